use crate::oasis::{LoadRecord, LoadTable, OasisClient, OasisError};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io;
use tracing::{debug, info, warn};

type HourKey = (NaiveDate, u32);

/// Forecast error for one operating hour
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastError {
    #[serde(rename = "OPR_DT")]
    pub opr_dt: NaiveDate,
    #[serde(rename = "OPR_HR")]
    pub opr_hr: u32,
    #[serde(rename = "MW_forecast")]
    pub mw_forecast: f64,
    #[serde(rename = "MW_actual")]
    pub mw_actual: f64,
    pub abs_error: f64,
    /// abs_error relative to actual load; not finite when actual is zero
    pub percent_error: f64,
    pub forecast_bias: f64, // forecast - actual
    pub hour: u32,
    /// 0 = Monday .. 6 = Sunday
    pub day_of_week: u32,
}

impl ForecastError {
    fn new((opr_dt, opr_hr): HourKey, mw_forecast: f64, mw_actual: f64) -> Self {
        let forecast_bias = mw_forecast - mw_actual;
        let abs_error = forecast_bias.abs();

        Self {
            opr_dt,
            opr_hr,
            mw_forecast,
            mw_actual,
            abs_error,
            percent_error: abs_error / mw_actual * 100.0,
            forecast_bias,
            hour: opr_hr,
            day_of_week: opr_dt.weekday().num_days_from_monday(),
        }
    }

    /// Check if the forecast was above the actual load
    pub fn is_over_forecast(&self) -> bool {
        self.forecast_bias > 0.0
    }
}

/// Merged forecast/actual table, ordered by operating date and hour
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ForecastErrorTable {
    rows: Vec<ForecastError>,
}

impl ForecastErrorTable {
    pub const COLUMNS: [&'static str; 9] = [
        "OPR_DT",
        "OPR_HR",
        "MW_forecast",
        "MW_actual",
        "abs_error",
        "percent_error",
        "forecast_bias",
        "hour",
        "day_of_week",
    ];

    pub fn columns(&self) -> &'static [&'static str] {
        &Self::COLUMNS
    }

    pub fn rows(&self) -> &[ForecastError] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render the table as CSV. The header row is written even when there are no rows.
    pub fn to_csv(&self) -> Result<String, OasisError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(vec![]);

        writer.write_record(Self::COLUMNS)?;
        for row in &self.rows {
            writer.serialize(row)?;
        }

        let data = writer.into_inner().map_err(|e| e.into_error())?;
        String::from_utf8(data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e).into())
    }
}

/// Aligns a forecast report with an actual load report
pub struct LoadDataProcessor {
    forecast: LoadTable,
    actual: LoadTable,
}

impl LoadDataProcessor {
    pub fn new(forecast: LoadTable, actual: LoadTable) -> Self {
        Self { forecast, actual }
    }

    pub fn forecast(&self) -> &LoadTable {
        &self.forecast
    }

    pub fn actual(&self) -> &LoadTable {
        &self.actual
    }

    /// Hourly forecast error for one TAC area.
    ///
    /// Both reports are reduced to the mean MW of every (date, hour) and only
    /// hours present on both sides are kept.
    pub fn filter_and_merge(&self, tac_area: &str) -> ForecastErrorTable {
        let forecast_hourly = hourly_means(self.forecast.for_tac_area(tac_area));
        let actual_hourly = hourly_means(self.actual.for_tac_area(tac_area));
        let forecast_hours = forecast_hourly.len();
        let actual_hours = actual_hourly.len();

        let rows: Vec<ForecastError> = forecast_hourly
            .into_iter()
            .filter_map(|(key, forecast)| {
                actual_hourly
                    .get(&key)
                    .map(|&actual| ForecastError::new(key, forecast, actual))
            })
            .collect();

        debug!(
            tac_area,
            forecast_hours,
            actual_hours,
            merged_hours = rows.len(),
            "merged forecast and actual load"
        );

        ForecastErrorTable { rows }
    }
}

/// Mean MW per (date, hour). Missing values are skipped; a group with no
/// values at all averages to NaN.
fn hourly_means<'a>(records: impl Iterator<Item = &'a LoadRecord>) -> BTreeMap<HourKey, f64> {
    let mut groups: BTreeMap<HourKey, (f64, usize)> = BTreeMap::new();

    for record in records {
        let (sum, count) = groups
            .entry((record.opr_dt, record.opr_hr))
            .or_insert((0.0, 0));
        if let Some(mw) = record.mw.filter(|mw| !mw.is_nan()) {
            *sum += mw;
            *count += 1;
        }
    }

    groups
        .into_iter()
        .map(|(key, (sum, count))| {
            let mean = if count == 0 {
                f64::NAN
            } else {
                sum / count as f64
            };
            (key, mean)
        })
        .collect()
}

impl OasisClient {
    /// Fetch a forecast and an actual load report and merge them for one TAC area.
    /// The two reports are requested one after the other.
    pub async fn fetch_forecast_error(
        &self,
        forecast_query: &str,
        actual_query: &str,
        period_start: &str,
        period_end: &str,
        tac_area: &str,
    ) -> Result<ForecastErrorTable, OasisError> {
        let forecast = self
            .fetch(forecast_query, period_start, period_end, tac_area)
            .await?;
        let actual = self
            .fetch(actual_query, period_start, period_end, tac_area)
            .await?;

        let processor = LoadDataProcessor::new(forecast, actual);
        info!(
            forecast_rows = processor.forecast().len(),
            actual_rows = processor.actual().len(),
            "fetched OASIS reports"
        );
        if processor.forecast().is_empty() || processor.actual().is_empty() {
            warn!(tac_area, "an OASIS report came back empty, no hours can be merged");
        }

        Ok(processor.filter_and_merge(tac_area))
    }
}
