//! Headline accuracy figures over a merged forecast error table.

use crate::oasis::analysis::{ForecastError, ForecastErrorTable};
use serde::Serialize;
use std::collections::BTreeMap;

/// Accuracy figures for a whole table.
///
/// Hours whose aggregates are not finite (an all-missing group) are left out
/// of the MW based figures. MAPE only averages the finite percent errors, so
/// hours with zero actual load do not poison it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorSummary {
    pub hours: usize,
    pub mean_absolute_error: f64,
    pub mean_absolute_percent_error: Option<f64>,
    pub mean_bias: f64,
    pub root_mean_square_error: f64,
    /// Hour with the largest absolute error
    pub worst_hour: Option<ForecastError>,
}

/// Error figures for the rows sharing one key (hour of day or day of week)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileBucket {
    pub key: u32,
    pub hours: usize,
    pub mean_absolute_error: f64,
    pub mean_bias: f64,
}

impl ErrorSummary {
    pub fn from_table(table: &ForecastErrorTable) -> Self {
        let finite: Vec<&ForecastError> = table
            .rows()
            .iter()
            .filter(|row| row.abs_error.is_finite())
            .collect();

        if finite.is_empty() {
            return Self {
                hours: table.len(),
                mean_absolute_error: 0.0,
                mean_absolute_percent_error: None,
                mean_bias: 0.0,
                root_mean_square_error: 0.0,
                worst_hour: None,
            };
        }

        let n = finite.len() as f64;
        let mut abs_sum = 0.0;
        let mut bias_sum = 0.0;
        let mut sq_sum = 0.0;
        for row in &finite {
            abs_sum += row.abs_error;
            bias_sum += row.forecast_bias;
            sq_sum += row.forecast_bias * row.forecast_bias;
        }

        let percent: Vec<f64> = finite
            .iter()
            .map(|row| row.percent_error)
            .filter(|p| p.is_finite())
            .collect();
        let mean_absolute_percent_error = if percent.is_empty() {
            None
        } else {
            Some(percent.iter().sum::<f64>() / percent.len() as f64)
        };

        let worst_hour = finite
            .iter()
            .max_by(|a, b| {
                a.abs_error
                    .partial_cmp(&b.abs_error)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|row| (*row).clone());

        Self {
            hours: table.len(),
            mean_absolute_error: abs_sum / n,
            mean_absolute_percent_error,
            mean_bias: bias_sum / n,
            root_mean_square_error: (sq_sum / n).sqrt(),
            worst_hour,
        }
    }

    /// Positive mean bias means the forecast ran above actual load
    pub fn is_over_forecasting(&self) -> bool {
        self.mean_bias > 0.0
    }

    pub fn bias_direction(&self) -> &'static str {
        if self.is_over_forecasting() {
            "over-forecast"
        } else if self.mean_bias < 0.0 {
            "under-forecast"
        } else {
            "unbiased"
        }
    }
}

/// Error figures grouped by operating hour
pub fn hourly_profile(table: &ForecastErrorTable) -> Vec<ProfileBucket> {
    profile_by(table, |row| row.hour)
}

/// Error figures grouped by day of week (0 = Monday)
pub fn weekday_profile(table: &ForecastErrorTable) -> Vec<ProfileBucket> {
    profile_by(table, |row| row.day_of_week)
}

fn profile_by(table: &ForecastErrorTable, key: impl Fn(&ForecastError) -> u32) -> Vec<ProfileBucket> {
    let mut buckets: BTreeMap<u32, (usize, f64, f64)> = BTreeMap::new();

    for row in table.rows().iter().filter(|row| row.abs_error.is_finite()) {
        let (count, abs_sum, bias_sum) = buckets.entry(key(row)).or_insert((0, 0.0, 0.0));
        *count += 1;
        *abs_sum += row.abs_error;
        *bias_sum += row.forecast_bias;
    }

    buckets
        .into_iter()
        .map(|(key, (count, abs_sum, bias_sum))| ProfileBucket {
            key,
            hours: count,
            mean_absolute_error: abs_sum / count as f64,
            mean_bias: bias_sum / count as f64,
        })
        .collect()
}
