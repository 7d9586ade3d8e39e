pub(crate) mod analysis;
pub(crate) mod areas;
pub(crate) mod summary;

use std::io::{Cursor, Read};

use chrono::{NaiveDate, NaiveTime};
use reqwest::{Client, Url};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};
use zip::ZipArchive;

pub const DEFAULT_BASE_URL: &str = "http://oasis.caiso.com/oasisapi/SingleZip";

/// Transmission access charge area used when the caller does not name one
pub const DEFAULT_TAC_AREA: &str = "PGE-TAC";

// resultformat=6 asks OASIS for CSV files inside the ZIP
const RESULT_FORMAT_CSV: &str = "6";
const API_VERSION: &str = "1";
const MARKET_RUN_ID: &str = "RTM";

#[derive(Error, Debug)]
pub enum OasisError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Request failed: {0}")]
    Status(u16),
    #[error("Invalid base URL: {0}")]
    InvalidUrl(String),
    #[error("ZIP extraction failed: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("CSV parsing failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One row of an OASIS load report.
///
/// Only the columns the error analysis needs are kept; the rest of the vendor
/// columns are ignored. A row whose date, hour or MW cell does not parse
/// rejects the whole report.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoadRecord {
    #[serde(rename = "TAC_AREA_NAME")]
    pub tac_area_name: String,
    #[serde(rename = "OPR_DT")]
    pub opr_dt: NaiveDate,
    #[serde(rename = "OPR_HR")]
    pub opr_hr: u32,
    /// Empty cells are missing values
    #[serde(rename = "MW")]
    pub mw: Option<f64>,
}

/// Rows of a single report, in file order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadTable {
    records: Vec<LoadRecord>,
}

impl LoadTable {
    pub fn new(records: Vec<LoadRecord>) -> Self {
        Self { records }
    }

    /// Parse CSV with a header row into typed records
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, OasisError> {
        let mut reader = csv::Reader::from_reader(reader);
        let records = reader
            .deserialize()
            .collect::<Result<Vec<LoadRecord>, csv::Error>>()?;

        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rows belonging to one TAC area
    pub fn for_tac_area<'a>(&'a self, tac_area: &'a str) -> impl Iterator<Item = &'a LoadRecord> {
        self.records
            .iter()
            .filter(move |record| record.tac_area_name == tac_area)
    }
}

impl From<Vec<LoadRecord>> for LoadTable {
    fn from(records: Vec<LoadRecord>) -> Self {
        Self::new(records)
    }
}

// OASIS answers an empty selection with an XML report instead of a CSV file
#[derive(Debug, Deserialize)]
#[serde(rename = "OASISReport")]
struct OasisReport {
    #[serde(rename = "MessagePayload")]
    payload: MessagePayload,
}

#[derive(Debug, Deserialize)]
struct MessagePayload {
    #[serde(rename = "RTO")]
    rto: Rto,
}

#[derive(Debug, Deserialize)]
struct Rto {
    #[serde(rename = "ERROR", default)]
    errors: Vec<ReportError>,
}

#[derive(Debug, Deserialize)]
struct ReportError {
    #[serde(rename = "ERR_CODE")]
    code: String,
    #[serde(rename = "ERR_DESC")]
    description: String,
}

pub struct OasisClient {
    client: Client,
    base_url: String,
}

impl OasisClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch one report for a TAC area from the real-time market run.
    ///
    /// `start_date` and `end_date` are passed to OASIS verbatim, see
    /// [`format_period`] for the expected shape. An archive without a CSV
    /// file yields an empty table, not an error.
    pub async fn fetch(
        &self,
        query_name: &str,
        start_date: &str,
        end_date: &str,
        tac_area: &str,
    ) -> Result<LoadTable, OasisError> {
        let url = self.request_url(query_name, start_date, end_date, tac_area)?;
        debug!(%url, "requesting OASIS report");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(OasisError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        read_first_csv(&body)
    }

    fn request_url(
        &self,
        query_name: &str,
        start_date: &str,
        end_date: &str,
        tac_area: &str,
    ) -> Result<Url, OasisError> {
        let params = [
            ("resultformat", RESULT_FORMAT_CSV),
            ("queryname", query_name),
            ("version", API_VERSION),
            ("startdatetime", start_date),
            ("enddatetime", end_date),
            ("market_run_id", MARKET_RUN_ID),
            ("tac_area_name", tac_area),
        ];

        Url::parse_with_params(&self.base_url, &params)
            .map_err(|e| OasisError::InvalidUrl(format!("{}: {}", self.base_url, e)))
    }
}

impl Default for OasisClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a date range for OASIS (YYYYMMDDTHH:MM-0000), both ends at midnight GMT
pub fn format_period(start: NaiveDate, end: NaiveDate) -> (String, String) {
    let format = |date: NaiveDate| {
        date.and_time(NaiveTime::MIN)
            .format("%Y%m%dT%H:%M-0000")
            .to_string()
    };
    (format(start), format(end))
}

/// Unpack the first CSV entry of an in-memory ZIP archive
fn read_first_csv(bytes: &[u8]) -> Result<LoadTable, OasisError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    let names = (0..archive.len())
        .map(|i| archive.by_index(i).map(|entry| entry.name().to_string()))
        .collect::<Result<Vec<String>, _>>()?;

    let Some(csv_index) = names.iter().position(|name| name.ends_with(".csv")) else {
        match report_error_reason(&mut archive, &names) {
            Some(reason) => warn!("No CSV files found in ZIP ({})", reason),
            None => warn!("No CSV files found in ZIP"),
        }
        return Ok(LoadTable::default());
    };

    let entry = archive.by_index(csv_index)?;
    LoadTable::from_csv_reader(entry)
}

/// Best effort: decode the first OASIS error report found in the archive
fn report_error_reason(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    names: &[String],
) -> Option<String> {
    names
        .iter()
        .enumerate()
        .filter(|(_, name)| name.ends_with(".xml"))
        .find_map(|(i, _)| {
            let mut xml = String::new();
            archive.by_index(i).ok()?.read_to_string(&mut xml).ok()?;
            describe_report_errors(&xml)
        })
}

fn describe_report_errors(xml: &str) -> Option<String> {
    let report: OasisReport = quick_xml::de::from_str(xml).ok()?;
    let errors = report.payload.rto.errors;
    if errors.is_empty() {
        return None;
    }

    let reason = errors
        .iter()
        .map(|e| format!("{}: {}", e.code.trim(), e.description.trim()))
        .collect::<Vec<_>>()
        .join("; ");
    Some(reason)
}
