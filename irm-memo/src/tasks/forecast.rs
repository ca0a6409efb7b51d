//! Analyst forecast workbook
//!
//! Reads the `Forecasts` sheet of the analyst key-metrics workbook. Each
//! row is one analyst update; the analyst's most recent row becomes a
//! [`ForecastTable`] with deltas versus consensus.

use async_trait::async_trait;
use calamine::{open_workbook_auto, Data, Reader};
use chrono::{Duration as ChronoDuration, Local, NaiveDate};
use irm_common::events::{ForecastRow, ForecastTable};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{AnalystEntry, ForecastSource, LeafError};

pub const FORECAST_SHEET: &str = "Forecasts";

/// Placeholder delta when either side is missing
pub const VALUE_UNAVAILABLE: &str = "[Value unavailable]";

const DATE_UNAVAILABLE: &str = "[Date unavailable]";
const RATING_UNAVAILABLE: &str = "[Not available]";

/// Forecasts older than this are stale
pub const STALE_AFTER_DAYS: i64 = 30;

/// Table layout: (label, analyst column, consensus column, indent)
pub const FORECAST_ROWS: [(&str, &str, &str, u8); 14] = [
    ("ISG Revenues", "ISG Revenues", "Consensus ISG", 0),
    ("Total S&T", "Total S&T", "Consensus S&T", 1),
    ("Equity", "Equity", "Consensus Equity", 2),
    ("Fixed Income", "Fixed Income", "Consensus FI", 2),
    ("Total BD", "Total BD", "Consensus BD", 1),
    ("Advisory", "Advisory", "Consensus Advisory", 2),
    ("Equity U/W", "Equity U/W", "Consensus Eq UW", 2),
    ("Debt U/W", "Debt U/W", "Consensus Debt UW", 2),
    ("WM Revenues", "WM Revenues", "Consensus WM", 0),
    ("IM Revenues", "IM Revenues", "Consensus IM", 0),
    ("Firmwide Revenues", "Firmwide Revenues", "Consensus Firmwide", 0),
    ("EPS", "EPS", "Consensus EPS", 0),
    ("ROE", "ROE", "Consensus ROE", 0),
    ("ROTCE", "ROTCE", "Consensus ROTCE", 0),
];

/// A workbook cell reduced to what the forecast needs
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Number(f64),
    Text(String),
    Date(NaiveDate),
    Empty,
}

impl Cell {
    fn from_data(data: &Data) -> Self {
        match data {
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Float(f) => Cell::Number(*f),
            Data::String(s) if s.trim().is_empty() => Cell::Empty,
            Data::String(s) => Cell::Text(s.trim().to_string()),
            Data::Bool(b) => Cell::Text(b.to_string()),
            Data::DateTime(dt) => excel_serial_date(dt.as_f64()).map_or(Cell::Empty, Cell::Date),
            Data::DateTimeIso(s) => parse_date_text(s).map_or(Cell::Empty, Cell::Date),
            Data::DurationIso(_) | Data::Error(_) | Data::Empty => Cell::Empty,
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) if n.is_finite() => Some(*n),
            Cell::Text(s) => s.replace(['$', ','], "").trim().parse().ok(),
            _ => None,
        }
    }

    fn as_text(&self) -> Option<String> {
        match self {
            Cell::Text(s) => Some(s.clone()),
            Cell::Number(n) => Some(n.to_string()),
            Cell::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            Cell::Empty => None,
        }
    }

    fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Cell::Date(d) => Some(*d),
            Cell::Number(n) => excel_serial_date(*n),
            Cell::Text(s) => parse_date_text(s),
            Cell::Empty => None,
        }
    }
}

/// Excel serial day number to a date (1900 date system)
fn excel_serial_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|base| base.checked_add_signed(ChronoDuration::days(serial.trunc() as i64)))
}

fn parse_date_text(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    let head = trimmed.get(..10).unwrap_or(trimmed);
    ["%Y-%m-%d", "%m/%d/%Y", "%B %d, %Y"]
        .iter()
        .find_map(|fmt| {
            NaiveDate::parse_from_str(head, fmt)
                .or_else(|_| NaiveDate::parse_from_str(trimmed, fmt))
                .ok()
        })
}

/// One sheet row keyed by header name
pub type SheetRecord = HashMap<String, Cell>;

fn cell<'a>(record: &'a SheetRecord, column: &str) -> &'a Cell {
    record.get(column).unwrap_or(&Cell::Empty)
}

/// `+X.X%` difference of analyst versus consensus
pub fn format_delta(analyst: Option<f64>, consensus: Option<f64>) -> Option<String> {
    let (analyst, consensus) = (analyst?, consensus?);
    if consensus == 0.0 {
        return None;
    }
    let delta = (analyst - consensus) / consensus * 100.0;
    let sign = if delta > 0.0 { "+" } else { "" };
    Some(format!("{}{:.1}%", sign, delta))
}

/// The analyst's most recent row (case-insensitive name match)
///
/// Rows without a parseable date sort after dated rows; ties keep sheet
/// order.
pub fn latest_for_analyst<'a>(records: &'a [SheetRecord], analyst: &str) -> Option<&'a SheetRecord> {
    let wanted = analyst.trim().to_lowercase();
    let mut best: Option<(&SheetRecord, Option<NaiveDate>)> = None;

    for record in records {
        let matches = cell(record, "Analyst")
            .as_text()
            .is_some_and(|name| name.trim().to_lowercase() == wanted);
        if !matches {
            continue;
        }
        let date = cell(record, "Date Updated").as_date();
        let better = match &best {
            None => true,
            Some((_, best_date)) => date > *best_date,
        };
        if better {
            best = Some((record, date));
        }
    }

    best.map(|(record, _)| record)
}

/// Build the forecast table from a sheet row as of `today`
pub fn build_table(record: &SheetRecord, fallback_name: &str, today: NaiveDate) -> ForecastTable {
    let updated = cell(record, "Date Updated").as_date();
    let date_updated = updated
        .map(|d| d.format("%B %d, %Y").to_string())
        .unwrap_or_else(|| DATE_UNAVAILABLE.to_string());
    let is_stale = updated.is_some_and(|d| (today - d).num_days() > STALE_AFTER_DAYS);

    let table_rows = FORECAST_ROWS
        .iter()
        .map(|(label, analyst_col, consensus_col, indent)| {
            let analyst = cell(record, analyst_col).as_number();
            let consensus = cell(record, consensus_col).as_number();
            ForecastRow {
                label: label.to_string(),
                indent: *indent,
                analyst,
                consensus,
                delta: Some(
                    format_delta(analyst, consensus)
                        .unwrap_or_else(|| VALUE_UNAVAILABLE.to_string()),
                ),
                bold: None,
                highlight: None,
            }
        })
        .collect();

    ForecastTable {
        analyst_name: cell(record, "Analyst")
            .as_text()
            .unwrap_or_else(|| fallback_name.to_string()),
        firm: cell(record, "Firm").as_text().unwrap_or_default(),
        date_updated,
        is_stale,
        table_rows,
        rating: cell(record, "Rating")
            .as_text()
            .unwrap_or_else(|| RATING_UNAVAILABLE.to_string()),
        price_target: cell(record, "Price Target").as_number(),
    }
}

/// Unique analysts in sheet order, first occurrence wins
pub fn analyst_entries(records: &[SheetRecord]) -> Vec<AnalystEntry> {
    let mut entries: Vec<AnalystEntry> = Vec::new();
    for record in records {
        let Some(name) = cell(record, "Analyst").as_text() else {
            continue;
        };
        if entries.iter().any(|e| e.name == name) {
            continue;
        }
        entries.push(AnalystEntry {
            name,
            firm: cell(record, "Firm").as_text().unwrap_or_default(),
        });
    }
    entries
}

/// Read every data row of the forecast sheet
pub fn read_sheet(path: &Path) -> Result<Vec<SheetRecord>, LeafError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| {
        LeafError::NotAvailable(format!("Failed to read Excel file {}: {}", path.display(), e))
    })?;
    let range = workbook.worksheet_range(FORECAST_SHEET).map_err(|e| {
        LeafError::Parse(format!("Sheet '{}' unreadable: {}", FORECAST_SHEET, e))
    })?;

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header_row) => header_row
            .iter()
            .map(|c| match c {
                Data::Empty => String::new(),
                other => other.to_string().trim().to_string(),
            })
            .collect(),
        None => return Ok(Vec::new()),
    };

    let records: Vec<SheetRecord> = rows
        .map(|row| {
            headers
                .iter()
                .zip(row.iter())
                .filter(|(h, _)| !h.is_empty())
                .map(|(h, data)| (h.clone(), Cell::from_data(data)))
                .collect()
        })
        .collect();

    debug!(rows = records.len(), "Forecast sheet read");
    Ok(records)
}

/// Workbook-backed forecast source
pub struct ExcelForecastSource {
    path: PathBuf,
}

impl ExcelForecastSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    async fn records(&self) -> Result<Vec<SheetRecord>, LeafError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_sheet(&path))
            .await
            .map_err(|e| LeafError::NotAvailable(format!("Workbook reader task failed: {}", e)))?
    }
}

#[async_trait]
impl ForecastSource for ExcelForecastSource {
    async fn read(&self, analyst: &str) -> Result<ForecastTable, LeafError> {
        let records = self.records().await?;
        let record = latest_for_analyst(&records, analyst).ok_or_else(|| {
            LeafError::NotAvailable(format!("Analyst '{}' not found in Excel file", analyst))
        })?;

        let table = build_table(record, analyst, Local::now().date_naive());
        info!(
            analyst = %table.analyst_name,
            date_updated = %table.date_updated,
            stale = table.is_stale,
            "Forecast loaded"
        );
        Ok(table)
    }

    async fn list_analysts(&self) -> Result<Vec<AnalystEntry>, LeafError> {
        Ok(analyst_entries(&self.records().await?))
    }
}
