//! Structured section payloads
//!
//! Forecast table, valuation snapshot and quality-check verdict. These are
//! sent verbatim in `forecast`, `valuation` and `quality_check` events and
//! stored in the report.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label of the valuation metric used to detect a failed quote pull
pub const STOCK_PRICE_METRIC: &str = "Stock Price";

/// One forecast metric row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    pub label: String,
    /// 0 = parent, 1 = sub, 2 = sub-sub
    #[serde(default)]
    pub indent: u8,
    #[serde(default)]
    pub analyst: Option<f64>,
    #[serde(default)]
    pub consensus: Option<f64>,
    #[serde(default)]
    pub delta: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight: Option<bool>,
}

impl ForecastRow {
    /// Row missing either side of the comparison
    pub fn is_incomplete(&self) -> bool {
        self.analyst.is_none() || self.consensus.is_none()
    }
}

/// The analyst's forecast versus consensus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastTable {
    pub analyst_name: String,
    pub firm: String,
    /// Display date, e.g. "March 04, 2025"
    pub date_updated: String,
    pub is_stale: bool,
    pub table_rows: Vec<ForecastRow>,
    pub rating: String,
    pub price_target: Option<f64>,
}

impl ForecastTable {
    pub fn missing_count(&self) -> usize {
        self.table_rows.iter().filter(|r| r.is_incomplete()).count()
    }

    pub fn row(&self, label: &str) -> Option<&ForecastRow> {
        self.table_rows.iter().find(|r| r.label == label)
    }
}

/// Market metrics for the target and its peers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationSnapshot {
    /// Display order, target symbol first
    pub ticker_order: Vec<String>,
    /// symbol -> metric label -> value
    pub tickers: BTreeMap<String, BTreeMap<String, Option<f64>>>,
    /// metric label -> median across non-target symbols
    pub peer_median: BTreeMap<String, Option<f64>>,
    pub as_of: String,
}

impl ValuationSnapshot {
    pub fn metric(&self, symbol: &str, label: &str) -> Option<f64> {
        self.tickers
            .get(symbol)
            .and_then(|metrics| metrics.get(label).copied().flatten())
    }

    /// Symbols whose quote pull produced no price
    pub fn failed_symbols(&self) -> usize {
        self.ticker_order
            .iter()
            .filter(|t| self.metric(t, STOCK_PRICE_METRIC).is_none())
            .count()
    }

    pub fn target(&self) -> Option<&str> {
        self.ticker_order.first().map(String::as_str)
    }
}

/// Whole-memo quality-check result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityVerdict {
    /// pass, warnings, fail or error
    #[serde(default = "default_overall_status")]
    pub overall_status: String,
    #[serde(default)]
    pub sections: serde_json::Value,
    #[serde(default)]
    pub summary: String,
}

fn default_overall_status() -> String {
    "unknown".to_string()
}

impl QualityVerdict {
    pub fn new(overall_status: &str, summary: impl Into<String>) -> Self {
        Self {
            overall_status: overall_status.to_string(),
            sections: serde_json::Value::Object(Default::default()),
            summary: summary.into(),
        }
    }

    /// Text reported on the `quality_check` step, e.g. "PASS - looks good"
    pub fn findings_text(&self) -> String {
        let mut text = self.overall_status.to_uppercase();
        if !self.summary.is_empty() {
            let head: String = self.summary.chars().take(100).collect();
            text.push_str(" - ");
            text.push_str(&head);
        }
        text
    }
}
