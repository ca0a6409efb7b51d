//! Stored memo report
//!
//! A report is the subject, a record per generated section, the quality
//! verdict and the run metadata fed to the quality check.

use chrono::{DateTime, Utc};
use irm_common::events::{
    Confidence, ForecastTable, MemoEvent, QualityVerdict, SectionKey, Source, ValuationSnapshot,
    STOCK_PRICE_METRIC,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::tasks::market_data::PE_TTM;

/// Placeholder for metadata not yet known
pub const NOT_AVAILABLE: &str = "N/A";

/// Who the memo is about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub analyst: String,
    /// Empty when the analyst is not in the forecast workbook
    pub firm: String,
    /// Target company ticker
    pub ticker: String,
}

/// Outcome of a drafting call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftStatus {
    Success,
    Error,
}

/// Section content, one shape per section kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SectionBody {
    /// Drafted prose (bio, earnings, peer)
    Narrative { text: String, status: DraftStatus },
    Forecast(ForecastTable),
    Valuation(ValuationSnapshot),
    /// Section could not be produced
    Failed { message: String },
}

/// One section of the report
///
/// Every record carries exactly one confidence, whatever its shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionRecord {
    pub body: SectionBody,
    pub sources: Vec<Source>,
    pub confidence: Confidence,
}

impl SectionRecord {
    /// Failure marker: low confidence, no sources
    pub fn failed(message: impl Into<String>, reason: &str) -> Self {
        Self {
            body: SectionBody::Failed {
                message: message.into(),
            },
            sources: Vec::new(),
            confidence: Confidence::low(reason),
        }
    }

    pub fn narrative_text(&self) -> Option<&str> {
        match &self.body {
            SectionBody::Narrative { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn forecast(&self) -> Option<&ForecastTable> {
        match &self.body {
            SectionBody::Forecast(table) => Some(table),
            _ => None,
        }
    }

    pub fn valuation(&self) -> Option<&ValuationSnapshot> {
        match &self.body {
            SectionBody::Valuation(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.body, SectionBody::Failed { .. })
    }

    /// Narrative holding a drafting error marker instead of prose
    pub fn draft_failed(&self) -> bool {
        matches!(
            self.body,
            SectionBody::Narrative {
                status: DraftStatus::Error,
                ..
            }
        )
    }

    /// The payload event announcing this record
    ///
    /// Failed records have no payload event; their failure is reported on
    /// the step that produced them.
    pub fn payload_event(&self, key: SectionKey, regen: bool) -> Option<MemoEvent> {
        let sources = self.sources.clone();
        let confidence = self.confidence.clone();
        let event = match (&self.body, regen) {
            (SectionBody::Narrative { text, .. }, false) => MemoEvent::Section {
                section: key,
                content: text.clone(),
                sources,
                confidence,
            },
            (SectionBody::Narrative { text, .. }, true) => MemoEvent::RegenSection {
                section: key,
                content: text.clone(),
                sources,
                confidence,
            },
            (SectionBody::Forecast(table), false) => MemoEvent::Forecast {
                table: table.clone(),
                sources,
                confidence,
            },
            (SectionBody::Forecast(table), true) => MemoEvent::RegenForecast {
                table: table.clone(),
                sources,
                confidence,
            },
            (SectionBody::Valuation(snapshot), false) => MemoEvent::Valuation {
                snapshot: snapshot.clone(),
                sources,
                confidence,
            },
            (SectionBody::Valuation(snapshot), true) => MemoEvent::RegenValuation {
                snapshot: snapshot.clone(),
                sources,
                confidence,
            },
            (SectionBody::Failed { .. }, _) => return None,
        };
        Some(event)
    }

    /// Plain-text rendering handed to the quality check
    pub fn review_text(&self) -> String {
        match &self.body {
            SectionBody::Narrative { text, .. } => text.clone(),
            SectionBody::Forecast(table) => {
                let mut lines: Vec<String> = table
                    .table_rows
                    .iter()
                    .map(|r| {
                        format!(
                            "{}: Analyst={}, Consensus={}, Delta={}",
                            r.label,
                            display_number(r.analyst),
                            display_number(r.consensus),
                            r.delta.as_deref().unwrap_or(NOT_AVAILABLE)
                        )
                    })
                    .collect();
                lines.push(format!(
                    "Rating: {}, Price Target: ${}",
                    table.rating,
                    display_number(table.price_target)
                ));
                lines.push(format!("Date Updated: {}", table.date_updated));
                format!("Forecast table data:\n{}", lines.join("\n"))
            }
            SectionBody::Valuation(snapshot) => {
                let lines: Vec<String> = snapshot
                    .ticker_order
                    .iter()
                    .map(|t| {
                        format!(
                            "{}: Price=${}, P/E={}",
                            t,
                            display_number(snapshot.metric(t, STOCK_PRICE_METRIC)),
                            display_number(snapshot.metric(t, PE_TTM))
                        )
                    })
                    .collect();
                format!(
                    "Live valuation data as of {}:\n{}",
                    snapshot.as_of,
                    lines.join("\n")
                )
            }
            SectionBody::Failed { message } => message.chars().take(500).collect(),
        }
    }
}

fn display_number(value: Option<f64>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

/// Facts about the run handed to the quality check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub valuation_timestamp: String,
    pub forecast_date_updated: String,
    pub transcript_source: String,
}

impl Default for RunMetadata {
    fn default() -> Self {
        Self {
            valuation_timestamp: NOT_AVAILABLE.to_string(),
            forecast_date_updated: NOT_AVAILABLE.to_string(),
            transcript_source: NOT_AVAILABLE.to_string(),
        }
    }
}

/// A completed memo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub subject: Subject,
    pub created_at: DateTime<Utc>,
    pub sections: BTreeMap<SectionKey, SectionRecord>,
    pub quality: Option<QualityVerdict>,
    pub metadata: RunMetadata,
}

impl Report {
    pub fn new(subject: Subject, created_at: DateTime<Utc>) -> Self {
        Self {
            subject,
            created_at,
            sections: BTreeMap::new(),
            quality: None,
            metadata: RunMetadata::default(),
        }
    }

    /// Preparation date as shown on the memo, e.g. "March 04, 2026"
    pub fn date_label(&self) -> String {
        self.created_at.format("%B %d, %Y").to_string()
    }

    pub fn section(&self, key: SectionKey) -> Option<&SectionRecord> {
        self.sections.get(&key)
    }
}
