//! Memo vocabulary shared by events and stored reports
//!
//! Section keys, confidence, provenance and the step tree.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// One of the five memo sections
///
/// Declaration order is the canonical memo order; `Ord` follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKey {
    Bio,
    Forecast,
    Earnings,
    Peer,
    Valuation,
}

impl SectionKey {
    /// Every section in canonical order
    pub const ALL: [SectionKey; 5] = [
        SectionKey::Bio,
        SectionKey::Forecast,
        SectionKey::Earnings,
        SectionKey::Peer,
        SectionKey::Valuation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKey::Bio => "bio",
            SectionKey::Forecast => "forecast",
            SectionKey::Earnings => "earnings",
            SectionKey::Peer => "peer",
            SectionKey::Valuation => "valuation",
        }
    }

    /// Human-readable section title used in prompts and exports
    pub fn title(&self) -> &'static str {
        match self {
            SectionKey::Bio => "Background and Analyst Bio",
            SectionKey::Forecast => "Analyst Forecast",
            SectionKey::Earnings => "Post-Earnings Feedback and Questions",
            SectionKey::Peer => "Recent Peer Research",
            SectionKey::Valuation => "Valuation Ratios",
        }
    }

    /// Narrative sections carry drafted prose rather than a table
    pub fn is_narrative(&self) -> bool {
        matches!(self, SectionKey::Bio | SectionKey::Earnings | SectionKey::Peer)
    }

    /// Parse a request selection: `all` or a comma-separated list
    ///
    /// Blank entries are ignored, duplicates collapse, and the result is
    /// returned in canonical order regardless of input order.
    pub fn parse_selection(raw: &str) -> Result<Vec<SectionKey>, Error> {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("all") {
            return Ok(Self::ALL.to_vec());
        }

        let mut keys = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(SectionKey::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

impl fmt::Display for SectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SectionKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bio" => Ok(SectionKey::Bio),
            "forecast" => Ok(SectionKey::Forecast),
            "earnings" => Ok(SectionKey::Earnings),
            "peer" => Ok(SectionKey::Peer),
            "valuation" => Ok(SectionKey::Valuation),
            other => Err(Error::InvalidInput(format!("Unknown section: {}", other))),
        }
    }
}

/// Confidence rating attached to every section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

/// Confidence rating plus its human-readable reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confidence {
    pub level: ConfidenceLevel,
    pub reason: String,
}

impl Confidence {
    pub fn new(level: ConfidenceLevel, reason: impl Into<String>) -> Self {
        Self {
            level,
            reason: reason.into(),
        }
    }

    pub fn low(reason: impl Into<String>) -> Self {
        Self::new(ConfidenceLevel::Low, reason)
    }
}

/// Provenance entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Empty for local or API sources with no public page
    pub url: String,
    pub domain: String,
    pub label: String,
}

/// Node of the progress step tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepNode {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<StepNode>,
}

impl StepNode {
    pub fn leaf(id: &str, label: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            children: Vec::new(),
        }
    }
}

/// Step lifecycle status reported in `step_update`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Running,
    Complete,
    Error,
}

/// Findings attached to a completed or failed step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Findings {
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<Preview>,
}

impl Findings {
    pub fn summary(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            detail: None,
            sources: Vec::new(),
            preview: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_sources(mut self, sources: Vec<Source>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_preview(mut self, preview: Option<Preview>) -> Self {
        self.preview = preview;
        self
    }
}

/// Compact preview of raw data shown alongside step findings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Preview {
    /// Key fields of the analyst's forecast row
    ForecastTable {
        rows: Vec<PreviewRow>,
        local_source: bool,
    },
    /// The analyst's first exchange in the transcript
    TranscriptSnippet {
        analyst_name: String,
        snippet: String,
        char_count: usize,
        local_source: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewRow {
    pub label: String,
    pub value: String,
}

impl PreviewRow {
    pub fn new(label: &str, value: impl Into<String>) -> Self {
        Self {
            label: label.to_string(),
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_all_is_canonical() {
        assert_eq!(SectionKey::parse_selection("all").unwrap(), SectionKey::ALL.to_vec());
        assert_eq!(SectionKey::parse_selection("").unwrap(), SectionKey::ALL.to_vec());
    }

    #[test]
    fn test_selection_reorders_and_dedupes() {
        let keys = SectionKey::parse_selection("valuation, bio,valuation").unwrap();
        assert_eq!(keys, vec![SectionKey::Bio, SectionKey::Valuation]);
    }

    #[test]
    fn test_unknown_section_rejected() {
        let err = SectionKey::parse_selection("bio,weather").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(ref m) if m.contains("weather")));
    }

    #[test]
    fn test_step_status_wire_format() {
        assert_eq!(serde_json::to_string(&StepStatus::Complete).unwrap(), "\"complete\"");
        assert_eq!(
            serde_json::to_string(&ConfidenceLevel::Medium).unwrap(),
            "\"medium\""
        );
    }

    #[test]
    fn test_findings_omit_empty_fields() {
        let value = serde_json::to_value(Findings::summary("done")).unwrap();
        assert_eq!(value, serde_json::json!({"summary": "done"}));
    }

    #[test]
    fn test_preview_tagged() {
        let preview = Preview::TranscriptSnippet {
            analyst_name: "Jane Roe".into(),
            snippet: "Jane Roe: question".into(),
            char_count: 1200,
            local_source: true,
        };
        let value = serde_json::to_value(&preview).unwrap();
        assert_eq!(value["type"], "transcript_snippet");
        assert_eq!(value["char_count"], 1200);
    }
}
