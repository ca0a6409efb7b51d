//! Drafting prompt templates
//!
//! Templates use `{name}` placeholders. Unknown placeholders and literal
//! braces are left as written.

use serde::{Deserialize, Serialize};

/// Prompt template identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    AnalystBio,
    EarningsFeedback,
    PeerResearch,
    QualityCheck,
}

impl Template {
    pub fn text(&self) -> &'static str {
        match self {
            Template::AnalystBio => include_str!("../../prompts/analyst_bio.txt"),
            Template::EarningsFeedback => include_str!("../../prompts/earnings_feedback.txt"),
            Template::PeerResearch => include_str!("../../prompts/peer_research.txt"),
            Template::QualityCheck => include_str!("../../prompts/quality_check.txt"),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Template::AnalystBio => "analyst_bio",
            Template::EarningsFeedback => "earnings_feedback",
            Template::PeerResearch => "peer_research",
            Template::QualityCheck => "quality_check",
        }
    }
}

/// Fill `{name}` placeholders from `context`
pub fn render(template: Template, context: &[(&str, &str)]) -> String {
    context
        .iter()
        .fold(template.text().to_string(), |text, (name, value)| {
            text.replace(&format!("{{{}}}", name), value)
        })
}
