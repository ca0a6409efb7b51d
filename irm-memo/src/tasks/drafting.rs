//! Section drafting, editing and quality review
//!
//! Everything here goes through a [`Drafter`]. The production drafter calls
//! the Anthropic Messages API.

use async_trait::async_trait;
use irm_common::events::{ForecastRow, QualityVerdict, SectionKey};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{header, Client};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{error, info, warn};

use super::prompts::{render, Template};
use super::research::PeerResearch;
use super::{build_http_client, Drafter, LeafError, SearchHit};
use crate::models::{DraftStatus, RunMetadata};

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Token budget for the quality review
pub const QUALITY_CHECK_MAX_TOKENS: u32 = 1500;

const FORECAST_EDIT_MAX_TOKENS: u32 = 2000;

/// Characters kept when unparsable review text becomes the summary
const REVIEW_SUMMARY_CHARS: usize = 500;

static CODE_FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*\n(.*?)\n```").expect("valid regex"));

/// Token budget for drafting a section; earnings Q&A runs long
pub fn max_tokens_for(section: SectionKey) -> u32 {
    match section {
        SectionKey::Earnings => 3000,
        _ => 2000,
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

/// Anthropic Messages API drafter
pub struct AnthropicDrafter {
    client: Client,
    api_key: Option<String>,
    model: String,
}

impl AnthropicDrafter {
    pub fn new(api_key: Option<String>, model: &str, timeout: Duration) -> Result<Self, LeafError> {
        Ok(Self {
            client: build_http_client(timeout, None)?,
            api_key,
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl Drafter for AnthropicDrafter {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, LeafError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| LeafError::NotConfigured("ANTHROPIC_API_KEY not set".to_string()))?;

        let response = self
            .client
            .post(MESSAGES_URL)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&json!({
                "model": self.model,
                "max_tokens": max_tokens,
                "messages": [{"role": "user", "content": prompt}],
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let head: String = body.chars().take(200).collect();
            return Err(LeafError::Api(format!("Messages API returned {}: {}", status, head)));
        }

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| LeafError::Parse(format!("Messages response: {}", e)))?;

        body.content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or_else(|| LeafError::Parse("Messages response had no text block".to_string()))
    }
}

/// A drafted section
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    pub text: String,
    pub status: DraftStatus,
}

impl Draft {
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }

    pub fn is_success(&self) -> bool {
        self.status == DraftStatus::Success
    }
}

/// Draft a narrative section from a template
///
/// A drafting failure yields placeholder text with `DraftStatus::Error`
/// instead of an error.
pub async fn generate_section(
    drafter: &dyn Drafter,
    section: SectionKey,
    template: Template,
    context: &[(&str, &str)],
    extra_instruction: Option<&str>,
) -> Draft {
    let mut prompt = render(template, context);
    if let Some(instruction) = extra_instruction.filter(|i| !i.trim().is_empty()) {
        prompt.push_str("\n\nAdditional user instruction: ");
        prompt.push_str(instruction);
    }

    match drafter.complete(&prompt, max_tokens_for(section)).await {
        Ok(text) => {
            info!(section = %section, template = template.name(), "Section drafted");
            Draft {
                text,
                status: DraftStatus::Success,
            }
        }
        Err(e) => {
            error!(section = %section, "Failed to generate section: {}", e);
            Draft {
                text: format!("[Section could not be generated: {}]", e),
                status: DraftStatus::Error,
            }
        }
    }
}

fn edit_prompt(section: SectionKey, current: &str, instruction: &str) -> String {
    let mut prompt = format!(
        "Here is the current content of the \"{}\" section of an IR briefing memo:\n\n---\n{}\n---\n\nThe user wants the following change:\n{}\n\n",
        section.title(),
        current,
        instruction
    );

    if section == SectionKey::Earnings {
        prompt.push_str(
            "IMPORTANT: The user may provide information that is NOT in the original transcript \
             (e.g., from private meetings, off-the-record conversations, or their own knowledge). \
             You MUST incorporate this information exactly as described. Add it as a clearly \
             labeled note at the end of the section, formatted as:\n\n\
             **Note:** [user-provided information]\n\n\
             Keep ALL existing content intact. Only ADD or MODIFY what the user specifically requests. ",
        );
    } else {
        prompt.push_str(
            "Modify the existing content to incorporate this change. Keep all existing content \
             intact unless the user specifically asks to remove or replace something. ",
        );
    }
    prompt.push_str(
        "Return the full updated section, not just the changes. \
         Maintain the same markdown formatting and professional IR tone.",
    );
    prompt
}

/// Apply an instruction to existing section text
///
/// Callers keep the original text when this fails.
pub async fn edit_section(
    drafter: &dyn Drafter,
    section: SectionKey,
    current: &str,
    instruction: &str,
) -> Result<String, LeafError> {
    let prompt = edit_prompt(section, current, instruction);
    drafter
        .complete(&prompt, max_tokens_for(section))
        .await
        .map_err(|e| {
            error!(section = %section, "Failed to edit section: {}", e);
            e
        })
}

/// Body of the first fenced code block, or the text itself
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if !trimmed.contains("```") {
        return trimmed;
    }
    CODE_FENCE_RE
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(trimmed)
}

fn forecast_edit_prompt(rows_json: &str, instruction: &str) -> String {
    format!(
        "Here is the current forecast table as a JSON array. Each row has:\n\
         \x20 label (metric name), indent (0=parent, 1=sub, 2=sub-sub),\n\
         \x20 analyst (number or null), consensus (number or null), delta (string like \"+3.2%\" or null).\n\n\
         ```json\n{}\n```\n\n\
         The user wants: {}\n\n\
         Return ONLY a modified JSON array with the same structure.\n\
         Rules:\n\
         - You may add rows, remove rows, or reorder rows.\n\
         - For new rows, calculate values from existing rows if possible (e.g. a subtotal is the sum of its children). \
         If a value cannot be computed, use null.\n\
         - For calculated values, compute the delta as: (analyst - consensus) / consensus * 100, \
         formatted as \"+X.X%\" or \"-X.X%\". If consensus is 0 or null, set delta to null.\n\
         - Preserve the indent field to maintain the hierarchy.\n\
         - To bold a row, add \"bold\": true.\n\
         - To highlight a row, add \"highlight\": true.\n\
         - Do NOT wrap the output in markdown code fences. Return raw JSON only.",
        rows_json, instruction
    )
}

/// Edit forecast rows through a JSON round trip
///
/// Returns `None` when the call fails or the reply is not a JSON array of
/// rows.
pub async fn edit_forecast_table(
    drafter: &dyn Drafter,
    rows: &[ForecastRow],
    instruction: &str,
) -> Option<Vec<ForecastRow>> {
    let rows_json = match serde_json::to_string_pretty(rows) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize forecast rows: {}", e);
            return None;
        }
    };

    let reply = match drafter
        .complete(&forecast_edit_prompt(&rows_json, instruction), FORECAST_EDIT_MAX_TOKENS)
        .await
    {
        Ok(reply) => reply,
        Err(e) => {
            error!("Failed to edit forecast table: {}", e);
            return None;
        }
    };

    match serde_json::from_str::<Vec<ForecastRow>>(strip_code_fence(&reply)) {
        Ok(edited) => Some(edited),
        Err(e) => {
            error!("Forecast edit reply was not a row array: {}", e);
            None
        }
    }
}

/// Review the whole memo
///
/// Unparsable replies become a `warnings` verdict carrying the first 500
/// characters; drafting failures become an `error` verdict.
pub async fn run_quality_check(
    drafter: &dyn Drafter,
    sections: &BTreeMap<String, String>,
    metadata: &RunMetadata,
    today: &str,
) -> QualityVerdict {
    let all_sections = match serde_json::to_string_pretty(sections) {
        Ok(json) => json,
        Err(e) => {
            return QualityVerdict::new(
                "error",
                format!("Quality check could not be completed: {}", e),
            )
        }
    };

    let prompt = render(
        Template::QualityCheck,
        &[
            ("all_sections", all_sections.as_str()),
            ("valuation_timestamp", metadata.valuation_timestamp.as_str()),
            ("forecast_date_updated", metadata.forecast_date_updated.as_str()),
            ("transcript_source", metadata.transcript_source.as_str()),
            ("today_date", today),
        ],
    );

    match drafter.complete(&prompt, QUALITY_CHECK_MAX_TOKENS).await {
        Ok(reply) => parse_verdict(&reply),
        Err(e) => {
            error!("Quality check failed: {}", e);
            QualityVerdict::new(
                "error",
                format!("Quality check could not be completed: {}", e),
            )
        }
    }
}

/// Interpret a review reply
pub fn parse_verdict(reply: &str) -> QualityVerdict {
    match serde_json::from_str::<QualityVerdict>(strip_code_fence(reply)) {
        Ok(verdict) => verdict,
        Err(e) => {
            warn!("Quality check reply was not JSON: {}", e);
            QualityVerdict::new(
                "warnings",
                reply.chars().take(REVIEW_SUMMARY_CHARS).collect::<String>(),
            )
        }
    }
}

/// Numbered search results for a drafting prompt
pub fn format_search_results(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "[No search results available]".to_string();
    }
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "[{}] Title: {}\n    URL: {}\n    Snippet: {}",
                i + 1,
                hit.title,
                hit.url,
                hit.snippet
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn push_peer_hits(parts: &mut Vec<String>, hits: &[SearchHit]) {
    for (i, hit) in hits.iter().enumerate() {
        parts.push(format!(
            "[{}] {}\n    URL: {}\n    {}",
            i + 1,
            hit.title,
            hit.url,
            hit.snippet
        ));
    }
}

/// Peer research grouped by ticker for a drafting prompt
pub fn format_peer_results(research: &PeerResearch) -> String {
    let mut parts = Vec::new();
    for (ticker, hits) in &research.per_ticker {
        if hits.is_empty() {
            parts.push(format!("--- {} ---\n[No results found]", ticker));
        } else {
            parts.push(format!("--- {} ---", ticker));
            push_peer_hits(&mut parts, hits);
        }
        parts.push(String::new());
    }

    if !research.sector.is_empty() {
        parts.push("--- Sector-Level Research ---".to_string());
        push_peer_hits(&mut parts, &research.sector);
    }

    if parts.is_empty() {
        "[No peer research results available]".to_string()
    } else {
        parts.join("\n")
    }
}
