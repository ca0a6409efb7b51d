//! Single-section regeneration
//!
//! Two modes. Draft-only edits the stored content with the instruction and
//! keeps its sources and confidence. Re-search reruns the section's full
//! pipeline with the instruction threaded into drafting and replaces the
//! whole record. Either way sibling sections are untouched, and a refused
//! or failed regeneration leaves the stored report as it was.
//!
//! Valuation is the exception to "draft-only never re-acquires": ticker
//! directives that change the symbol list trigger a fresh quote pull for
//! the new list.

pub mod tickers;

use chrono::Local;
use futures::FutureExt;
use irm_common::events::{
    Confidence, ConfidenceLevel, EventSender, MemoEvent, SectionKey,
};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::config::valuation_symbols;
use crate::models::{DraftStatus, Report, SectionBody, SectionRecord};
use crate::sections::{run_section, valuation, SectionContext, StepReporter};
use crate::store::ReportStore;
use crate::tasks::drafting::{edit_forecast_table, edit_section};
use crate::tasks::market_data::{get_valuation_data, valuation_timestamp};
use crate::tasks::Toolkit;

pub use tickers::{apply_directives, parse_directives, Directive};

/// How to regenerate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegenMode {
    /// Edit stored content, no new data
    DraftOnly,
    /// Rerun the section pipeline
    ReSearch,
}

/// One regeneration request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegenRequest {
    pub memo_id: String,
    /// Section key as sent by the client, validated by the engine
    pub section: String,
    pub instruction: String,
    pub mode: RegenMode,
    /// Client's current text, preferred over the stored text for edits
    pub current_content: Option<String>,
}

/// Why a regeneration did not complete
///
/// The display text is what the client sees in `regen_error`.
#[derive(Debug, Clone, Error)]
pub enum RegenError {
    #[error("Memo not found")]
    UnknownSession(String),

    #[error("Unknown section: {0}")]
    UnknownSection(String),

    /// Nothing stored to edit
    #[error("{0}")]
    MissingContent(&'static str),

    /// A leaf failed to produce the new content
    #[error("{0}")]
    Acquisition(String),

    /// The consumer went away before the new content was ready
    #[error("Client disconnected")]
    Detached,
}

/// Regeneration engine
#[derive(Clone)]
pub struct Regenerator {
    toolkit: Arc<Toolkit>,
    store: Arc<dyn ReportStore>,
    last_error: Arc<RwLock<Option<String>>>,
}

impl Regenerator {
    pub fn new(
        toolkit: Arc<Toolkit>,
        store: Arc<dyn ReportStore>,
        last_error: Arc<RwLock<Option<String>>>,
    ) -> Self {
        Self {
            toolkit,
            store,
            last_error,
        }
    }

    /// Run one regeneration to completion
    ///
    /// The channel ends with exactly one `regen_complete` or `regen_error`.
    pub async fn run(&self, request: RegenRequest, events: EventSender) {
        info!(
            memo_id = %request.memo_id,
            section = %request.section,
            mode = ?request.mode,
            "Regeneration started"
        );

        let outcome = AssertUnwindSafe(self.regenerate(&request, &events))
            .catch_unwind()
            .await;

        let message = match outcome {
            Ok(Ok(key)) => {
                info!(memo_id = %request.memo_id, section = %key, "Regeneration complete");
                events.emit(MemoEvent::RegenComplete { section: key });
                return;
            }
            Ok(Err(RegenError::Detached)) => {
                warn!(
                    memo_id = %request.memo_id,
                    section = %request.section,
                    "Client disconnected, regeneration stopped"
                );
                return;
            }
            Ok(Err(e)) => {
                warn!(
                    memo_id = %request.memo_id,
                    section = %request.section,
                    "Regeneration refused: {}",
                    e
                );
                if let RegenError::Acquisition(message) = &e {
                    *self.last_error.write().await = Some(message.clone());
                }
                e.to_string()
            }
            Err(_) => {
                let message = "Regeneration task panicked".to_string();
                error!(memo_id = %request.memo_id, section = %request.section, "{}", message);
                *self.last_error.write().await = Some(message.clone());
                message
            }
        };

        events.emit(MemoEvent::RegenError {
            section: request.section.clone(),
            message,
        });
    }

    async fn regenerate(
        &self,
        request: &RegenRequest,
        events: &EventSender,
    ) -> Result<SectionKey, RegenError> {
        let key: SectionKey = request
            .section
            .parse()
            .map_err(|_| RegenError::UnknownSection(request.section.clone()))?;
        let report = self
            .store
            .get(&request.memo_id)
            .await
            .ok_or_else(|| RegenError::UnknownSession(request.memo_id.clone()))?;

        if !events.emit(MemoEvent::RegenStart { section: key }) {
            return Err(RegenError::Detached);
        }

        let record = match request.mode {
            RegenMode::DraftOnly => self.draft_only(key, request, &report, events).await?,
            RegenMode::ReSearch => self.re_search(key, request, &report, events).await?,
        };

        self.store
            .replace_section(&request.memo_id, key, record.clone())
            .await
            .map_err(|_| RegenError::UnknownSession(request.memo_id.clone()))?;

        if let Some(event) = record.payload_event(key, true) {
            events.emit(event);
        }
        Ok(key)
    }

    async fn draft_only(
        &self,
        key: SectionKey,
        request: &RegenRequest,
        report: &Report,
        events: &EventSender,
    ) -> Result<SectionRecord, RegenError> {
        let stored = report.section(key);
        let step = |label: String| {
            events.emit(MemoEvent::RegenStep {
                section: key,
                step: label,
            })
        };

        match key {
            SectionKey::Bio | SectionKey::Earnings | SectionKey::Peer => {
                let current = request
                    .current_content
                    .as_deref()
                    .filter(|c| !c.trim().is_empty())
                    .or_else(|| {
                        stored
                            .filter(|r| !r.draft_failed())
                            .and_then(SectionRecord::narrative_text)
                    })
                    .filter(|c| !c.trim().is_empty())
                    .ok_or(RegenError::MissingContent("No existing content to edit"))?;

                step("Applying changes".to_string());
                let text = edit_section(
                    self.toolkit.drafter.as_ref(),
                    key,
                    current,
                    &request.instruction,
                )
                .await
                .map_err(|e| RegenError::Acquisition(format!("Failed to apply changes: {}", e)))?;

                let (sources, confidence) = stored
                    .filter(|r| !r.is_failed() && !r.draft_failed())
                    .map(|r| (r.sources.clone(), r.confidence.clone()))
                    .unwrap_or_else(|| {
                        (
                            Vec::new(),
                            Confidence::new(ConfidenceLevel::Medium, "Edited section"),
                        )
                    });
                Ok(SectionRecord {
                    body: SectionBody::Narrative {
                        text,
                        status: DraftStatus::Success,
                    },
                    sources,
                    confidence,
                })
            }

            SectionKey::Forecast => {
                let (record, table) = stored
                    .and_then(|r| r.forecast().map(|t| (r, t)))
                    .filter(|(_, t)| !t.table_rows.is_empty())
                    .ok_or(RegenError::MissingContent("No existing forecast data to edit"))?;

                let mut table = table.clone();
                if !request.instruction.trim().is_empty() {
                    step("Applying changes to forecast table".to_string());
                    match edit_forecast_table(
                        self.toolkit.drafter.as_ref(),
                        &table.table_rows,
                        &request.instruction,
                    )
                    .await
                    {
                        Some(rows) => table.table_rows = rows,
                        None => warn!(section = %key, "Forecast edit failed, table kept"),
                    }
                }
                Ok(SectionRecord {
                    body: SectionBody::Forecast(table),
                    sources: record.sources.clone(),
                    confidence: record.confidence.clone(),
                })
            }

            SectionKey::Valuation => {
                let current = stored_symbols(report);
                let next = apply_directives(&current, &parse_directives(&request.instruction));

                if next == current {
                    return stored
                        .filter(|r| r.valuation().is_some())
                        .cloned()
                        .ok_or(RegenError::MissingContent("No existing valuation data"));
                }

                step(format!("Pulling data for updated tickers: {}", next.join(", ")));
                let snapshot = get_valuation_data(
                    self.toolkit.quotes.as_ref(),
                    &next,
                    valuation_timestamp(),
                )
                .await
                .map_err(|e| {
                    warn!(section = %key, "Valuation re-pull failed: {}", e);
                    RegenError::Acquisition("Failed to pull valuation data".to_string())
                })?;
                Ok(SectionRecord {
                    sources: valuation::valuation_sources(&snapshot),
                    confidence: valuation::rate(&snapshot),
                    body: SectionBody::Valuation(snapshot),
                })
            }
        }
    }

    async fn re_search(
        &self,
        key: SectionKey,
        request: &RegenRequest,
        report: &Report,
        events: &EventSender,
    ) -> Result<SectionRecord, RegenError> {
        let (symbols, instruction) = match key {
            SectionKey::Valuation => (
                apply_directives(
                    &stored_symbols(report),
                    &parse_directives(&request.instruction),
                ),
                None,
            ),
            _ => (
                valuation_symbols(&report.subject.ticker),
                Some(request.instruction.as_str()),
            ),
        };

        let ctx = SectionContext {
            toolkit: &self.toolkit,
            subject: &report.subject,
            today: Local::now().date_naive(),
            instruction,
            valuation_symbols: &symbols,
        };
        let reporter = StepReporter::Regeneration {
            events,
            section: key,
        };
        let mut metadata = report.metadata.clone();
        let record = run_section(key, &ctx, &reporter, &mut metadata).await;
        if events.is_closed() {
            return Err(RegenError::Detached);
        }

        // A failed re-draft keeps the stored record, like a failed re-read
        if record.is_failed() || record.draft_failed() {
            let message = match key {
                SectionKey::Forecast => "Failed to read forecast data",
                SectionKey::Valuation => "Failed to pull valuation data",
                _ => "Section could not be regenerated",
            };
            return Err(RegenError::Acquisition(message.to_string()));
        }
        Ok(record)
    }
}

/// Symbols of the stored valuation table, or the default set for the subject
fn stored_symbols(report: &Report) -> Vec<String> {
    report
        .section(SectionKey::Valuation)
        .and_then(SectionRecord::valuation)
        .map(|snapshot| snapshot.ticker_order.clone())
        .filter(|symbols| !symbols.is_empty())
        .unwrap_or_else(|| valuation_symbols(&report.subject.ticker))
}
