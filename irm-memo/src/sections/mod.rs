//! Section pipelines
//!
//! One pipeline per section kind. A pipeline runs its leaves, reports each
//! sub-step through a [`StepReporter`], rates the result with the rules in
//! [`crate::confidence`] and returns the finished [`SectionRecord`]. The
//! same pipelines serve a full run and a re-search regeneration; only the
//! reporter differs.

pub mod bio;
pub mod earnings;
pub mod forecast;
pub mod peer;
pub mod valuation;

use chrono::NaiveDate;
use irm_common::events::{
    Confidence, EventSender, Findings, MemoEvent, SectionKey, Source, StepStatus,
};

use crate::models::{RunMetadata, SectionBody, SectionRecord, Subject};
use crate::tasks::drafting::Draft;
use crate::tasks::Toolkit;

/// Confidence reason for a narrative whose drafting call failed
pub const DRAFT_FAILED_REASON: &str = "Section drafting failed";

/// Everything a pipeline needs besides its reporter
pub struct SectionContext<'a> {
    pub toolkit: &'a Toolkit,
    pub subject: &'a Subject,
    /// Reference date for staleness checks
    pub today: NaiveDate,
    /// Extra drafting instruction (re-search regeneration)
    pub instruction: Option<&'a str>,
    /// Symbols for the valuation pull, target first
    pub valuation_symbols: &'a [String],
}

/// Where a pipeline's sub-step progress goes
pub enum StepReporter<'a> {
    /// `step_update` events for the step tree
    Generation(&'a EventSender),
    /// `regen_step` narration for one section
    Regeneration {
        events: &'a EventSender,
        section: SectionKey,
    },
}

impl<'a> StepReporter<'a> {
    /// The consumer has gone away; pipelines start no further leaves
    pub fn is_detached(&self) -> bool {
        match self {
            StepReporter::Generation(events) | StepReporter::Regeneration { events, .. } => {
                events.is_closed()
            }
        }
    }

    /// A sub-step started
    pub fn running(&self, step: &str) {
        match self {
            StepReporter::Generation(events) => {
                events.emit(MemoEvent::step(step, StepStatus::Running, None));
            }
            StepReporter::Regeneration { events, section } => {
                if let Some(label) = regen_step_label(step) {
                    events.emit(MemoEvent::RegenStep {
                        section: *section,
                        step: label.to_string(),
                    });
                }
            }
        }
    }

    /// A sub-step started, with narration specific to this regeneration
    pub fn running_with(&self, step: &str, regen_label: String) {
        match self {
            StepReporter::Generation(_) => self.running(step),
            StepReporter::Regeneration { events, section } => {
                events.emit(MemoEvent::RegenStep {
                    section: *section,
                    step: regen_label,
                });
            }
        }
    }

    pub fn complete(&self, step: &str, findings: Findings) {
        self.finish(step, StepStatus::Complete, findings);
    }

    pub fn error(&self, step: &str, findings: Findings) {
        self.finish(step, StepStatus::Error, findings);
    }

    /// Terminal status chosen by the caller
    pub fn finish(&self, step: &str, status: StepStatus, findings: Findings) {
        if let StepReporter::Generation(events) = self {
            events.emit(MemoEvent::step(step, status, Some(findings)));
        }
    }
}

/// Narration shown during a re-search for a generation sub-step
fn regen_step_label(step: &str) -> Option<&'static str> {
    match step {
        "bio_search" => Some("Searching for analyst background"),
        "bio_draft" => Some("Drafting bio section"),
        "forecast_read" => Some("Re-reading forecast from workbook"),
        "transcript_fetch" => Some("Re-fetching earnings transcript"),
        "earnings_draft" => Some("Drafting post-earnings feedback"),
        "peer_search" => Some("Searching for peer commentary"),
        "peer_draft" => Some("Drafting peer research summary"),
        _ => None,
    }
}

/// Record returned by a pipeline cut short by a detached consumer
///
/// Engines discard it; it is never stored or announced.
pub fn detached_record() -> SectionRecord {
    SectionRecord::failed("Client disconnected", "Generation stopped")
}

/// Narrative record from a finished draft
///
/// A failed draft keeps its error marker as the text and is rated low,
/// whatever the section's own rules would say.
pub fn narrative_record(draft: Draft, sources: Vec<Source>, rated: Confidence) -> SectionRecord {
    let confidence = if draft.is_success() {
        rated
    } else {
        Confidence::low(DRAFT_FAILED_REASON)
    };
    SectionRecord {
        body: SectionBody::Narrative {
            text: draft.text,
            status: draft.status,
        },
        sources,
        confidence,
    }
}

/// Run one section's pipeline
pub async fn run_section(
    key: SectionKey,
    ctx: &SectionContext<'_>,
    reporter: &StepReporter<'_>,
    metadata: &mut RunMetadata,
) -> SectionRecord {
    match key {
        SectionKey::Bio => bio::run(ctx, reporter).await,
        SectionKey::Forecast => forecast::run(ctx, reporter, metadata).await,
        SectionKey::Earnings => earnings::run(ctx, reporter, metadata).await,
        SectionKey::Peer => peer::run(ctx, reporter).await,
        SectionKey::Valuation => valuation::run(ctx, reporter, metadata).await,
    }
}
