//! Memo generation engine
//!
//! Runs the selected section pipelines in canonical order, then the quality
//! check, stores the report and announces its id. Progress goes to the
//! run's own event channel.
//!
//! Every run ends its channel with exactly one `complete` or `server_error`
//! event. A section failure is recorded in the report and never stops the
//! run. If the consumer detaches, the run stops before the next section
//! and nothing is stored.

use anyhow::Result;
use chrono::{Local, Utc};
use futures::FutureExt;
use irm_common::events::{EventSender, Findings, MemoEvent, SectionKey, StepStatus};
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::config::valuation_symbols;
use crate::models::{Report, Subject};
use crate::sections::{run_section, SectionContext, StepReporter};
use crate::steps::{build_steps, QUALITY_CHECK_STEP};
use crate::store::ReportStore;
use crate::tasks::drafting::run_quality_check;
use crate::tasks::Toolkit;

/// One memo generation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub analyst: String,
    /// Target company ticker
    pub ticker: String,
    /// Selected sections; run order is always canonical
    pub sections: Vec<SectionKey>,
}

/// How a run ended before its terminal event
enum RunEnd {
    Stored(String),
    /// Consumer detached
    Abandoned,
}

/// Memo generation engine
#[derive(Clone)]
pub struct Orchestrator {
    toolkit: Arc<Toolkit>,
    store: Arc<dyn ReportStore>,
    /// Shared with the health endpoint
    last_error: Arc<RwLock<Option<String>>>,
}

impl Orchestrator {
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

    /// Run one generation to completion
    ///
    /// Consumes the sender so the channel closes when the run ends.
    pub async fn run(&self, request: RunRequest, events: EventSender) {
        info!(
            analyst = %request.analyst,
            ticker = %request.ticker,
            sections = request.sections.len(),
            "Memo generation started"
        );

        let outcome = AssertUnwindSafe(self.generate(&request, &events))
            .catch_unwind()
            .await;

        let message = match outcome {
            Ok(Ok(RunEnd::Stored(memo_id))) => {
                info!(memo_id = %memo_id, analyst = %request.analyst, "Memo generation complete");
                events.emit(MemoEvent::Complete { memo_id });
                return;
            }
            Ok(Ok(RunEnd::Abandoned)) => {
                warn!(analyst = %request.analyst, "Client disconnected, generation stopped");
                return;
            }
            Ok(Err(e)) => format!("{:#}", e),
            Err(_) => "Generation task panicked".to_string(),
        };

        error!(analyst = %request.analyst, "Memo generation failed: {}", message);
        *self.last_error.write().await = Some(message.clone());
        events.emit(MemoEvent::ServerError { message });
    }

    async fn generate(&self, request: &RunRequest, events: &EventSender) -> Result<RunEnd> {
        let subject = Subject {
            analyst: request.analyst.clone(),
            firm: self.lookup_firm(&request.analyst).await,
            ticker: request.ticker.clone(),
        };

        if !events.emit(MemoEvent::Steps {
            steps: build_steps(&request.sections),
        }) {
            return Ok(RunEnd::Abandoned);
        }

        let symbols = valuation_symbols(&subject.ticker);
        let today = Local::now().date_naive();
        let ctx = SectionContext {
            toolkit: &self.toolkit,
            subject: &subject,
            today,
            instruction: None,
            valuation_symbols: &symbols,
        };
        let reporter = StepReporter::Generation(events);
        let mut report = Report::new(subject.clone(), Utc::now());

        for key in SectionKey::ALL
            .into_iter()
            .filter(|k| request.sections.contains(k))
        {
            if events.is_closed() {
                return Ok(RunEnd::Abandoned);
            }

            let record = run_section(key, &ctx, &reporter, &mut report.metadata).await;
            // In-flight results are dropped once the consumer is gone
            if events.is_closed() {
                return Ok(RunEnd::Abandoned);
            }
            if let Some(event) = record.payload_event(key, false) {
                events.emit(event);
            }
            info!(
                section = %key,
                confidence = ?record.confidence.level,
                failed = record.is_failed(),
                "Section finished"
            );
            report.sections.insert(key, record);
        }

        if events.is_closed() {
            return Ok(RunEnd::Abandoned);
        }

        events.emit(MemoEvent::step(QUALITY_CHECK_STEP, StepStatus::Running, None));
        let summaries: BTreeMap<String, String> = report
            .sections
            .iter()
            .map(|(key, record)| (key.as_str().to_string(), record.review_text()))
            .collect();
        let verdict = run_quality_check(
            self.toolkit.drafter.as_ref(),
            &summaries,
            &report.metadata,
            &today.format("%Y-%m-%d").to_string(),
        )
        .await;
        let findings = Findings::summary(verdict.findings_text());
        events.emit(MemoEvent::QualityCheck {
            verdict: verdict.clone(),
        });
        events.emit(MemoEvent::step(
            QUALITY_CHECK_STEP,
            StepStatus::Complete,
            Some(findings),
        ));
        report.quality = Some(verdict);

        if events.is_closed() {
            return Ok(RunEnd::Abandoned);
        }

        let memo_id = self.store.put(report).await;
        Ok(RunEnd::Stored(memo_id))
    }

    /// Firm for an analyst from the forecast source, empty when unknown
    async fn lookup_firm(&self, analyst: &str) -> String {
        match self.toolkit.forecasts.list_analysts().await {
            Ok(entries) => entries
                .into_iter()
                .find(|entry| entry.name.eq_ignore_ascii_case(analyst.trim()))
                .map(|entry| entry.firm)
                .unwrap_or_default(),
            Err(e) => {
                warn!(analyst = %analyst, "Analyst list unavailable, firm left empty: {}", e);
                String::new()
            }
        }
    }
}
