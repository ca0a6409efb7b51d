//! Progress events for memo generation and regeneration
//!
//! A run produces an ordered sequence of [`MemoEvent`]s into its own
//! [`EventSender`]; the HTTP layer drains the paired [`EventReceiver`] into
//! an SSE response. Each event is sent as an SSE `event:` name (see
//! [`MemoEvent::event_type`]) with the JSON-serialized event as data.

mod memo_types;
mod table_types;

pub use memo_types::{
    Confidence, ConfidenceLevel, Findings, Preview, PreviewRow, SectionKey, Source, StepNode,
    StepStatus,
};
pub use table_types::{
    ForecastRow, ForecastTable, QualityVerdict, ValuationSnapshot, STOCK_PRICE_METRIC,
};

use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// Memo progress events
///
/// Generation runs end with exactly one `Complete` or `ServerError`.
/// Regeneration runs end with exactly one `RegenComplete` or `RegenError`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MemoEvent {
    /// Full step tree, emitted once before any work starts
    Steps { steps: Vec<StepNode> },

    /// A sub-step changed status
    StepUpdate {
        step: String,
        status: StepStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        findings: Option<Findings>,
    },

    /// Narrative section drafted
    Section {
        section: SectionKey,
        content: String,
        sources: Vec<Source>,
        confidence: Confidence,
    },

    Forecast {
        #[serde(flatten)]
        table: ForecastTable,
        sources: Vec<Source>,
        confidence: Confidence,
    },

    Valuation {
        #[serde(flatten)]
        snapshot: ValuationSnapshot,
        sources: Vec<Source>,
        confidence: Confidence,
    },

    QualityCheck {
        #[serde(flatten)]
        verdict: QualityVerdict,
    },

    /// Report stored under `memo_id`
    Complete { memo_id: String },

    /// Engine fault; no report was stored
    ServerError { message: String },

    RegenStart { section: SectionKey },

    RegenStep { section: SectionKey, step: String },

    RegenSection {
        section: SectionKey,
        content: String,
        sources: Vec<Source>,
        confidence: Confidence,
    },

    RegenForecast {
        #[serde(flatten)]
        table: ForecastTable,
        sources: Vec<Source>,
        confidence: Confidence,
    },

    RegenValuation {
        #[serde(flatten)]
        snapshot: ValuationSnapshot,
        sources: Vec<Source>,
        confidence: Confidence,
    },

    RegenComplete { section: SectionKey },

    /// Regeneration refused or failed; `section` echoes the request
    RegenError { section: String, message: String },
}

impl MemoEvent {
    /// SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            MemoEvent::Steps { .. } => "steps",
            MemoEvent::StepUpdate { .. } => "step_update",
            MemoEvent::Section { .. } => "section",
            MemoEvent::Forecast { .. } => "forecast",
            MemoEvent::Valuation { .. } => "valuation",
            MemoEvent::QualityCheck { .. } => "quality_check",
            MemoEvent::Complete { .. } => "complete",
            MemoEvent::ServerError { .. } => "server_error",
            MemoEvent::RegenStart { .. } => "regen_start",
            MemoEvent::RegenStep { .. } => "regen_step",
            MemoEvent::RegenSection { .. } => "regen_section",
            MemoEvent::RegenForecast { .. } => "regen_forecast",
            MemoEvent::RegenValuation { .. } => "regen_valuation",
            MemoEvent::RegenComplete { .. } => "regen_complete",
            MemoEvent::RegenError { .. } => "regen_error",
        }
    }

    /// True for the events that end a stream
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MemoEvent::Complete { .. }
                | MemoEvent::ServerError { .. }
                | MemoEvent::RegenComplete { .. }
                | MemoEvent::RegenError { .. }
        )
    }

    pub fn step(step: &str, status: StepStatus, findings: Option<Findings>) -> Self {
        MemoEvent::StepUpdate {
            step: step.to_string(),
            status,
            findings,
        }
    }
}

/// Create an ordered single-producer, single-consumer event channel
///
/// The channel is unbounded: producers never wait on a slow client, and
/// events arrive exactly in emission order.
pub fn event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, EventReceiver { rx })
}

/// Producing half of a run's event channel
#[derive(Debug)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<MemoEvent>,
}

impl EventSender {
    /// Send an event
    ///
    /// Returns `false` once the consumer has gone away; callers use this to
    /// stop starting new work.
    pub fn emit(&self, event: MemoEvent) -> bool {
        let event_type = event.event_type();
        match self.tx.send(event) {
            Ok(()) => true,
            Err(_) => {
                debug!(event_type, "Event receiver dropped, event discarded");
                false
            }
        }
    }

    /// Whether the consumer has detached
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consuming half of a run's event channel
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<MemoEvent>,
}

impl EventReceiver {
    /// Adapt into a stream that ends when the producer is dropped
    pub fn into_stream(mut self) -> impl Stream<Item = MemoEvent> + Send {
        async_stream::stream! {
            while let Some(event) = self.rx.recv().await {
                yield event;
            }
        }
    }

    /// Drain every event until the producer is dropped
    pub async fn collect_all(mut self) -> Vec<MemoEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.rx.recv().await {
            events.push(event);
        }
        events
    }
}
