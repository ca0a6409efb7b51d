//! Shared fakes for irm-memo integration tests
//!
//! Every leaf collaborator has an in-process stand-in so engine and HTTP
//! tests run without network access.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Local;
use irm_common::events::{EventReceiver, ForecastRow, ForecastTable, MemoEvent};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use irm_memo::config::MemoConfig;
use irm_memo::fallback::{TierAttempt, TierPayload};
use irm_memo::store::{InMemoryReportStore, ReportStore};
use irm_memo::tasks::export::MarkdownExporter;
use irm_memo::tasks::{
    AnalystEntry, Drafter, ForecastSource, LeafError, QuoteMetrics, QuoteProvider, SearchHit,
    SearchProvider, Toolkit, TranscriptQuery, TranscriptRetriever,
};
use irm_memo::AppState;

pub const ANALYST: &str = "Jane Roe";
pub const FIRM: &str = "Acme Securities";

// ---- search ----

/// Returns the same hits for every query, or fails every query
pub struct FakeSearch {
    hits: Vec<SearchHit>,
    fail: bool,
    pub calls: AtomicUsize,
}

impl FakeSearch {
    /// Hits from four distinct domains
    pub fn standard() -> Self {
        let hits = ["news.example.com", "www.research.example.org", "bankwatch.example.net", "markets.example.io"]
            .iter()
            .enumerate()
            .map(|(i, domain)| SearchHit {
                title: format!("{} coverage {}", ANALYST, i),
                snippet: format!("{} of {} discusses the sector", ANALYST, FIRM),
                url: format!("https://{}/article-{}", domain, i),
            })
            .collect();
        Self {
            hits,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self {
            hits: Vec::new(),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            hits: Vec::new(),
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SearchProvider for FakeSearch {
    async fn search(&self, _query: &str, max_results: usize) -> Result<Vec<SearchHit>, LeafError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(LeafError::Network("search backend unreachable".into()));
        }
        Ok(self.hits.iter().take(max_results).cloned().collect())
    }
}

/// Drops the run's event receiver while a search is in flight
pub struct DetachingSearch {
    receiver: Mutex<Option<EventReceiver>>,
}

impl DetachingSearch {
    pub fn new(receiver: EventReceiver) -> Self {
        Self {
            receiver: Mutex::new(Some(receiver)),
        }
    }
}

#[async_trait]
impl SearchProvider for DetachingSearch {
    async fn search(&self, _query: &str, _max_results: usize) -> Result<Vec<SearchHit>, LeafError> {
        drop(self.receiver.lock().unwrap().take());
        Ok(Vec::new())
    }
}

// ---- drafting ----

/// Draft text that rates well on every narrative rule
pub fn standard_draft() -> String {
    format!(
        "**Current role:** Senior analyst at {firm}\n\
         **Prior experience:** Goldman Sachs, JPMorgan, Citi\n\n\
         > \"How should we think about wealth margins into next year?\"\n\
         > \"What pace of buybacks is embedded in guidance?\"\n\n\
         | **Date** | {date} |",
        firm = FIRM,
        date = Local::now().format("%B %Y")
    )
}

pub const QC_REPLY: &str =
    r#"{"overall_status": "pass", "sections": {}, "summary": "All sections consistent"}"#;

pub const EDITED_TEXT: &str = "Edited section text";

/// Answers by prompt kind and records every prompt
pub struct FakeDrafter {
    fail_edits: bool,
    fail_all: bool,
    forecast_reply: Option<String>,
    pub prompts: Mutex<Vec<String>>,
}

impl FakeDrafter {
    pub fn standard() -> Self {
        Self {
            fail_edits: false,
            fail_all: false,
            forecast_reply: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Section edits fail; drafting and quality checks still work
    pub fn failing_edits() -> Self {
        Self {
            fail_edits: true,
            ..Self::standard()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_all: true,
            ..Self::standard()
        }
    }

    /// Forecast table edits return this reply
    pub fn with_forecast_reply(reply: &str) -> Self {
        Self {
            forecast_reply: Some(reply.to_string()),
            ..Self::standard()
        }
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts_containing(&self, needle: &str) -> usize {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.contains(needle))
            .count()
    }
}

#[async_trait]
impl Drafter for FakeDrafter {
    async fn complete(&self, prompt: &str, _max_tokens: u32) -> Result<String, LeafError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail_all {
            return Err(LeafError::Api("drafting service returned 529".into()));
        }

        if prompt.contains("\"overall_status\"") {
            Ok(QC_REPLY.to_string())
        } else if prompt.contains("The user wants the following change") {
            if self.fail_edits {
                Err(LeafError::Timeout("drafting timed out".into()))
            } else {
                Ok(EDITED_TEXT.to_string())
            }
        } else if prompt.contains("current forecast table as a JSON array") {
            self.forecast_reply
                .clone()
                .ok_or_else(|| LeafError::Parse("no forecast reply".into()))
        } else {
            Ok(standard_draft())
        }
    }
}

// ---- forecasts ----

pub fn forecast_table() -> ForecastTable {
    let row = |label: &str, analyst: f64, consensus: f64, delta: &str| ForecastRow {
        label: label.to_string(),
        indent: 0,
        analyst: Some(analyst),
        consensus: Some(consensus),
        delta: Some(delta.to_string()),
        bold: None,
        highlight: None,
    };
    ForecastTable {
        analyst_name: ANALYST.to_string(),
        firm: FIRM.to_string(),
        date_updated: Local::now().format("%B %d, %Y").to_string(),
        is_stale: false,
        table_rows: vec![
            row("Firmwide Revenues", 61_500.0, 60_000.0, "+2.5%"),
            row("EPS", 8.25, 8.0, "+3.1%"),
            row("ROTCE", 19.0, 18.0, "+5.6%"),
        ],
        rating: "Overweight".to_string(),
        price_target: Some(135.0),
    }
}

pub struct FakeForecasts {
    table: Option<ForecastTable>,
    analysts: Vec<AnalystEntry>,
    pub reads: AtomicUsize,
}

impl FakeForecasts {
    pub fn standard() -> Self {
        Self {
            table: Some(forecast_table()),
            analysts: vec![AnalystEntry {
                name: ANALYST.to_string(),
                firm: FIRM.to_string(),
            }],
            reads: AtomicUsize::new(0),
        }
    }

    /// Workbook unreadable
    pub fn missing() -> Self {
        Self {
            table: None,
            analysts: Vec::new(),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ForecastSource for FakeForecasts {
    async fn read(&self, analyst: &str) -> Result<ForecastTable, LeafError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        match &self.table {
            Some(table) if table.analyst_name.eq_ignore_ascii_case(analyst) => Ok(table.clone()),
            Some(_) => Err(LeafError::NotAvailable(format!(
                "No forecast data found for analyst: {}",
                analyst
            ))),
            None => Err(LeafError::NotAvailable("Forecast workbook not found".into())),
        }
    }

    async fn list_analysts(&self) -> Result<Vec<AnalystEntry>, LeafError> {
        if self.table.is_none() {
            return Err(LeafError::NotAvailable("Forecast workbook not found".into()));
        }
        Ok(self.analysts.clone())
    }
}

// ---- quotes ----

/// Prices per symbol; unknown symbols fail
pub struct FakeQuotes {
    prices: HashMap<String, f64>,
    pub calls: AtomicUsize,
}

impl FakeQuotes {
    pub fn pricing(prices: &[(&str, f64)]) -> Self {
        Self {
            prices: prices.iter().map(|(s, p)| (s.to_string(), *p)).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Every default symbol plus a couple of extras for directive tests
    pub fn standard() -> Self {
        Self::pricing(&[
            ("MS", 131.5),
            ("GS", 590.0),
            ("JPM", 250.0),
            ("BAC", 45.0),
            ("C", 70.0),
            ("WFC", 75.0),
            ("SCHW", 80.0),
            ("BLK", 950.0),
            ("HOOD", 40.0),
        ])
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteProvider for FakeQuotes {
    async fn quote(&self, symbol: &str) -> Result<QuoteMetrics, LeafError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let price = self
            .prices
            .get(symbol)
            .copied()
            .ok_or_else(|| LeafError::Api(format!("No quote for {}", symbol)))?;
        Ok(QuoteMetrics {
            price: Some(price),
            pe_ttm: Some(14.2),
            forward_pe: Some(13.1),
            price_to_book: Some(2.1),
            dividend_yield: Some(2.85),
            market_cap: Some(price * 1.6e9),
            year_high: Some(price * 1.1),
            year_low: Some(price * 0.8),
        })
    }
}

// ---- transcripts ----

/// Transcript tier with a fixed answer
pub struct FakeTier {
    label: String,
    text: Option<String>,
    fail: bool,
    calls: Option<Arc<AtomicUsize>>,
}

impl FakeTier {
    pub fn resolving(label: &str, text: &str) -> Box<dyn TierAttempt<TranscriptQuery>> {
        Box::new(Self {
            label: label.to_string(),
            text: Some(text.to_string()),
            fail: false,
            calls: None,
        })
    }

    pub fn empty(label: &str) -> Box<dyn TierAttempt<TranscriptQuery>> {
        Box::new(Self {
            label: label.to_string(),
            text: None,
            fail: false,
            calls: None,
        })
    }

    pub fn failing(label: &str) -> Box<dyn TierAttempt<TranscriptQuery>> {
        Box::new(Self {
            label: label.to_string(),
            text: None,
            fail: true,
            calls: None,
        })
    }

    /// Resolving tier that counts its attempts into `calls`
    pub fn counted(
        label: &str,
        text: &str,
        calls: &Arc<AtomicUsize>,
    ) -> Box<dyn TierAttempt<TranscriptQuery>> {
        Box::new(Self {
            label: label.to_string(),
            text: Some(text.to_string()),
            fail: false,
            calls: Some(calls.clone()),
        })
    }
}

#[async_trait]
impl TierAttempt<TranscriptQuery> for FakeTier {
    fn label(&self) -> &str {
        &self.label
    }

    async fn attempt(&self, _query: &TranscriptQuery) -> Result<Option<TierPayload>, LeafError> {
        if let Some(calls) = &self.calls {
            calls.fetch_add(1, Ordering::SeqCst);
        }
        if self.fail {
            return Err(LeafError::Network(format!("{} unreachable", self.label)));
        }
        Ok(self.text.clone().map(|text| TierPayload {
            text,
            source_url: "https://transcripts.example.com/ms-q4".to_string(),
        }))
    }
}

pub const TRANSCRIPT: &str = "Operator: Our next question comes from Jane Roe with Acme Securities.\n\
Jane Roe: Thanks. How should we think about wealth margins into next year?\n\
Ted Pick: We remain confident in the 30% target.\n\
Jane Roe: And what pace of buybacks is embedded in guidance?\n\
Sharon Yeshaya: We bought back $1 billion in the quarter.";

/// Five tiers resolving at the first
pub fn resolving_transcripts() -> TranscriptRetriever {
    TranscriptRetriever::from_tiers(vec![
        FakeTier::resolving("SEC EDGAR (EFTS)", TRANSCRIPT),
        FakeTier::empty("SEC EDGAR (8-K filing)"),
        FakeTier::empty("Financial Modeling Prep API"),
        FakeTier::empty("Web search"),
        FakeTier::empty("Local file (transcript.txt)"),
    ])
}

/// Five resolving tiers sharing one attempt counter
pub fn counted_transcripts(calls: &Arc<AtomicUsize>) -> TranscriptRetriever {
    TranscriptRetriever::from_tiers(
        [
            "SEC EDGAR (EFTS)",
            "SEC EDGAR (8-K filing)",
            "Financial Modeling Prep API",
            "Web search",
            "Local file (transcript.txt)",
        ]
        .iter()
        .map(|label| FakeTier::counted(label, TRANSCRIPT, calls))
        .collect(),
    )
}

/// Five tiers that all come back empty or failing
pub fn unavailable_transcripts() -> TranscriptRetriever {
    TranscriptRetriever::from_tiers(vec![
        FakeTier::failing("SEC EDGAR (EFTS)"),
        FakeTier::empty("SEC EDGAR (8-K filing)"),
        FakeTier::failing("Financial Modeling Prep API"),
        FakeTier::empty("Web search"),
        FakeTier::empty("Local file (transcript.txt)"),
    ])
}

// ---- wiring ----

/// Fakes behind a toolkit, kept reachable for assertions
pub struct Fakes {
    pub search: Arc<FakeSearch>,
    pub drafter: Arc<FakeDrafter>,
    pub forecasts: Arc<FakeForecasts>,
    pub quotes: Arc<FakeQuotes>,
    pub transcripts: Arc<TranscriptRetriever>,
}

impl Fakes {
    pub fn standard() -> Self {
        Self {
            search: Arc::new(FakeSearch::standard()),
            drafter: Arc::new(FakeDrafter::standard()),
            forecasts: Arc::new(FakeForecasts::standard()),
            quotes: Arc::new(FakeQuotes::standard()),
            transcripts: Arc::new(resolving_transcripts()),
        }
    }

    pub fn toolkit(&self) -> Toolkit {
        Toolkit {
            search: self.search.clone(),
            drafter: self.drafter.clone(),
            forecasts: self.forecasts.clone(),
            quotes: self.quotes.clone(),
            transcripts: self.transcripts.clone(),
            exporter: Arc::new(MarkdownExporter),
        }
    }

    /// App state over these fakes and a fresh store
    pub fn app_state(&self) -> (AppState, Arc<InMemoryReportStore>) {
        let store = Arc::new(InMemoryReportStore::new());
        let state = AppState::new(
            MemoConfig::default(),
            self.toolkit(),
            store.clone() as Arc<dyn ReportStore>,
        );
        (state, store)
    }
}

// ---- event helpers ----

pub fn event_types(events: &[MemoEvent]) -> Vec<&'static str> {
    events.iter().map(MemoEvent::event_type).collect()
}

/// `(step, status)` pairs of every step update, status in wire form
pub fn step_updates(events: &[MemoEvent]) -> Vec<(String, String)> {
    events
        .iter()
        .filter_map(|e| match e {
            MemoEvent::StepUpdate { step, status, .. } => Some((
                step.clone(),
                serde_json::to_value(status)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default(),
            )),
            _ => None,
        })
        .collect()
}

pub fn memo_id(events: &[MemoEvent]) -> Option<String> {
    events.iter().find_map(|e| match e {
        MemoEvent::Complete { memo_id } => Some(memo_id.clone()),
        _ => None,
    })
}
