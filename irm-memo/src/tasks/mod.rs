//! Leaf task set
//!
//! Thin collaborators the section pipelines call: web search, text
//! drafting, the forecast workbook, market quotes, transcript retrieval and
//! export. Each is an async trait with one production implementation so
//! tests can substitute fakes.
//!
//! No leaf failure crosses into the engines as an error: pipelines call
//! leaves through [`guarded`], which turns every `Err` into
//! [`LeafOutcome::Error`].

pub mod drafting;
pub mod export;
pub mod forecast;
pub mod market_data;
pub mod prompts;
pub mod research;
pub mod transcript;

use async_trait::async_trait;
use irm_common::events::ForecastTable;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::config::MemoConfig;
use crate::models::Report;

pub use transcript::{TranscriptQuery, TranscriptResult, TranscriptRetriever};

/// Leaf failure
#[derive(Debug, Clone, Error)]
pub enum LeafError {
    /// Network communication error
    #[error("Network error: {0}")]
    Network(String),

    /// External API returned an error
    #[error("API error: {0}")]
    Api(String),

    /// Failed to parse response or data
    #[error("Parse error: {0}")]
    Parse(String),

    /// Requested data does not exist
    #[error("Not available: {0}")]
    NotAvailable(String),

    /// Collaborator missing configuration (e.g. API key)
    #[error("Not configured: {0}")]
    NotConfigured(String),

    /// Transport timeout
    #[error("Timed out: {0}")]
    Timeout(String),
}

impl From<reqwest::Error> for LeafError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LeafError::Timeout(e.to_string())
        } else {
            LeafError::Network(e.to_string())
        }
    }
}

/// Result of a leaf call as seen by the engines
#[derive(Debug, Clone, PartialEq)]
pub enum LeafOutcome<T> {
    Success(T),
    Error(String),
}

impl<T> LeafOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, LeafOutcome::Success(_))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            LeafOutcome::Success(value) => Some(value),
            LeafOutcome::Error(_) => None,
        }
    }
}

/// Run a leaf call, converting failure into `LeafOutcome::Error`
pub async fn guarded<T, F>(label: &str, call: F) -> LeafOutcome<T>
where
    F: Future<Output = Result<T, LeafError>>,
{
    match call.await {
        Ok(value) => LeafOutcome::Success(value),
        Err(e) => {
            warn!(leaf = label, "Leaf call failed: {}", e);
            LeafOutcome::Error(e.to_string())
        }
    }
}

/// Build an HTTP client enforcing the transport timeout
pub fn build_http_client(timeout: Duration, user_agent: Option<&str>) -> Result<Client, LeafError> {
    let mut headers = header::HeaderMap::new();
    if let Some(agent) = user_agent {
        let value = header::HeaderValue::from_str(agent)
            .map_err(|e| LeafError::NotConfigured(format!("Invalid user agent: {}", e)))?;
        headers.insert(header::USER_AGENT, value);
    }

    Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()
        .map_err(|e| LeafError::NotConfigured(format!("Failed to create HTTP client: {}", e)))
}

/// One web search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

/// Analyst listed in the forecast workbook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalystEntry {
    pub name: String,
    pub firm: String,
}

/// Raw quote fields for one symbol, before display transforms
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuoteMetrics {
    pub price: Option<f64>,
    pub pe_ttm: Option<f64>,
    pub forward_pe: Option<f64>,
    pub price_to_book: Option<f64>,
    /// Percent, e.g. 2.85
    pub dividend_yield: Option<f64>,
    /// Dollars
    pub market_cap: Option<f64>,
    pub year_high: Option<f64>,
    pub year_low: Option<f64>,
}

/// Web search backend
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, LeafError>;
}

/// Text generation backend
#[async_trait]
pub trait Drafter: Send + Sync {
    /// Complete a single-turn prompt
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, LeafError>;
}

/// Analyst forecast data
#[async_trait]
pub trait ForecastSource: Send + Sync {
    /// The analyst's most recent forecast (case-insensitive name match)
    async fn read(&self, analyst: &str) -> Result<ForecastTable, LeafError>;

    /// Every analyst in the source, first occurrence wins
    async fn list_analysts(&self) -> Result<Vec<AnalystEntry>, LeafError>;
}

/// Market quote backend
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn quote(&self, symbol: &str) -> Result<QuoteMetrics, LeafError>;
}

/// Report rendering for download
pub trait Exporter: Send + Sync {
    fn export(&self, report: &Report) -> Result<Vec<u8>, LeafError>;

    /// MIME type of the rendered document
    fn content_type(&self) -> &'static str;

    fn file_extension(&self) -> &'static str;
}

/// Every leaf collaborator the engines use
#[derive(Clone)]
pub struct Toolkit {
    pub search: Arc<dyn SearchProvider>,
    pub drafter: Arc<dyn Drafter>,
    pub forecasts: Arc<dyn ForecastSource>,
    pub quotes: Arc<dyn QuoteProvider>,
    pub transcripts: Arc<TranscriptRetriever>,
    pub exporter: Arc<dyn Exporter>,
}

impl Toolkit {
    /// Production collaborators built from configuration
    pub fn from_config(config: &MemoConfig) -> Result<Self, LeafError> {
        let search: Arc<dyn SearchProvider> = Arc::new(research::SearxSearchClient::new(
            &config.search_url,
            config.http_timeout,
        )?);
        let drafter: Arc<dyn Drafter> = Arc::new(drafting::AnthropicDrafter::new(
            config.anthropic_api_key.clone(),
            &config.drafting_model,
            config.http_timeout,
        )?);
        let forecasts: Arc<dyn ForecastSource> =
            Arc::new(forecast::ExcelForecastSource::new(config.forecast_path()));
        let quotes: Arc<dyn QuoteProvider> = Arc::new(market_data::FmpQuoteClient::new(
            config.fmp_api_key.clone(),
            config.http_timeout,
        )?);
        let transcripts = Arc::new(TranscriptRetriever::standard(config, search.clone())?);

        Ok(Self {
            search,
            drafter,
            forecasts,
            quotes,
            transcripts,
            exporter: Arc::new(export::MarkdownExporter),
        })
    }
}
