//! Earnings call transcript retrieval
//!
//! Five-tier fallback chain:
//! 1. SEC EDGAR full-text search for 8-K filings mentioning a Q&A session
//! 2. SEC EDGAR submissions API, crawling the most recent 8-K filings
//! 3. Financial Modeling Prep transcript API (needs an API key)
//! 4. Web search restricted to known transcript hosts
//! 5. Bundled local transcript file

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{header, Client};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use super::{build_http_client, LeafError, SearchProvider};
use crate::config::{company_cik, company_name, MemoConfig, SEC_EDGAR_USER_AGENT};
use crate::fallback::{FallbackResolver, Resolution, TierAttempt, TierPayload};

/// Placeholder drafted against when every tier fails
pub const UNAVAILABLE_TRANSCRIPT: &str =
    "[Earnings call transcript not available from public sources]";

const EFTS_URL: &str = "https://efts.sec.gov/LATEST/search-index";
const SUBMISSIONS_URL: &str = "https://data.sec.gov/submissions";
const ARCHIVES_URL: &str = "https://www.sec.gov/Archives/edgar/data";
const FMP_TRANSCRIPT_URL: &str = "https://financialmodelingprep.com/api/v3/earning_call_transcript";

/// Hosts known to publish full transcripts
const TRANSCRIPT_HOSTS: [&str; 3] = ["seekingalpha.com", "fool.com", "gurufocus.com"];

const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Maximum 8-K filings inspected by the submissions tier
const MAX_RECENT_FILINGS: usize = 10;

const MIN_FMP_CHARS: usize = 500;
const MIN_WEB_CHARS: usize = 1000;
const MIN_LOCAL_CHARS: usize = 100;

/// Company the transcript is for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptQuery {
    pub ticker: String,
    pub company_name: String,
    /// SEC central index key, when known
    pub cik: Option<String>,
}

impl TranscriptQuery {
    pub fn for_ticker(ticker: &str) -> Self {
        Self {
            ticker: ticker.to_string(),
            company_name: company_name(ticker),
            cik: company_cik(ticker).map(str::to_string),
        }
    }
}

/// Transcript retrieval outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptResult {
    /// `None` when every tier failed
    pub text: Option<String>,
    /// Resolving source label, "none" when unavailable
    pub source: String,
    pub source_url: String,
    /// Resolving tier, 0 when unavailable
    pub tier: u8,
}

impl TranscriptResult {
    pub fn unavailable() -> Self {
        Self {
            text: None,
            source: "none".to_string(),
            source_url: String::new(),
            tier: 0,
        }
    }

    pub fn is_available(&self) -> bool {
        self.text.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Transcript text, or the placeholder when unavailable
    pub fn text_or_placeholder(&self) -> &str {
        match self.text.as_deref() {
            Some(text) if !text.is_empty() => text,
            _ => UNAVAILABLE_TRANSCRIPT,
        }
    }
}

impl From<Resolution> for TranscriptResult {
    fn from(resolution: Resolution) -> Self {
        match resolution {
            Resolution::Resolved {
                payload,
                source_label,
                tier,
            } => Self {
                text: Some(payload.text),
                source: source_label,
                source_url: payload.source_url,
                tier,
            },
            Resolution::Unavailable => Self::unavailable(),
        }
    }
}

type TranscriptTier = Box<dyn TierAttempt<TranscriptQuery>>;

/// Ordered transcript fallback chain
pub struct TranscriptRetriever {
    tiers: Vec<TranscriptTier>,
}

impl TranscriptRetriever {
    /// Chain over arbitrary tiers
    pub fn from_tiers(tiers: Vec<TranscriptTier>) -> Self {
        Self { tiers }
    }

    /// The production five-tier chain
    pub fn standard(
        config: &MemoConfig,
        search: Arc<dyn SearchProvider>,
    ) -> Result<Self, LeafError> {
        let sec_client = build_http_client(config.http_timeout, Some(SEC_EDGAR_USER_AGENT))?;
        let web_client = build_http_client(config.http_timeout, Some(BROWSER_USER_AGENT))?;
        let api_client = build_http_client(config.http_timeout, None)?;

        Ok(Self::from_tiers(vec![
            Box::new(EdgarFullTextSearch {
                client: sec_client.clone(),
            }),
            Box::new(EdgarSubmissions { client: sec_client }),
            Box::new(FmpTranscripts {
                client: api_client,
                api_key: config.fmp_api_key.clone(),
            }),
            Box::new(WebTranscriptSearch {
                search,
                client: web_client,
            }),
            Box::new(LocalTranscriptFile::new(config.transcript_path())),
        ]))
    }

    pub fn tier_count(&self) -> usize {
        self.tiers.len()
    }

    pub async fn retrieve(&self, query: &TranscriptQuery) -> TranscriptResult {
        info!(ticker = %query.ticker, "Retrieving earnings transcript");
        FallbackResolver::resolve(&self.tiers, query).await.into()
    }
}

async fn fetch_text(client: &Client, url: &str) -> Result<Option<String>, LeafError> {
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        debug!(url, status = %response.status(), "Fetch returned non-success status");
        return Ok(None);
    }
    Ok(Some(response.text().await?))
}

// ---- Tier 1 ----

#[derive(Debug, Deserialize)]
struct EftsResponse {
    #[serde(default)]
    hits: EftsHits,
}

#[derive(Debug, Default, Deserialize)]
struct EftsHits {
    #[serde(default)]
    hits: Vec<EftsHit>,
}

#[derive(Debug, Deserialize)]
struct EftsHit {
    #[serde(rename = "_source", default)]
    source: EftsSource,
}

#[derive(Debug, Default, Deserialize)]
struct EftsSource {
    file_url: Option<String>,
}

/// SEC EDGAR full-text search
pub struct EdgarFullTextSearch {
    client: Client,
}

#[async_trait]
impl TierAttempt<TranscriptQuery> for EdgarFullTextSearch {
    fn label(&self) -> &str {
        "SEC EDGAR (EFTS)"
    }

    async fn attempt(&self, query: &TranscriptQuery) -> Result<Option<TierPayload>, LeafError> {
        let q = format!("\"question-and-answer\" \"{}\"", query.company_name);
        let response = self
            .client
            .get(EFTS_URL)
            .header(header::ACCEPT, "application/json")
            .query(&[
                ("q", q.as_str()),
                ("forms", "8-K"),
                ("dateRange", "custom"),
                ("startdt", "2024-01-01"),
                ("enddt", "2026-12-31"),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(LeafError::Api(format!("EFTS returned {}", response.status())));
        }

        let body: EftsResponse = response
            .json()
            .await
            .map_err(|e| LeafError::Parse(format!("EFTS response: {}", e)))?;

        for hit in body.hits.hits {
            let Some(file_url) = hit.source.file_url else {
                continue;
            };
            if let Some(text) = fetch_text(&self.client, &file_url).await? {
                let lower = text.to_lowercase();
                if lower.contains("question") && lower.contains("answer") {
                    return Ok(Some(TierPayload {
                        text,
                        source_url: file_url,
                    }));
                }
            }
        }
        Ok(None)
    }
}

// ---- Tier 2 ----

#[derive(Debug, Deserialize)]
struct Submissions {
    filings: Filings,
}

#[derive(Debug, Deserialize)]
struct Filings {
    recent: RecentFilings,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecentFilings {
    #[serde(default)]
    form: Vec<String>,
    #[serde(default)]
    accession_number: Vec<String>,
    #[serde(default)]
    primary_document: Vec<String>,
}

/// Archive URLs of the leading run of 8-K filings, newest first
fn recent_8k_urls(cik: &str, recent: &RecentFilings) -> Vec<String> {
    let cik_digits = cik.trim_start_matches('0');
    recent
        .form
        .iter()
        .zip(recent.accession_number.iter())
        .zip(recent.primary_document.iter())
        .take(MAX_RECENT_FILINGS)
        .take_while(|((form, _), _)| form.as_str() == "8-K")
        .map(|((_, accession), document)| {
            format!(
                "{}/{}/{}/{}",
                ARCHIVES_URL,
                cik_digits,
                accession.replace('-', ""),
                document
            )
        })
        .collect()
}

/// SEC EDGAR submissions crawl
pub struct EdgarSubmissions {
    client: Client,
}

#[async_trait]
impl TierAttempt<TranscriptQuery> for EdgarSubmissions {
    fn label(&self) -> &str {
        "SEC EDGAR (8-K filing)"
    }

    async fn attempt(&self, query: &TranscriptQuery) -> Result<Option<TierPayload>, LeafError> {
        let Some(cik) = query.cik.as_deref() else {
            debug!(ticker = %query.ticker, "No CIK known, skipping submissions crawl");
            return Ok(None);
        };

        let url = format!("{}/CIK{}.json", SUBMISSIONS_URL, cik);
        let response = self
            .client
            .get(&url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(LeafError::Api(format!(
                "Submissions API returned {}",
                response.status()
            )));
        }
        let submissions: Submissions = response
            .json()
            .await
            .map_err(|e| LeafError::Parse(format!("Submissions response: {}", e)))?;

        for filing_url in recent_8k_urls(cik, &submissions.filings.recent) {
            let Some(text) = fetch_text(&self.client, &filing_url).await? else {
                continue;
            };
            let lower = text.to_lowercase();
            if lower.contains("question-and-answer") || lower.contains("q&a session") {
                return Ok(Some(TierPayload {
                    text,
                    source_url: filing_url,
                }));
            }
        }
        Ok(None)
    }
}

// ---- Tier 3 ----

#[derive(Debug, Deserialize)]
struct FmpTranscript {
    #[serde(default)]
    content: String,
    quarter: Option<serde_json::Value>,
    year: Option<serde_json::Value>,
    #[serde(default)]
    date: String,
}

fn display_field(value: &Option<serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "?".to_string(),
    }
}

/// Financial Modeling Prep earnings call transcripts
pub struct FmpTranscripts {
    client: Client,
    api_key: Option<String>,
}

#[async_trait]
impl TierAttempt<TranscriptQuery> for FmpTranscripts {
    fn label(&self) -> &str {
        "Financial Modeling Prep API"
    }

    async fn attempt(&self, query: &TranscriptQuery) -> Result<Option<TierPayload>, LeafError> {
        let Some(api_key) = self.api_key.as_deref() else {
            info!("FMP API key not configured, skipping transcript tier");
            return Ok(None);
        };

        let url = format!("{}/{}", FMP_TRANSCRIPT_URL, query.ticker);
        let response = self
            .client
            .get(&url)
            .query(&[("apikey", api_key)])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(LeafError::Api(format!("FMP returned {}", response.status())));
        }
        let transcripts: Vec<FmpTranscript> = response
            .json()
            .await
            .map_err(|e| LeafError::Parse(format!("FMP transcript response: {}", e)))?;

        let Some(latest) = transcripts.into_iter().next() else {
            return Ok(None);
        };
        if latest.content.len() <= MIN_FMP_CHARS {
            return Ok(None);
        }

        let quarter = display_field(&latest.quarter);
        let year = display_field(&latest.year);
        let header = format!(
            "{} ({}) Q{} {} Earnings Call Transcript\nDate: {}\nSource: Financial Modeling Prep API\n{}\n\n",
            query.company_name,
            query.ticker,
            quarter,
            year,
            latest.date,
            "=".repeat(60)
        );
        Ok(Some(TierPayload {
            text: header + &latest.content,
            source_url: format!("{}/{}?quarter={}&year={}", FMP_TRANSCRIPT_URL, query.ticker, quarter, year),
        }))
    }
}

// ---- Tier 4 ----

static ARTICLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<article[^>]*>(.*?)</article>").expect("valid regex"));
static SCRIPT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style|noscript)[^>]*>.*?</(script|style|noscript)>")
        .expect("valid regex")
});
static BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<(br|/p|/div|/h[1-6]|/li|/tr)[^>]*>").expect("valid regex")
});
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").expect("valid regex"));

/// Reduce an HTML page to its article text, one line per block
pub fn html_to_text(html: &str) -> String {
    let body = ARTICLE_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(html);
    let without_scripts = SCRIPT_RE.replace_all(body, "");
    let with_breaks = BLOCK_RE.replace_all(&without_scripts, "\n");
    let plain = TAG_RE.replace_all(&with_breaks, "");

    plain
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Web search over known transcript hosts
pub struct WebTranscriptSearch {
    search: Arc<dyn SearchProvider>,
    client: Client,
}

#[async_trait]
impl TierAttempt<TranscriptQuery> for WebTranscriptSearch {
    fn label(&self) -> &str {
        "Web search"
    }

    async fn attempt(&self, query: &TranscriptQuery) -> Result<Option<TierPayload>, LeafError> {
        let queries = [
            format!(
                "\"{}\" earnings call transcript Q&A 2025 OR 2026",
                query.company_name
            ),
            format!(
                "{} earnings call transcript \"question-and-answer\"",
                query.ticker
            ),
        ];

        for search_query in &queries {
            let hits = self.search.search(search_query, 5).await?;
            for hit in hits
                .iter()
                .filter(|h| TRANSCRIPT_HOSTS.iter().any(|host| h.url.contains(host)))
            {
                let Some(html) = fetch_text(&self.client, &hit.url).await? else {
                    continue;
                };
                let text = html_to_text(&html);
                if text.len() > MIN_WEB_CHARS && text.to_lowercase().contains("question") {
                    return Ok(Some(TierPayload {
                        text,
                        source_url: hit.url.clone(),
                    }));
                }
            }
        }
        Ok(None)
    }
}

// ---- Tier 5 ----

/// Bundled transcript shipped with the service
pub struct LocalTranscriptFile {
    path: PathBuf,
    label: String,
}

impl LocalTranscriptFile {
    pub fn new(path: PathBuf) -> Self {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            label: format!("Local file ({})", file_name),
            path,
        }
    }
}

#[async_trait]
impl TierAttempt<TranscriptQuery> for LocalTranscriptFile {
    fn label(&self) -> &str {
        &self.label
    }

    async fn attempt(&self, _query: &TranscriptQuery) -> Result<Option<TierPayload>, LeafError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(LeafError::NotAvailable(format!(
                    "{}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        if text.len() > MIN_LOCAL_CHARS {
            info!(path = %self.path.display(), "Using local transcript file");
            Ok(Some(TierPayload {
                text,
                source_url: String::new(),
            }))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn query() -> TranscriptQuery {
        TranscriptQuery::for_ticker("MS")
    }

    #[test]
    fn test_query_for_known_ticker() {
        let q = query();
        assert_eq!(q.company_name, "Morgan Stanley");
        assert_eq!(q.cik.as_deref(), Some("0000895421"));
        assert!(TranscriptQuery::for_ticker("GS").cik.is_none());
    }

    #[test]
    fn test_recent_8k_urls_stop_at_first_other_form() {
        let recent = RecentFilings {
            form: vec!["8-K".into(), "8-K".into(), "10-Q".into(), "8-K".into()],
            accession_number: vec![
                "0000895421-25-000101".into(),
                "0000895421-25-000100".into(),
                "0000895421-25-000099".into(),
                "0000895421-25-000098".into(),
            ],
            primary_document: vec![
                "a.htm".into(),
                "b.htm".into(),
                "c.htm".into(),
                "d.htm".into(),
            ],
        };
        let urls = recent_8k_urls("0000895421", &recent);
        assert_eq!(
            urls,
            vec![
                "https://www.sec.gov/Archives/edgar/data/895421/000089542125000101/a.htm",
                "https://www.sec.gov/Archives/edgar/data/895421/000089542125000100/b.htm",
            ]
        );
    }

    #[test]
    fn test_html_to_text_prefers_article() {
        let html = "<html><nav>Menu</nav><article><h1>Q3 Call</h1><script>x()</script>\
                    <p>Operator: first question&amp;answer</p></article></html>";
        assert_eq!(html_to_text(html), "Q3 Call\nOperator: first question&answer");
    }

    #[test]
    fn test_unavailable_result_uses_placeholder() {
        let result = TranscriptResult::unavailable();
        assert_eq!(result.tier, 0);
        assert!(!result.is_available());
        assert_eq!(result.text_or_placeholder(), UNAVAILABLE_TRANSCRIPT);
    }

    #[tokio::test]
    async fn test_local_file_accepts_long_text() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", "Operator: Our next question comes from Jane Roe. ".repeat(5)).unwrap();

        let tier = LocalTranscriptFile::new(file.path().to_path_buf());
        assert!(tier.label().starts_with("Local file ("));
        let payload = tier.attempt(&query()).await.unwrap().unwrap();
        assert!(payload.source_url.is_empty());
    }

    #[tokio::test]
    async fn test_local_file_rejects_short_or_missing() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "too short").unwrap();
        let tier = LocalTranscriptFile::new(file.path().to_path_buf());
        assert!(tier.attempt(&query()).await.unwrap().is_none());

        let missing = LocalTranscriptFile::new(PathBuf::from("/nonexistent/ms_transcript.txt"));
        assert!(missing.attempt(&query()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fmp_without_key_is_skipped() {
        let tier = FmpTranscripts {
            client: Client::new(),
            api_key: None,
        };
        assert!(tier.attempt(&query()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_retriever_falls_through_to_local_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", "Analyst question and answer. ".repeat(10)).unwrap();

        let retriever = TranscriptRetriever::from_tiers(vec![
            Box::new(FmpTranscripts {
                client: Client::new(),
                api_key: None,
            }),
            Box::new(LocalTranscriptFile::new(file.path().to_path_buf())),
        ]);
        let result = retriever.retrieve(&query()).await;
        assert_eq!(result.tier, 2);
        assert!(result.source.starts_with("Local file"));
        assert!(result.is_available());
    }
}
