//! Web research leaves
//!
//! Analyst bio and peer commentary searches over a SearXNG-compatible JSON
//! search API.

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

use super::{build_http_client, LeafError, SearchHit, SearchProvider};
use irm_common::events::Source;

/// Results requested per bio query
pub const BIO_RESULTS_PER_QUERY: usize = 8;

/// Results requested per peer query
pub const PEER_RESULTS_PER_QUERY: usize = 5;

/// Sources attached to a narrative section
pub const MAX_SOURCES: usize = 5;

const SEARCH_USER_AGENT: &str = "IR-Memo-Agent/0.1";

#[derive(Debug, Deserialize)]
struct SearxResponse {
    #[serde(default)]
    results: Vec<SearxResult>,
}

#[derive(Debug, Deserialize)]
struct SearxResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    url: String,
}

/// SearXNG JSON search client
pub struct SearxSearchClient {
    client: Client,
    endpoint: Url,
}

impl SearxSearchClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, LeafError> {
        let base = Url::parse(base_url)
            .map_err(|e| LeafError::NotConfigured(format!("Invalid search URL {}: {}", base_url, e)))?;
        let endpoint = base
            .join("search")
            .map_err(|e| LeafError::NotConfigured(format!("Invalid search URL {}: {}", base_url, e)))?;

        Ok(Self {
            client: build_http_client(timeout, Some(SEARCH_USER_AGENT))?,
            endpoint,
        })
    }
}

#[async_trait]
impl SearchProvider for SearxSearchClient {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, LeafError> {
        debug!(query, "Web search");

        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[("q", query), ("format", "json")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(LeafError::Api(format!(
                "Search returned {}",
                response.status()
            )));
        }

        let body: SearxResponse = response
            .json()
            .await
            .map_err(|e| LeafError::Parse(format!("Search response: {}", e)))?;

        Ok(body
            .results
            .into_iter()
            .filter(|r| !r.url.is_empty())
            .take(max_results)
            .map(|r| SearchHit {
                title: r.title,
                snippet: r.content,
                url: r.url,
            })
            .collect())
    }
}

/// Queries used to research an analyst's background
pub fn bio_queries(analyst: &str, firm: &str) -> [String; 4] {
    [
        format!("\"{}\" \"{}\" analyst bio coverage universe", analyst, firm),
        format!("\"{}\" analyst banking interview commentary", analyst),
        format!("\"{}\" career history banks analyst", analyst),
        format!("\"{}\" BrokerCheck prior firms employment history", analyst),
    ]
}

/// Bio search fan-out
///
/// All queries run concurrently; hits are de-duplicated by URL keeping the
/// first occurrence in query order. A failed query contributes nothing.
/// Fails only when every query fails.
pub async fn bio_search(
    search: &dyn SearchProvider,
    analyst: &str,
    firm: &str,
) -> Result<Vec<SearchHit>, LeafError> {
    let queries = bio_queries(analyst, firm);
    let results = join_all(
        queries
            .iter()
            .map(|q| search.search(q, BIO_RESULTS_PER_QUERY)),
    )
    .await;

    let mut seen = HashSet::new();
    let mut hits = Vec::new();
    let mut last_error = None;
    let mut any_ok = false;

    for (query, result) in queries.iter().zip(results) {
        match result {
            Ok(batch) => {
                any_ok = true;
                for hit in batch {
                    if seen.insert(hit.url.clone()) {
                        hits.push(hit);
                    }
                }
            }
            Err(e) => {
                warn!(query = %query, "Bio search query failed: {}", e);
                last_error = Some(e);
            }
        }
    }

    match (any_ok, last_error) {
        (false, Some(e)) => Err(e),
        _ => Ok(hits),
    }
}

/// Peer commentary gathered for one analyst
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeerResearch {
    /// Hits per peer ticker, in ticker order
    pub per_ticker: Vec<(String, Vec<SearchHit>)>,
    pub sector: Vec<SearchHit>,
}

impl PeerResearch {
    /// Peers with at least one hit
    pub fn peers_with_results(&self) -> usize {
        self.per_ticker.iter().filter(|(_, hits)| !hits.is_empty()).count()
    }

    pub fn total_results(&self) -> usize {
        self.per_ticker.iter().map(|(_, hits)| hits.len()).sum::<usize>() + self.sector.len()
    }

    /// Every hit, per-ticker first then sector
    pub fn all_hits(&self) -> impl Iterator<Item = &SearchHit> {
        self.per_ticker
            .iter()
            .flat_map(|(_, hits)| hits.iter())
            .chain(self.sector.iter())
    }
}

/// Peer search fan-out
///
/// One query per peer ticker plus a sector query, all concurrent. A failed
/// query yields an empty list for its ticker.
pub async fn peer_search(
    search: &dyn SearchProvider,
    analyst: &str,
    peers: &[String],
) -> PeerResearch {
    let ticker_queries: Vec<String> = peers
        .iter()
        .map(|t| format!("\"{}\" {} research outlook rating", analyst, t))
        .collect();
    let sector_query = format!("\"{}\" large bank sector outlook", analyst);

    let per_ticker_fut = join_all(
        ticker_queries
            .iter()
            .map(|q| search.search(q, PEER_RESULTS_PER_QUERY)),
    );
    let sector_fut = search.search(&sector_query, PEER_RESULTS_PER_QUERY);
    let (per_ticker, sector) = futures::join!(per_ticker_fut, sector_fut);

    let per_ticker = peers
        .iter()
        .zip(per_ticker)
        .map(|(ticker, result)| {
            let hits = result.unwrap_or_else(|e| {
                warn!(ticker = %ticker, "Peer search query failed: {}", e);
                Vec::new()
            });
            (ticker.clone(), hits)
        })
        .collect();

    let sector = sector.unwrap_or_else(|e| {
        warn!("Sector search query failed: {}", e);
        Vec::new()
    });

    PeerResearch { per_ticker, sector }
}

/// Host of a URL without a leading "www.", or its first 40 characters
pub fn extract_domain(url: &str) -> String {
    match Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string)) {
        Some(host) => host.strip_prefix("www.").unwrap_or(&host).to_string(),
        None => url.chars().take(40).collect(),
    }
}

/// Up to five sources, one per distinct domain, in hit order
pub fn top_sources<'a>(hits: impl IntoIterator<Item = &'a SearchHit>) -> Vec<Source> {
    let mut seen = HashSet::new();
    hits.into_iter()
        .filter_map(|hit| {
            let domain = extract_domain(&hit.url);
            if !seen.insert(domain.clone()) {
                return None;
            }
            let label_base = if hit.title.is_empty() {
                domain.as_str()
            } else {
                hit.title.as_str()
            };
            Some(Source {
                url: hit.url.clone(),
                label: label_base.chars().take(80).collect(),
                domain,
            })
        })
        .take(MAX_SOURCES)
        .collect()
}

/// Number of distinct domains among the hits
pub fn distinct_domains<'a>(hits: impl IntoIterator<Item = &'a SearchHit>) -> usize {
    hits.into_iter()
        .map(|hit| extract_domain(&hit.url))
        .collect::<HashSet<_>>()
        .len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ScriptedSearch {
        queries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SearchProvider for ScriptedSearch {
        async fn search(&self, query: &str, _max: usize) -> Result<Vec<SearchHit>, LeafError> {
            self.queries.lock().unwrap().push(query.to_string());
            if query.contains("BrokerCheck") || query.contains(" JPM ") {
                return Err(LeafError::Network("reset".into()));
            }
            Ok(vec![
                hit("Profile", "https://www.example.com/profile"),
                hit(query, &format!("https://news.example.org/{}", query.len())),
            ])
        }
    }

    fn hit(title: &str, url: &str) -> SearchHit {
        SearchHit {
            title: title.to_string(),
            snippet: String::new(),
            url: url.to_string(),
        }
    }

    fn scripted() -> ScriptedSearch {
        ScriptedSearch {
            queries: Mutex::new(Vec::new()),
        }
    }

    #[tokio::test]
    async fn test_bio_search_dedups_by_url() {
        let search = scripted();
        let hits = bio_search(&search, "Jane Roe", "Acme").await.unwrap();

        assert_eq!(search.queries.lock().unwrap().len(), 4);
        let profile_count = hits
            .iter()
            .filter(|h| h.url == "https://www.example.com/profile")
            .count();
        assert_eq!(profile_count, 1);
        assert_eq!(hits[0].title, "Profile");
    }

    #[tokio::test]
    async fn test_peer_search_failed_ticker_is_empty() {
        let search = scripted();
        let peers = vec!["GS".to_string(), "JPM".to_string()];
        let research = peer_search(&search, "Jane Roe", &peers).await;

        assert_eq!(research.per_ticker.len(), 2);
        assert_eq!(research.per_ticker[0].1.len(), 2);
        assert!(research.per_ticker[1].1.is_empty());
        assert_eq!(research.peers_with_results(), 1);
        assert_eq!(research.sector.len(), 2);
        assert_eq!(research.total_results(), 4);
    }

    #[test]
    fn test_extract_domain() {
        assert_eq!(extract_domain("https://www.bloomberg.com/a/b"), "bloomberg.com");
        assert_eq!(extract_domain("https://brokercheck.finra.org/x"), "brokercheck.finra.org");
        assert_eq!(extract_domain("not a url"), "not a url");
    }

    #[test]
    fn test_top_sources_unique_domains_capped() {
        let hits: Vec<SearchHit> = (0..8)
            .map(|i| hit("", &format!("https://site{}.com/page", i % 6)))
            .chain(std::iter::once(hit("", "https://www.site0.com/other")))
            .collect();
        let sources = top_sources(&hits);
        assert_eq!(sources.len(), MAX_SOURCES);
        assert_eq!(sources[0].domain, "site0.com");
        assert_eq!(sources[0].label, "site0.com");
        assert_eq!(distinct_domains(&hits), 6);
    }
}
