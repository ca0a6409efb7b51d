//! Runtime configuration for irm-memo
//!
//! Every setting resolves ENV -> TOML -> default (see
//! `irm_common::config`). Reference data for the subject company and its
//! peer set lives here as constants.

use irm_common::config::{resolve_secret, resolve_setting, TomlConfig};
use std::path::PathBuf;
use std::time::Duration;

/// Default HTTP listen port
pub const DEFAULT_PORT: u16 = 8000;

/// Subject company used when a request does not name one
pub const DEFAULT_TICKER: &str = "MS";

/// Peer set compared against the subject company
pub const PEER_TICKERS: [&str; 6] = ["GS", "JPM", "BAC", "C", "WFC", "SCHW"];

/// SEC EDGAR requires identification in the User-Agent header
pub const SEC_EDGAR_USER_AGENT: &str = "IR-Memo-Agent research@example.com";

pub const DEFAULT_DRAFTING_MODEL: &str = "claude-sonnet-4-20250514";

/// SearXNG-compatible JSON search endpoint
pub const DEFAULT_SEARCH_URL: &str = "http://localhost:8888";

pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;

/// Forecast workbook file name inside the data directory
pub const FORECAST_WORKBOOK: &str = "analyst_key_metrics.xlsx";

/// Bundled transcript file name inside the data directory
pub const TRANSCRIPT_FILE: &str = "ms_transcript.txt";

/// Origins always allowed by CORS (local frontend dev servers)
pub const DEV_ORIGINS: [&str; 2] = ["http://localhost:5173", "http://localhost:3000"];

/// SEC EDGAR central index key for a ticker
pub fn company_cik(ticker: &str) -> Option<&'static str> {
    match ticker {
        "MS" => Some("0000895421"),
        _ => None,
    }
}

/// Display name for a ticker, falling back to the ticker itself
pub fn company_name(ticker: &str) -> String {
    match ticker {
        "MS" => "Morgan Stanley".to_string(),
        other => other.to_string(),
    }
}

/// Target symbol followed by the peer set
pub fn valuation_symbols(target: &str) -> Vec<String> {
    std::iter::once(target)
        .chain(PEER_TICKERS.iter().copied().filter(|t| *t != target))
        .map(str::to_string)
        .collect()
}

/// Resolved service configuration
#[derive(Debug, Clone)]
pub struct MemoConfig {
    pub port: u16,
    /// Extra CORS origin for a deployed frontend
    pub frontend_url: Option<String>,
    /// Holds the forecast workbook and bundled transcript
    pub data_dir: PathBuf,
    pub search_url: String,
    pub drafting_model: String,
    pub http_timeout: Duration,
    pub anthropic_api_key: Option<String>,
    pub fmp_api_key: Option<String>,
    pub log_level: String,
}

impl Default for MemoConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            frontend_url: None,
            data_dir: PathBuf::from("data"),
            search_url: DEFAULT_SEARCH_URL.to_string(),
            drafting_model: DEFAULT_DRAFTING_MODEL.to_string(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            anthropic_api_key: None,
            fmp_api_key: None,
            log_level: "info".to_string(),
        }
    }
}

impl MemoConfig {
    /// Resolve every setting from environment, TOML and defaults
    pub fn resolve(toml: &TomlConfig) -> Self {
        let defaults = Self::default();

        let frontend_url = std::env::var("FRONTEND_URL")
            .ok()
            .filter(|u| !u.trim().is_empty())
            .or_else(|| toml.frontend_url.clone());

        Self {
            port: resolve_setting("IRM_PORT", toml.port, defaults.port),
            frontend_url,
            data_dir: resolve_setting("IRM_DATA_DIR", toml.data_dir.clone(), defaults.data_dir),
            search_url: resolve_setting(
                "IRM_SEARCH_URL",
                toml.search_url.clone(),
                defaults.search_url,
            ),
            drafting_model: resolve_setting(
                "IRM_DRAFTING_MODEL",
                toml.drafting_model.clone(),
                defaults.drafting_model,
            ),
            http_timeout: Duration::from_secs(resolve_setting(
                "IRM_HTTP_TIMEOUT_SECS",
                Some(toml.timeouts.http_secs),
                DEFAULT_HTTP_TIMEOUT_SECS,
            )),
            anthropic_api_key: resolve_secret(
                "ANTHROPIC_API_KEY",
                toml.api_keys.anthropic.as_ref(),
            ),
            fmp_api_key: resolve_secret("FMP_API_KEY", toml.api_keys.fmp.as_ref()),
            log_level: resolve_setting(
                "IRM_LOG_LEVEL",
                Some(toml.logging.level.clone()),
                defaults.log_level,
            ),
        }
    }

    pub fn forecast_path(&self) -> PathBuf {
        self.data_dir.join(FORECAST_WORKBOOK)
    }

    pub fn transcript_path(&self) -> PathBuf {
        self.data_dir.join(TRANSCRIPT_FILE)
    }

    /// CORS origins: local dev servers plus the configured frontend
    pub fn allowed_origins(&self) -> Vec<String> {
        DEV_ORIGINS
            .iter()
            .map(|o| o.to_string())
            .chain(self.frontend_url.iter().cloned())
            .collect()
    }
}
