//! Valuation market data
//!
//! Quote pulls run concurrently, one per symbol. A symbol whose pull fails
//! gets all-`None` metrics rather than failing the snapshot.

use async_trait::async_trait;
use chrono::Local;
use futures::future::join_all;
use irm_common::events::ValuationSnapshot;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};

use super::{build_http_client, LeafError, QuoteMetrics, QuoteProvider};

const FMP_API_URL: &str = "https://financialmodelingprep.com/api/v3";

pub use irm_common::events::STOCK_PRICE_METRIC as PRICE;
pub const PE_TTM: &str = "P/E (TTM)";
pub const FORWARD_PE: &str = "Forward P/E";
pub const PRICE_TO_BOOK: &str = "Price/Book";
pub const DIVIDEND_YIELD: &str = "Dividend Yield";
pub const MARKET_CAP: &str = "Market Cap ($B)";
pub const YEAR_HIGH: &str = "52W High";
pub const YEAR_LOW: &str = "52W Low";

/// Metric labels in display order
pub const METRICS: [&str; 8] = [
    PRICE,
    PE_TTM,
    FORWARD_PE,
    PRICE_TO_BOOK,
    DIVIDEND_YIELD,
    MARKET_CAP,
    YEAR_HIGH,
    YEAR_LOW,
];

/// Metrics with no meaningful peer median
const NO_MEDIAN: [&str; 2] = [YEAR_HIGH, YEAR_LOW];

/// Timestamp label for a snapshot taken now
pub fn valuation_timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M ET").to_string()
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Display metrics for one symbol
pub fn display_metrics(quote: &QuoteMetrics) -> BTreeMap<String, Option<f64>> {
    let values = [
        quote.price,
        quote.pe_ttm,
        quote.forward_pe,
        quote.price_to_book,
        quote.dividend_yield.map(|v| round_to(v, 2)),
        quote.market_cap.map(|v| round_to(v / 1e9, 1)),
        quote.year_high,
        quote.year_low,
    ];
    METRICS
        .iter()
        .zip(values)
        .map(|(label, value)| (label.to_string(), value))
        .collect()
}

/// Round half up to two decimals on the shortest decimal rendering
///
/// `2.675` rounds to `2.68` even though its binary value is slightly below.
pub fn round_half_up_2(value: f64) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let rendered = format!("{}", value.abs());
    let (int_part, frac_part) = rendered.split_once('.').unwrap_or((&rendered, ""));
    if frac_part.len() <= 2 {
        return value;
    }

    let whole: i64 = match int_part.parse() {
        Ok(w) => w,
        Err(_) => return round_to(value, 2),
    };
    let digits = frac_part.as_bytes();
    let mut cents = whole * 100 + i64::from(digits[0] - b'0') * 10 + i64::from(digits[1] - b'0');
    if digits[2] >= b'5' {
        cents += 1;
    }
    let rounded = cents as f64 / 100.0;
    if value < 0.0 {
        -rounded
    } else {
        rounded
    }
}

/// Median of the values, `None` when empty
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

/// Per-metric median over every symbol except the first
pub fn peer_medians(
    symbols: &[String],
    tickers: &BTreeMap<String, BTreeMap<String, Option<f64>>>,
) -> BTreeMap<String, Option<f64>> {
    METRICS
        .iter()
        .map(|label| {
            if NO_MEDIAN.contains(label) {
                return (label.to_string(), None);
            }
            let mut values: Vec<f64> = symbols
                .iter()
                .skip(1)
                .filter_map(|s| tickers.get(s).and_then(|m| m.get(*label).copied().flatten()))
                .collect();
            (label.to_string(), median(&mut values).map(round_half_up_2))
        })
        .collect()
}

/// Pull a valuation snapshot for `symbols`, target first
pub async fn get_valuation_data(
    quotes: &dyn QuoteProvider,
    symbols: &[String],
    as_of: String,
) -> Result<ValuationSnapshot, LeafError> {
    if symbols.is_empty() {
        return Err(LeafError::NotAvailable("No tickers to pull".to_string()));
    }

    let pulls = join_all(symbols.iter().map(|s| quotes.quote(s))).await;

    let tickers: BTreeMap<String, BTreeMap<String, Option<f64>>> = symbols
        .iter()
        .zip(pulls)
        .map(|(symbol, pull)| {
            let quote = pull.unwrap_or_else(|e| {
                warn!(symbol = %symbol, "Quote pull failed: {}", e);
                QuoteMetrics::default()
            });
            (symbol.clone(), display_metrics(&quote))
        })
        .collect();

    let snapshot = ValuationSnapshot {
        ticker_order: symbols.to_vec(),
        peer_median: peer_medians(symbols, &tickers),
        tickers,
        as_of,
    };
    info!(
        symbols = symbols.len(),
        failed = snapshot.failed_symbols(),
        "Valuation snapshot pulled"
    );
    Ok(snapshot)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FmpQuote {
    price: Option<f64>,
    pe: Option<f64>,
    market_cap: Option<f64>,
    year_high: Option<f64>,
    year_low: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FmpRatiosTtm {
    #[serde(rename = "priceToBookRatioTTM")]
    price_to_book: Option<f64>,
    #[serde(rename = "dividendYielTTM", alias = "dividendYieldTTM")]
    dividend_yield: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FmpEstimate {
    estimated_eps_avg: Option<f64>,
}

/// Financial Modeling Prep quote client
pub struct FmpQuoteClient {
    client: Client,
    api_key: Option<String>,
}

impl FmpQuoteClient {
    pub fn new(api_key: Option<String>, timeout: Duration) -> Result<Self, LeafError> {
        Ok(Self {
            client: build_http_client(timeout, None)?,
            api_key,
        })
    }

    async fn first<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        api_key: &str,
        extra: &[(&str, &str)],
    ) -> Result<Option<T>, LeafError> {
        let url = format!("{}/{}", FMP_API_URL, path);
        let response = self
            .client
            .get(&url)
            .query(&[("apikey", api_key)])
            .query(extra)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(LeafError::Api(format!("{} returned {}", path, response.status())));
        }
        let items: Vec<T> = response
            .json()
            .await
            .map_err(|e| LeafError::Parse(format!("{}: {}", path, e)))?;
        Ok(items.into_iter().next())
    }
}

#[async_trait]
impl QuoteProvider for FmpQuoteClient {
    async fn quote(&self, symbol: &str) -> Result<QuoteMetrics, LeafError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| LeafError::NotConfigured("FMP API key not set".to_string()))?;

        let quote_path = format!("quote/{}", symbol);
        let ratios_path = format!("ratios-ttm/{}", symbol);
        let estimates_path = format!("analyst-estimates/{}", symbol);
        let (quote, ratios, estimate) = futures::join!(
            self.first::<FmpQuote>(&quote_path, api_key, &[]),
            self.first::<FmpRatiosTtm>(&ratios_path, api_key, &[]),
            self.first::<FmpEstimate>(&estimates_path, api_key, &[("limit", "1")]),
        );

        let quote =
            quote?.ok_or_else(|| LeafError::NotAvailable(format!("No quote for {}", symbol)))?;
        // Ratios and estimates are optional extras
        let ratios = ratios.unwrap_or_else(|e| {
            warn!(symbol, "Ratio pull failed: {}", e);
            None
        });
        let forward_eps = estimate
            .ok()
            .flatten()
            .and_then(|e| e.estimated_eps_avg)
            .filter(|eps| *eps > 0.0);

        Ok(QuoteMetrics {
            price: quote.price,
            pe_ttm: quote.pe,
            forward_pe: quote
                .price
                .zip(forward_eps)
                .map(|(price, eps)| round_to(price / eps, 2)),
            price_to_book: ratios.as_ref().and_then(|r| r.price_to_book),
            dividend_yield: ratios
                .as_ref()
                .and_then(|r| r.dividend_yield)
                .map(|y| y * 100.0),
            market_cap: quote.market_cap,
            year_high: quote.year_high,
            year_low: quote.year_low,
        })
    }
}
