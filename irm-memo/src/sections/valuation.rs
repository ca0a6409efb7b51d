//! Valuation ratios section

use irm_common::events::{Confidence, Findings, Source, ValuationSnapshot};

use super::{SectionContext, StepReporter};
use crate::confidence::{valuation_confidence, ValuationSignals};
use crate::models::{RunMetadata, SectionBody, SectionRecord};
use crate::tasks::market_data::{get_valuation_data, valuation_timestamp, PRICE};
use crate::tasks::{guarded, LeafOutcome};

pub fn valuation_sources(snapshot: &ValuationSnapshot) -> Vec<Source> {
    let Some(target) = snapshot.target() else {
        return Vec::new();
    };
    let price = snapshot
        .metric(target, PRICE)
        .map(|p| format!("${:.2}", p))
        .unwrap_or_else(|| "N/A".to_string());
    vec![Source {
        url: String::new(),
        domain: "Market data API".to_string(),
        label: format!(
            "Real-time data - {}: {} (as of {})",
            target, price, snapshot.as_of
        ),
    }]
}

pub fn rate(snapshot: &ValuationSnapshot) -> Confidence {
    valuation_confidence(&ValuationSignals {
        symbols: snapshot.ticker_order.len(),
        failed: snapshot.failed_symbols(),
    })
}

pub async fn run(
    ctx: &SectionContext<'_>,
    reporter: &StepReporter<'_>,
    metadata: &mut RunMetadata,
) -> SectionRecord {
    reporter.running_with(
        "market_data",
        format!(
            "Pulling fresh valuation data for {}",
            ctx.valuation_symbols.join(", ")
        ),
    );

    let as_of = valuation_timestamp();
    let snapshot = match guarded(
        "market_data",
        get_valuation_data(ctx.toolkit.quotes.as_ref(), ctx.valuation_symbols, as_of),
    )
    .await
    {
        LeafOutcome::Success(snapshot) => snapshot,
        LeafOutcome::Error(message) => {
            reporter.error(
                "market_data",
                Findings::summary("Failed to pull valuation data").with_detail(message.clone()),
            );
            return SectionRecord::failed(message, "Valuation data unavailable");
        }
    };

    metadata.valuation_timestamp = snapshot.as_of.clone();
    let sources = valuation_sources(&snapshot);
    let count = snapshot.ticker_order.len();
    reporter.complete(
        "market_data",
        Findings::summary(format!(
            "Pulled live data for {} tickers as of {}",
            count, snapshot.as_of
        ))
        .with_detail(format!(
            "Retrieved data for {} tickers, {} failures",
            count,
            snapshot.failed_symbols()
        ))
        .with_sources(sources.clone()),
    );

    SectionRecord {
        confidence: rate(&snapshot),
        body: SectionBody::Valuation(snapshot),
        sources,
    }
}
