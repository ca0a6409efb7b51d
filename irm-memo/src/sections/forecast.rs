//! Analyst forecast section

use irm_common::events::{Findings, ForecastTable, Preview, PreviewRow, Source};

use super::{detached_record, SectionContext, StepReporter};
use crate::config::FORECAST_WORKBOOK;
use crate::confidence::{forecast_confidence, ForecastSignals};
use crate::models::{RunMetadata, SectionBody, SectionRecord};
use crate::tasks::drafting::edit_forecast_table;
use crate::tasks::forecast::VALUE_UNAVAILABLE;
use crate::tasks::{guarded, LeafOutcome};

const NA: &str = "[N/A]";

/// Provenance entry pointing at the workbook row
pub fn forecast_sources(analyst: &str, firm: &str, date_updated: &str) -> Vec<Source> {
    vec![Source {
        url: String::new(),
        domain: FORECAST_WORKBOOK.to_string(),
        label: format!("Row: {}, {}, updated {}", analyst, firm, date_updated),
    }]
}

fn with_thousands(value: f64) -> String {
    crate::tasks::export::group_thousands(value.round())
}

/// Key workbook fields shown on the `forecast_read` step
pub fn forecast_preview(table: &ForecastTable) -> Preview {
    let analyst_value = |label: &str| {
        table
            .row(label)
            .and_then(|r| r.analyst)
            .filter(|v| *v != 0.0)
    };
    Preview::ForecastTable {
        rows: vec![
            PreviewRow::new("Analyst", table.analyst_name.clone()),
            PreviewRow::new("Firm", table.firm.clone()),
            PreviewRow::new("Date Updated", table.date_updated.clone()),
            PreviewRow::new(
                "Firmwide Rev",
                analyst_value("Firmwide Revenues")
                    .map(|v| format!("${}M", with_thousands(v)))
                    .unwrap_or_else(|| NA.to_string()),
            ),
            PreviewRow::new(
                "EPS",
                analyst_value("EPS")
                    .map(|v| format!("${}", v))
                    .unwrap_or_else(|| NA.to_string()),
            ),
            PreviewRow::new("Rating", table.rating.clone()),
            PreviewRow::new(
                "Price Target",
                table
                    .price_target
                    .filter(|v| *v != 0.0)
                    .map(|v| format!("${}", v))
                    .unwrap_or_else(|| NA.to_string()),
            ),
        ],
        local_source: true,
    }
}

/// Rate a forecast table
pub fn rate(table: &ForecastTable) -> irm_common::events::Confidence {
    forecast_confidence(&ForecastSignals {
        stale: table.is_stale,
        missing: table.missing_count(),
        date_updated: table.date_updated.clone(),
    })
}

pub async fn run(
    ctx: &SectionContext<'_>,
    reporter: &StepReporter<'_>,
    metadata: &mut RunMetadata,
) -> SectionRecord {
    let subject = ctx.subject;

    reporter.running("forecast_read");
    let mut table = match guarded(
        "forecast_read",
        ctx.toolkit.forecasts.read(&subject.analyst),
    )
    .await
    {
        LeafOutcome::Success(table) => table,
        LeafOutcome::Error(message) => {
            reporter.error("forecast_read", Findings::summary(message.clone()));
            reporter.running("forecast_deltas");
            reporter.error(
                "forecast_deltas",
                Findings::summary("Skipped: forecast data unavailable"),
            );
            return SectionRecord::failed(message, "Forecast data unavailable");
        }
    };

    metadata.forecast_date_updated = table.date_updated.clone();
    let sources = forecast_sources(&subject.analyst, &subject.firm, &table.date_updated);
    let stale_note = if table.is_stale {
        " (STALE - >30 days)"
    } else {
        ""
    };
    reporter.complete(
        "forecast_read",
        Findings::summary(format!(
            "Loaded {}'s forecast (updated {}){}",
            subject.analyst, table.date_updated, stale_note
        ))
        .with_detail(format!(
            "{} forecast fields extracted, {} missing values",
            table.table_rows.len(),
            table.missing_count()
        ))
        .with_sources(sources.clone())
        .with_preview(Some(forecast_preview(&table))),
    );

    reporter.running("forecast_deltas");
    let computed = table
        .table_rows
        .iter()
        .filter(|r| r.delta.as_deref().is_some_and(|d| d != VALUE_UNAVAILABLE))
        .count();
    reporter.complete(
        "forecast_deltas",
        Findings::summary(format!(
            "Computed delta % for {} of {} metrics vs. consensus",
            computed,
            table.table_rows.len()
        )),
    );

    // A re-search instruction is applied as a table edit on the fresh read
    if let Some(instruction) = ctx.instruction.filter(|i| !i.trim().is_empty()) {
        if reporter.is_detached() {
            return detached_record();
        }
        reporter.running_with("forecast_deltas", "Applying changes to forecast table".to_string());
        if let Some(rows) =
            edit_forecast_table(ctx.toolkit.drafter.as_ref(), &table.table_rows, instruction).await
        {
            table.table_rows = rows;
        }
    }

    SectionRecord {
        confidence: rate(&table),
        body: SectionBody::Forecast(table),
        sources,
    }
}
