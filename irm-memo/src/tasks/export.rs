//! Memo export
//!
//! Renders a stored report as a standalone Markdown document.

use irm_common::events::{ForecastRow, ForecastTable, SectionKey, ValuationSnapshot};
use std::fmt::Write as _;

use super::market_data::{DIVIDEND_YIELD, MARKET_CAP, METRICS, PRICE, YEAR_HIGH, YEAR_LOW};
use super::{Exporter, LeafError};
use crate::models::{Report, SectionBody};

const MISSING: &str = "[N/A]";
const FOOTER: &str = "Confidential - For Internal Use Only";

/// Markdown renderer
pub struct MarkdownExporter;

impl Exporter for MarkdownExporter {
    fn export(&self, report: &Report) -> Result<Vec<u8>, LeafError> {
        Ok(render_markdown(report).into_bytes())
    }

    fn content_type(&self) -> &'static str {
        "text/markdown; charset=utf-8"
    }

    fn file_extension(&self) -> &'static str {
        "md"
    }
}

/// Whole memo as Markdown
///
/// Sections appear in canonical order. Failed forecast and valuation
/// sections are left out.
pub fn render_markdown(report: &Report) -> String {
    let subject = &report.subject;
    let mut out = format!(
        "# IR 1-Pager: {} ({}) - Prepared {}\n\n",
        subject.analyst,
        subject.firm,
        report.date_label()
    );

    for key in SectionKey::ALL {
        let Some(record) = report.section(key) else {
            continue;
        };
        match &record.body {
            SectionBody::Narrative { text, .. } => {
                let _ = writeln!(out, "## {}\n", key.title());
                out.push_str(&clean_narrative(text));
                out.push_str("\n\n");
            }
            SectionBody::Forecast(table) => {
                let _ = writeln!(
                    out,
                    "## {}'s Forecast (As of {})\n",
                    subject.analyst, table.date_updated
                );
                if table.is_stale {
                    out.push_str("_Note: Forecast data is older than 30 days._\n\n");
                }
                out.push_str(&forecast_markdown(table));
                out.push('\n');
            }
            SectionBody::Valuation(snapshot) => {
                let _ = writeln!(out, "## Valuation Ratios (As of {})\n", snapshot.as_of);
                out.push_str(&valuation_markdown(snapshot));
                out.push('\n');
            }
            SectionBody::Failed { .. } => {}
        }
    }

    out.push_str("---\n\n");
    out.push_str(FOOTER);
    out.push('\n');
    out
}

/// Drop the draft's own top-level headings and `::` artifacts
fn clean_narrative(text: &str) -> String {
    text.replace("::", ":")
        .lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            !(trimmed.starts_with("## ") || trimmed == "##")
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Integer with thousands separators, truncated toward zero
pub fn group_thousands(value: f64) -> String {
    let whole = value.trunc() as i64;
    let digits = whole.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if whole < 0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

fn forecast_value(row: &ForecastRow, value: Option<f64>) -> String {
    let Some(v) = value else {
        return MISSING.to_string();
    };
    match row.label.as_str() {
        "EPS" => format!("${:.2}", v),
        "ROE" | "ROTCE" => format!("{:.1}%", v),
        _ => group_thousands(v),
    }
}

fn forecast_markdown(table: &ForecastTable) -> String {
    let mut out = String::from(
        "| Revenues ($MM) | Analyst | Consensus | Delta vs Consensus % |\n|---|---:|---:|---:|\n",
    );
    for row in &table.table_rows {
        let indent = "\u{a0}\u{a0}".repeat(row.indent as usize);
        let label = if row.indent == 0 || row.bold == Some(true) {
            format!("**{}**", row.label)
        } else {
            row.label.clone()
        };
        let _ = writeln!(
            out,
            "| {}{} | {} | {} | {} |",
            indent,
            label,
            forecast_value(row, row.analyst),
            forecast_value(row, row.consensus),
            row.delta.as_deref().unwrap_or(MISSING)
        );
    }
    let price_target = table
        .price_target
        .map(|p| format!("${}", p))
        .unwrap_or_else(|| MISSING.to_string());
    let _ = writeln!(
        out,
        "\n**Rating: {} | Price Target: {}**",
        table.rating, price_target
    );
    out
}

fn valuation_value(metric: &str, value: f64) -> String {
    match metric {
        m if m == PRICE || m == YEAR_HIGH || m == YEAR_LOW => format!("${:.2}", value),
        m if m == DIVIDEND_YIELD => format!("{:.2}%", value),
        m if m == MARKET_CAP => format!("{:.1}", value),
        _ => format!("{:.2}", value),
    }
}

fn valuation_markdown(snapshot: &ValuationSnapshot) -> String {
    let mut out = format!(
        "| Metric | {} | Peer Median |\n|---|{}---:|\n",
        snapshot.ticker_order.join(" | "),
        "---:|".repeat(snapshot.ticker_order.len())
    );

    for metric in METRICS {
        let cells: Vec<String> = snapshot
            .ticker_order
            .iter()
            .map(|symbol| {
                snapshot
                    .metric(symbol, metric)
                    .map(|v| valuation_value(metric, v))
                    .unwrap_or_else(|| MISSING.to_string())
            })
            .collect();

        let median = if metric == YEAR_HIGH || metric == YEAR_LOW {
            "-".to_string()
        } else {
            snapshot
                .peer_median
                .get(metric)
                .copied()
                .flatten()
                .map(|v| valuation_value(metric, v))
                .unwrap_or_else(|| MISSING.to_string())
        };

        let _ = writeln!(out, "| **{}** | {} | **{}** |", metric, cells.join(" | "), median);
    }
    out
}
