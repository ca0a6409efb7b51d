//! Post-earnings feedback section

use irm_common::events::{Findings, Preview, SectionKey, Source};

use super::{detached_record, narrative_record, SectionContext, StepReporter};
use crate::confidence::{
    earnings_confidence, question_count, EarningsSignals, BUNDLED_TRANSCRIPT_TIER,
    PARTIAL_TRANSCRIPT_MARKER,
};
use crate::models::{RunMetadata, SectionRecord};
use crate::tasks::drafting::generate_section;
use crate::tasks::export::group_thousands;
use crate::tasks::prompts::Template;
use crate::tasks::{TranscriptQuery, TranscriptResult};

/// Transcript characters passed to the drafter
pub const MAX_TRANSCRIPT_CHARS: usize = 15_000;

/// Lines kept around the analyst's first exchange in the preview
const SNIPPET_LINES_BEFORE: usize = 1;
const SNIPPET_LINES_AFTER: usize = 5;

/// Provenance for a resolved transcript
pub fn transcript_sources(transcript: &TranscriptResult) -> Vec<Source> {
    match transcript.text.as_deref() {
        Some(text) if transcript.is_available() => vec![Source {
            url: transcript.source_url.clone(),
            domain: transcript.source.clone(),
            label: format!(
                "Transcript from {} ({} characters)",
                transcript.source,
                group_thousands(text.chars().count() as f64)
            ),
        }],
        _ => Vec::new(),
    }
}

/// The analyst's first exchange, located by last name and a speaker colon
pub fn analyst_snippet(transcript: &str, analyst: &str) -> Option<String> {
    let last_name = analyst.split_whitespace().last()?.to_lowercase();
    let lines: Vec<&str> = transcript.lines().collect();
    let index = lines.iter().position(|line| {
        let lower = line.to_lowercase();
        lower.contains(&last_name) && line.contains(':')
    })?;
    let start = index.saturating_sub(SNIPPET_LINES_BEFORE);
    let end = (index + SNIPPET_LINES_AFTER).min(lines.len());
    Some(lines[start..end].join("\n").trim().to_string())
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((offset, _)) => &text[..offset],
        None => text,
    }
}

pub async fn run(
    ctx: &SectionContext<'_>,
    reporter: &StepReporter<'_>,
    metadata: &mut RunMetadata,
) -> SectionRecord {
    let subject = ctx.subject;

    reporter.running("transcript_fetch");
    let transcript = ctx
        .toolkit
        .transcripts
        .retrieve(&TranscriptQuery::for_ticker(&subject.ticker))
        .await;
    let sources = transcript_sources(&transcript);

    if let Some(text) = transcript.text.as_deref().filter(|_| transcript.is_available()) {
        let chars = text.chars().count();
        let preview = if transcript.tier == BUNDLED_TRANSCRIPT_TIER {
            analyst_snippet(text, &subject.analyst).map(|snippet| Preview::TranscriptSnippet {
                analyst_name: subject.analyst.clone(),
                char_count: chars,
                snippet,
                local_source: true,
            })
        } else {
            None
        };
        reporter.complete(
            "transcript_fetch",
            Findings::summary(format!(
                "Retrieved {}-character transcript from {} [Tier {}]",
                group_thousands(chars as f64),
                transcript.source,
                transcript.tier
            ))
            .with_detail(format!(
                "Fallback chain: SEC EDGAR > FMP API > Web > Local file (resolved at tier {})",
                transcript.tier
            ))
            .with_sources(sources.clone())
            .with_preview(preview),
        );
    } else {
        reporter.error(
            "transcript_fetch",
            Findings::summary("Transcript not available from public sources").with_detail(
                format!(
                    "Tried all {} tiers: SEC EDGAR (EFTS, 8-K), FMP API, web search, local file",
                    ctx.toolkit.transcripts.tier_count()
                ),
            ),
        );
    }
    metadata.transcript_source = transcript.source.clone();

    reporter.running("transcript_extract");
    reporter.complete(
        "transcript_extract",
        Findings::summary(format!("Processing transcript for {}'s Q&A", subject.analyst)),
    );
    if reporter.is_detached() {
        return detached_record();
    }

    reporter.running("earnings_draft");
    let transcript_text = truncate_chars(transcript.text_or_placeholder(), MAX_TRANSCRIPT_CHARS);
    let draft = generate_section(
        ctx.toolkit.drafter.as_ref(),
        SectionKey::Earnings,
        Template::EarningsFeedback,
        &[
            ("analyst_name", subject.analyst.as_str()),
            ("firm", subject.firm.as_str()),
            ("transcript_text", transcript_text),
        ],
        ctx.instruction,
    )
    .await;

    let findings = Findings::summary(format!(
        "Generated {}-word post-earnings analysis",
        draft.word_count()
    ));
    if draft.is_success() {
        reporter.complete("earnings_draft", findings);
    } else {
        reporter.error("earnings_draft", findings);
    }

    let confidence = earnings_confidence(&EarningsSignals {
        has_transcript: transcript.is_available(),
        tier: transcript.tier,
        questions: question_count(&draft.text),
        snippets_only: transcript
            .text
            .as_deref()
            .is_some_and(|t| t.contains(PARTIAL_TRANSCRIPT_MARKER)),
        source: transcript.source.clone(),
    });

    narrative_record(draft, sources, confidence)
}
