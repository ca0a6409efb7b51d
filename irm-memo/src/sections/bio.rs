//! Analyst background section

use irm_common::events::{Findings, SectionKey};

use super::{detached_record, narrative_record, SectionContext, StepReporter};
use crate::confidence::{bio_confidence, prior_firm_count, BioSignals};
use crate::models::SectionRecord;
use crate::tasks::drafting::{format_search_results, generate_section};
use crate::tasks::prompts::Template;
use crate::tasks::research::{bio_search, top_sources};
use crate::tasks::{guarded, LeafOutcome};

pub async fn run(ctx: &SectionContext<'_>, reporter: &StepReporter<'_>) -> SectionRecord {
    let subject = ctx.subject;

    reporter.running("bio_search");
    let outcome = guarded(
        "bio_search",
        bio_search(ctx.toolkit.search.as_ref(), &subject.analyst, &subject.firm),
    )
    .await;
    let search_ok = outcome.is_success();
    let hits = match outcome {
        LeafOutcome::Success(hits) => hits,
        LeafOutcome::Error(_) => Vec::new(),
    };
    let sources = top_sources(&hits);
    let findings = Findings::summary(format!(
        "Found {} web sources about {}",
        hits.len(),
        subject.analyst
    ))
    .with_detail(format!(
        "Retrieved {} results from 4 web search queries (incl. career history)",
        hits.len()
    ))
    .with_sources(sources.clone());
    if search_ok {
        reporter.complete("bio_search", findings);
    } else {
        reporter.error("bio_search", findings);
    }
    if reporter.is_detached() {
        return detached_record();
    }

    reporter.running("bio_draft");
    let results_text = format_search_results(&hits);
    let draft = generate_section(
        ctx.toolkit.drafter.as_ref(),
        SectionKey::Bio,
        Template::AnalystBio,
        &[
            ("analyst_name", subject.analyst.as_str()),
            ("firm", subject.firm.as_str()),
            ("search_results", results_text.as_str()),
        ],
        ctx.instruction,
    )
    .await;

    let confidence = bio_confidence(&BioSignals {
        domains: sources.len(),
        prior_firms: prior_firm_count(&draft.text),
    });

    let findings = Findings::summary(format!(
        "Generated {}-word analyst profile",
        draft.word_count()
    ))
    .with_detail(format!(
        "Synthesized from {} unique source domains",
        sources.len()
    ));
    if draft.is_success() {
        reporter.complete("bio_draft", findings);
    } else {
        reporter.error("bio_draft", findings);
    }

    narrative_record(draft, sources, confidence)
}
