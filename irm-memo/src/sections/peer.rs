//! Recent peer research section

use irm_common::events::{Findings, SectionKey};

use super::{detached_record, narrative_record, SectionContext, StepReporter};
use crate::config::PEER_TICKERS;
use crate::confidence::{peer_confidence, peer_stale_note, PeerSignals};
use crate::models::SectionRecord;
use crate::tasks::drafting::{format_peer_results, generate_section};
use crate::tasks::prompts::Template;
use crate::tasks::research::{peer_search, top_sources};

/// Peer universe minus the subject's own ticker
pub fn peers_for(target: &str) -> Vec<String> {
    PEER_TICKERS
        .iter()
        .filter(|t| !t.eq_ignore_ascii_case(target))
        .map(|t| t.to_string())
        .collect()
}

pub async fn run(ctx: &SectionContext<'_>, reporter: &StepReporter<'_>) -> SectionRecord {
    let subject = ctx.subject;
    let peers = peers_for(&subject.ticker);

    reporter.running("peer_search");
    let research = peer_search(ctx.toolkit.search.as_ref(), &subject.analyst, &peers).await;
    let sources = top_sources(research.all_hits());
    reporter.complete(
        "peer_search",
        Findings::summary(format!(
            "Found commentary on {} peer tickers + sector overview",
            research.peers_with_results()
        ))
        .with_detail(format!(
            "Retrieved {} total results across {} peers",
            research.total_results(),
            peers.len()
        ))
        .with_sources(sources.clone()),
    );
    if reporter.is_detached() {
        return detached_record();
    }

    reporter.running("peer_draft");
    let results_text = format_peer_results(&research);
    let draft = generate_section(
        ctx.toolkit.drafter.as_ref(),
        SectionKey::Peer,
        Template::PeerResearch,
        &[
            ("analyst_name", subject.analyst.as_str()),
            ("firm", subject.firm.as_str()),
            ("peer_results", results_text.as_str()),
        ],
        ctx.instruction,
    )
    .await;

    let findings = Findings::summary(format!(
        "Generated {}-word peer research summary",
        draft.word_count()
    ))
    .with_detail(format!(
        "Synthesized from {} unique source domains",
        sources.len()
    ));
    if draft.is_success() {
        reporter.complete("peer_draft", findings);
    } else {
        reporter.error("peer_draft", findings);
    }

    let peers_with_results = research.peers_with_results();
    let confidence = peer_confidence(&PeerSignals {
        stale_note: peer_stale_note(&draft.text, peers_with_results, ctx.today),
        peers_with_results,
        domains: sources.len(),
    });

    narrative_record(draft, sources, confidence)
}
