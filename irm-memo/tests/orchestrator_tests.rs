//! Generation engine integration tests
//!
//! Drive `Orchestrator::run` over in-process fakes and inspect the emitted
//! event sequence and the stored report.

mod helpers;

use helpers::*;
use irm_common::events::{event_channel, ConfidenceLevel, MemoEvent, SectionKey};
use irm_memo::models::SectionBody;
use irm_memo::orchestrator::{Orchestrator, RunRequest};
use irm_memo::sections::DRAFT_FAILED_REASON;
use irm_memo::store::{InMemoryReportStore, ReportStore};
use irm_memo::tasks::transcript::UNAVAILABLE_TRANSCRIPT;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

fn request(sections: &[SectionKey]) -> RunRequest {
    RunRequest {
        analyst: ANALYST.to_string(),
        ticker: "MS".to_string(),
        sections: sections.to_vec(),
    }
}

async fn run(fakes: &Fakes, req: RunRequest) -> (Vec<MemoEvent>, Arc<InMemoryReportStore>) {
    let store = Arc::new(InMemoryReportStore::new());
    let orchestrator = Orchestrator::new(
        Arc::new(fakes.toolkit()),
        store.clone() as Arc<dyn ReportStore>,
        Arc::new(RwLock::new(None)),
    );
    let (tx, rx) = event_channel();
    orchestrator.run(req, tx).await;
    (rx.collect_all().await, store)
}

#[tokio::test]
async fn test_full_run_event_order() {
    // Given: every collaborator healthy
    let fakes = Fakes::standard();

    // When: all sections are generated
    let (events, store) = run(&fakes, request(&SectionKey::ALL)).await;

    // Then: steps first, payloads in canonical order, one terminal event last
    let payloads: Vec<&str> = event_types(&events)
        .into_iter()
        .filter(|t| *t != "step_update")
        .collect();
    assert_eq!(
        payloads,
        vec![
            "steps",
            "section",
            "forecast",
            "section",
            "section",
            "valuation",
            "quality_check",
            "complete"
        ]
    );
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);

    let memo_id = memo_id(&events).expect("complete event");
    let report = store.get(&memo_id).await.expect("stored report");
    assert_eq!(report.sections.len(), 5);
    assert_eq!(report.subject.firm, FIRM);
    assert_eq!(
        report.quality.as_ref().map(|q| q.overall_status.as_str()),
        Some("pass")
    );
}

#[tokio::test]
async fn test_sub_steps_run_then_finish() {
    let fakes = Fakes::standard();
    let (events, _) = run(&fakes, request(&[SectionKey::Bio])).await;

    let updates = step_updates(&events);
    let pairs: Vec<(&str, &str)> = updates
        .iter()
        .map(|(s, st)| (s.as_str(), st.as_str()))
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("bio_search", "running"),
            ("bio_search", "complete"),
            ("bio_draft", "running"),
            ("bio_draft", "complete"),
            ("quality_check", "running"),
            ("quality_check", "complete"),
        ]
    );
}

#[tokio::test]
async fn test_selection_runs_in_canonical_order() {
    let fakes = Fakes::standard();
    let (events, store) = run(&fakes, request(&[SectionKey::Valuation, SectionKey::Bio])).await;

    let MemoEvent::Steps { steps } = &events[0] else {
        panic!("first event must be steps");
    };
    let ids: Vec<&str> = steps.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["bio", "valuation", "qc"]);

    let report = store.get(&memo_id(&events).unwrap()).await.unwrap();
    let keys: Vec<SectionKey> = report.sections.keys().copied().collect();
    assert_eq!(keys, vec![SectionKey::Bio, SectionKey::Valuation]);
}

#[tokio::test]
async fn test_single_section_invokes_only_its_leaves() {
    // Given: counters on every leaf collaborator
    let tier_calls = Arc::new(AtomicUsize::new(0));
    let fakes = Fakes {
        transcripts: Arc::new(counted_transcripts(&tier_calls)),
        ..Fakes::standard()
    };

    // When: only the bio section is selected
    let (events, store) = run(&fakes, request(&[SectionKey::Bio])).await;

    // Then: bio search and draft plus the quality check, nothing else
    assert!(memo_id(&events).is_some());
    assert_eq!(fakes.search.calls.load(Ordering::SeqCst), 4);
    assert_eq!(fakes.drafter.prompt_count(), 2);
    assert_eq!(fakes.quotes.call_count(), 0);
    assert_eq!(fakes.forecasts.read_count(), 0);
    assert_eq!(tier_calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn test_earnings_only_run_touches_transcripts_alone() {
    let tier_calls = Arc::new(AtomicUsize::new(0));
    let fakes = Fakes {
        transcripts: Arc::new(counted_transcripts(&tier_calls)),
        ..Fakes::standard()
    };

    run(&fakes, request(&[SectionKey::Earnings])).await;

    // Resolved at the first tier, later tiers never attempted
    assert_eq!(tier_calls.load(Ordering::SeqCst), 1);
    assert_eq!(fakes.search.calls.load(Ordering::SeqCst), 0);
    assert_eq!(fakes.quotes.call_count(), 0);
    assert_eq!(fakes.forecasts.read_count(), 0);
}

#[tokio::test]
async fn test_confidence_and_metadata_recorded() {
    let fakes = Fakes::standard();
    let (events, store) = run(&fakes, request(&SectionKey::ALL)).await;
    let report = store.get(&memo_id(&events).unwrap()).await.unwrap();

    let bio = report.section(SectionKey::Bio).unwrap();
    assert_eq!(bio.confidence.level, ConfidenceLevel::High);
    assert_eq!(bio.confidence.reason, "4 sources found");
    assert_eq!(bio.sources.len(), 4);
    assert_eq!(bio.sources[1].domain, "research.example.org");

    let earnings = report.section(SectionKey::Earnings).unwrap();
    assert_eq!(earnings.confidence.level, ConfidenceLevel::High);
    assert_eq!(
        earnings.confidence.reason,
        "Full transcript retrieved from SEC EDGAR (EFTS)"
    );

    let valuation = report.section(SectionKey::Valuation).unwrap();
    assert_eq!(valuation.confidence.reason, "All 7 tickers retrieved");
    assert_eq!(valuation.valuation().unwrap().target(), Some("MS"));

    assert_eq!(report.metadata.transcript_source, "SEC EDGAR (EFTS)");
    assert_eq!(
        report.metadata.forecast_date_updated,
        forecast_table().date_updated
    );
    assert_ne!(report.metadata.valuation_timestamp, "N/A");
}

#[tokio::test]
async fn test_forecast_failure_does_not_halt_run() {
    // Given: the forecast workbook cannot be read
    let fakes = Fakes {
        forecasts: Arc::new(FakeForecasts::missing()),
        ..Fakes::standard()
    };

    // When
    let (events, store) = run(&fakes, request(&SectionKey::ALL)).await;

    // Then: both forecast sub-steps error, no forecast payload, run completes
    let updates = step_updates(&events);
    assert!(updates.contains(&("forecast_read".to_string(), "error".to_string())));
    assert!(updates.contains(&("forecast_deltas".to_string(), "error".to_string())));
    assert!(!event_types(&events).contains(&"forecast"));

    let report = store.get(&memo_id(&events).unwrap()).await.unwrap();
    assert_eq!(report.subject.firm, "");
    let forecast = report.section(SectionKey::Forecast).unwrap();
    assert!(forecast.is_failed());
    assert!(forecast.sources.is_empty());
    assert_eq!(forecast.confidence.level, ConfidenceLevel::Low);
    assert_eq!(forecast.confidence.reason, "Forecast data unavailable");
    assert!(report.section(SectionKey::Valuation).is_some());
}

#[tokio::test]
async fn test_unavailable_transcript_drafts_against_placeholder() {
    let fakes = Fakes {
        transcripts: Arc::new(unavailable_transcripts()),
        ..Fakes::standard()
    };
    let (events, store) = run(&fakes, request(&[SectionKey::Earnings])).await;

    let fetch = events.iter().find_map(|e| match e {
        MemoEvent::StepUpdate {
            step,
            findings: Some(f),
            ..
        } if step == "transcript_fetch" => Some(f.clone()),
        _ => None,
    });
    assert_eq!(
        fetch.map(|f| f.summary),
        Some("Transcript not available from public sources".to_string())
    );
    assert_eq!(fakes.drafter.prompts_containing(UNAVAILABLE_TRANSCRIPT), 1);

    let report = store.get(&memo_id(&events).unwrap()).await.unwrap();
    let earnings = report.section(SectionKey::Earnings).unwrap();
    assert_eq!(earnings.confidence.level, ConfidenceLevel::Low);
    assert_eq!(earnings.confidence.reason, "Transcript not available");
    assert!(earnings.sources.is_empty());
    assert_eq!(report.metadata.transcript_source, "none");
}

#[tokio::test]
async fn test_bundled_transcript_rated_medium_with_preview() {
    let fakes = Fakes {
        transcripts: Arc::new(irm_memo::tasks::TranscriptRetriever::from_tiers(vec![
            FakeTier::failing("SEC EDGAR (EFTS)"),
            FakeTier::empty("SEC EDGAR (8-K filing)"),
            FakeTier::empty("Financial Modeling Prep API"),
            FakeTier::empty("Web search"),
            FakeTier::resolving("Local file (transcript.txt)", TRANSCRIPT),
        ])),
        ..Fakes::standard()
    };
    let (events, store) = run(&fakes, request(&[SectionKey::Earnings])).await;

    let preview = events.iter().find_map(|e| match e {
        MemoEvent::StepUpdate {
            step,
            findings: Some(f),
            ..
        } if step == "transcript_fetch" => f.preview.clone(),
        _ => None,
    });
    assert!(matches!(
        preview,
        Some(irm_common::events::Preview::TranscriptSnippet { local_source: true, .. })
    ));

    let report = store.get(&memo_id(&events).unwrap()).await.unwrap();
    let earnings = report.section(SectionKey::Earnings).unwrap();
    assert_eq!(earnings.confidence.level, ConfidenceLevel::Medium);
    assert!(earnings.confidence.reason.starts_with("Using bundled"));
}

#[tokio::test]
async fn test_drafting_failure_yields_placeholder_sections() {
    let fakes = Fakes {
        drafter: Arc::new(FakeDrafter::failing()),
        ..Fakes::standard()
    };
    let (events, store) = run(&fakes, request(&[SectionKey::Bio, SectionKey::Peer])).await;

    let updates = step_updates(&events);
    assert!(updates.contains(&("bio_draft".to_string(), "error".to_string())));
    assert!(updates.contains(&("peer_draft".to_string(), "error".to_string())));

    let report = store.get(&memo_id(&events).unwrap()).await.unwrap();
    let bio = report.section(SectionKey::Bio).unwrap();
    match &bio.body {
        SectionBody::Narrative { text, .. } => {
            assert!(text.starts_with("[Section could not be generated:"))
        }
        other => panic!("unexpected body {:?}", other),
    }
    // Search succeeded, but a section with no draft is still rated low
    assert!(bio.draft_failed());
    assert_eq!(bio.confidence.level, ConfidenceLevel::Low);
    assert_eq!(bio.confidence.reason, DRAFT_FAILED_REASON);
    assert!(!bio.sources.is_empty());

    let peer = report.section(SectionKey::Peer).unwrap();
    assert_eq!(peer.confidence.level, ConfidenceLevel::Low);
    assert_eq!(peer.confidence.reason, DRAFT_FAILED_REASON);
    assert_eq!(
        report.quality.as_ref().map(|q| q.overall_status.as_str()),
        Some("error")
    );
}

#[tokio::test]
async fn test_search_outage_rates_bio_low() {
    let fakes = Fakes {
        search: Arc::new(FakeSearch::failing()),
        ..Fakes::standard()
    };
    let (events, store) = run(&fakes, request(&[SectionKey::Bio, SectionKey::Peer])).await;

    let updates = step_updates(&events);
    assert!(updates.contains(&("bio_search".to_string(), "error".to_string())));

    let report = store.get(&memo_id(&events).unwrap()).await.unwrap();
    let bio = report.section(SectionKey::Bio).unwrap();
    assert_eq!(bio.confidence.level, ConfidenceLevel::Low);
    assert_eq!(bio.confidence.reason, "No web sources found");

    let peer = report.section(SectionKey::Peer).unwrap();
    assert_eq!(peer.confidence.level, ConfidenceLevel::Low);
    assert_eq!(peer.confidence.reason, "No peer commentary found");
}

#[tokio::test]
async fn test_detached_consumer_stores_nothing() {
    let fakes = Fakes::standard();
    let store = Arc::new(InMemoryReportStore::new());
    let orchestrator = Orchestrator::new(
        Arc::new(fakes.toolkit()),
        store.clone() as Arc<dyn ReportStore>,
        Arc::new(RwLock::new(None)),
    );

    let (tx, rx) = event_channel();
    drop(rx);
    orchestrator.run(request(&SectionKey::ALL), tx).await;

    assert!(store.is_empty().await);
    assert_eq!(fakes.drafter.prompt_count(), 0);
}

#[tokio::test]
async fn test_disconnect_mid_section_starts_no_further_leaves() {
    // Given: the consumer goes away while the bio search is in flight
    let fakes = Fakes::standard();
    let store = Arc::new(InMemoryReportStore::new());
    let (tx, rx) = event_channel();
    let mut toolkit = fakes.toolkit();
    toolkit.search = Arc::new(DetachingSearch::new(rx));
    let orchestrator = Orchestrator::new(
        Arc::new(toolkit),
        store.clone() as Arc<dyn ReportStore>,
        Arc::new(RwLock::new(None)),
    );

    // When
    orchestrator
        .run(request(&[SectionKey::Bio, SectionKey::Valuation]), tx)
        .await;

    // Then: no drafting, no later section, no quality check, nothing stored
    assert_eq!(fakes.drafter.prompt_count(), 0);
    assert_eq!(fakes.quotes.call_count(), 0);
    assert!(store.is_empty().await);
}
