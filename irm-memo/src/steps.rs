//! Step tree shown to the client before a run starts

use irm_common::events::{SectionKey, StepNode};

/// Parent node id of the quality check
pub const QC_NODE: &str = "qc";

/// Step id of the quality check
pub const QUALITY_CHECK_STEP: &str = "quality_check";

/// Sub-step ids and labels per section, in execution order
pub fn section_steps(key: SectionKey) -> &'static [(&'static str, &'static str)] {
    match key {
        SectionKey::Bio => &[
            ("bio_search", "Searching web for analyst background"),
            ("bio_draft", "Drafting analyst profile"),
        ],
        SectionKey::Forecast => &[
            ("forecast_read", "Reading forecast workbook"),
            ("forecast_deltas", "Calculating deltas vs. consensus"),
        ],
        SectionKey::Earnings => &[
            ("transcript_fetch", "Retrieving earnings call transcript"),
            ("transcript_extract", "Extracting analyst Q&A"),
            ("earnings_draft", "Drafting post-earnings feedback"),
        ],
        SectionKey::Peer => &[
            ("peer_search", "Searching for peer commentary"),
            ("peer_draft", "Summarizing peer research"),
        ],
        SectionKey::Valuation => &[("market_data", "Pulling live valuation data")],
    }
}

/// One parent per selected section in canonical order, then the quality check
pub fn build_steps(selected: &[SectionKey]) -> Vec<StepNode> {
    let mut nodes: Vec<StepNode> = SectionKey::ALL
        .iter()
        .filter(|key| selected.contains(key))
        .map(|key| StepNode {
            id: key.as_str().to_string(),
            label: key.title().to_string(),
            children: section_steps(*key)
                .iter()
                .map(|(id, label)| StepNode::leaf(id, label))
                .collect(),
        })
        .collect();

    nodes.push(StepNode {
        id: QC_NODE.to_string(),
        label: "Quality Check".to_string(),
        children: vec![StepNode::leaf(QUALITY_CHECK_STEP, "Reviewing memo for consistency")],
    });
    nodes
}
