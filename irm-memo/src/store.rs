//! Report store
//!
//! Completed reports keyed by an 8-character memo id. Reports live for the
//! process lifetime; nothing is persisted.

use async_trait::async_trait;
use irm_common::events::SectionKey;
use irm_common::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::models::{Report, SectionRecord};

/// Length of a memo id (prefix of a v4 UUID)
pub const MEMO_ID_LEN: usize = 8;

/// Fresh opaque memo id
pub fn new_memo_id() -> String {
    Uuid::new_v4().simple().to_string()[..MEMO_ID_LEN].to_string()
}

/// Storage seam for reports
///
/// Concurrent writes to the same report are last-write-wins.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Snapshot of a stored report
    async fn get(&self, memo_id: &str) -> Option<Report>;

    /// Store a new report and return its memo id
    async fn put(&self, report: Report) -> String;

    /// Replace one section of a stored report, leaving siblings untouched
    async fn replace_section(
        &self,
        memo_id: &str,
        key: SectionKey,
        record: SectionRecord,
    ) -> Result<()>;
}

/// Process-local report store
#[derive(Clone, Default)]
pub struct InMemoryReportStore {
    reports: Arc<RwLock<HashMap<String, Report>>>,
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.reports.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.reports.read().await.is_empty()
    }
}

#[async_trait]
impl ReportStore for InMemoryReportStore {
    async fn get(&self, memo_id: &str) -> Option<Report> {
        self.reports.read().await.get(memo_id).cloned()
    }

    async fn put(&self, report: Report) -> String {
        let mut reports = self.reports.write().await;
        let mut memo_id = new_memo_id();
        // Prefix collisions are rare but possible
        while reports.contains_key(&memo_id) {
            memo_id = new_memo_id();
        }
        reports.insert(memo_id.clone(), report);
        debug!(memo_id = %memo_id, "Report stored");
        memo_id
    }

    async fn replace_section(
        &self,
        memo_id: &str,
        key: SectionKey,
        record: SectionRecord,
    ) -> Result<()> {
        let mut reports = self.reports.write().await;
        let report = reports
            .get_mut(memo_id)
            .ok_or_else(|| Error::NotFound(format!("Memo not found: {}", memo_id)))?;
        report.sections.insert(key, record);
        debug!(memo_id = %memo_id, section = %key, "Section replaced");
        Ok(())
    }
}
