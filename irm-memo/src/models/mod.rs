//! Data models for irm-memo

pub mod report;

pub use report::{DraftStatus, Report, RunMetadata, SectionBody, SectionRecord, Subject};
