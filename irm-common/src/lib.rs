//! # IR Memo Common Library
//!
//! Shared code for the IR memo workspace including:
//! - Error type shared by the service crates
//! - Configuration file loading and settings resolution
//! - Progress event types (MemoEvent enum) and the ordered event channel
//! - SSE response helpers

pub mod config;
pub mod error;
pub mod events;
pub mod sse;

pub use error::{Error, Result};
