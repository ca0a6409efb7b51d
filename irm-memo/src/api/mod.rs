//! HTTP API handlers for irm-memo
//!
//! JSON endpoints for health, the analyst list and downloads, plus the two
//! SSE endpoints that stream a generation or a regeneration.

pub mod analysts;
pub mod download;
pub mod generate;
pub mod health;
pub mod regenerate;

pub use analysts::analyst_routes;
pub use download::download_routes;
pub use generate::generate_routes;
pub use health::health_routes;
pub use regenerate::regenerate_routes;
