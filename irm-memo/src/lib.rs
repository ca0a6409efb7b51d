//! irm-memo library interface
//!
//! Exposes the engines, the HTTP router and the application state so the
//! binary and the integration tests share one wiring.

pub mod api;
pub mod config;
pub mod confidence;
pub mod error;
pub mod fallback;
pub mod models;
pub mod orchestrator;
pub mod regeneration;
pub mod sections;
pub mod steps;
pub mod store;
pub mod tasks;

pub use crate::error::{ApiError, ApiResult};

use axum::http::{HeaderValue, Method};
use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::MemoConfig;
use crate::orchestrator::Orchestrator;
use crate::regeneration::Regenerator;
use crate::store::ReportStore;
use crate::tasks::Toolkit;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<MemoConfig>,
    /// Leaf collaborators
    pub toolkit: Arc<Toolkit>,
    /// Completed reports
    pub store: Arc<dyn ReportStore>,
    pub orchestrator: Orchestrator,
    pub regenerator: Regenerator,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last engine failure, reported by the health endpoint
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(config: MemoConfig, toolkit: Toolkit, store: Arc<dyn ReportStore>) -> Self {
        let toolkit = Arc::new(toolkit);
        let last_error = Arc::new(RwLock::new(None));
        Self {
            config: Arc::new(config),
            orchestrator: Orchestrator::new(toolkit.clone(), store.clone(), last_error.clone()),
            regenerator: Regenerator::new(toolkit.clone(), store.clone(), last_error.clone()),
            toolkit,
            store,
            startup_time: Utc::now(),
            last_error,
        }
    }
}

/// CORS for the local dev servers and the configured frontend
fn cors_layer(config: &MemoConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins()
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin: {}", e);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .merge(api::health_routes())
        .merge(api::analyst_routes())
        .merge(api::generate_routes())
        .merge(api::regenerate_routes())
        .merge(api::download_routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
