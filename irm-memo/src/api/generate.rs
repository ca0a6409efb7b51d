//! Memo generation stream

use axum::{
    extract::{Query, State},
    response::sse::{Event, Sse},
    routing::get,
    Router,
};
use futures::stream::Stream;
use irm_common::events::{event_channel, SectionKey};
use irm_common::sse::event_stream_response;
use serde::Deserialize;
use std::convert::Infallible;
use tracing::info;

use crate::config::DEFAULT_TICKER;
use crate::error::{ApiError, ApiResult};
use crate::orchestrator::RunRequest;
use crate::AppState;

/// GET /api/generate query
#[derive(Debug, Deserialize)]
pub struct GenerateParams {
    #[serde(default)]
    pub analyst: String,
    /// Target company ticker
    #[serde(default = "default_company")]
    pub company: String,
    /// "all" or comma-separated section keys
    #[serde(default = "default_sections")]
    pub sections: String,
}

fn default_company() -> String {
    DEFAULT_TICKER.to_string()
}

fn default_sections() -> String {
    "all".to_string()
}

impl GenerateParams {
    /// Validate into a run request; rejected before any streaming starts
    pub fn into_request(self) -> ApiResult<RunRequest> {
        let analyst = self.analyst.trim();
        if analyst.is_empty() {
            return Err(ApiError::BadRequest("analyst is required".to_string()));
        }

        let ticker = match self.company.trim() {
            "" => DEFAULT_TICKER.to_string(),
            t => t.to_ascii_uppercase(),
        };

        Ok(RunRequest {
            analyst: analyst.to_string(),
            ticker,
            sections: SectionKey::parse_selection(&self.sections)?,
        })
    }
}

/// GET /api/generate
///
/// Starts a generation run and streams its progress. The run lives in its
/// own task; closing the stream stops it at the next section.
pub async fn generate_memo(
    State(state): State<AppState>,
    Query(params): Query<GenerateParams>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let request = params.into_request()?;
    info!(
        analyst = %request.analyst,
        ticker = %request.ticker,
        "Generate request accepted"
    );

    let (tx, rx) = event_channel();
    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        orchestrator.run(request, tx).await;
    });

    Ok(event_stream_response(rx, "generate"))
}

pub fn generate_routes() -> Router<AppState> {
    Router::new().route("/api/generate", get(generate_memo))
}
