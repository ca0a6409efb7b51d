//! Section regeneration stream

use axum::{
    extract::State,
    response::sse::{Event, Sse},
    routing::post,
    Json, Router,
};
use futures::stream::Stream;
use irm_common::events::event_channel;
use irm_common::sse::event_stream_response;
use serde::Deserialize;
use std::convert::Infallible;
use tracing::info;

use crate::regeneration::{RegenMode, RegenRequest};
use crate::AppState;

/// POST /api/regenerate body
#[derive(Debug, Deserialize)]
pub struct RegenerateBody {
    pub section: String,
    pub memo_id: String,
    #[serde(default)]
    pub instruction: String,
    /// Rerun the section pipeline instead of editing the stored text
    #[serde(default)]
    pub re_search: bool,
    #[serde(default)]
    pub current_content: Option<String>,
}

impl From<RegenerateBody> for RegenRequest {
    fn from(body: RegenerateBody) -> Self {
        Self {
            memo_id: body.memo_id,
            section: body.section,
            instruction: body.instruction,
            mode: if body.re_search {
                RegenMode::ReSearch
            } else {
                RegenMode::DraftOnly
            },
            current_content: body.current_content.filter(|c| !c.is_empty()),
        }
    }
}

/// POST /api/regenerate
///
/// Validation failures (unknown memo, unknown section) arrive on the stream
/// as `regen_error`, not as HTTP errors.
pub async fn regenerate_section(
    State(state): State<AppState>,
    Json(body): Json<RegenerateBody>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let request = RegenRequest::from(body);
    info!(
        memo_id = %request.memo_id,
        section = %request.section,
        mode = ?request.mode,
        "Regenerate request accepted"
    );

    let (tx, rx) = event_channel();
    let regenerator = state.regenerator.clone();
    tokio::spawn(async move {
        regenerator.run(request, tx).await;
    });

    event_stream_response(rx, "regenerate")
}

pub fn regenerate_routes() -> Router<AppState> {
    Router::new().route("/api/regenerate", post(regenerate_section))
}
