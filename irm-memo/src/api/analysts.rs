//! Analyst list for the request form

use axum::{extract::State, routing::get, Json, Router};
use tracing::error;

use crate::error::{ApiError, ApiResult};
use crate::tasks::AnalystEntry;
use crate::AppState;

/// GET /api/analysts
///
/// Every analyst in the forecast workbook with their firm, first occurrence
/// wins.
pub async fn list_analysts(State(state): State<AppState>) -> ApiResult<Json<Vec<AnalystEntry>>> {
    let analysts = state.toolkit.forecasts.list_analysts().await.map_err(|e| {
        error!("Failed to list analysts: {}", e);
        ApiError::Internal(e.to_string())
    })?;
    Ok(Json(analysts))
}

pub fn analyst_routes() -> Router<AppState> {
    Router::new().route("/api/analysts", get(list_analysts))
}
