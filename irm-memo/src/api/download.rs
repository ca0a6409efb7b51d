//! Memo download

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Router,
};
use tracing::{error, info};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Attachment file name for a memo, e.g. "IR_Memo_Jane_Roe.md"
pub fn attachment_name(analyst: &str, extension: &str) -> String {
    let stem: String = analyst
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    let stem = if stem.is_empty() { "Analyst" } else { stem.as_str() };
    format!("IR_Memo_{}.{}", stem, extension)
}

/// GET /api/download/:memo_id
pub async fn download_memo(
    State(state): State<AppState>,
    Path(memo_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let report = state
        .store
        .get(&memo_id)
        .await
        .ok_or_else(|| ApiError::NotFound("Memo not found".to_string()))?;

    let exporter = &state.toolkit.exporter;
    let bytes = exporter.export(&report).map_err(|e| {
        error!(memo_id = %memo_id, "Export failed: {}", e);
        ApiError::Internal(e.to_string())
    })?;
    let filename = attachment_name(&report.subject.analyst, exporter.file_extension());
    info!(memo_id = %memo_id, bytes = bytes.len(), "Memo exported");

    Ok((
        [
            (header::CONTENT_TYPE, exporter.content_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        bytes,
    ))
}

pub fn download_routes() -> Router<AppState> {
    Router::new().route("/api/download/:memo_id", get(download_memo))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_name() {
        assert_eq!(attachment_name("Jane Roe", "md"), "IR_Memo_Jane_Roe.md");
        assert_eq!(attachment_name("J. O'Neil", "md"), "IR_Memo_J_ONeil.md");
        assert_eq!(attachment_name("", "md"), "IR_Memo_Analyst.md");
    }
}
