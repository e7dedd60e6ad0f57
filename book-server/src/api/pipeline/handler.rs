//! Pipeline API Handlers

use axum::{Json, extract::State};
use serde::Deserialize;
use shared::models::{GenerationQueueEntry, SignedUrl};

use crate::core::ServerState;
use crate::generation::{ImageKind, ImageRequest};
use crate::utils::validation::{
    MAX_ID_LEN, MAX_NAME_LEN, MAX_PROMPT_LEN, MAX_URL_LEN, validate_optional_text,
    validate_required_text,
};
use crate::utils::{ApiResponse, AppResult, ok};

#[derive(Debug, Deserialize)]
pub struct ProcessBookRequest {
    pub order_item_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeBookRequest {
    pub book_id: String,
}

fn validate_image_request(req: &ImageRequest) -> AppResult<()> {
    validate_required_text(&req.book_id, "book_id", MAX_ID_LEN)?;
    validate_required_text(&req.child_name, "child_name", MAX_NAME_LEN)?;
    validate_optional_text(&req.child_image_url, "child_image_url", MAX_URL_LEN)?;
    validate_optional_text(&req.prompt, "prompt", MAX_PROMPT_LEN)?;
    Ok(())
}

async fn render(state: &ServerState, kind: ImageKind, req: ImageRequest) -> AppResult<Json<ApiResponse<SignedUrl>>> {
    validate_image_request(&req)?;
    let link = state.worker.render_image(kind, &req).await?;
    Ok(ok(link))
}

/// POST /generate-image
pub async fn generate_image(
    State(state): State<ServerState>,
    Json(req): Json<ImageRequest>,
) -> AppResult<Json<ApiResponse<SignedUrl>>> {
    render(&state, ImageKind::Image, req).await
}

/// POST /generate-cover
pub async fn generate_cover(
    State(state): State<ServerState>,
    Json(req): Json<ImageRequest>,
) -> AppResult<Json<ApiResponse<SignedUrl>>> {
    render(&state, ImageKind::Cover, req).await
}

/// POST /process-complete-book
///
/// Enqueues the item if needed and dispatches it without waiting for the
/// monitor. The returned entry is already `processing` unless it had
/// left `pending` before.
pub async fn process_complete_book(
    State(state): State<ServerState>,
    Json(req): Json<ProcessBookRequest>,
) -> AppResult<Json<ApiResponse<GenerationQueueEntry>>> {
    validate_required_text(&req.order_item_id, "order_item_id", MAX_ID_LEN)?;
    let entry = state.worker.process_now(req.order_item_id.trim()).await?;
    Ok(ok(entry))
}

/// POST /analyze-book
pub async fn analyze_book(
    State(state): State<ServerState>,
    Json(req): Json<AnalyzeBookRequest>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    validate_required_text(&req.book_id, "book_id", MAX_ID_LEN)?;
    let analysis = state.worker.analyze_book(req.book_id.trim()).await?;
    Ok(ok(analysis))
}
