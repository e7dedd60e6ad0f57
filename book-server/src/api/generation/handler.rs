//! Generation Queue API Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use shared::models::{GenerationQueueEntry, GenerationStatus};

use crate::core::ServerState;
use crate::utils::{ApiResponse, AppResult, ok, ok_with_message};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub status: Option<GenerationStatus>,
}

pub async fn list(
    State(state): State<ServerState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<ApiResponse<Vec<GenerationQueueEntry>>>> {
    let entries = state.queue.list(query.status)?;
    Ok(ok(entries))
}

pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<GenerationQueueEntry>>> {
    Ok(ok(state.queue.get(&id)?))
}

/// Operator retry of a failed entry; the monitor picks it up on its next tick
pub async fn retry(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<GenerationQueueEntry>>> {
    let entry = state.queue.retry(&id)?;
    Ok(ok_with_message(entry, "Entry re-queued"))
}
