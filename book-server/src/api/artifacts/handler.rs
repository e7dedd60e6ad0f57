//! Artifact API Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
};
use serde::Deserialize;
use shared::models::{RefreshReport, SignedUrl};
use std::time::Duration;

use crate::artifacts::validate_object_key;
use crate::core::ServerState;
use crate::utils::validation::{MAX_ID_LEN, validate_required_text};
use crate::utils::{ApiResponse, AppError, AppResult, ok};

/// Longest TTL a caller may request (7 days)
const MAX_TTL_SECS: u64 = 7 * 24 * 3600;

#[derive(Debug, Deserialize)]
pub struct SignedUrlRequest {
    pub object_key: String,
    /// Defaults to `SIGNED_URL_TTL_SECS`
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub order_id: String,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub expires: i64,
    pub signature: String,
}

/// POST /generate-signed-url
pub async fn generate_signed_url(
    State(state): State<ServerState>,
    Json(req): Json<SignedUrlRequest>,
) -> AppResult<Json<ApiResponse<SignedUrl>>> {
    validate_object_key(&req.object_key)?;
    let ttl = match req.ttl_secs {
        None => state.config.signed_url_ttl(),
        Some(secs) if (1..=MAX_TTL_SECS).contains(&secs) => Duration::from_secs(secs),
        Some(secs) => {
            return Err(AppError::validation(format!(
                "ttl_secs must be between 1 and {MAX_TTL_SECS}, got {secs}"
            )));
        }
    };

    let link = state.artifacts.signed_url(&req.object_key, ttl).await?;
    Ok(ok(link))
}

/// POST /refresh-order-urls
pub async fn refresh_order_urls(
    State(state): State<ServerState>,
    Json(req): Json<RefreshRequest>,
) -> AppResult<Json<ApiResponse<RefreshReport>>> {
    validate_required_text(&req.order_id, "order_id", MAX_ID_LEN)?;
    let report = state.refresher.refresh_order_urls(req.order_id.trim()).await?;
    Ok(ok(report))
}

/// GET /artifacts/{*key}?expires=&signature=
pub async fn download(
    State(state): State<ServerState>,
    Path(key): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> AppResult<impl IntoResponse> {
    validate_object_key(&key)?;
    state
        .signer
        .verify(&key, query.expires, &query.signature, shared::util::now_millis())?;

    let bytes = state.artifacts.get(&key).await?;
    let mime = mime_guess::from_path(&key).first_or_octet_stream();

    Ok((
        [
            (header::CONTENT_TYPE, mime.to_string()),
            (header::CACHE_CONTROL, "private, no-store".to_string()),
        ],
        bytes,
    ))
}
