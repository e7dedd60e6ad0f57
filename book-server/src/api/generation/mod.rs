//! Generation queue API
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /api/generation | GET | 队列条目 (?status=pending\|processing\|completed\|failed) |
//! | /api/generation/{id} | GET | 单个条目 |
//! | /api/generation/{id}/retry | POST | 人工重试 (failed → pending) |

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/generation", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/", get(handler::list))
        .route("/{id}", get(handler::get_by_id))
        .route("/{id}/retry", post(handler::retry))
}
