//! 健康检查路由
//!
//! # 路由列表
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /health | GET | 健康检查 |
//! | /api/health | GET | 同上 |
//!
//! # 响应示例
//!
//! ```json
//! {
//!   "code": 0,
//!   "message": "OK",
//!   "data": { "status": "ok", "version": "0.1.0", "monitor_running": true, "in_flight": 1 }
//! }
//! ```

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::core::ServerState;
use crate::utils::{ApiResponse, ok};

pub fn router() -> Router<ServerState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/health", get(health))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// 状态 (ok)
    status: &'static str,
    version: &'static str,
    environment: String,
    monitor_running: bool,
    /// 正在执行的生成任务数
    in_flight: usize,
    timestamp: i64,
}

async fn health(State(state): State<ServerState>) -> Json<ApiResponse<HealthResponse>> {
    ok(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.environment.clone(),
        monitor_running: state.monitor.is_running(),
        in_flight: state.worker.in_flight_count(),
        timestamp: shared::util::now_millis(),
    })
}
