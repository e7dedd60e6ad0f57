//! Monitor control API
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /monitor/start | POST | 启动监控 (已运行则无操作) |
//! | /monitor/stop | POST | 停止监控并等待循环退出 |
//! | /monitor/status | GET | 监控状态 |

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::Serialize;

use crate::core::ServerState;
use crate::monitor::MonitorStatus;
use crate::utils::{ApiResponse, ok, ok_with_message};

pub fn router() -> Router<ServerState> {
    Router::new()
        .route("/monitor/start", post(start))
        .route("/monitor/stop", post(stop))
        .route("/monitor/status", get(status))
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    /// false when the monitor was already running
    pub started: bool,
    pub status: MonitorStatus,
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    /// false when the monitor was already idle
    pub stopped: bool,
    pub status: MonitorStatus,
}

async fn start(State(state): State<ServerState>) -> Json<ApiResponse<StartResponse>> {
    let started = state.monitor.start().await;
    let message = if started { "Monitor started" } else { "Monitor already running" };
    ok_with_message(
        StartResponse {
            started,
            status: state.monitor.status(),
        },
        message,
    )
}

async fn stop(State(state): State<ServerState>) -> Json<ApiResponse<StopResponse>> {
    let stopped = state.monitor.stop().await;
    let message = if stopped { "Monitor stopped" } else { "Monitor not running" };
    ok_with_message(
        StopResponse {
            stopped,
            status: state.monitor.status(),
        },
        message,
    )
}

async fn status(State(state): State<ServerState>) -> Json<ApiResponse<MonitorStatus>> {
    ok(state.monitor.status())
}
