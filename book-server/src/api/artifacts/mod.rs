//! Artifact API
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /generate-signed-url | POST | 为已存储对象签发链接 |
//! | /refresh-order-urls | POST | 刷新订单所有即将过期的 PDF 链接 |
//! | /artifacts/{*key} | GET | 签名下载 (校验 signature 与 expires) |

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new()
        .route("/generate-signed-url", post(handler::generate_signed_url))
        .route("/refresh-order-urls", post(handler::refresh_order_urls))
        .route("/artifacts/{*key}", get(handler::download))
}
