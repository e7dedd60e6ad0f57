//! Generation pipeline API
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /generate-image | POST | 生成单张个性化图片，返回签名链接 |
//! | /generate-cover | POST | 生成封面，返回签名链接 |
//! | /process-complete-book | POST | 立即派发订单项的整书生成 |
//! | /analyze-book | POST | 书籍模板分析 (透传 AI 服务结果) |

mod handler;

use axum::{Router, routing::post};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new()
        .route("/generate-image", post(handler::generate_image))
        .route("/generate-cover", post(handler::generate_cover))
        .route("/process-complete-book", post(handler::process_complete_book))
        .route("/analyze-book", post(handler::analyze_book))
}
