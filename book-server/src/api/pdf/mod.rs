//! PDF file management
//!
//! 上传的 PDF 存放在 `{work_dir}/pdfs`，按文件名管理。
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /api/upload-pdf | POST | multipart 上传 (字段 `pdf`) |
//! | /api/pdf-info/{filename} | GET | 文件信息 |
//! | /api/pdf/{filename} | DELETE | 删除文件 |

mod handler;

pub use handler::PdfInfo;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};

use crate::core::{Config, ServerState};

/// Multipart framing allowance on top of the file size cap
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn router(config: &Config) -> Router<ServerState> {
    let body_limit = config.max_pdf_size_bytes() + MULTIPART_OVERHEAD;
    Router::new()
        .route(
            "/api/upload-pdf",
            post(handler::upload).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/api/pdf-info/{filename}", get(handler::info))
        .route("/api/pdf/{filename}", delete(handler::remove))
}
