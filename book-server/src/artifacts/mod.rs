//! Artifact Store - 生成产物存储与签名链接生命周期
//!
//! # 模块结构
//!
//! - [`ArtifactStore`] - 存储抽象 (put / exists / delete / signed_url)
//! - [`LocalArtifactStore`] - 本地磁盘实现，链接由 [`UrlSigner`] 签名
//! - [`UrlRefresher`] - 订单级签名链接刷新
//!
//! 签名链接只替换、不清空：刷新失败时旧链接保持原样，
//! 对象丢失时在订单项上标记 `artifact_unavailable`。

mod local;
mod refresh;
mod signer;

pub use local::LocalArtifactStore;
pub use refresh::{RefreshError, UrlRefresher};
pub use signer::{InvalidSigningKey, SignatureError, UrlSigner};

use async_trait::async_trait;
use shared::error::{AppError, ErrorCode};
use shared::models::SignedUrl;
use std::time::Duration;
use thiserror::Error;

/// Artifact store errors
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Artifact storage failed: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ArtifactResult<T> = Result<T, ArtifactError>;

impl From<ArtifactError> for AppError {
    fn from(err: ArtifactError) -> Self {
        match err {
            ArtifactError::NotFound(key) => {
                AppError::with_message(ErrorCode::ArtifactNotFound, format!("Object not found: {key}"))
                    .with_detail("object_key", key)
            }
            ArtifactError::InvalidKey(key) => {
                AppError::validation(format!("Invalid object key: {key}"))
            }
            other => AppError::with_message(ErrorCode::ArtifactStorageFailed, other.to_string()),
        }
    }
}

/// Object storage for generated images and PDFs
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store an object, replacing any previous content
    async fn put(&self, object_key: &str, bytes: Vec<u8>) -> ArtifactResult<()>;

    /// Read an object
    async fn get(&self, object_key: &str) -> ArtifactResult<Vec<u8>>;

    async fn exists(&self, object_key: &str) -> ArtifactResult<bool>;

    /// Delete an object; deleting a missing object is not an error
    async fn delete(&self, object_key: &str) -> ArtifactResult<()>;

    /// Issue a link valid for `ttl`
    ///
    /// Never mutates the object. Fails with [`ArtifactError::NotFound`] when
    /// the object is missing.
    async fn signed_url(&self, object_key: &str, ttl: Duration) -> ArtifactResult<SignedUrl>;
}

/// Validate an object key: relative, `/`-separated, no traversal
pub fn validate_object_key(object_key: &str) -> ArtifactResult<()> {
    let valid = !object_key.is_empty()
        && object_key.len() <= 512
        && !object_key.starts_with('/')
        && object_key
            .split('/')
            .all(|seg| !seg.is_empty() && seg != "." && seg != "..")
        && object_key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(ArtifactError::InvalidKey(object_key.to_string()))
    }
}

/// Storage key of the generated PDF of an order item
pub fn book_pdf_key(order_id: &str, order_item_id: &str) -> String {
    format!("orders/{order_id}/{order_item_id}/book.pdf")
}

/// Storage key of the generated cover of an order item
pub fn book_cover_key(order_id: &str, order_item_id: &str, ext: &str) -> String {
    format!("orders/{order_id}/{order_item_id}/cover.{ext}")
}
