//! Order-level signed URL refresh
//!
//! 每个订单项独立刷新 (并发执行，无顺序保证)，并以单行更新写回：
//! - 链接只会被新链接替换，永远不会被清空
//! - 对象已丢失 → `artifact_unavailable = true`，`generation_status` 不变
//! - 签名失败 → 保留旧链接，计入 `failed`

use futures::future::join_all;
use shared::models::{OrderItem, RefreshReport};
use shared::error::{AppError, ErrorCode};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::{ArtifactError, ArtifactStore};
use crate::store::{BookStorage, StorageError};

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<RefreshError> for AppError {
    fn from(err: RefreshError) -> Self {
        match err {
            RefreshError::OrderNotFound(id) => {
                AppError::with_message(ErrorCode::OrderNotFound, format!("Order {id} not found"))
                    .with_detail("order_id", id)
            }
            RefreshError::Storage(e) => AppError::database(e.to_string()),
        }
    }
}

enum ItemOutcome {
    Refreshed,
    Skipped,
    Unavailable,
    Failed,
}

/// Replaces expiring PDF links on order items
#[derive(Clone)]
pub struct UrlRefresher {
    storage: BookStorage,
    artifacts: Arc<dyn ArtifactStore>,
    ttl: Duration,
    margin: Duration,
}

impl UrlRefresher {
    pub fn new(
        storage: BookStorage,
        artifacts: Arc<dyn ArtifactStore>,
        ttl: Duration,
        margin: Duration,
    ) -> Self {
        Self {
            storage,
            artifacts,
            ttl,
            margin,
        }
    }

    /// Refresh margin in millis
    pub fn margin_ms(&self) -> i64 {
        i64::try_from(self.margin.as_millis()).unwrap_or(i64::MAX)
    }

    /// Refresh every item of the order whose link is missing, expired or
    /// expires within the margin
    pub async fn refresh_order_urls(&self, order_id: &str) -> Result<RefreshReport, RefreshError> {
        if self.storage.get_order(order_id)?.is_none() {
            return Err(RefreshError::OrderNotFound(order_id.to_string()));
        }

        let items = self.storage.get_items_for_order(order_id)?;
        let now = shared::util::now_millis();
        let margin_ms = self.margin_ms();

        let outcomes = join_all(
            items
                .into_iter()
                .map(|item| self.refresh_item(item, now, margin_ms)),
        )
        .await;

        let mut report = RefreshReport::new(order_id);
        for outcome in outcomes {
            match outcome {
                ItemOutcome::Refreshed => report.refreshed += 1,
                ItemOutcome::Skipped => report.skipped += 1,
                ItemOutcome::Unavailable => report.unavailable += 1,
                ItemOutcome::Failed => report.failed += 1,
            }
        }

        if report.refreshed > 0 || report.unavailable > 0 || report.failed > 0 {
            tracing::info!(
                order_id = %order_id,
                refreshed = report.refreshed,
                unavailable = report.unavailable,
                failed = report.failed,
                "Order URLs refreshed"
            );
        }
        Ok(report)
    }

    async fn refresh_item(&self, item: OrderItem, now: i64, margin_ms: i64) -> ItemOutcome {
        if !item.url_needs_refresh(now, margin_ms) {
            return ItemOutcome::Skipped;
        }
        let Some(object_key) = item.pdf_object_key.clone() else {
            return ItemOutcome::Skipped;
        };

        match self.artifacts.signed_url(&object_key, self.ttl).await {
            Ok(link) => {
                let result = self.storage.update_item(&item.id, |row| {
                    row.pdf_url = Some(link.url);
                    row.pdf_url_expires_at = Some(link.expires_at);
                });
                match result {
                    Ok(_) => ItemOutcome::Refreshed,
                    Err(e) => {
                        tracing::warn!(item_id = %item.id, error = %e, "Failed to persist refreshed URL");
                        ItemOutcome::Failed
                    }
                }
            }
            Err(ArtifactError::NotFound(_)) => {
                tracing::warn!(
                    item_id = %item.id,
                    object_key = %object_key,
                    "Artifact missing from storage, marking unavailable"
                );
                match self
                    .storage
                    .update_item(&item.id, |row| row.artifact_unavailable = true)
                {
                    Ok(_) => ItemOutcome::Unavailable,
                    Err(e) => {
                        tracing::warn!(item_id = %item.id, error = %e, "Failed to flag unavailable artifact");
                        ItemOutcome::Failed
                    }
                }
            }
            Err(e) => {
                tracing::warn!(item_id = %item.id, error = %e, "Signed URL issuance failed, keeping previous link");
                ItemOutcome::Failed
            }
        }
    }
}
