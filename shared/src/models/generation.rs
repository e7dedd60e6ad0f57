//! Generation Queue Model
//!
//! 一个 [`GenerationQueueEntry`] 对应一次个性化书籍生成请求。
//! 状态只能沿 `pending → processing → completed | failed` 前进，
//! `failed → pending` 仅由人工重试触发。

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Generation status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl GenerationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GenerationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown generation status: {other}")),
        }
    }
}

/// Rejected state change
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("entry {entry_id}: cannot move from {from} to {to}")]
pub struct TransitionError {
    pub entry_id: String,
    pub from: GenerationStatus,
    pub to: GenerationStatus,
}

/// Generation queue entry
///
/// 不变量：
/// - `completed_at` 有值 ⇔ 状态为 completed / failed
/// - `started_at` 有值 ⇔ 状态不是 pending
/// - completed 时 `generated_image_url` 必有值
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationQueueEntry {
    pub id: String,
    pub order_id: String,
    pub order_item_id: String,
    pub book_id: String,
    pub child_name: String,
    pub child_image_url: Option<String>,
    /// Storage key of the generated PDF
    pub generated_image_url: Option<String>,
    pub status: GenerationStatus,
    pub error_message: Option<String>,
    /// Number of times processing has begun
    #[serde(default)]
    pub attempts: u32,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl GenerationQueueEntry {
    pub fn new(
        id: impl Into<String>,
        order_id: impl Into<String>,
        order_item_id: impl Into<String>,
        book_id: impl Into<String>,
        child_name: impl Into<String>,
        child_image_url: Option<String>,
        created_at: i64,
    ) -> Self {
        Self {
            id: id.into(),
            order_id: order_id.into(),
            order_item_id: order_item_id.into(),
            book_id: book_id.into(),
            child_name: child_name.into(),
            child_image_url,
            generated_image_url: None,
            status: GenerationStatus::Pending,
            error_message: None,
            attempts: 0,
            created_at,
            started_at: None,
            completed_at: None,
        }
    }

    fn reject(&self, to: GenerationStatus) -> TransitionError {
        TransitionError {
            entry_id: self.id.clone(),
            from: self.status,
            to,
        }
    }

    /// pending → processing
    pub fn start(&mut self, now: i64) -> Result<(), TransitionError> {
        if self.status != GenerationStatus::Pending {
            return Err(self.reject(GenerationStatus::Processing));
        }
        self.status = GenerationStatus::Processing;
        self.started_at = Some(now);
        self.completed_at = None;
        self.error_message = None;
        self.attempts += 1;
        Ok(())
    }

    /// processing → completed
    pub fn complete(&mut self, artifact_key: impl Into<String>, now: i64) -> Result<(), TransitionError> {
        if self.status != GenerationStatus::Processing {
            return Err(self.reject(GenerationStatus::Completed));
        }
        self.status = GenerationStatus::Completed;
        self.generated_image_url = Some(artifact_key.into());
        self.error_message = None;
        self.completed_at = Some(now);
        Ok(())
    }

    /// processing → failed
    pub fn fail(&mut self, error: impl Into<String>, now: i64) -> Result<(), TransitionError> {
        if self.status != GenerationStatus::Processing {
            return Err(self.reject(GenerationStatus::Failed));
        }
        self.status = GenerationStatus::Failed;
        self.error_message = Some(error.into());
        self.completed_at = Some(now);
        Ok(())
    }

    /// failed → pending (manual retry)
    pub fn retry(&mut self) -> Result<(), TransitionError> {
        if self.status != GenerationStatus::Failed {
            return Err(self.reject(GenerationStatus::Pending));
        }
        self.status = GenerationStatus::Pending;
        self.started_at = None;
        self.completed_at = None;
        self.error_message = None;
        Ok(())
    }

    /// Processing for longer than `timeout_ms`
    pub fn is_stale(&self, now: i64, timeout_ms: i64) -> bool {
        self.status == GenerationStatus::Processing
            && self.started_at.is_some_and(|t| now - t > timeout_ms)
    }
}
