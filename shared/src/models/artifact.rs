//! Artifact Model

use serde::{Deserialize, Serialize};

/// Time-limited link to a stored object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignedUrl {
    pub object_key: String,
    pub url: String,
    /// Unix millis
    pub expires_at: i64,
}

impl SignedUrl {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }

    /// Expired, or expiring within `margin_ms`
    pub fn expires_within(&self, now: i64, margin_ms: i64) -> bool {
        self.expires_at - margin_ms <= now
    }
}

/// Outcome of refreshing the PDF links of one order
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshReport {
    pub order_id: String,
    /// Items that received a new link
    pub refreshed: usize,
    /// Items with nothing to refresh
    pub skipped: usize,
    /// Items whose stored object is gone
    pub unavailable: usize,
    /// Items whose refresh failed; their previous link is kept
    pub failed: usize,
}

impl RefreshReport {
    pub fn new(order_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            ..Default::default()
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}
