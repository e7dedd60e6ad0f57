//! Order Model
//!
//! Orders are created at checkout and never deleted; only their status
//! fields change. Each order owns one or more [`OrderItem`]s, one per book.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::generation::GenerationStatus;

/// Order fulfilment status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Delivered and cancelled orders accept no further status changes
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Processing => 1,
            Self::Shipped => 2,
            Self::Delivered => 3,
            Self::Cancelled => 4,
        }
    }

    /// Forward-only along pending → processing → shipped → delivered;
    /// any non-terminal order may be cancelled.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::Cancelled => true,
            _ => next.rank() > self.rank(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment status as reported by the checkout flow
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
}

/// Free-form personalization attached to an order item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersonalizationData {
    pub child_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_image_url: Option<String>,
}

/// Order item (one book line)
///
/// `generation_status`, `pdf_url`, `generated_at` and `generation_error` are
/// rendered verbatim by the admin dashboards and keep these exact names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    pub id: String,
    /// Back-reference to the owning order
    pub order_id: String,
    /// Line number within the order, from 0
    #[serde(default)]
    pub position: u32,
    pub book_id: String,
    pub quantity: u32,
    /// Price in currency unit
    pub unit_price: f64,
    pub personalization_data: Option<PersonalizationData>,
    /// `None` for items that need no generation
    pub generation_status: Option<GenerationStatus>,
    /// Signed URL of the generated PDF
    pub pdf_url: Option<String>,
    /// Storage key behind `pdf_url`
    #[serde(default)]
    pub pdf_object_key: Option<String>,
    /// Expiry of `pdf_url` (Unix millis)
    #[serde(default)]
    pub pdf_url_expires_at: Option<i64>,
    pub generated_at: Option<i64>,
    pub generation_error: Option<String>,
    /// Stored artifact is gone for good (distinct from a generation failure)
    #[serde(default)]
    pub artifact_unavailable: bool,
}

impl OrderItem {
    pub fn is_personalized(&self) -> bool {
        self.personalization_data.is_some()
    }

    /// Line total in currency unit
    pub fn line_total(&self) -> f64 {
        self.unit_price * f64::from(self.quantity)
    }

    /// Whether the stored PDF link is missing, expired, or expires within `margin_ms`
    pub fn url_needs_refresh(&self, now: i64, margin_ms: i64) -> bool {
        if self.pdf_object_key.is_none() || self.artifact_unavailable {
            return false;
        }
        match (&self.pdf_url, self.pdf_url_expires_at) {
            (Some(_), Some(expires_at)) => expires_at - margin_ms <= now,
            _ => true,
        }
    }
}

/// Order entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: String,
    /// Human-readable number, e.g. `ORD-20261017-0001`
    pub order_number: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    /// Total amount in currency unit
    pub total_amount: f64,
    pub shipping_address: Option<Value>,
    pub billing_address: Option<Value>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Order together with its items (API read model)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// Order creation payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    #[serde(default)]
    pub payment_status: Option<PaymentStatus>,
    #[serde(default)]
    pub shipping_address: Option<Value>,
    #[serde(default)]
    pub billing_address: Option<Value>,
    pub items: Vec<NewOrderItem>,
}

/// Order item creation payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub book_id: String,
    pub quantity: u32,
    pub unit_price: f64,
    #[serde(default)]
    pub personalization_data: Option<PersonalizationData>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item_with_url(url: Option<&str>, expires_at: Option<i64>) -> OrderItem {
        OrderItem {
            id: "item-1".to_string(),
            order_id: "order-1".to_string(),
            position: 0,
            book_id: "book-1".to_string(),
            quantity: 1,
            unit_price: 29.9,
            personalization_data: None,
            generation_status: Some(GenerationStatus::Completed),
            pdf_url: url.map(str::to_string),
            pdf_object_key: Some("orders/order-1/item-1/book.pdf".to_string()),
            pdf_url_expires_at: expires_at,
            generated_at: Some(1),
            generation_error: None,
            artifact_unavailable: false,
        }
    }

    #[test]
    fn test_order_status_forward_only() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Processing));
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Shipped));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Delivered));
        assert!(!OrderStatus::Shipped.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Processing.can_transition_to(OrderStatus::Processing));
    }

    #[test]
    fn test_order_status_terminal() {
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Processing));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn test_url_needs_refresh() {
        let now = 1_000_000;
        let margin = 60_000;

        // Fresh link
        assert!(!item_with_url(Some("u"), Some(now + 120_000)).url_needs_refresh(now, margin));
        // Inside the margin
        assert!(item_with_url(Some("u"), Some(now + 30_000)).url_needs_refresh(now, margin));
        // Already expired
        assert!(item_with_url(Some("u"), Some(now - 1)).url_needs_refresh(now, margin));
        // Object stored but no link yet
        assert!(item_with_url(None, None).url_needs_refresh(now, margin));
    }

    #[test]
    fn test_url_refresh_skips_unavailable_and_missing_objects() {
        let now = 1_000_000;
        let mut item = item_with_url(Some("u"), Some(now - 1));
        item.artifact_unavailable = true;
        assert!(!item.url_needs_refresh(now, 0));

        let mut item = item_with_url(None, None);
        item.pdf_object_key = None;
        assert!(!item.url_needs_refresh(now, 0));
    }

    #[test]
    fn test_status_serde_names() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::Cancelled).unwrap(),
            "\"cancelled\""
        );
        assert_eq!(
            serde_json::to_string(&PaymentStatus::Refunded).unwrap(),
            "\"refunded\""
        );
    }
}
