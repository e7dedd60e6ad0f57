//! Order ingestion and read service

use shared::error::{AppError, ErrorCode};
use shared::models::{
    NewOrder, Order, OrderDetail, OrderItem, OrderStatus, PaymentStatus,
};
use thiserror::Error;

use crate::artifacts::{RefreshError, UrlRefresher};
use crate::generation::{GenerationQueue, QueueError};
use crate::store::{BookStorage, StorageError};
use crate::utils::validation::{MAX_ID_LEN, validate_required_text};

/// Default page size of order listings
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Largest page size of order listings
pub const MAX_PAGE_SIZE: usize = 200;

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Order has no items")]
    Empty,

    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("Order {order_id}: cannot move from {from} to {to}")]
    InvalidStatus {
        order_id: String,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<redb::CommitError> for OrderError {
    fn from(err: redb::CommitError) -> Self {
        OrderError::Storage(err.into())
    }
}

pub type OrderResult<T> = Result<T, OrderError>;

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::Validation(msg) => AppError::validation(msg),
            OrderError::Empty => AppError::new(ErrorCode::OrderEmpty),
            OrderError::NotFound(id) => {
                AppError::new(ErrorCode::OrderNotFound).with_detail("order_id", id)
            }
            OrderError::InvalidStatus { order_id, from, to } => AppError::with_message(
                ErrorCode::InvalidOrderStatus,
                format!("Cannot move order from {from} to {to}"),
            )
            .with_detail("order_id", order_id)
            .with_detail("from", from.as_str())
            .with_detail("to", to.as_str()),
            OrderError::Queue(e) => e.into(),
            OrderError::Storage(e) => AppError::database(e.to_string()),
        }
    }
}

/// Order service
#[derive(Clone)]
pub struct OrderService {
    storage: BookStorage,
    queue: GenerationQueue,
    refresher: UrlRefresher,
}

impl OrderService {
    pub fn new(storage: BookStorage, queue: GenerationQueue, refresher: UrlRefresher) -> Self {
        Self {
            storage,
            queue,
            refresher,
        }
    }

    /// Create an order and enqueue generation for its personalized items
    ///
    /// Order, items and queue entries are committed together.
    pub fn create_order(&self, input: NewOrder) -> OrderResult<OrderDetail> {
        validate_new_order(&input)?;

        let now = shared::util::now_millis();
        let order_id = shared::util::new_id();

        let items: Vec<OrderItem> = input
            .items
            .into_iter()
            .zip(0u32..)
            .map(|(line, position)| OrderItem {
                id: shared::util::new_id(),
                order_id: order_id.clone(),
                position,
                book_id: line.book_id.trim().to_string(),
                quantity: line.quantity,
                unit_price: line.unit_price,
                personalization_data: line.personalization_data,
                generation_status: None,
                pdf_url: None,
                pdf_object_key: None,
                pdf_url_expires_at: None,
                generated_at: None,
                generation_error: None,
                artifact_unavailable: false,
            })
            .collect();
        let total_amount = items.iter().map(OrderItem::line_total).sum();

        let txn = self.storage.begin_write()?;
        let date = shared::util::date_stamp(now);
        let seq = self.storage.next_daily_sequence(&txn, &date)?;
        let order = Order {
            id: order_id,
            order_number: format!("ORD-{date}-{seq:04}"),
            status: OrderStatus::Pending,
            payment_status: input.payment_status.unwrap_or_default(),
            total_amount,
            shipping_address: input.shipping_address,
            billing_address: input.billing_address,
            created_at: now,
            updated_at: now,
        };
        self.storage.store_order(&txn, &order)?;

        let mut queued = 0usize;
        for item in &items {
            self.storage.store_item(&txn, item)?;
            if item.is_personalized() {
                self.queue.enqueue_in(&txn, item)?;
                queued += 1;
            }
        }
        txn.commit()?;

        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            items = items.len(),
            queued,
            "Order created"
        );
        self.get_order(&order.id)
    }

    /// Order with its items, as stored
    pub fn get_order(&self, order_id: &str) -> OrderResult<OrderDetail> {
        let order = self
            .storage
            .get_order(order_id)?
            .ok_or_else(|| OrderError::NotFound(order_id.to_string()))?;
        let items = self.storage.get_items_for_order(order_id)?;
        Ok(OrderDetail { order, items })
    }

    /// Order prepared for API clients
    ///
    /// Expiring links are refreshed first. Links that are still expired
    /// (refresh failed) or whose artifact is gone are withheld from the view
    /// without touching the stored row.
    pub async fn present_order(&self, order_id: &str) -> OrderResult<OrderDetail> {
        match self.refresher.refresh_order_urls(order_id).await {
            Ok(_) => {}
            Err(RefreshError::OrderNotFound(id)) => return Err(OrderError::NotFound(id)),
            Err(e) => tracing::warn!(order_id = %order_id, error = %e, "URL refresh before read failed"),
        }

        let mut detail = self.get_order(order_id)?;
        let now = shared::util::now_millis();
        for item in &mut detail.items {
            let expired = item.pdf_url_expires_at.is_some_and(|t| t <= now);
            if item.artifact_unavailable || expired {
                item.pdf_url = None;
            }
        }
        Ok(detail)
    }

    pub fn list_orders(&self, limit: Option<usize>, offset: Option<usize>) -> OrderResult<Vec<Order>> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        Ok(self.storage.list_orders(limit, offset.unwrap_or(0))?)
    }

    /// Move an order along its fulfilment lifecycle
    pub fn update_order_status(&self, order_id: &str, status: OrderStatus) -> OrderResult<Order> {
        self.update_order(order_id, |order| {
            if !order.status.can_transition_to(status) {
                return Err(OrderError::InvalidStatus {
                    order_id: order.id.clone(),
                    from: order.status,
                    to: status,
                });
            }
            order.status = status;
            Ok(())
        })
    }

    pub fn update_payment_status(
        &self,
        order_id: &str,
        payment_status: PaymentStatus,
    ) -> OrderResult<Order> {
        self.update_order(order_id, |order| {
            order.payment_status = payment_status;
            Ok(())
        })
    }

    fn update_order(
        &self,
        order_id: &str,
        apply: impl FnOnce(&mut Order) -> OrderResult<()>,
    ) -> OrderResult<Order> {
        let txn = self.storage.begin_write()?;
        let mut order = self
            .storage
            .get_order_txn(&txn, order_id)?
            .ok_or_else(|| OrderError::NotFound(order_id.to_string()))?;
        let previous = order.status;
        apply(&mut order)?;
        order.updated_at = shared::util::now_millis();
        self.storage.store_order(&txn, &order)?;
        txn.commit()?;

        tracing::info!(
            order_id = %order.id,
            from = %previous,
            status = %order.status,
            payment_status = ?order.payment_status,
            "Order updated"
        );
        Ok(order)
    }
}

fn validate_new_order(input: &NewOrder) -> OrderResult<()> {
    if input.items.is_empty() {
        return Err(OrderError::Empty);
    }
    for (idx, line) in input.items.iter().enumerate() {
        validate_required_text(&line.book_id, &format!("items[{idx}].book_id"), MAX_ID_LEN)
            .map_err(|e| OrderError::Validation(e.0))?;
        if line.quantity == 0 {
            return Err(OrderError::Validation(format!(
                "items[{idx}].quantity must be positive"
            )));
        }
        if !line.unit_price.is_finite() || line.unit_price < 0.0 {
            return Err(OrderError::Validation(format!(
                "items[{idx}].unit_price must be a non-negative number"
            )));
        }
    }
    Ok(())
}
