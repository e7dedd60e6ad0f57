//! Generation queue: persisted state machine + order item mirror
//!
//! 每次状态迁移与订单项镜像字段 (`generation_status` / `pdf_url` /
//! `generated_at` / `generation_error`) 在同一个 redb 写事务内提交。

use redb::WriteTransaction;
use shared::error::{AppError, ErrorCode};
use shared::models::{
    GenerationQueueEntry, GenerationStatus, OrderItem, SignedUrl, TransitionError,
};
use thiserror::Error;

use crate::store::{BookStorage, StorageError};
use crate::utils::validation::{MAX_ID_LEN, MAX_NAME_LEN, validate_required_text};

/// Queue errors
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("Generation entry not found: {0}")]
    EntryNotFound(String),

    #[error("Order item not found: {0}")]
    ItemNotFound(String),

    #[error("Order item {0} has no personalization data")]
    NotPersonalized(String),

    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for QueueError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ItemNotFound(id) => QueueError::ItemNotFound(id),
            other => QueueError::Storage(other),
        }
    }
}

impl From<redb::CommitError> for QueueError {
    fn from(err: redb::CommitError) -> Self {
        QueueError::Storage(err.into())
    }
}

pub type QueueResult<T> = Result<T, QueueError>;

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Validation(msg) => AppError::validation(msg),
            QueueError::Transition(e) => AppError::invalid_transition(e.to_string())
                .with_detail("entry_id", e.entry_id)
                .with_detail("from", e.from.as_str())
                .with_detail("to", e.to.as_str()),
            QueueError::EntryNotFound(id) => AppError::new(ErrorCode::GenerationEntryNotFound)
                .with_detail("entry_id", id),
            QueueError::ItemNotFound(id) => {
                AppError::new(ErrorCode::OrderItemNotFound).with_detail("order_item_id", id)
            }
            QueueError::NotPersonalized(id) => {
                AppError::new(ErrorCode::NotPersonalized).with_detail("order_item_id", id)
            }
            QueueError::Storage(e) => AppError::database(e.to_string()),
        }
    }
}

/// Generation queue backed by [`BookStorage`]
#[derive(Debug, Clone)]
pub struct GenerationQueue {
    storage: BookStorage,
}

impl GenerationQueue {
    pub fn new(storage: BookStorage) -> Self {
        Self { storage }
    }

    /// Enqueue an order item (idempotent per item)
    pub fn enqueue(&self, order_item_id: &str) -> QueueResult<GenerationQueueEntry> {
        let txn = self.storage.begin_write()?;
        let item = self
            .storage
            .get_item_txn(&txn, order_item_id)?
            .ok_or_else(|| QueueError::ItemNotFound(order_item_id.to_string()))?;
        let entry = self.enqueue_in(&txn, &item)?;
        txn.commit()?;
        Ok(entry)
    }

    /// Enqueue within the caller's transaction
    ///
    /// The item must already be stored in `txn`; its `generation_status` is
    /// set to `pending` when a new entry is created.
    pub fn enqueue_in(
        &self,
        txn: &WriteTransaction,
        item: &OrderItem,
    ) -> QueueResult<GenerationQueueEntry> {
        if let Some(entry_id) = self.storage.entry_id_for_item_txn(txn, &item.id)? {
            if let Some(existing) = self.storage.get_entry_txn(txn, &entry_id)? {
                tracing::debug!(entry_id = %existing.id, order_item_id = %item.id, "Item already queued");
                return Ok(existing);
            }
        }

        let personalization = item
            .personalization_data
            .as_ref()
            .ok_or_else(|| QueueError::NotPersonalized(item.id.clone()))?;
        validate_required_text(&item.book_id, "book_id", MAX_ID_LEN)
            .map_err(|e| QueueError::Validation(e.0))?;
        validate_required_text(&personalization.child_name, "child_name", MAX_NAME_LEN)
            .map_err(|e| QueueError::Validation(e.0))?;

        let entry = GenerationQueueEntry::new(
            shared::util::new_id(),
            item.order_id.clone(),
            item.id.clone(),
            item.book_id.trim(),
            personalization.child_name.trim(),
            personalization.child_image_url.clone(),
            shared::util::now_millis(),
        );
        self.storage.store_entry(txn, &entry)?;
        self.storage.link_item_entry(txn, &item.id, &entry.id)?;

        let mut mirrored = item.clone();
        mirrored.generation_status = Some(GenerationStatus::Pending);
        mirrored.generation_error = None;
        self.storage.store_item(txn, &mirrored)?;

        tracing::info!(
            entry_id = %entry.id,
            order_id = %entry.order_id,
            order_item_id = %entry.order_item_id,
            "Generation entry enqueued"
        );
        Ok(entry)
    }

    /// pending → processing
    pub fn start(&self, entry_id: &str) -> QueueResult<GenerationQueueEntry> {
        let now = shared::util::now_millis();
        self.transition(
            entry_id,
            |entry| entry.start(now),
            |_, item| item.generation_status = Some(GenerationStatus::Processing),
        )
    }

    /// processing → completed
    ///
    /// `link` is the freshly issued PDF link; without one the item keeps its
    /// object key and the monitor issues the link on a later tick.
    pub fn complete(
        &self,
        entry_id: &str,
        generated_image_url: &str,
        link: Option<&SignedUrl>,
    ) -> QueueResult<GenerationQueueEntry> {
        let now = shared::util::now_millis();
        self.transition(
            entry_id,
            |entry| entry.complete(generated_image_url, now),
            |entry, item| {
                item.generation_status = Some(GenerationStatus::Completed);
                item.pdf_object_key = entry.generated_image_url.clone();
                if let Some(link) = link {
                    item.pdf_url = Some(link.url.clone());
                    item.pdf_url_expires_at = Some(link.expires_at);
                }
                item.generated_at = entry.completed_at;
                item.generation_error = None;
                item.artifact_unavailable = false;
            },
        )
    }

    /// processing → failed
    ///
    /// The item's existing `pdf_url` is left as is.
    pub fn fail(&self, entry_id: &str, error_message: &str) -> QueueResult<GenerationQueueEntry> {
        let now = shared::util::now_millis();
        self.transition(
            entry_id,
            |entry| entry.fail(error_message, now),
            |entry, item| {
                item.generation_status = Some(GenerationStatus::Failed);
                item.generation_error = entry.error_message.clone();
            },
        )
    }

    /// failed → pending (operator retry)
    pub fn retry(&self, entry_id: &str) -> QueueResult<GenerationQueueEntry> {
        let entry = self.transition(
            entry_id,
            |entry| entry.retry(),
            |_, item| {
                item.generation_status = Some(GenerationStatus::Pending);
                item.generation_error = None;
            },
        )?;
        tracing::info!(entry_id = %entry.id, attempts = entry.attempts, "Generation entry re-queued");
        Ok(entry)
    }

    pub fn get(&self, entry_id: &str) -> QueueResult<GenerationQueueEntry> {
        self.storage
            .get_entry(entry_id)?
            .ok_or_else(|| QueueError::EntryNotFound(entry_id.to_string()))
    }

    /// Entries oldest first, optionally filtered by status
    pub fn list(&self, status: Option<GenerationStatus>) -> QueueResult<Vec<GenerationQueueEntry>> {
        Ok(self.storage.list_entries(status)?)
    }

    pub fn entry_for_item(&self, order_item_id: &str) -> QueueResult<Option<GenerationQueueEntry>> {
        match self.storage.entry_id_for_item(order_item_id)? {
            Some(entry_id) => Ok(self.storage.get_entry(&entry_id)?),
            None => Ok(None),
        }
    }

    /// Apply one entry transition and mirror it onto the order item,
    /// committing both or neither
    fn transition(
        &self,
        entry_id: &str,
        apply: impl FnOnce(&mut GenerationQueueEntry) -> Result<(), TransitionError>,
        mirror: impl FnOnce(&GenerationQueueEntry, &mut OrderItem),
    ) -> QueueResult<GenerationQueueEntry> {
        let txn = self.storage.begin_write()?;
        let mut entry = self
            .storage
            .get_entry_txn(&txn, entry_id)?
            .ok_or_else(|| QueueError::EntryNotFound(entry_id.to_string()))?;

        if let Err(e) = apply(&mut entry) {
            tracing::warn!(entry_id = %entry_id, from = %e.from, to = %e.to, "Rejected generation transition");
            return Err(e.into());
        }

        let mut item = self
            .storage
            .get_item_txn(&txn, &entry.order_item_id)?
            .ok_or_else(|| QueueError::ItemNotFound(entry.order_item_id.clone()))?;
        mirror(&entry, &mut item);

        self.storage.store_entry(&txn, &entry)?;
        self.storage.store_item(&txn, &item)?;
        txn.commit()?;

        tracing::debug!(entry_id = %entry.id, status = %entry.status, "Generation entry updated");
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::PersonalizationData;

    fn seed_item(storage: &BookStorage, item_id: &str, personalized: bool) {
        let item = OrderItem {
            id: item_id.to_string(),
            order_id: "order-1".to_string(),
            position: 0,
            book_id: "book-1".to_string(),
            quantity: 1,
            unit_price: 29.9,
            personalization_data: personalized.then(|| PersonalizationData {
                child_name: "Mia".to_string(),
                child_age: Some(5),
                child_gender: None,
                child_image_url: Some("https://img.example/mia.png".to_string()),
            }),
            generation_status: None,
            pdf_url: None,
            pdf_object_key: None,
            pdf_url_expires_at: None,
            generated_at: None,
            generation_error: None,
            artifact_unavailable: false,
        };
        let txn = storage.begin_write().unwrap();
        storage.store_item(&txn, &item).unwrap();
        txn.commit().unwrap();
    }

    fn queue_with_item(item_id: &str) -> (BookStorage, GenerationQueue) {
        let storage = BookStorage::open_in_memory().unwrap();
        seed_item(&storage, item_id, true);
        let queue = GenerationQueue::new(storage.clone());
        (storage, queue)
    }

    #[test]
    fn test_enqueue_is_idempotent_per_item() {
        let (storage, queue) = queue_with_item("item-1");
        let first = queue.enqueue("item-1").unwrap();
        let second = queue.enqueue("item-1").unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(queue.list(None).unwrap().len(), 1);
        assert_eq!(first.child_name, "Mia");

        let item = storage.get_item("item-1").unwrap().unwrap();
        assert_eq!(item.generation_status, Some(GenerationStatus::Pending));
    }

    #[test]
    fn test_enqueue_rejects_unpersonalized_and_blank_names() {
        let storage = BookStorage::open_in_memory().unwrap();
        seed_item(&storage, "plain", false);
        let queue = GenerationQueue::new(storage.clone());
        assert!(matches!(
            queue.enqueue("plain").unwrap_err(),
            QueueError::NotPersonalized(_)
        ));

        storage
            .update_item("plain", |item| {
                item.personalization_data = Some(PersonalizationData {
                    child_name: "   ".to_string(),
                    child_age: None,
                    child_gender: None,
                    child_image_url: None,
                })
            })
            .unwrap();
        assert!(matches!(
            queue.enqueue("plain").unwrap_err(),
            QueueError::Validation(_)
        ));
        assert!(queue.list(None).unwrap().is_empty());

        assert!(matches!(
            queue.enqueue("missing").unwrap_err(),
            QueueError::ItemNotFound(_)
        ));
    }

    #[test]
    fn test_complete_mirrors_item() {
        let (storage, queue) = queue_with_item("item-1");
        let entry = queue.enqueue("item-1").unwrap();
        queue.start(&entry.id).unwrap();
        assert_eq!(
            storage.get_item("item-1").unwrap().unwrap().generation_status,
            Some(GenerationStatus::Processing)
        );

        let link = SignedUrl {
            object_key: "orders/order-1/item-1/book.pdf".to_string(),
            url: "http://localhost:5000/artifacts/orders/order-1/item-1/book.pdf?expires=9&signature=ab"
                .to_string(),
            expires_at: 9,
        };
        let done = queue
            .complete(&entry.id, "orders/order-1/item-1/book.pdf", Some(&link))
            .unwrap();
        assert_eq!(done.status, GenerationStatus::Completed);
        assert!(done.completed_at.is_some());

        let item = storage.get_item("item-1").unwrap().unwrap();
        assert_eq!(item.generation_status, Some(GenerationStatus::Completed));
        assert_eq!(item.pdf_url.as_deref(), Some(link.url.as_str()));
        assert_eq!(item.pdf_object_key.as_deref(), Some("orders/order-1/item-1/book.pdf"));
        assert_eq!(item.generated_at, done.completed_at);
        assert!(item.generation_error.is_none());
    }

    #[test]
    fn test_complete_on_pending_is_rejected_and_nothing_changes() {
        let (storage, queue) = queue_with_item("item-1");
        let entry = queue.enqueue("item-1").unwrap();

        let err = queue.complete(&entry.id, "key", None).unwrap_err();
        assert!(matches!(err, QueueError::Transition(_)));

        assert_eq!(queue.get(&entry.id).unwrap().status, GenerationStatus::Pending);
        let item = storage.get_item("item-1").unwrap().unwrap();
        assert_eq!(item.generation_status, Some(GenerationStatus::Pending));
        assert!(item.pdf_object_key.is_none());
    }

    #[test]
    fn test_fail_keeps_existing_pdf_url_and_retry_clears_error() {
        let (storage, queue) = queue_with_item("item-1");
        storage
            .update_item("item-1", |item| item.pdf_url = Some("http://old".to_string()))
            .unwrap();
        let entry = queue.enqueue("item-1").unwrap();
        queue.start(&entry.id).unwrap();
        let failed = queue.fail(&entry.id, "provider timeout").unwrap();
        assert_eq!(failed.status, GenerationStatus::Failed);

        let item = storage.get_item("item-1").unwrap().unwrap();
        assert_eq!(item.generation_status, Some(GenerationStatus::Failed));
        assert_eq!(item.generation_error.as_deref(), Some("provider timeout"));
        assert_eq!(item.pdf_url.as_deref(), Some("http://old"));

        let retried = queue.retry(&entry.id).unwrap();
        assert_eq!(retried.status, GenerationStatus::Pending);
        let item = storage.get_item("item-1").unwrap().unwrap();
        assert_eq!(item.generation_status, Some(GenerationStatus::Pending));
        assert!(item.generation_error.is_none());
    }

    #[test]
    fn test_lookup_helpers() {
        let (_storage, queue) = queue_with_item("item-1");
        assert!(queue.entry_for_item("item-1").unwrap().is_none());
        let entry = queue.enqueue("item-1").unwrap();
        assert_eq!(queue.entry_for_item("item-1").unwrap().map(|e| e.id), Some(entry.id.clone()));
        assert!(matches!(queue.get("nope").unwrap_err(), QueueError::EntryNotFound(_)));
        assert_eq!(queue.list(Some(GenerationStatus::Pending)).unwrap().len(), 1);
        assert!(queue.list(Some(GenerationStatus::Failed)).unwrap().is_empty());
    }
}
