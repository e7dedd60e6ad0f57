//! redb-based storage layer for orders and the generation queue
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `orders` | `order_id` | `Order` | Order rows |
//! | `order_items` | `item_id` | `OrderItem` | Order item rows |
//! | `order_item_index` | `(order_id, item_id)` | `()` | Items of an order |
//! | `generation_queue` | `entry_id` | `GenerationQueueEntry` | Generation jobs |
//! | `item_generation` | `item_id` | `entry_id` | One entry per order item |
//! | `counters` | name | `u64` | Daily order number sequence |
//!
//! # Durability
//!
//! redb commits are durable once `commit()` returns (copy-on-write with an
//! atomic root swap), so a queue transition and the mirrored order item are
//! either both visible or both absent after a crash.

use redb::{
    Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction,
};
use shared::models::{GenerationQueueEntry, GenerationStatus, Order, OrderItem};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// key = order_id, value = JSON-serialized Order
const ORDERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("orders");

/// key = item_id, value = JSON-serialized OrderItem
const ORDER_ITEMS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("order_items");

/// key = (order_id, item_id), value = empty (range scan per order)
const ORDER_ITEM_INDEX_TABLE: TableDefinition<(&str, &str), ()> =
    TableDefinition::new("order_item_index");

/// key = entry_id, value = JSON-serialized GenerationQueueEntry
const GENERATION_QUEUE_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("generation_queue");

/// key = item_id, value = entry_id
const ITEM_GENERATION_TABLE: TableDefinition<&str, &str> = TableDefinition::new("item_generation");

/// key = counter name, value = u64
const COUNTERS_TABLE: TableDefinition<&str, u64> = TableDefinition::new("counters");

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Order item not found: {0}")]
    ItemNotFound(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Order + generation queue storage backed by redb
#[derive(Clone)]
pub struct BookStorage {
    db: Arc<Database>,
}

impl std::fmt::Debug for BookStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookStorage").finish_non_exhaustive()
    }
}

impl BookStorage {
    /// Open or create the database at the given path
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Open an in-memory database (tests and throwaway tooling)
    pub fn open_in_memory() -> StorageResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> StorageResult<Self> {
        let write_txn = db.begin_write()?;
        {
            // Create all tables if they don't exist
            let _ = write_txn.open_table(ORDERS_TABLE)?;
            let _ = write_txn.open_table(ORDER_ITEMS_TABLE)?;
            let _ = write_txn.open_table(ORDER_ITEM_INDEX_TABLE)?;
            let _ = write_txn.open_table(GENERATION_QUEUE_TABLE)?;
            let _ = write_txn.open_table(ITEM_GENERATION_TABLE)?;
            let _ = write_txn.open_table(COUNTERS_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Begin a write transaction
    pub fn begin_write(&self) -> StorageResult<WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    // ========== Counters ==========

    /// Increment the per-day order sequence and return the new value
    ///
    /// `date` is the `YYYYMMDD` stamp; each day starts again at 1.
    pub fn next_daily_sequence(&self, txn: &WriteTransaction, date: &str) -> StorageResult<u64> {
        let key = format!("order_seq:{date}");
        let mut table = txn.open_table(COUNTERS_TABLE)?;
        let current = table
            .get(key.as_str())?
            .map(|guard| guard.value())
            .unwrap_or(0);
        let next = current + 1;
        table.insert(key.as_str(), next)?;
        Ok(next)
    }

    // ========== Orders ==========

    /// Store an order (insert or replace)
    pub fn store_order(&self, txn: &WriteTransaction, order: &Order) -> StorageResult<()> {
        let mut table = txn.open_table(ORDERS_TABLE)?;
        let value = serde_json::to_vec(order)?;
        table.insert(order.id.as_str(), value.as_slice())?;
        Ok(())
    }

    /// Get an order by ID
    pub fn get_order(&self, order_id: &str) -> StorageResult<Option<Order>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ORDERS_TABLE)?;

        match table.get(order_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Get an order by ID (within transaction)
    pub fn get_order_txn(
        &self,
        txn: &WriteTransaction,
        order_id: &str,
    ) -> StorageResult<Option<Order>> {
        let table = txn.open_table(ORDERS_TABLE)?;

        match table.get(order_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// List orders, newest first
    pub fn list_orders(&self, limit: usize, offset: usize) -> StorageResult<Vec<Order>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ORDERS_TABLE)?;

        let mut orders: Vec<Order> = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            orders.push(serde_json::from_slice(value.value())?);
        }

        orders.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.order_number.cmp(&a.order_number))
        });
        Ok(orders.into_iter().skip(offset).take(limit).collect())
    }

    // ========== Order Items ==========

    /// Store an order item and index it under its order
    pub fn store_item(&self, txn: &WriteTransaction, item: &OrderItem) -> StorageResult<()> {
        {
            let mut table = txn.open_table(ORDER_ITEMS_TABLE)?;
            let value = serde_json::to_vec(item)?;
            table.insert(item.id.as_str(), value.as_slice())?;
        }
        let mut index = txn.open_table(ORDER_ITEM_INDEX_TABLE)?;
        index.insert((item.order_id.as_str(), item.id.as_str()), ())?;
        Ok(())
    }

    /// Get an order item by ID
    pub fn get_item(&self, item_id: &str) -> StorageResult<Option<OrderItem>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ORDER_ITEMS_TABLE)?;

        match table.get(item_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Get an order item by ID (within transaction)
    pub fn get_item_txn(
        &self,
        txn: &WriteTransaction,
        item_id: &str,
    ) -> StorageResult<Option<OrderItem>> {
        let table = txn.open_table(ORDER_ITEMS_TABLE)?;

        match table.get(item_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Get all items of an order, in line order
    pub fn get_items_for_order(&self, order_id: &str) -> StorageResult<Vec<OrderItem>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(ORDER_ITEM_INDEX_TABLE)?;
        let items_table = read_txn.open_table(ORDER_ITEMS_TABLE)?;

        let mut items = Vec::new();
        for result in index.range((order_id, "")..)? {
            let (key, _value) = result?;
            let (owner, item_id) = key.value();
            if owner != order_id {
                break;
            }
            if let Some(value) = items_table.get(item_id)? {
                items.push(serde_json::from_slice::<OrderItem>(value.value())?);
            }
        }

        // Index is keyed by item id; present lines as submitted
        items.sort_by_key(|item| item.position);
        Ok(items)
    }

    /// Update a single order item row in its own transaction
    ///
    /// The closure sees the current row; the new row is committed atomically.
    pub fn update_item(
        &self,
        item_id: &str,
        apply: impl FnOnce(&mut OrderItem),
    ) -> StorageResult<OrderItem> {
        let txn = self.begin_write()?;
        let mut item = self
            .get_item_txn(&txn, item_id)?
            .ok_or_else(|| StorageError::ItemNotFound(item_id.to_string()))?;
        apply(&mut item);
        self.store_item(&txn, &item)?;
        txn.commit()?;
        Ok(item)
    }

    /// IDs of orders having at least one item whose PDF link needs a refresh
    pub fn orders_with_expiring_urls(&self, now: i64, margin_ms: i64) -> StorageResult<Vec<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ORDER_ITEMS_TABLE)?;

        let mut order_ids: Vec<String> = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            let item: OrderItem = serde_json::from_slice(value.value())?;
            if item.url_needs_refresh(now, margin_ms) && !order_ids.contains(&item.order_id) {
                order_ids.push(item.order_id);
            }
        }

        Ok(order_ids)
    }

    // ========== Generation Queue ==========

    /// Store a queue entry (insert or replace)
    pub fn store_entry(
        &self,
        txn: &WriteTransaction,
        entry: &GenerationQueueEntry,
    ) -> StorageResult<()> {
        let mut table = txn.open_table(GENERATION_QUEUE_TABLE)?;
        let value = serde_json::to_vec(entry)?;
        table.insert(entry.id.as_str(), value.as_slice())?;
        Ok(())
    }

    /// Get a queue entry by ID
    pub fn get_entry(&self, entry_id: &str) -> StorageResult<Option<GenerationQueueEntry>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(GENERATION_QUEUE_TABLE)?;

        match table.get(entry_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Get a queue entry by ID (within transaction)
    pub fn get_entry_txn(
        &self,
        txn: &WriteTransaction,
        entry_id: &str,
    ) -> StorageResult<Option<GenerationQueueEntry>> {
        let table = txn.open_table(GENERATION_QUEUE_TABLE)?;

        match table.get(entry_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// List queue entries, oldest first, optionally filtered by status
    pub fn list_entries(
        &self,
        status: Option<GenerationStatus>,
    ) -> StorageResult<Vec<GenerationQueueEntry>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(GENERATION_QUEUE_TABLE)?;

        let mut entries: Vec<GenerationQueueEntry> = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            let entry: GenerationQueueEntry = serde_json::from_slice(value.value())?;
            if status.is_none_or(|s| entry.status == s) {
                entries.push(entry);
            }
        }

        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(entries)
    }

    /// Link an order item to its queue entry
    pub fn link_item_entry(
        &self,
        txn: &WriteTransaction,
        item_id: &str,
        entry_id: &str,
    ) -> StorageResult<()> {
        let mut table = txn.open_table(ITEM_GENERATION_TABLE)?;
        table.insert(item_id, entry_id)?;
        Ok(())
    }

    /// Queue entry ID of an order item (within transaction)
    pub fn entry_id_for_item_txn(
        &self,
        txn: &WriteTransaction,
        item_id: &str,
    ) -> StorageResult<Option<String>> {
        let table = txn.open_table(ITEM_GENERATION_TABLE)?;
        Ok(table.get(item_id)?.map(|guard| guard.value().to_string()))
    }

    /// Queue entry ID of an order item
    pub fn entry_id_for_item(&self, item_id: &str) -> StorageResult<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ITEM_GENERATION_TABLE)?;
        Ok(table.get(item_id)?.map(|guard| guard.value().to_string()))
    }
}
