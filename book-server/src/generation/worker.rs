//! Generation worker
//!
//! 有界并发 (Semaphore) 执行 AI 生成任务：
//!
//! ```text
//! dispatch(entry, permit)
//!     ├─ queue.start()            (同步, pending → processing)
//!     └─ tokio::spawn ─┐          (独立任务, 持有 permit)
//!                      ├─ timeout(provider.generate_book)
//!                      ├─ artifacts.put + signed_url
//!                      └─ queue.complete() / queue.fail()
//! ```
//!
//! 任务与 monitor 循环相互独立：monitor 停止只影响新的派发，
//! 已在执行的调用会完成并持久化结果。

use dashmap::DashMap;
use futures::FutureExt;
use shared::error::AppResult;
use shared::models::{GenerationQueueEntry, GenerationStatus, SignedUrl};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

use super::provider::{
    BookRequest, GeneratedBook, GenerationProvider, ImageKind, ImageRequest, ProviderError,
};
use super::queue::{GenerationQueue, QueueError, QueueResult};
use crate::artifacts::{ArtifactStore, book_cover_key, book_pdf_key};

/// Bounded pool running provider calls on detached tasks
#[derive(Clone)]
pub struct GenerationWorker {
    queue: GenerationQueue,
    provider: Arc<dyn GenerationProvider>,
    artifacts: Arc<dyn ArtifactStore>,
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    /// entry_id → started_at
    in_flight: Arc<DashMap<String, i64>>,
    timeout: Duration,
    url_ttl: Duration,
}

impl std::fmt::Debug for GenerationWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationWorker")
            .field("concurrency", &self.concurrency)
            .field("in_flight", &self.in_flight.len())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl GenerationWorker {
    pub fn new(
        queue: GenerationQueue,
        provider: Arc<dyn GenerationProvider>,
        artifacts: Arc<dyn ArtifactStore>,
        concurrency: usize,
        timeout: Duration,
        url_ttl: Duration,
    ) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            queue,
            provider,
            artifacts,
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            in_flight: Arc::new(DashMap::new()),
            timeout,
            url_ttl,
        }
    }

    pub fn queue(&self) -> &GenerationQueue {
        &self.queue
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_in_flight(&self, entry_id: &str) -> bool {
        self.in_flight.contains_key(entry_id)
    }

    /// Wait for a free slot; `None` once the pool is closed
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        self.semaphore.clone().acquire_owned().await.ok()
    }

    /// Start an entry and run it on its own task, holding `permit`
    ///
    /// The `pending → processing` transition is committed before this
    /// returns. An entry that is already in flight is returned unchanged.
    pub fn dispatch(
        &self,
        entry_id: &str,
        permit: OwnedSemaphorePermit,
    ) -> QueueResult<(GenerationQueueEntry, Option<JoinHandle<()>>)> {
        if self.in_flight.contains_key(entry_id) {
            return Ok((self.queue.get(entry_id)?, None));
        }

        let entry = self.queue.start(entry_id)?;
        let started_at = entry.started_at.unwrap_or_else(shared::util::now_millis);
        self.in_flight.insert(entry.id.clone(), started_at);

        tracing::info!(
            entry_id = %entry.id,
            order_item_id = %entry.order_item_id,
            attempt = entry.attempts,
            "Generation started"
        );

        let worker = self.clone();
        let job = entry.clone();
        let handle = tokio::spawn(async move {
            let entry_id = job.id.clone();
            let result = AssertUnwindSafe(worker.execute(job)).catch_unwind().await;
            if let Err(panic_info) = result {
                let panic_msg = panic_message(panic_info.as_ref());
                tracing::error!(entry_id = %entry_id, panic = %panic_msg, "Generation task panicked");
                if let Err(e) = worker.queue.fail(&entry_id, &format!("internal error: {panic_msg}")) {
                    tracing::error!(entry_id = %entry_id, error = %e, "Failed to record panicked generation");
                }
            }
            worker.in_flight.remove(&entry_id);
            drop(permit);
        });

        Ok((entry, Some(handle)))
    }

    /// Enqueue (if needed) and dispatch an order item right away
    ///
    /// Waits for a free slot. Entries that are not pending, including ones
    /// the monitor picked up while this call waited, are returned as is.
    pub async fn process_now(&self, order_item_id: &str) -> QueueResult<GenerationQueueEntry> {
        let entry = self.queue.enqueue(order_item_id)?;
        if entry.status != GenerationStatus::Pending {
            return Ok(entry);
        }
        let Some(permit) = self.acquire().await else {
            return Ok(entry);
        };

        let current = self.queue.get(&entry.id)?;
        if current.status != GenerationStatus::Pending {
            tracing::debug!(entry_id = %current.id, status = ?current.status, "Entry already taken, not dispatching");
            return Ok(current);
        }
        match self.dispatch(&current.id, permit) {
            Ok((entry, _)) => Ok(entry),
            Err(QueueError::Transition(_)) => self.queue.get(&current.id),
            Err(e) => Err(e),
        }
    }

    async fn execute(&self, entry: GenerationQueueEntry) {
        let request = BookRequest {
            order_id: entry.order_id.clone(),
            order_item_id: entry.order_item_id.clone(),
            book_id: entry.book_id.clone(),
            child_name: entry.child_name.clone(),
            child_image_url: entry.child_image_url.clone(),
        };

        let outcome = match tokio::time::timeout(self.timeout, self.provider.generate_book(&request)).await {
            Ok(Ok(book)) => self.store_book(&entry, book).await,
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(ProviderError::Timeout(self.timeout).to_string()),
        };

        match outcome {
            Ok((object_key, link)) => match self.queue.complete(&entry.id, &object_key, link.as_ref()) {
                Ok(_) => tracing::info!(entry_id = %entry.id, object_key = %object_key, "Generation completed"),
                Err(e) => tracing::error!(entry_id = %entry.id, error = %e, "Failed to record completed generation"),
            },
            Err(message) => {
                tracing::warn!(entry_id = %entry.id, error = %message, "Generation failed");
                if let Err(e) = self.queue.fail(&entry.id, &message) {
                    tracing::error!(entry_id = %entry.id, error = %e, "Failed to record failed generation");
                }
            }
        }
    }

    /// Persist the book artifacts; returns the PDF key and, when signing
    /// succeeded, its first link
    async fn store_book(
        &self,
        entry: &GenerationQueueEntry,
        book: GeneratedBook,
    ) -> Result<(String, Option<SignedUrl>), String> {
        let pdf_key = book_pdf_key(&entry.order_id, &entry.order_item_id);
        self.artifacts
            .put(&pdf_key, book.pdf)
            .await
            .map_err(|e| format!("failed to store PDF: {e}"))?;

        if let Some(cover) = book.cover {
            let cover_key = book_cover_key(&entry.order_id, &entry.order_item_id, &image_ext(&cover.format));
            if let Err(e) = self.artifacts.put(&cover_key, cover.bytes).await {
                tracing::warn!(entry_id = %entry.id, error = %e, "Failed to store cover, continuing");
            }
        }

        let link = match self.artifacts.signed_url(&pdf_key, self.url_ttl).await {
            Ok(link) => Some(link),
            Err(e) => {
                tracing::warn!(entry_id = %entry.id, error = %e, "Signing failed, link will be issued by the monitor");
                None
            }
        };
        Ok((pdf_key, link))
    }

    /// Generate one standalone image and return its link
    pub async fn render_image(&self, kind: ImageKind, request: &ImageRequest) -> AppResult<SignedUrl> {
        let image = tokio::time::timeout(self.timeout, self.provider.generate_image(kind, request))
            .await
            .map_err(|_| ProviderError::Timeout(self.timeout))??;

        let object_key = format!(
            "images/{}/{}-{}.{}",
            sanitize_segment(&request.book_id),
            kind.as_str(),
            shared::util::new_id(),
            image_ext(&image.format)
        );
        self.artifacts.put(&object_key, image.bytes).await?;
        let link = self.artifacts.signed_url(&object_key, self.url_ttl).await?;

        tracing::info!(kind = kind.as_str(), object_key = %object_key, "Image generated");
        Ok(link)
    }

    /// Provider book analysis, passed through
    pub async fn analyze_book(&self, book_id: &str) -> AppResult<serde_json::Value> {
        let analysis = tokio::time::timeout(self.timeout, self.provider.analyze_book(book_id))
            .await
            .map_err(|_| ProviderError::Timeout(self.timeout))??;
        Ok(analysis)
    }

    /// Wait until every in-flight job has released its slot
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let permits = u32::try_from(self.concurrency).unwrap_or(u32::MAX);
        match tokio::time::timeout(timeout, self.semaphore.acquire_many(permits)).await {
            Ok(Ok(_all)) => true,
            Ok(Err(_)) => true,
            Err(_) => {
                tracing::warn!(in_flight = self.in_flight.len(), "Generation jobs still running at shutdown");
                false
            }
        }
    }
}

fn panic_message(panic_info: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Lowercase alphanumeric extension, `png` when unusable
fn image_ext(format: &str) -> String {
    let ext = format.trim().trim_start_matches('.').to_ascii_lowercase();
    if !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        ext
    } else {
        "png".to_string()
    }
}

/// Object key segment from free-form input
fn sanitize_segment(value: &str) -> String {
    let cleaned: String = value
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() { "unknown".to_string() } else { cleaned }
}
