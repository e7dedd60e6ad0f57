//! Order Monitor - 周期性派发生成任务与刷新签名链接
//!
//! # 状态
//!
//! ```text
//! Idle ──start()──▶ Running { cancel, handle } ──stop()──▶ Idle
//! ```
//!
//! 控制调用由异步互斥锁串行化：并发 `start()` 只会产生一个循环，
//! `stop()` 会等待循环任务退出后才返回。
//!
//! # 每个 tick
//!
//! 1. 派发所有 pending 条目到 [`GenerationWorker`]
//! 2. 将超时且不在本进程执行中的 processing 条目标记为 failed
//! 3. 刷新即将过期的订单链接 (按订单指数退避，超过阈值发出告警)

mod backoff;

pub use backoff::MonitorAlert;

use backoff::RefreshBackoff;
use futures::FutureExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use shared::models::GenerationStatus;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::artifacts::UrlRefresher;
use crate::core::Config;
use crate::generation::{GenerationWorker, QueueError};
use crate::store::BookStorage;

/// Monitor tuning
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub interval: Duration,
    pub refresh_max_failures: u32,
    pub refresh_backoff_base: Duration,
    pub refresh_backoff_max: Duration,
}

impl MonitorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.monitor_interval(),
            refresh_max_failures: config.refresh_max_failures,
            refresh_backoff_base: Duration::from_secs(config.refresh_backoff_base_secs),
            refresh_backoff_max: Duration::from_secs(config.refresh_backoff_max_secs),
        }
    }
}

/// Monitor snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorStatus {
    pub running: bool,
    pub started_at: Option<i64>,
    pub last_tick_at: Option<i64>,
    pub tick_count: u64,
    pub error_count: u64,
    pub interval_secs: u64,
    /// Generation calls currently running
    pub in_flight: usize,
    pub alerts: Vec<MonitorAlert>,
}

/// What one tick did
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TickReport {
    pub dispatched: usize,
    /// Stale `processing` entries failed
    pub recovered: usize,
    pub refreshed_orders: usize,
    pub refresh_failures: usize,
    /// Phases that hit an error
    pub errors: usize,
}

enum MonitorState {
    Idle,
    Running {
        cancel: CancellationToken,
        handle: JoinHandle<()>,
    },
}

#[derive(Debug, Default)]
struct MonitorStats {
    running: bool,
    started_at: Option<i64>,
    last_tick_at: Option<i64>,
    tick_count: u64,
    error_count: u64,
}

struct MonitorInner {
    state: Mutex<MonitorState>,
    stats: RwLock<MonitorStats>,
    backoff: RefreshBackoff,
    storage: BookStorage,
    worker: GenerationWorker,
    refresher: UrlRefresher,
    settings: MonitorSettings,
}

/// Background order monitor (cheap to clone)
#[derive(Clone)]
pub struct OrderMonitor {
    inner: Arc<MonitorInner>,
}

impl std::fmt::Debug for OrderMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderMonitor")
            .field("running", &self.is_running())
            .field("settings", &self.inner.settings)
            .finish()
    }
}

impl OrderMonitor {
    pub fn new(
        storage: BookStorage,
        worker: GenerationWorker,
        refresher: UrlRefresher,
        settings: MonitorSettings,
    ) -> Self {
        let backoff = RefreshBackoff::new(
            settings.refresh_backoff_base,
            settings.refresh_backoff_max,
            settings.refresh_max_failures,
        );
        Self {
            inner: Arc::new(MonitorInner {
                state: Mutex::new(MonitorState::Idle),
                stats: RwLock::new(MonitorStats::default()),
                backoff,
                storage,
                worker,
                refresher,
                settings,
            }),
        }
    }

    /// Start the loop; `false` if it was already running
    pub async fn start(&self) -> bool {
        let mut state = self.inner.state.lock().await;
        if matches!(*state, MonitorState::Running { .. }) {
            tracing::debug!("Monitor already running");
            return false;
        }

        let cancel = CancellationToken::new();
        let inner = self.inner.clone();
        let loop_cancel = cancel.clone();
        let handle = tokio::spawn(async move { inner.run(loop_cancel).await });
        *state = MonitorState::Running { cancel, handle };

        {
            let mut stats = self.inner.stats.write();
            stats.running = true;
            stats.started_at = Some(shared::util::now_millis());
        }
        tracing::info!(
            interval_secs = self.inner.settings.interval.as_secs(),
            "Order monitor started"
        );
        true
    }

    /// Stop the loop and wait for it to exit; `false` if it was idle
    ///
    /// In-flight generation calls keep running and persist their results.
    pub async fn stop(&self) -> bool {
        let mut state = self.inner.state.lock().await;
        let MonitorState::Running { cancel, handle } =
            std::mem::replace(&mut *state, MonitorState::Idle)
        else {
            tracing::debug!("Monitor already idle");
            return false;
        };

        cancel.cancel();
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Monitor loop ended abnormally");
        }

        {
            let mut stats = self.inner.stats.write();
            stats.running = false;
            stats.started_at = None;
        }
        tracing::info!(
            in_flight = self.inner.worker.in_flight_count(),
            "Order monitor stopped"
        );
        true
    }

    pub fn is_running(&self) -> bool {
        self.inner.stats.read().running
    }

    pub fn status(&self) -> MonitorStatus {
        let stats = self.inner.stats.read();
        MonitorStatus {
            running: stats.running,
            started_at: stats.started_at,
            last_tick_at: stats.last_tick_at,
            tick_count: stats.tick_count,
            error_count: stats.error_count,
            interval_secs: self.inner.settings.interval.as_secs(),
            in_flight: self.inner.worker.in_flight_count(),
            alerts: self.inner.backoff.alerts(),
        }
    }

    /// Run one tick outside the loop
    pub async fn tick_once(&self) -> TickReport {
        self.inner.tick_recorded(&CancellationToken::new()).await
    }
}

impl MonitorInner {
    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.settings.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            self.tick_recorded(&cancel).await;
        }
        tracing::debug!("Monitor loop exited");
    }

    /// Tick with panic isolation and stats bookkeeping
    async fn tick_recorded(&self, cancel: &CancellationToken) -> TickReport {
        let result = AssertUnwindSafe(self.tick(cancel)).catch_unwind().await;
        let report = match result {
            Ok(report) => report,
            Err(panic_info) => {
                let panic_msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                    (*s).to_string()
                } else if let Some(s) = panic_info.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                };
                tracing::error!(panic = %panic_msg, "Monitor tick panicked");
                TickReport {
                    errors: 1,
                    ..Default::default()
                }
            }
        };

        {
            let mut stats = self.stats.write();
            stats.tick_count += 1;
            stats.last_tick_at = Some(shared::util::now_millis());
            if report.errors > 0 {
                stats.error_count += 1;
            }
        }
        if report != TickReport::default() {
            tracing::debug!(
                dispatched = report.dispatched,
                recovered = report.recovered,
                refreshed_orders = report.refreshed_orders,
                refresh_failures = report.refresh_failures,
                errors = report.errors,
                "Monitor tick"
            );
        }
        report
    }

    async fn tick(&self, cancel: &CancellationToken) -> TickReport {
        let mut report = TickReport::default();

        match self.dispatch_pending(cancel).await {
            Ok(n) => report.dispatched = n,
            Err(e) => {
                tracing::warn!(error = %e, "Dispatch phase failed");
                report.errors += 1;
            }
        }
        if cancel.is_cancelled() {
            return report;
        }

        match self.recover_stale() {
            Ok(n) => report.recovered = n,
            Err(e) => {
                tracing::warn!(error = %e, "Stale entry sweep failed");
                report.errors += 1;
            }
        }
        if cancel.is_cancelled() {
            return report;
        }

        self.refresh_expiring(&mut report).await;
        report
    }

    /// Hand every pending entry to the worker, waiting for free slots
    async fn dispatch_pending(&self, cancel: &CancellationToken) -> Result<usize, QueueError> {
        let pending = self.worker.queue().list(Some(GenerationStatus::Pending))?;
        let mut dispatched = 0;

        for entry in pending {
            if self.worker.is_in_flight(&entry.id) {
                continue;
            }
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = self.worker.acquire() => match permit {
                    Some(permit) => permit,
                    None => break,
                },
            };

            match self.worker.dispatch(&entry.id, permit) {
                Ok((_, Some(_))) => dispatched += 1,
                Ok((_, None)) => {}
                Err(QueueError::Transition(e)) => {
                    tracing::debug!(entry_id = %entry.id, error = %e, "Entry left pending before dispatch");
                }
                Err(e) => {
                    tracing::warn!(entry_id = %entry.id, error = %e, "Failed to dispatch entry");
                }
            }
        }
        Ok(dispatched)
    }

    /// Fail `processing` entries no local task owns once they exceed the timeout
    fn recover_stale(&self) -> Result<usize, QueueError> {
        let now = shared::util::now_millis();
        let timeout_ms = i64::try_from(self.worker.timeout().as_millis()).unwrap_or(i64::MAX);
        let processing = self.worker.queue().list(Some(GenerationStatus::Processing))?;

        let mut recovered = 0;
        for entry in processing {
            if !entry.is_stale(now, timeout_ms) || self.worker.is_in_flight(&entry.id) {
                continue;
            }
            match self
                .worker
                .queue()
                .fail(&entry.id, "generation abandoned: no active worker before timeout")
            {
                Ok(_) => {
                    tracing::warn!(entry_id = %entry.id, started_at = ?entry.started_at, "Recovered stale generation entry");
                    recovered += 1;
                }
                Err(e) => tracing::warn!(entry_id = %entry.id, error = %e, "Failed to recover stale entry"),
            }
        }
        Ok(recovered)
    }

    async fn refresh_expiring(&self, report: &mut TickReport) {
        let now = shared::util::now_millis();
        let margin_ms = self.refresher.margin_ms();
        let order_ids = match self.storage.orders_with_expiring_urls(now, margin_ms) {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to scan expiring URLs");
                report.errors += 1;
                return;
            }
        };

        for order_id in order_ids {
            if !self.backoff.is_ready(&order_id, now) {
                continue;
            }
            let failure = match self.refresher.refresh_order_urls(&order_id).await {
                Ok(r) if r.has_failures() => Some(format!("{} item(s) failed to refresh", r.failed)),
                Ok(_) => None,
                Err(e) => Some(e.to_string()),
            };

            match failure {
                None => {
                    self.backoff.record_success(&order_id);
                    report.refreshed_orders += 1;
                }
                Some(error) => {
                    report.refresh_failures += 1;
                    tracing::warn!(order_id = %order_id, error = %error, "Order URL refresh failed");
                    if let Some(alert) =
                        self.backoff
                            .record_failure(&order_id, &error, shared::util::now_millis())
                    {
                        tracing::error!(
                            target: "alert",
                            order_id = %alert.order_id,
                            consecutive_failures = alert.consecutive_failures,
                            last_error = %alert.last_error,
                            "Signed URL refresh keeps failing, operator attention required"
                        );
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{LocalArtifactStore, UrlSigner};
    use crate::generation::{
        BookRequest, GeneratedBook, GeneratedImage, GenerationProvider, GenerationQueue,
        ImageKind, ImageRequest, ProviderResult,
    };
    use async_trait::async_trait;

    struct InstantProvider;

    #[async_trait]
    impl GenerationProvider for InstantProvider {
        async fn generate_book(&self, _request: &BookRequest) -> ProviderResult<GeneratedBook> {
            Ok(GeneratedBook {
                pdf: b"%PDF".to_vec(),
                cover: None,
            })
        }

        async fn generate_image(&self, _kind: ImageKind, _request: &ImageRequest) -> ProviderResult<GeneratedImage> {
            Ok(GeneratedImage {
                bytes: vec![1],
                format: "png".to_string(),
            })
        }

        async fn analyze_book(&self, _book_id: &str) -> ProviderResult<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }
    }

    fn monitor(dir: &std::path::Path) -> OrderMonitor {
        let storage = BookStorage::open_in_memory().unwrap();
        let signer = UrlSigner::new("secret", "http://localhost:5000").unwrap();
        let artifacts = Arc::new(LocalArtifactStore::new(dir.join("artifacts"), signer));
        let worker = GenerationWorker::new(
            GenerationQueue::new(storage.clone()),
            Arc::new(InstantProvider),
            artifacts.clone(),
            2,
            Duration::from_secs(5),
            Duration::from_secs(3600),
        );
        let refresher = UrlRefresher::new(
            storage.clone(),
            artifacts,
            Duration::from_secs(3600),
            Duration::from_secs(60),
        );
        OrderMonitor::new(
            storage,
            worker,
            refresher,
            MonitorSettings {
                interval: Duration::from_millis(20),
                refresh_max_failures: 3,
                refresh_backoff_base: Duration::from_secs(1),
                refresh_backoff_max: Duration::from_secs(10),
            },
        )
    }

    #[tokio::test]
    async fn test_start_stop_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let m = monitor(dir.path());

        assert!(!m.stop().await);
        assert!(m.start().await);
        assert!(!m.start().await);
        assert!(m.status().running);
        assert!(m.status().started_at.is_some());

        assert!(m.stop().await);
        assert!(!m.stop().await);
        let status = m.status();
        assert!(!status.running);
        assert!(status.started_at.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_starts_leave_one_loop() {
        let dir = tempfile::tempdir().unwrap();
        let m = monitor(dir.path());

        let results = futures::future::join_all((0..8).map(|_| {
            let m = m.clone();
            async move { m.start().await }
        }))
        .await;
        assert_eq!(results.iter().filter(|started| **started).count(), 1);
        assert!(m.stop().await);
    }

    #[tokio::test]
    async fn test_loop_ticks_until_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let m = monitor(dir.path());
        m.start().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        m.stop().await;

        let ticks = m.status().tick_count;
        assert!(ticks >= 1);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(m.status().tick_count, ticks);
    }

    #[tokio::test]
    async fn test_tick_once_on_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let m = monitor(dir.path());
        let report = m.tick_once().await;
        assert_eq!(report, TickReport::default());
        assert_eq!(m.status().tick_count, 1);
        assert_eq!(m.status().error_count, 0);
    }
}
