//! Server State
//!
//! 所有组件在这里装配一次，并以 `Clone` 方式注入到 axum handlers。
//! 克隆成本很低：每个组件内部都是 `Arc`。

use std::sync::Arc;

use crate::artifacts::{ArtifactStore, LocalArtifactStore, UrlRefresher, UrlSigner};
use crate::core::{Config, Result, ServerError};
use crate::generation::{
    GenerationProvider, GenerationQueue, GenerationWorker, HttpGenerationProvider,
};
use crate::monitor::{MonitorSettings, OrderMonitor};
use crate::orders::OrderService;
use crate::store::{BookStorage, DATABASE_FILE};

/// 服务器状态 - 持有所有服务的共享引用
///
/// | 字段 | 说明 |
/// |------|------|
/// | config | 配置 (不可变) |
/// | storage | redb 存储 |
/// | artifacts | 产物存储 |
/// | signer | 签名链接签发与校验 |
/// | queue / worker | 生成队列与执行器 |
/// | refresher | 链接刷新 |
/// | orders | 订单服务 |
/// | monitor | 订单监控 |
#[derive(Clone)]
pub struct ServerState {
    pub config: Config,
    pub storage: BookStorage,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub signer: UrlSigner,
    pub queue: GenerationQueue,
    pub worker: GenerationWorker,
    pub refresher: UrlRefresher,
    pub orders: OrderService,
    pub monitor: OrderMonitor,
}

impl std::fmt::Debug for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerState")
            .field("config", &self.config)
            .field("worker", &self.worker)
            .field("monitor", &self.monitor)
            .finish_non_exhaustive()
    }
}

impl ServerState {
    /// Build the production state from config
    ///
    /// Creates the work dir layout, opens `{work_dir}/database/books.redb`
    /// and connects the HTTP generation provider.
    pub fn initialize(config: &Config) -> Result<Self> {
        config.ensure_work_dir_structure()?;

        let db_path = config.database_dir().join(DATABASE_FILE);
        let storage = BookStorage::open(&db_path)?;
        tracing::info!(path = %db_path.display(), "Database opened");

        let signer = UrlSigner::new(&config.signing_secret, &config.public_base_url)
            .map_err(|e| ServerError::Internal(anyhow::anyhow!(e)))?;
        let artifacts: Arc<dyn ArtifactStore> =
            Arc::new(LocalArtifactStore::new(config.artifacts_dir(), signer.clone()));
        let provider: Arc<dyn GenerationProvider> = Arc::new(HttpGenerationProvider::new(
            config.ai_provider_url.clone(),
            config.ai_provider_api_key.clone(),
        ));

        Ok(Self::with_components(config.clone(), storage, artifacts, signer, provider))
    }

    /// Assemble state from ready-made components
    pub fn with_components(
        config: Config,
        storage: BookStorage,
        artifacts: Arc<dyn ArtifactStore>,
        signer: UrlSigner,
        provider: Arc<dyn GenerationProvider>,
    ) -> Self {
        let queue = GenerationQueue::new(storage.clone());
        let worker = GenerationWorker::new(
            queue.clone(),
            provider,
            artifacts.clone(),
            config.generation_concurrency,
            config.generation_timeout(),
            config.signed_url_ttl(),
        );
        let refresher = UrlRefresher::new(
            storage.clone(),
            artifacts.clone(),
            config.signed_url_ttl(),
            config.url_refresh_margin(),
        );
        let orders = OrderService::new(storage.clone(), queue.clone(), refresher.clone());
        let monitor = OrderMonitor::new(
            storage.clone(),
            worker.clone(),
            refresher.clone(),
            MonitorSettings::from_config(&config),
        );

        Self {
            config,
            storage,
            artifacts,
            signer,
            queue,
            worker,
            refresher,
            orders,
            monitor,
        }
    }

    /// Start the monitor unless `AUTO_START_MONITOR=false`
    pub async fn start_background_tasks(&self) {
        if self.config.auto_start_monitor {
            self.monitor.start().await;
        } else {
            tracing::info!("Monitor auto-start disabled");
        }
    }

    /// Stop the monitor, then wait for in-flight generation calls
    pub async fn shutdown(&self) {
        self.monitor.stop().await;
        if self.worker.drain(self.config.shutdown_timeout()).await {
            tracing::info!("All generation jobs settled");
        }
    }
}
