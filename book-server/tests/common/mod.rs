//! Shared fixtures for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use book_server::artifacts::{
    ArtifactError, ArtifactResult, ArtifactStore, LocalArtifactStore, UrlSigner,
};
use book_server::generation::{
    BookRequest, GeneratedBook, GeneratedImage, GenerationProvider, ImageKind, ImageRequest,
    ProviderError, ProviderResult,
};
use book_server::{BookStorage, Config, ServerState};
use shared::models::{NewOrder, NewOrderItem, OrderDetail, PaymentStatus, PersonalizationData, SignedUrl};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

/// Child names that script the provider
pub const SLOW: &str = "Slow";
pub const BROKEN: &str = "Broken";
pub const GATED: &str = "Gated";

/// Provider double driven by the child name:
/// - `Slow` sleeps far past any test timeout
/// - `Broken` returns a provider error
/// - `Gated` signals `started` and waits for `release`
/// - anything else succeeds immediately
#[derive(Default)]
pub struct ScriptedProvider {
    pub calls: AtomicUsize,
    pub started: Notify,
    pub release: Notify,
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    async fn generate_book(&self, request: &BookRequest) -> ProviderResult<GeneratedBook> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match request.child_name.as_str() {
            SLOW => tokio::time::sleep(Duration::from_secs(60)).await,
            BROKEN => {
                return Err(ProviderError::Status {
                    status: 503,
                    message: "model unavailable".to_string(),
                });
            }
            GATED => {
                self.started.notify_one();
                self.release.notified().await;
            }
            _ => {}
        }
        Ok(GeneratedBook {
            pdf: format!("%PDF-1.7 book for {}", request.child_name).into_bytes(),
            cover: None,
        })
    }

    async fn generate_image(&self, _kind: ImageKind, request: &ImageRequest) -> ProviderResult<GeneratedImage> {
        if request.child_name == SLOW {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        Ok(GeneratedImage {
            bytes: vec![0x89, b'P', b'N', b'G'],
            format: "png".to_string(),
        })
    }

    async fn analyze_book(&self, book_id: &str) -> ProviderResult<serde_json::Value> {
        Ok(serde_json::json!({ "book_id": book_id, "pages": 24, "characters": ["hero"] }))
    }
}

/// Local store whose signing can be switched off
pub struct FlakyArtifactStore {
    pub inner: LocalArtifactStore,
    pub fail_signing: AtomicBool,
}

#[async_trait]
impl ArtifactStore for FlakyArtifactStore {
    async fn put(&self, object_key: &str, bytes: Vec<u8>) -> ArtifactResult<()> {
        self.inner.put(object_key, bytes).await
    }

    async fn get(&self, object_key: &str) -> ArtifactResult<Vec<u8>> {
        self.inner.get(object_key).await
    }

    async fn exists(&self, object_key: &str) -> ArtifactResult<bool> {
        self.inner.exists(object_key).await
    }

    async fn delete(&self, object_key: &str) -> ArtifactResult<()> {
        self.inner.delete(object_key).await
    }

    async fn signed_url(&self, object_key: &str, ttl: Duration) -> ArtifactResult<SignedUrl> {
        if self.fail_signing.load(Ordering::SeqCst) {
            return Err(ArtifactError::Storage("signing backend unavailable".to_string()));
        }
        self.inner.signed_url(object_key, ttl).await
    }
}

pub struct TestApp {
    pub dir: tempfile::TempDir,
    pub state: ServerState,
    pub provider: Arc<ScriptedProvider>,
    pub artifacts: Arc<FlakyArtifactStore>,
}

/// Config for tests: 1s generation timeout, monitor off, instant backoff
pub fn test_config(dir: &std::path::Path) -> Config {
    let mut config = Config::with_overrides(dir.to_string_lossy().to_string(), 5000);
    config.auto_start_monitor = false;
    config.monitor_interval_secs = 1;
    config.generation_timeout_secs = 1;
    config.generation_concurrency = 3;
    config.refresh_backoff_base_secs = 0;
    config.refresh_backoff_max_secs = 0;
    config.refresh_max_failures = 2;
    config.max_pdf_size_mb = 1;
    config.shutdown_timeout_ms = 5_000;
    config
}

pub fn test_app() -> TestApp {
    test_app_with(|_| {})
}

pub fn test_app_with(customize: impl FnOnce(&mut Config)) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    customize(&mut config);
    config.ensure_work_dir_structure().unwrap();

    let storage = BookStorage::open_in_memory().unwrap();
    let signer = UrlSigner::new(&config.signing_secret, &config.public_base_url).unwrap();
    let artifacts = Arc::new(FlakyArtifactStore {
        inner: LocalArtifactStore::new(config.artifacts_dir(), signer.clone()),
        fail_signing: AtomicBool::new(false),
    });
    let provider = Arc::new(ScriptedProvider::default());

    let state = ServerState::with_components(
        config,
        storage,
        artifacts.clone(),
        signer,
        provider.clone(),
    );
    TestApp {
        dir,
        state,
        provider,
        artifacts,
    }
}

/// Order with one item per entry; `Some(name)` items are personalized
pub fn place_order(state: &ServerState, children: &[Option<&str>]) -> OrderDetail {
    let items = children
        .iter()
        .map(|child| NewOrderItem {
            book_id: "book-dragon".to_string(),
            quantity: 1,
            unit_price: 24.0,
            personalization_data: child.map(|name| PersonalizationData {
                child_name: name.to_string(),
                child_age: Some(6),
                child_gender: None,
                child_image_url: Some(format!("https://img.example/{name}.png")),
            }),
        })
        .collect();
    state
        .orders
        .create_order(NewOrder {
            payment_status: Some(PaymentStatus::Paid),
            shipping_address: None,
            billing_address: None,
            items,
        })
        .unwrap()
}

/// Poll `check` every 20ms until it holds or `timeout` elapses
pub async fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
