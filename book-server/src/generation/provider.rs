//! AI generation provider seam
//!
//! [`GenerationProvider`] 抽象外部 AI 服务；生产实现
//! [`HttpGenerationProvider`] 通过 JSON + base64 调用远端服务。

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use shared::error::{AppError, ErrorCode};
use std::time::Duration;
use thiserror::Error;

/// Provider errors
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider request failed: {0}")]
    Request(String),

    #[error("Provider returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Provider timed out after {0:?}")]
    Timeout(Duration),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Timeout(_) => {
                AppError::with_message(ErrorCode::ProviderTimeout, err.to_string())
            }
            other => AppError::with_message(ErrorCode::ProviderFailed, other.to_string()),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::InvalidResponse(err.to_string())
        } else {
            ProviderError::Request(err.to_string())
        }
    }
}

/// Which single image to generate
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ImageKind {
    Image,
    Cover,
}

impl ImageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Cover => "cover",
        }
    }
}

/// Input for a single image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRequest {
    pub book_id: String,
    pub child_name: String,
    #[serde(default)]
    pub child_image_url: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
}

/// Input for a complete personalized book
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookRequest {
    pub order_id: String,
    pub order_item_id: String,
    pub book_id: String,
    pub child_name: String,
    pub child_image_url: Option<String>,
}

/// Generated image bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    /// File extension, e.g. `png`
    pub format: String,
}

/// Generated book artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedBook {
    pub pdf: Vec<u8>,
    pub cover: Option<GeneratedImage>,
}

/// External AI service
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Generate the complete book PDF (plus optional cover)
    async fn generate_book(&self, request: &BookRequest) -> ProviderResult<GeneratedBook>;

    async fn generate_image(
        &self,
        kind: ImageKind,
        request: &ImageRequest,
    ) -> ProviderResult<GeneratedImage>;

    /// Analyze a template book; the result is passed through untouched
    async fn analyze_book(&self, book_id: &str) -> ProviderResult<serde_json::Value>;
}

// ========== HTTP provider ==========

#[derive(Deserialize)]
struct ImagePayload {
    image_base64: String,
    #[serde(default = "default_image_format")]
    format: String,
}

#[derive(Deserialize)]
struct BookPayload {
    pdf_base64: String,
    #[serde(default)]
    cover_base64: Option<String>,
    #[serde(default = "default_image_format")]
    cover_format: String,
}

fn default_image_format() -> String {
    "png".to_string()
}

fn decode(field: &str, data: &str) -> ProviderResult<Vec<u8>> {
    BASE64
        .decode(data)
        .map_err(|e| ProviderError::InvalidResponse(format!("{field}: {e}")))
}

/// Provider reached over HTTP (`POST {base}/generate-book` etc.)
#[derive(Clone)]
pub struct HttpGenerationProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl std::fmt::Debug for HttpGenerationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGenerationProvider")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

impl HttpGenerationProvider {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    async fn post<B: Serialize + ?Sized, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> ProviderResult<R> {
        let mut req = self.client.post(format!("{}{}", self.base_url, path)).json(body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            tracing::warn!(path = %path, status = %status, "Provider returned non-success status");
            return Err(ProviderError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp.json::<R>().await?)
    }
}

#[async_trait]
impl GenerationProvider for HttpGenerationProvider {
    async fn generate_book(&self, request: &BookRequest) -> ProviderResult<GeneratedBook> {
        let payload: BookPayload = self.post("/generate-book", request).await?;
        let pdf = decode("pdf_base64", &payload.pdf_base64)?;
        if pdf.is_empty() {
            return Err(ProviderError::InvalidResponse("empty PDF".to_string()));
        }
        let cover = match payload.cover_base64 {
            Some(data) => Some(GeneratedImage {
                bytes: decode("cover_base64", &data)?,
                format: payload.cover_format,
            }),
            None => None,
        };
        Ok(GeneratedBook { pdf, cover })
    }

    async fn generate_image(
        &self,
        kind: ImageKind,
        request: &ImageRequest,
    ) -> ProviderResult<GeneratedImage> {
        let path = match kind {
            ImageKind::Image => "/generate-image",
            ImageKind::Cover => "/generate-cover",
        };
        let payload: ImagePayload = self.post(path, request).await?;
        Ok(GeneratedImage {
            bytes: decode("image_base64", &payload.image_base64)?,
            format: payload.format,
        })
    }

    async fn analyze_book(&self, book_id: &str) -> ProviderResult<serde_json::Value> {
        self.post("/analyze-book", &serde_json::json!({ "book_id": book_id }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_codes() {
        let err: AppError = ProviderError::Timeout(Duration::from_secs(120)).into();
        assert_eq!(err.code, ErrorCode::ProviderTimeout);

        let err: AppError = ProviderError::Status {
            status: 500,
            message: "boom".to_string(),
        }
        .into();
        assert_eq!(err.code, ErrorCode::ProviderFailed);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert_eq!(decode("f", "aGVsbG8=").unwrap(), b"hello");
        assert!(matches!(
            decode("f", "not base64!").unwrap_err(),
            ProviderError::InvalidResponse(_)
        ));
    }

    // ========== Wire contract against a local stub service ==========

    mod stub {
        use super::*;
        use axum::http::{HeaderMap, StatusCode, header};
        use axum::{Json, Router, routing::post};
        use serde_json::{Value, json};

        fn auth(headers: &HeaderMap) -> Value {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map_or(Value::Null, |v| Value::String(v.to_string()))
        }

        async fn generate_book(Json(req): Json<BookRequest>) -> Json<Value> {
            let body = match req.child_name.as_str() {
                "Empty" => json!({ "pdf_base64": "" }),
                "Garbage" => json!({ "pdf_base64": "not base64!" }),
                "NoCover" => json!({ "pdf_base64": BASE64.encode(b"%PDF-1.7 plain") }),
                name => json!({
                    "pdf_base64": BASE64.encode(format!("%PDF-1.7 {name}")),
                    "cover_base64": BASE64.encode(b"cover-bytes"),
                    "cover_format": "jpg",
                }),
            };
            Json(body)
        }

        async fn generate_image(Json(req): Json<ImageRequest>) -> Json<Value> {
            Json(json!({ "image_base64": BASE64.encode(format!("image:{}", req.child_name)) }))
        }

        async fn generate_cover(Json(req): Json<ImageRequest>) -> Json<Value> {
            Json(json!({
                "image_base64": BASE64.encode(format!("cover:{}", req.child_name)),
                "format": "webp",
            }))
        }

        async fn analyze_book(
            headers: HeaderMap,
            Json(body): Json<Value>,
        ) -> Result<Json<Value>, (StatusCode, String)> {
            if body["book_id"] == "missing" {
                return Err((StatusCode::NOT_FOUND, "unknown book".to_string()));
            }
            Ok(Json(json!({ "book_id": body["book_id"], "authorization": auth(&headers) })))
        }

        /// Serve the stub on an ephemeral port and return its base URL
        pub(super) async fn spawn() -> String {
            let app = Router::new()
                .route("/generate-book", post(generate_book))
                .route("/generate-image", post(generate_image))
                .route("/generate-cover", post(generate_cover))
                .route("/analyze-book", post(analyze_book));
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });
            format!("http://{addr}/")
        }
    }

    fn book_request(child_name: &str) -> BookRequest {
        BookRequest {
            order_id: "order-1".to_string(),
            order_item_id: "item-1".to_string(),
            book_id: "book-dragon".to_string(),
            child_name: child_name.to_string(),
            child_image_url: None,
        }
    }

    fn image_request(child_name: &str) -> ImageRequest {
        ImageRequest {
            book_id: "book-dragon".to_string(),
            child_name: child_name.to_string(),
            child_image_url: None,
            prompt: None,
        }
    }

    #[tokio::test]
    async fn test_generate_book_decodes_pdf_and_cover() {
        let provider = HttpGenerationProvider::new(stub::spawn().await, None);

        let book = provider.generate_book(&book_request("Ava")).await.unwrap();
        assert_eq!(book.pdf, b"%PDF-1.7 Ava");
        let cover = book.cover.unwrap();
        assert_eq!(cover.bytes, b"cover-bytes");
        assert_eq!(cover.format, "jpg");

        let plain = provider.generate_book(&book_request("NoCover")).await.unwrap();
        assert_eq!(plain.pdf, b"%PDF-1.7 plain");
        assert!(plain.cover.is_none());
    }

    #[tokio::test]
    async fn test_generate_book_rejects_empty_or_undecodable_pdf() {
        let provider = HttpGenerationProvider::new(stub::spawn().await, None);

        let err = provider.generate_book(&book_request("Empty")).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(ref m) if m.contains("empty PDF")));

        let err = provider.generate_book(&book_request("Garbage")).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(ref m) if m.starts_with("pdf_base64")));
    }

    #[tokio::test]
    async fn test_image_kinds_hit_their_own_routes() {
        let provider = HttpGenerationProvider::new(stub::spawn().await, None);

        let image = provider
            .generate_image(ImageKind::Image, &image_request("Ava"))
            .await
            .unwrap();
        assert_eq!(image.bytes, b"image:Ava");
        assert_eq!(image.format, "png");

        let cover = provider
            .generate_image(ImageKind::Cover, &image_request("Ava"))
            .await
            .unwrap();
        assert_eq!(cover.bytes, b"cover:Ava");
        assert_eq!(cover.format, "webp");
    }

    #[tokio::test]
    async fn test_bearer_key_sent_only_when_configured() {
        let base = stub::spawn().await;

        let keyed = HttpGenerationProvider::new(base.clone(), Some("k-123".to_string()));
        let analysis = keyed.analyze_book("book-dragon").await.unwrap();
        assert_eq!(analysis["book_id"], "book-dragon");
        assert_eq!(analysis["authorization"], "Bearer k-123");

        let anonymous = HttpGenerationProvider::new(base, None);
        let analysis = anonymous.analyze_book("book-dragon").await.unwrap();
        assert!(analysis["authorization"].is_null());
    }

    #[tokio::test]
    async fn test_non_success_status_maps_to_status_error() {
        let provider = HttpGenerationProvider::new(stub::spawn().await, None);

        match provider.analyze_book("missing").await.unwrap_err() {
            ProviderError::Status { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "unknown book");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_service_is_request_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let provider = HttpGenerationProvider::new(format!("http://{addr}"), None);
        let err = provider.analyze_book("book-dragon").await.unwrap_err();
        assert!(matches!(err, ProviderError::Request(_)));
    }

    #[test]
    fn test_base_url_is_normalized() {
        let provider = HttpGenerationProvider::new("http://ai.local/", Some("key".into()));
        assert_eq!(provider.base_url, "http://ai.local");
        assert!(!format!("{provider:?}").contains("key\""));
    }
}
