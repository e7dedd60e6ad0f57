//! 个性化书籍生成
//!
//! - [`GenerationQueue`] - 持久化状态机 (pending → processing → completed | failed)
//! - [`GenerationWorker`] - 有界并发执行器
//! - [`GenerationProvider`] - 外部 AI 服务抽象

pub mod provider;
mod queue;
mod worker;

pub use provider::{
    BookRequest, GeneratedBook, GeneratedImage, GenerationProvider, HttpGenerationProvider,
    ImageKind, ImageRequest, ProviderError, ProviderResult,
};
pub use queue::{GenerationQueue, QueueError, QueueResult};
pub use worker::GenerationWorker;
