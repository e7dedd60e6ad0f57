//! Shared types for the book pipeline
//!
//! Common types used by book-server and its clients: error codes,
//! response envelope, and the order / generation data models.

pub mod error;
pub mod models;
pub mod util;

// Re-exports
pub use axum::{Json, body};
pub use http;
pub use serde::{Deserialize, Serialize};

pub use error::{ApiResponse, AppError, AppResult, ErrorCode};
