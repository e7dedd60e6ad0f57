//! Data models
//!
//! Shared between book-server and its HTTP clients (admin dashboard, checkout).
//! All IDs are UUID strings; all timestamps are Unix millis.

pub mod artifact;
pub mod generation;
pub mod order;

// Re-exports
pub use artifact::*;
pub use generation::*;
pub use order::*;
