//! Input validation helpers
//!
//! Centralized length limits and validation functions shared by order
//! ingestion, the generation queue and the HTTP handlers.

use shared::error::AppError;
use thiserror::Error;

// ── Text length limits ──────────────────────────────────────────────

/// Identifiers: book_id, order ids
pub const MAX_ID_LEN: usize = 128;

/// Names: child_name, gender labels
pub const MAX_NAME_LEN: usize = 200;

/// URLs / image references
pub const MAX_URL_LEN: usize = 2048;

/// Free-text prompts for image generation
pub const MAX_PROMPT_LEN: usize = 2000;

/// Uploaded file names
pub const MAX_FILENAME_LEN: usize = 255;

/// Malformed input, reported to the caller and never retried
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::validation(err.0)
    }
}

/// Validate that a required string is non-empty and within the length limit.
pub fn validate_required_text(value: &str, field: &str, max_len: usize) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError(format!("{field} must not be empty")));
    }
    if value.len() > max_len {
        return Err(ValidationError(format!(
            "{field} is too long ({} chars, max {max_len})",
            value.len()
        )));
    }
    Ok(())
}

/// Validate that an optional string, if present, is within the length limit.
pub fn validate_optional_text(
    value: &Option<String>,
    field: &str,
    max_len: usize,
) -> Result<(), ValidationError> {
    if let Some(v) = value
        && v.len() > max_len
    {
        return Err(ValidationError(format!(
            "{field} is too long ({} chars, max {max_len})",
            v.len()
        )));
    }
    Ok(())
}

/// Validate a bare file name (no directories, no traversal).
pub fn validate_filename(name: &str) -> Result<(), ValidationError> {
    if name.is_empty()
        || name.len() > MAX_FILENAME_LEN
        || name.contains("..")
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
        || name.starts_with('.')
    {
        return Err(ValidationError(format!("Invalid filename: {name}")));
    }
    Ok(())
}
