//! Unified error codes for the book pipeline
//!
//! This module defines all error codes used across book-server and its clients.
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 4xxx: Order errors
//! - 5xxx: Generation errors
//! - 6xxx: Artifact / file errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values for efficient serialization
/// and cross-language compatibility (Rust, TypeScript, etc.)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,

    // ==================== 4xxx: Order ====================
    /// Order not found
    OrderNotFound = 4001,
    /// Order item not found
    OrderItemNotFound = 4002,
    /// Order has no items
    OrderEmpty = 4003,
    /// Order status change not allowed
    InvalidOrderStatus = 4004,

    // ==================== 5xxx: Generation ====================
    /// Generation queue entry not found
    GenerationEntryNotFound = 5001,
    /// Illegal generation state transition
    InvalidTransition = 5002,
    /// AI provider returned an error
    ProviderFailed = 5003,
    /// AI provider did not answer in time
    ProviderTimeout = 5004,
    /// Order item carries no personalization data
    NotPersonalized = 5005,

    // ==================== 6xxx: Artifact ====================
    /// Stored artifact not found
    ArtifactNotFound = 6001,
    /// Artifact storage operation failed
    ArtifactStorageFailed = 6002,
    /// Signed URL signature mismatch
    SignatureInvalid = 6003,
    /// Signed URL has expired
    SignedUrlExpired = 6004,

    // ==================== 65xx: File Upload ====================
    /// File too large
    FileTooLarge = 6501,
    /// Unsupported file format
    UnsupportedFileFormat = 6502,
    /// No file provided in request
    NoFileProvided = 6504,
    /// Empty file provided
    EmptyFile = 6505,
    /// No filename provided
    NoFilename = 6506,
    /// Invalid filename (path traversal etc.)
    InvalidFilename = 6507,
    /// File storage failed
    FileStorageFailed = 6509,

    // ==================== 9xxx: System ====================
    /// Database error
    DatabaseError = 9002,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Get the developer-facing English message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",

            // Order
            ErrorCode::OrderNotFound => "Order not found",
            ErrorCode::OrderItemNotFound => "Order item not found",
            ErrorCode::OrderEmpty => "Order is empty",
            ErrorCode::InvalidOrderStatus => "Order status change is not allowed",

            // Generation
            ErrorCode::GenerationEntryNotFound => "Generation queue entry not found",
            ErrorCode::InvalidTransition => "Invalid generation status transition",
            ErrorCode::ProviderFailed => "Generation provider failed",
            ErrorCode::ProviderTimeout => "Generation provider timed out",
            ErrorCode::NotPersonalized => "Order item has no personalization data",

            // Artifact
            ErrorCode::ArtifactNotFound => "Artifact not found",
            ErrorCode::ArtifactStorageFailed => "Artifact storage failed",
            ErrorCode::SignatureInvalid => "Signed URL signature is invalid",
            ErrorCode::SignedUrlExpired => "Signed URL has expired",

            // File Upload
            ErrorCode::FileTooLarge => "File too large",
            ErrorCode::UnsupportedFileFormat => "Unsupported file format",
            ErrorCode::NoFileProvided => "No file provided",
            ErrorCode::EmptyFile => "Empty file provided",
            ErrorCode::NoFilename => "No filename provided",
            ErrorCode::InvalidFilename => "Invalid filename",
            ErrorCode::FileStorageFailed => "File storage failed",

            // System
            ErrorCode::DatabaseError => "Database error",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),

            // Order
            4001 => Ok(ErrorCode::OrderNotFound),
            4002 => Ok(ErrorCode::OrderItemNotFound),
            4003 => Ok(ErrorCode::OrderEmpty),
            4004 => Ok(ErrorCode::InvalidOrderStatus),

            // Generation
            5001 => Ok(ErrorCode::GenerationEntryNotFound),
            5002 => Ok(ErrorCode::InvalidTransition),
            5003 => Ok(ErrorCode::ProviderFailed),
            5004 => Ok(ErrorCode::ProviderTimeout),
            5005 => Ok(ErrorCode::NotPersonalized),

            // Artifact
            6001 => Ok(ErrorCode::ArtifactNotFound),
            6002 => Ok(ErrorCode::ArtifactStorageFailed),
            6003 => Ok(ErrorCode::SignatureInvalid),
            6004 => Ok(ErrorCode::SignedUrlExpired),

            // File Upload
            6501 => Ok(ErrorCode::FileTooLarge),
            6502 => Ok(ErrorCode::UnsupportedFileFormat),
            6504 => Ok(ErrorCode::NoFileProvided),
            6505 => Ok(ErrorCode::EmptyFile),
            6506 => Ok(ErrorCode::NoFilename),
            6507 => Ok(ErrorCode::InvalidFilename),
            6509 => Ok(ErrorCode::FileStorageFailed),

            // System
            9002 => Ok(ErrorCode::DatabaseError),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
