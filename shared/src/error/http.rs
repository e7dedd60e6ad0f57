//! HTTP status code mapping for error codes

use super::codes::ErrorCode;
use http::StatusCode;

impl ErrorCode {
    /// Get the appropriate HTTP status code for this error code
    pub fn http_status(&self) -> StatusCode {
        match self {
            // Success
            Self::Success => StatusCode::OK,

            // 404 Not Found
            Self::NotFound
            | Self::OrderNotFound
            | Self::OrderItemNotFound
            | Self::GenerationEntryNotFound
            | Self::ArtifactNotFound => StatusCode::NOT_FOUND,

            // 409 Conflict
            Self::InvalidTransition | Self::InvalidOrderStatus => StatusCode::CONFLICT,

            // 403 Forbidden
            Self::SignatureInvalid => StatusCode::FORBIDDEN,

            // 410 Gone
            Self::SignedUrlExpired => StatusCode::GONE,

            // 413 Payload Too Large
            Self::FileTooLarge => StatusCode::PAYLOAD_TOO_LARGE,

            // 502 Bad Gateway (upstream AI provider)
            Self::ProviderFailed => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable (transient, client can retry)
            Self::ProviderTimeout => StatusCode::SERVICE_UNAVAILABLE,

            // 500 Internal Server Error
            Self::DatabaseError | Self::ArtifactStorageFailed | Self::FileStorageFailed => {
                StatusCode::INTERNAL_SERVER_ERROR
            }

            // 400 Bad Request (default for validation errors)
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_status() {
        assert_eq!(ErrorCode::Success.http_status(), StatusCode::OK);
    }

    #[test]
    fn test_not_found_status() {
        assert_eq!(ErrorCode::NotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ErrorCode::OrderNotFound.http_status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ErrorCode::GenerationEntryNotFound.http_status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_transition_is_conflict() {
        assert_eq!(
            ErrorCode::InvalidTransition.http_status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ErrorCode::InvalidOrderStatus.http_status(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_signed_url_statuses() {
        assert_eq!(
            ErrorCode::SignatureInvalid.http_status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(ErrorCode::SignedUrlExpired.http_status(), StatusCode::GONE);
    }

    #[test]
    fn test_provider_statuses() {
        assert_eq!(
            ErrorCode::ProviderFailed.http_status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ErrorCode::ProviderTimeout.http_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_bad_request_default() {
        assert_eq!(
            ErrorCode::ValidationFailed.http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ErrorCode::OrderEmpty.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ErrorCode::InvalidFilename.http_status(),
            StatusCode::BAD_REQUEST
        );
    }
}
