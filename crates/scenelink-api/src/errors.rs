//! API error types.

use thiserror::Error;

/// Errors from REST calls.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport-level failure (connect, timeout, TLS, body decode).
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The server answered with a non-success status.
    #[error("server returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: reqwest::StatusCode,
        /// Error message from the response body, if any.
        message: String,
    },
}

impl ApiError {
    /// Whether this error came from the transport rather than the server.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Http(_))
    }
}

/// Result type for API operations.
pub type Result<T> = std::result::Result<T, ApiError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_display() {
        let err = ApiError::Status {
            status: reqwest::StatusCode::CONFLICT,
            message: "Chat request already exists between these scenes".to_string(),
        };
        let s = err.to_string();
        assert!(s.contains("409"));
        assert!(s.contains("already exists"));
    }

    #[test]
    fn status_error_is_not_transport() {
        let err = ApiError::Status {
            status: reqwest::StatusCode::BAD_REQUEST,
            message: String::new(),
        };
        assert!(!err.is_transport());
    }
}
