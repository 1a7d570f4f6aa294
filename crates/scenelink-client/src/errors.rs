//! Error types for the client facade.

use thiserror::Error;

use scenelink_core::ids::RequestId;

/// Errors from the continuity cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem read/write failure.
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization failure.
    #[error("cache serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors surfaced to callers of [`crate::SceneClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// A REST call failed.
    #[error(transparent)]
    Api(#[from] scenelink_api::ApiError),
    /// The continuity cache could not be written.
    #[error(transparent)]
    Cache(#[from] CacheError),
    /// A command named a session this client does not know.
    #[error("unknown session: {0}")]
    UnknownSession(RequestId),
    /// A command requires a live scene and none is active.
    #[error("no active scene")]
    NoActiveScene,
    /// The persona has no server-assigned ID yet.
    #[error("persona has no ID")]
    MissingPersonaId,
}

/// Convenience alias for client results.
pub type Result<T> = std::result::Result<T, ClientError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
