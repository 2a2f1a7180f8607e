//! Error taxonomy for sync operations.
//!
//! The retryability split follows the deployment contract: transient
//! transport and server failures retry, anything the caller must fix first
//! (authorization, validation, missing rows, conflicts) short-circuits.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport failure; retryable.
    #[error("network error: {0}")]
    Network(String),

    /// The operation timed out; retryable.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// 401/403-class failure; the caller must re-authenticate.
    #[error("authorization failed: {0}")]
    Authorization(String),

    /// 400-class failure or missing required fields.
    #[error("validation failed: {reason}")]
    Validation {
        /// Why validation failed.
        reason: String,
        /// Missing required fields, if that was the cause.
        missing: Vec<String>,
    },

    /// 404-class failure.
    #[error("not found: {0}")]
    NotFound(String),

    /// 409-class failure; handled through the conflict workflow, never
    /// retried.
    #[error("conflict: {0}")]
    Conflict(String),

    /// 5xx-class failure; retryable.
    #[error("server error ({status}): {message}")]
    Server {
        /// HTTP-ish status code.
        status: u16,
        /// Server-provided message.
        message: String,
    },

    /// Anything unclassified. Retryable by default: an explicit
    /// availability-over-silence choice, overridable per call site.
    #[error("unknown error: {0}")]
    Unknown(String),

    /// The task was cancelled before it started.
    #[error("cancelled")]
    Cancelled,

    /// All retry attempts were consumed.
    #[error("{context}: retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// What was being attempted.
        context: String,
        /// Total attempts made.
        attempts: u32,
        /// The last underlying failure.
        #[source]
        source: Box<SyncError>,
    },

    /// Local storage failure.
    #[error("store error: {0}")]
    Store(#[from] tether_store::StoreError),

    /// Mapping or protocol failure.
    #[error("protocol error: {0}")]
    Protocol(#[from] tether_protocol::ProtocolError),

    /// Record payload could not be (de)serialized at the wire seam.
    #[error("payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

impl SyncError {
    /// Builds a validation error from a missing-field list.
    pub fn missing_fields(missing: Vec<String>) -> Self {
        Self::Validation {
            reason: format!("missing required fields: {}", missing.join(", ")),
            missing,
        }
    }

    /// Returns true if this error is worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Network(_)
            | SyncError::Timeout(_)
            | SyncError::Server { .. }
            | SyncError::Unknown(_) => true,
            SyncError::Authorization(_)
            | SyncError::Validation { .. }
            | SyncError::NotFound(_)
            | SyncError::Conflict(_)
            | SyncError::Cancelled
            | SyncError::RetriesExhausted { .. }
            | SyncError::Store(_)
            | SyncError::Protocol(_)
            | SyncError::Payload(_) => false,
        }
    }
}
