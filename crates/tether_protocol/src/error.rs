//! Error types for protocol encoding and record mapping.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while mapping or encoding protocol data.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// A timestamp could not be converted between representations.
    #[error("invalid timestamp {value:?}: {reason}")]
    InvalidTimestamp {
        /// The offending value.
        value: String,
        /// Why conversion failed.
        reason: String,
    },

    /// A record failed structural validation during mapping.
    #[error("malformed {table} record: {reason}")]
    MalformedRecord {
        /// Table the record belongs to.
        table: &'static str,
        /// Why the record is malformed.
        reason: String,
    },

    /// An unknown string code was encountered for an enum field.
    #[error("unknown {field} code: {value}")]
    UnknownCode {
        /// Field name.
        field: &'static str,
        /// The unrecognized value.
        value: String,
    },

    /// JSON serialization failure for a message payload.
    #[error("payload encoding failed: {0}")]
    Payload(#[from] serde_json::Error),
}
