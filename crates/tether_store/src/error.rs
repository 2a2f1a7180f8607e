//! Error types for the storage layer.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by storage implementations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The requested row does not exist.
    #[error("not found: {entity} {id}")]
    NotFound {
        /// Entity name (table or model).
        entity: &'static str,
        /// Row id.
        id: String,
    },

    /// A stored JSON column failed to decode.
    #[error("corrupt {entity} row {id}: {source}")]
    Corrupt {
        /// Entity name.
        entity: &'static str,
        /// Row id.
        id: String,
        /// Decoding failure.
        #[source]
        source: serde_json::Error,
    },

    /// The underlying storage backend failed.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Convenience constructor for missing rows.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_identity() {
        let err = StoreError::not_found("sync_state", "org-1/knowledge/k-1");
        assert!(err.to_string().contains("sync_state"));
        assert!(err.to_string().contains("k-1"));
    }
}
