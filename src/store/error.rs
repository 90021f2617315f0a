use thiserror::Error;

use super::Collection;

/// Errors raised at the document store boundary
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{collection}/{id} not found")]
    NotFound { collection: Collection, id: String },

    #[error("{collection}/{id} already exists")]
    AlreadyExists { collection: Collection, id: String },

    #[error("version conflict on {collection}/{id}: expected {expected}, found {actual}")]
    VersionConflict {
        collection: Collection,
        id: String,
        expected: u64,
        actual: u64,
    },

    #[error("precondition failed on {collection}/{id}: {reason}")]
    PreconditionFailed {
        collection: Collection,
        id: String,
        reason: String,
    },

    #[error("malformed document {collection}/{id}: {reason}")]
    Decode {
        collection: Collection,
        id: String,
        reason: String,
    },

    #[error("batch of {size} operations exceeds limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }
}
