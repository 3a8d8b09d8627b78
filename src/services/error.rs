use thiserror::Error;

use crate::core::CodecError;

/// Errors from the on-disk stores
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt feedback log at line {line}: {reason}")]
    CorruptFeedback { line: usize, reason: String },

    #[error("Corrupt dataset {path}: {reason}")]
    CorruptDataset { path: String, reason: String },

    #[error("Persistence failure: {0}")]
    Persistence(String),

    #[error("Inconsistent artifact pair: {0}")]
    Inconsistent(#[from] CodecError),

    #[error("Feedback queue changed underneath the drain: {0}")]
    QueueChanged(String),
}
