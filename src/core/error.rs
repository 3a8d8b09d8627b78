use thiserror::Error;

use crate::models::MalformedRecord;

/// Errors raised when a vector does not fit the codec or model it is used with
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("width mismatch: expected {expected}, got {actual}")]
    WidthMismatch { expected: usize, actual: usize },

    #[error("item not in label space: {0}")]
    UnknownItem(String),

    #[error("invalid model structure: {0}")]
    InvalidModel(String),
}

/// Errors that abort a training run
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("no data available to train on")]
    EmptyDataset,

    #[error("malformed record {index}: missing or invalid field '{field}'")]
    MalformedRecord { index: usize, field: String },

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("model error: {0}")]
    Model(String),
}

impl From<MalformedRecord> for TrainingError {
    fn from(err: MalformedRecord) -> Self {
        TrainingError::MalformedRecord {
            index: err.index,
            field: err.field,
        }
    }
}
