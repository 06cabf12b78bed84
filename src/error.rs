//! Error type shared by the store, the view controller and the search adapter.

use thiserror::Error;

use crate::model::EntityKind;

#[derive(Debug, Error)]
pub enum TripError {
    /// A required field was empty or out of range. The operation made no change.
    #[error("validation error: {0}")]
    Validation(String),
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: u64 },
    /// The map widget or a search capability has not initialized yet.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("invalid data url: {0}")]
    InvalidDataUrl(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Database(#[from] lmdb::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl TripError {
    pub fn validation(msg: impl Into<String>) -> Self {
        TripError::Validation(msg.into())
    }
}
