use std::fmt::{Display, Formatter};

use lmdb::Error as LmdbError;
use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeError;

use crate::error::TripError;

#[derive(Debug, Serialize, Deserialize)]
pub enum AppResponse {
    DatabaseError(String),
    SerializationError(String),
    NotFound(String),
    ValidationError(String),
    BadRequest(String),
    ServiceUnavailable(String),
    Ok(String),
}

impl Display for AppResponse {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AppResponse::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            AppResponse::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            AppResponse::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppResponse::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppResponse::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            AppResponse::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
            AppResponse::Ok(msg) => write!(f, "Ok: {}", msg),
        }
    }
}

impl From<LmdbError> for AppResponse {
    fn from(err: LmdbError) -> Self {
        match err {
            LmdbError::NotFound => AppResponse::NotFound("Key not found".to_string()),
            LmdbError::MapFull => {
                AppResponse::DatabaseError("Store is full; raise TRIPMAP_LMDB_MAP_SIZE".to_string())
            }
            LmdbError::Corrupted => AppResponse::DatabaseError("Database is corrupted".to_string()),
            _ => AppResponse::DatabaseError(format!("Database error: {}", err)),
        }
    }
}

impl From<SerdeError> for AppResponse {
    fn from(err: SerdeError) -> Self {
        AppResponse::SerializationError(format!("JSON serialization error: {}", err))
    }
}

impl From<TripError> for AppResponse {
    fn from(err: TripError) -> Self {
        match err {
            TripError::Validation(msg) => AppResponse::ValidationError(msg),
            TripError::InvalidDataUrl(msg) => {
                AppResponse::ValidationError(format!("Invalid image data: {}", msg))
            }
            TripError::NotFound { kind, id } => AppResponse::NotFound(format!("{} {} not found", kind, id)),
            TripError::ServiceUnavailable(msg) => AppResponse::ServiceUnavailable(msg),
            TripError::Config(msg) => AppResponse::BadRequest(format!("Configuration error: {}", msg)),
            TripError::Database(e) => e.into(),
            TripError::Serialization(e) => e.into(),
            TripError::Io(e) => AppResponse::DatabaseError(format!("IO error: {}", e)),
        }
    }
}

impl AppResponse {
    pub fn success(msg: impl Into<String>) -> Self {
        AppResponse::Ok(msg.into())
    }

    /// Wraps a value as `Ok` with its JSON encoding as payload.
    pub fn json<T: Serialize>(value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(json) => AppResponse::Ok(json),
            Err(e) => e.into(),
        }
    }
}
