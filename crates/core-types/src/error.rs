use thiserror::Error;

/// Shared error type for the dashboard state crates.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("{collection} record {id} not found")]
    NotFound { collection: String, id: String },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not authorized: {0}")]
    NotAuthorized(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("failed to decode {collection} record: {message}")]
    Decode { collection: String, message: String },
    #[error("internal error: {0}")]
    Internal(String),
}

impl SyncError {
    pub fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub fn decode(collection: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            collection: collection.into(),
            message: err.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<scriptflow_timefmt::TimeFormatError> for SyncError {
    fn from(value: scriptflow_timefmt::TimeFormatError) -> Self {
        SyncError::Validation(value.to_string())
    }
}
