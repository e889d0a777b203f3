use thiserror::Error;

use scriptflow_core_types::{ScopeKey, SyncError};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("scope {0} names an empty id")]
    EmptyScopeId(ScopeKey),
}

impl RegistryError {
    pub fn into_sync_error(self) -> SyncError {
        SyncError::Validation(self.to_string())
    }
}

impl From<RegistryError> for SyncError {
    fn from(err: RegistryError) -> Self {
        err.into_sync_error()
    }
}
