//! Error taxonomy of the sync components.

use crate::store::StoreError;

/// Failure surfaced to the consumer of a sync component.
///
/// `InvalidArgument` is raised before any store call. Store failures pass
/// through unchanged; nothing is retried or swallowed, except where a blank
/// identifier intentionally degrades to an empty no-op listener.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("not found: {collection}/{id}")]
    NotFound { collection: String, id: String },
    #[error(transparent)]
    Store(StoreError),
}

impl SyncError {
    /// Grepable error code, used as a structured log field.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "E_INVALID_ARGUMENT",
            Self::NotFound { .. } => "E_NOT_FOUND",
            Self::Store(_) => "E_STORE",
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { collection, id } => Self::NotFound { collection, id },
            other => Self::Store(other),
        }
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
