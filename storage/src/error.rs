//! Store error types

use std::path::PathBuf;

use thiserror::Error;

/// Errors from reading or writing a file store
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing file could not be read or written
    #[error("{action} {}: {source}", path.display())]
    Io {
        /// What was being attempted ("read", "write")
        action: &'static str,
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A value was rejected before it reached the file
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Field name
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// Lookup by index or name found nothing
    #[error("no NIM matches '{0}'")]
    NotFound(String),
}

impl StoreError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            action,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        StoreError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
