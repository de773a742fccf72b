//! Error types shared by every store realization.
//!
//! "Not found" is never an error: absent content is reported through
//! `Option`/`bool` returns on the store methods.

use std::io;

use thiserror::Error;

use crate::hash::HashError;

/// Errors returned by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A required input or configuration value is missing or malformed.
    /// Raised before any I/O is attempted.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A write requested an encoding the store has no transform for.
    #[error("unknown content encoding: {0}")]
    UnknownEncoding(String),

    #[error(transparent)]
    InvalidHash(#[from] HashError),

    /// Staging, publish, read, or artifact I/O failed.
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        source: io::Error,
    },
}

impl StoreError {
    pub(crate) fn io(context: &'static str, source: io::Error) -> Self {
        StoreError::Io { context, source }
    }

    /// Whether this error came from the filesystem or a stream.
    pub fn is_io(&self) -> bool {
        matches!(self, StoreError::Io { .. })
    }
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display_includes_context() {
        let err = StoreError::io(
            "failed to create staging file",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.is_io());
        assert_eq!(err.to_string(), "failed to create staging file: denied");
    }

    #[test]
    fn test_hash_error_converts() {
        let err: StoreError = HashError::InvalidHex.into();
        assert!(matches!(err, StoreError::InvalidHash(HashError::InvalidHex)));
        assert!(!err.is_io());
    }
}
