//! Storage error types.

use thiserror::Error;

/// Errors that can occur during read-position storage operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Encoding or decoding a stored position failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error (file system, database, etc.)
    #[error("I/O error: {0}")]
    Io(String),

    /// Failure injected by [`ChaoticStore`](crate::ChaoticStore)
    #[error("injected failure during {operation}")]
    Injected {
        /// Operation that was failed
        operation: &'static str,
    },
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
