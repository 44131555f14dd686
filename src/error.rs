//! Error types for txfile.
//!
//! All operations return `Result<T>` which aliases `Result<T, TxError>`.

use crate::txn::TransactionId;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from transactional file operations.
#[derive(Debug, Error)]
pub enum TxError {
    /// The underlying file system mutation failed.
    ///
    /// Any backup captured for the operation has already been disposed.
    #[error("Failed to {op} {}: {source}", .path.display())]
    Operation {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Undoing the journal failed and rollback errors are not ignored.
    #[error("Rollback failed: {0}")]
    RollbackFailed(String),

    /// The transaction has already entered its completion phase.
    #[error("Transaction {0} is no longer active")]
    TransactionInactive(TransactionId),

    /// A participant refused to prepare, so the transaction was rolled back.
    #[error("Transaction {0} was aborted")]
    Aborted(TransactionId),

    /// Plan file is structurally invalid.
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    /// TOML parse error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml_edit::TomlError),

    /// File system operation failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Unexpected error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TxError {
    pub(crate) fn operation(
        op: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        TxError::Operation {
            op,
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for txfile operations.
pub type Result<T> = std::result::Result<T, TxError>;
