use std::path::PathBuf;

use cachedb_types::TypesError;
use cachedb_write::WriteError;

/// Errors from document store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Directory, recovery, or metadata setup failed after every retry.
    #[error(
        "failed to initialize database at {} after {attempts} attempt(s): {cause}",
        path.display()
    )]
    Initialization {
        path: PathBuf,
        attempts: u32,
        cause: String,
    },

    /// An operation ran before `initialize()` completed.
    #[error("database at {} is not initialized", .0.display())]
    NotInitialized(PathBuf),

    /// Every write fallback failed.
    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Types(#[from] TypesError),

    /// The search query is not a valid regular expression.
    #[error("invalid search query {query:?}: {reason}")]
    InvalidQuery { query: String, reason: String },

    /// The import file could not be read or is not an export.
    #[error("cannot import {}: {reason}", path.display())]
    ImportFormat { path: PathBuf, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
