use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::writer::WriteMethod;

/// One permission-class failure recorded while walking the chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepFailure {
    pub method: WriteMethod,
    pub error: String,
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.method, self.error)
    }
}

fn join_failures(attempts: &[StepFailure]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors from durable writes.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// Every strategy in the chain failed with a permission-class error.
    #[error(
        "all write strategies failed for {} on {platform}: {}",
        path.display(),
        join_failures(attempts)
    )]
    Exhausted {
        path: PathBuf,
        platform: &'static str,
        attempts: Vec<StepFailure>,
    },

    /// A step failed with an error the chain does not route around.
    #[error("{method} failed for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        method: WriteMethod,
        #[source]
        source: io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result alias for write operations.
pub type WriteResult<T> = Result<T, WriteError>;
