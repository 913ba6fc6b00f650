use thiserror::Error;

/// Errors produced by type validation and conversion.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypesError {
    #[error("invalid collection name {name:?}: {reason}")]
    InvalidCollectionName { name: String, reason: &'static str },

    #[error("invalid entity: {0}")]
    InvalidEntity(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result alias for type operations.
pub type TypesResult<T> = Result<T, TypesError>;
