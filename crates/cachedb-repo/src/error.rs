use cachedb_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A record could not be turned into a storable entity.
    #[error("cannot encode {collection} record: {reason}")]
    Encode {
        collection: &'static str,
        reason: String,
    },

    /// A stored entity does not have the shape of this record kind.
    #[error("cannot decode {collection}/{id}: {reason}")]
    Decode {
        collection: &'static str,
        id: String,
        reason: String,
    },

    /// The remote source failed to return a page.
    #[error("fetching {collection} page at offset {offset} failed: {reason}")]
    Fetch {
        collection: &'static str,
        offset: usize,
        reason: String,
    },

    #[error("background task failed: {0}")]
    Task(String),
}

pub type RepoResult<T> = Result<T, RepoError>;
