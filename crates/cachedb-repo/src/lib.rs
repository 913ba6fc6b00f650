//! Typed repositories over the cachedb document store.
//!
//! A [`Repository`] binds a shared [`DocumentStore`](cachedb_store::DocumentStore)
//! to the collection of one [`Record`] kind and converts between the store's
//! open entities and typed records. [`Repository::sync`] refreshes a
//! collection page by page from a [`SyncSource`], enriching records with
//! bounded concurrency and saving each page before fetching the next.
//!
//! # Record Kinds
//!
//! - [`Dataset`] -- `datasets`
//! - [`Dataflow`] -- `dataflows`
//! - [`Card`] -- `cards`
//! - [`User`] -- `users`
//! - [`Group`] -- `groups`

pub mod error;
pub mod kinds;
pub mod record;
pub mod repository;
pub mod sync;

pub use error::{RepoError, RepoResult};
pub use kinds::{
    Card, CardRepository, Dataflow, DataflowRepository, Dataset, DatasetRepository, Group,
    GroupRepository, User, UserRepository,
};
pub use record::{Record, RecordComparator, RecordFilter, RecordQuery};
pub use repository::Repository;
pub use sync::{PageParams, SyncOptions, SyncReport, SyncSource, SYNC_CONCURRENCY_ENV};
