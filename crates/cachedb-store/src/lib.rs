//! Crash-resilient document store for cachedb.
//!
//! A database is one directory (`<root>/<instance>`) holding one JSON file
//! per collection, a `metadata.json` record, and `backups/` and `exports/`
//! subdirectories. [`DocumentStore`] keeps every collection in memory and
//! mirrors each mutation to disk through the durable write chain.
//!
//! # Components
//!
//! - [`DocumentStore`] -- lifecycle, entity and collection operations, search,
//!   export/import and statistics
//! - [`recovery`] -- startup repair from `.tmp` siblings and temp sweeping
//! - [`BackupManager`] -- timestamped per-collection snapshots with retention
//! - [`StoreConfig`] -- root, instance and tuning knobs, from TOML or env
//! - [`registry`] -- process-wide shared stores keyed by database directory
//!
//! # Design Rules
//!
//! 1. Reads are served from memory and never touch disk.
//! 2. Every mutation backs up the affected collection first; a failed backup
//!    is logged and does not block the mutation.
//! 3. A collection is swapped in memory only after its file was written.
//! 4. A corrupt collection file never prevents the others from loading.

pub mod backup;
pub mod config;
pub mod error;
pub mod query;
pub mod recovery;
pub mod registry;
pub mod stats;
pub mod store;

pub use backup::{BackupFile, BackupManager};
pub use config::{StoreConfig, INSTANCE_ENV, ROOT_ENV};
pub use error::{StoreError, StoreResult};
pub use query::{Comparator, Filter, ListOptions, SearchHit, SearchOptions};
pub use recovery::{recover_directory, RecoveryReport};
pub use stats::{CollectionStats, StoreStats};
pub use store::{DocumentStore, StoreState};
