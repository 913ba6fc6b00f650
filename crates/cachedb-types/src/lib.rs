//! Foundation types for cachedb.
//!
//! cachedb keeps results fetched from a remote analytics API on local disk,
//! grouped into named collections of string-identified entities. This crate
//! defines the shapes that flow through every other cachedb crate and the
//! exact JSON layout they take on disk.
//!
//! # Key Types
//!
//! - [`Entity`] -- open record with a required `id` and optional fetch metadata
//! - [`EntityMetadata`] -- when and from where an entity was obtained
//! - [`Collection`] -- versioned `id -> Entity` map, one JSON file per collection
//! - [`DatabaseMetadata`] -- per-instance record updated on every mutation
//! - [`ExportFile`] -- self-contained snapshot of a whole database

pub mod collection;
pub mod entity;
pub mod error;
pub mod metadata;
pub mod name;
pub mod temporal;

pub use collection::Collection;
pub use entity::{Entity, EntityMetadata, Source};
pub use error::{TypesError, TypesResult};
pub use metadata::{DatabaseMetadata, ExportFile};
pub use name::validate_collection_name;
pub use temporal::Timestamp;

/// Format version written into every collection and metadata file.
pub const FORMAT_VERSION: &str = "1.0.0";
