//! Durable file writes for cachedb.
//!
//! Collection and metadata files must never be left truncated or half
//! written, yet cachedb also runs inside packaged executables and on
//! filesystems that refuse renames or carry restrictive extended attributes.
//! This crate writes a file through an ordered chain of strategies, moving to
//! the next one only when the previous fails with a permission-class error.
//!
//! # Chains
//!
//! Standard: atomic rename → copy-then-delete → direct write →
//! delete-then-recreate → attribute clear (signing-restricted platforms) →
//! temp-file only.
//!
//! Bundled: synchronous direct write → delete-then-recreate → attribute
//! clear + unrestricted write (signing-restricted platforms) → temp-file only.
//!
//! The chain is picked once from a [`WriteProfile`]. All file access goes
//! through [`FsOps`] so the chain can be driven against a faulty filesystem.

pub mod error;
pub mod fs;
pub mod profile;
pub mod writer;

pub use error::{StepFailure, WriteError, WriteResult};
pub use fs::{is_permission_class, FsOps, StdFs};
pub use profile::WriteProfile;
pub use writer::{temp_path, write_json, FallbackWriter, WriteMethod, WriteOutcome, WriteStrategy};
