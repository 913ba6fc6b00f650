use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::collection::Collection;
use crate::temporal::{self, Timestamp};
use crate::FORMAT_VERSION;

/// Per-instance record kept in `metadata.json`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseMetadata {
    pub version: String,
    #[serde(default, with = "temporal::iso_opt")]
    pub last_sync: Option<Timestamp>,
    #[serde(with = "temporal::iso")]
    pub created_at: Timestamp,
    #[serde(with = "temporal::iso")]
    pub updated_at: Timestamp,
}

impl DatabaseMetadata {
    /// Fresh metadata for a newly created database.
    pub fn new() -> Self {
        let now = temporal::now();
        Self {
            version: FORMAT_VERSION.to_string(),
            last_sync: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record that the database changed.
    pub fn touch(&mut self) {
        self.updated_at = temporal::now();
    }
}

impl Default for DatabaseMetadata {
    fn default() -> Self {
        Self::new()
    }
}

/// A whole database in one file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportFile {
    pub metadata: DatabaseMetadata,
    pub collections: BTreeMap<String, Collection>,
    #[serde(with = "temporal::iso")]
    pub exported_at: Timestamp,
}
