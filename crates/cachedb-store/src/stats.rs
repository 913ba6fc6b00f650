use cachedb_types::temporal;
use cachedb_types::{DatabaseMetadata, Timestamp};
use serde::Serialize;

/// Size and freshness of one collection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionStats {
    pub name: String,
    pub count: usize,
    #[serde(with = "temporal::iso_opt")]
    pub last_sync: Option<Timestamp>,
    /// Byte length of the collection's JSON form.
    pub size_bytes: u64,
}

/// Database-wide statistics.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub collections: Vec<CollectionStats>,
    pub total_entities: usize,
    pub total_size_bytes: u64,
    pub metadata: DatabaseMetadata,
}

impl StoreStats {
    pub(crate) fn new(collections: Vec<CollectionStats>, metadata: DatabaseMetadata) -> Self {
        Self {
            total_entities: collections.iter().map(|c| c.count).sum(),
            total_size_bytes: collections.iter().map(|c| c.size_bytes).sum(),
            collections,
            metadata,
        }
    }

    pub fn collection(&self, name: &str) -> Option<&CollectionStats> {
        self.collections.iter().find(|c| c.name == name)
    }
}
