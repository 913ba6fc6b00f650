use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::entity::Entity;
use crate::error::{TypesError, TypesResult};
use crate::temporal::{self, Timestamp};
use crate::FORMAT_VERSION;

/// A named, versioned set of entities of one kind.
///
/// Entities are keyed by their own `id`. Iteration order is by id, which
/// gives list and search a stable order across process restarts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub version: String,
    #[serde(default, with = "temporal::iso_opt")]
    pub last_sync: Option<Timestamp>,
    #[serde(default)]
    pub entities: BTreeMap<String, Entity>,
}

impl Default for Collection {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION.to_string(),
            last_sync: None,
            entities: BTreeMap::new(),
        }
    }
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Insert or overwrite an entity under its own id.
    pub fn insert(&mut self, entity: Entity) {
        self.entities.insert(entity.id.clone(), entity);
    }

    /// Drop every entity and forget the last sync time.
    pub fn reset(&mut self) {
        self.entities.clear();
        self.last_sync = None;
    }

    /// Re-key entities whose map key differs from their `id`.
    ///
    /// Returns the number of entries that were moved.
    pub fn normalize(&mut self, name: &str) -> usize {
        let orphaned: Vec<String> = self
            .entities
            .iter()
            .filter(|(key, entity)| *key != &entity.id)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &orphaned {
            if let Some(entity) = self.entities.remove(key) {
                warn!(collection = name, key = %key, id = %entity.id, "re-keying orphaned entity");
                self.entities.insert(entity.id.clone(), entity);
            }
        }
        orphaned.len()
    }

    /// Pretty JSON form, exactly as written to disk.
    pub fn to_json(&self) -> TypesResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| TypesError::Serialization(e.to_string()))
    }

    /// Byte length of the serialized collection.
    pub fn size_bytes(&self) -> TypesResult<u64> {
        Ok(self.to_json()?.len() as u64)
    }

    /// Parse a collection file's contents.
    pub fn from_json(data: &str) -> TypesResult<Self> {
        serde_json::from_str(data).map_err(|e| TypesError::Serialization(e.to_string()))
    }
}
