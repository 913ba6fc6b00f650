use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{TypesError, TypesResult};
use crate::temporal::{self, Timestamp};

/// Where an entity's current content came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Fetched from the remote API.
    Api,
    /// Written by hand through a command.
    Manual,
    /// Loaded from an export file.
    Import,
}

impl Default for Source {
    fn default() -> Self {
        Self::Api
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Api => write!(f, "api"),
            Self::Manual => write!(f, "manual"),
            Self::Import => write!(f, "import"),
        }
    }
}

/// Fetch bookkeeping stored under an entity's `_metadata` key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityMetadata {
    #[serde(with = "temporal::iso")]
    pub fetched_at: Timestamp,
    pub source: Source,
    #[serde(
        default,
        with = "temporal::iso_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub synced_at: Option<Timestamp>,
}

impl EntityMetadata {
    /// Metadata stamped with the current time.
    pub fn now(source: Source) -> Self {
        Self {
            fetched_at: temporal::now(),
            source,
            synced_at: None,
        }
    }
}

/// Keys the envelope owns; they never appear among body fields.
const RESERVED_KEYS: [&str; 2] = ["id", "_metadata"];

/// A uniquely identified, otherwise schema-free record.
///
/// On disk an entity is a flat JSON object: `id`, the body fields, and an
/// optional `_metadata` block. The body is kept as an open map so the
/// persistence engine never needs to know which kind of entity it holds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    #[serde(
        rename = "_metadata",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub metadata: Option<EntityMetadata>,
}

impl Entity {
    /// Create an entity with no body fields.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
            metadata: None,
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Builder-style metadata setter.
    pub fn with_metadata(mut self, metadata: EntityMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Look up a field by name. `id` resolves to the identifier.
    pub fn field(&self, key: &str) -> Option<Value> {
        if key == "id" {
            return Some(Value::String(self.id.clone()));
        }
        self.fields.get(key).cloned()
    }

    /// Check that the entity can be stored.
    ///
    /// Body fields may not shadow `id` or `_metadata`; the flattened file
    /// would carry the key twice and fail to load.
    pub fn validate(&self) -> TypesResult<()> {
        if self.id.is_empty() {
            return Err(TypesError::InvalidEntity("empty id".into()));
        }
        if let Some(key) = RESERVED_KEYS.iter().find(|k| self.fields.contains_key(**k)) {
            return Err(TypesError::InvalidEntity(format!(
                "body field {key:?} is reserved"
            )));
        }
        Ok(())
    }

    /// Build an entity from an arbitrary JSON value.
    ///
    /// The value must be an object whose `id` is a non-empty string.
    pub fn from_value(value: Value) -> TypesResult<Self> {
        match value.get("id") {
            Some(Value::String(_)) => {}
            Some(_) => return Err(TypesError::InvalidEntity("id must be a string".into())),
            None => return Err(TypesError::InvalidEntity("missing id".into())),
        }
        let entity: Self = serde_json::from_value(value)
            .map_err(|e| TypesError::InvalidEntity(e.to_string()))?;
        entity.validate()?;
        Ok(entity)
    }

    /// The entity as a single JSON object.
    pub fn to_value(&self) -> TypesResult<Value> {
        serde_json::to_value(self).map_err(|e| TypesError::Serialization(e.to_string()))
    }

    /// Fill in `_metadata` if the entity carries none.
    pub fn stamp(&mut self, source: Source) {
        if self.metadata.is_none() {
            self.metadata = Some(EntityMetadata::now(source));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_flat_with_metadata_key() {
        let ts = "2026-01-02T03:04:05.678Z".parse().unwrap();
        let entity = Entity::new("d1")
            .with_field("name", "Sales")
            .with_metadata(EntityMetadata {
                fetched_at: ts,
                source: Source::Api,
                synced_at: None,
            });
        let value = entity.to_value().unwrap();
        assert_eq!(
            value,
            json!({
                "id": "d1",
                "name": "Sales",
                "_metadata": {"fetchedAt": "2026-01-02T03:04:05.678Z", "source": "api"}
            })
        );
    }

    #[test]
    fn metadata_omitted_when_absent() {
        let value = Entity::new("x").to_value().unwrap();
        assert_eq!(value, json!({"id": "x"}));
    }

    #[test]
    fn from_value_collects_body_fields() {
        let entity = Entity::from_value(json!({"id": "u1", "email": "a@b.c", "tags": [1, 2]}))
            .unwrap();
        assert_eq!(entity.id, "u1");
        assert_eq!(entity.field("email"), Some(json!("a@b.c")));
        assert_eq!(entity.field("tags"), Some(json!([1, 2])));
        assert!(entity.metadata.is_none());
    }

    #[test]
    fn from_value_rejects_bad_ids() {
        assert!(Entity::from_value(json!({"name": "no id"})).is_err());
        assert!(Entity::from_value(json!({"id": 7})).is_err());
        assert!(Entity::from_value(json!({"id": ""})).is_err());
        assert!(Entity::from_value(json!("scalar")).is_err());
    }

    #[test]
    fn validate_rejects_reserved_body_fields() {
        let shadow_id = Entity::new("u2").with_field("id", "other");
        assert!(matches!(
            shadow_id.validate(),
            Err(TypesError::InvalidEntity(reason)) if reason.contains("\"id\"")
        ));
        let shadow_meta = Entity::new("c1").with_field("_metadata", json!({"note": "x"}));
        assert!(shadow_meta.validate().is_err());
        assert!(Entity::new("ok").with_field("name", "x").validate().is_ok());
    }

    #[test]
    fn stamp_keeps_existing_metadata() {
        let original = EntityMetadata::now(Source::Manual);
        let mut entity = Entity::new("a").with_metadata(original.clone());
        entity.stamp(Source::Api);
        assert_eq!(entity.metadata, Some(original));

        let mut bare = Entity::new("b");
        bare.stamp(Source::Api);
        assert_eq!(bare.metadata.unwrap().source, Source::Api);
    }

    #[test]
    fn field_id_resolves_identifier() {
        let entity = Entity::new("abc");
        assert_eq!(entity.field("id"), Some(json!("abc")));
        assert_eq!(entity.field("missing"), None);
    }

    #[test]
    fn source_display_matches_wire_form() {
        for source in [Source::Api, Source::Manual, Source::Import] {
            let wire = serde_json::to_value(source).unwrap();
            assert_eq!(wire, json!(source.to_string()));
        }
    }
}
