use cachedb_types::EntityMetadata;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RepoResult;
use crate::record::{Record, RecordQuery};
use crate::repository::Repository;

/// A visualization card.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub card_type: Option<String>,
    #[serde(default)]
    pub dataset_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(
        rename = "_metadata",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub metadata: Option<EntityMetadata>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record for Card {
    const COLLECTION: &'static str = "cards";

    fn id(&self) -> &str {
        &self.id
    }
}

pub type CardRepository = Repository<Card>;

impl Repository<Card> {
    /// Cards built on `dataset_id`.
    pub fn referencing(&self, dataset_id: &str) -> RepoResult<Vec<Card>> {
        let dataset_id = dataset_id.to_string();
        self.list(
            RecordQuery::new()
                .filter(move |c: &Card| c.dataset_ids.iter().any(|id| *id == dataset_id)),
        )
    }
}
