use cachedb_types::EntityMetadata;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RepoResult;
use crate::record::{Record, RecordQuery};
use crate::repository::Repository;

/// A transformation pipeline between datasets.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataflow {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub input_dataset_ids: Vec<String>,
    #[serde(default)]
    pub output_dataset_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(
        rename = "_metadata",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub metadata: Option<EntityMetadata>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record for Dataflow {
    const COLLECTION: &'static str = "dataflows";

    fn id(&self) -> &str {
        &self.id
    }
}

pub type DataflowRepository = Repository<Dataflow>;

impl Repository<Dataflow> {
    /// Dataflows that write to `dataset_id`.
    pub fn writing_to(&self, dataset_id: &str) -> RepoResult<Vec<Dataflow>> {
        let dataset_id = dataset_id.to_string();
        self.list(RecordQuery::new().filter(move |f: &Dataflow| {
            f.output_dataset_ids.iter().any(|id| *id == dataset_id)
        }))
    }

    /// Dataflows that read from `dataset_id`.
    pub fn reading_from(&self, dataset_id: &str) -> RepoResult<Vec<Dataflow>> {
        let dataset_id = dataset_id.to_string();
        self.list(RecordQuery::new().filter(move |f: &Dataflow| {
            f.input_dataset_ids.iter().any(|id| *id == dataset_id)
        }))
    }
}
