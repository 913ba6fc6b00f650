use cachedb_types::EntityMetadata;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RepoResult;
use crate::record::{Record, RecordQuery};
use crate::repository::Repository;

/// A dataset on the remote platform.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_count: Option<u64>,
    #[serde(
        rename = "_metadata",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub metadata: Option<EntityMetadata>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record for Dataset {
    const COLLECTION: &'static str = "datasets";

    fn id(&self) -> &str {
        &self.id
    }
}

pub type DatasetRepository = Repository<Dataset>;

impl Repository<Dataset> {
    /// Datasets owned by `owner_id`.
    pub fn by_owner(&self, owner_id: &str) -> RepoResult<Vec<Dataset>> {
        let owner_id = owner_id.to_string();
        self.list(RecordQuery::new().filter(move |d: &Dataset| {
            d.owner_id.as_deref() == Some(owner_id.as_str())
        }))
    }
}
