use cachedb_types::EntityMetadata;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RepoResult;
use crate::record::{Record, RecordQuery};
use crate::repository::Repository;

/// A named set of users.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub member_ids: Vec<String>,
    #[serde(
        rename = "_metadata",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub metadata: Option<EntityMetadata>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record for Group {
    const COLLECTION: &'static str = "groups";

    fn id(&self) -> &str {
        &self.id
    }
}

pub type GroupRepository = Repository<Group>;

impl Repository<Group> {
    /// Groups that list `user_id` as a member.
    pub fn containing(&self, user_id: &str) -> RepoResult<Vec<Group>> {
        let user_id = user_id.to_string();
        self.list(
            RecordQuery::new().filter(move |g: &Group| g.member_ids.iter().any(|id| *id == user_id)),
        )
    }
}
