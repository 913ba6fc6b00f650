use cachedb_types::EntityMetadata;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RepoResult;
use crate::record::{Record, RecordQuery};
use crate::repository::Repository;

/// A platform user.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(
        rename = "_metadata",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub metadata: Option<EntityMetadata>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record for User {
    const COLLECTION: &'static str = "users";

    fn id(&self) -> &str {
        &self.id
    }
}

pub type UserRepository = Repository<User>;

impl Repository<User> {
    /// The user with this email address, ignoring case.
    pub fn find_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let email = email.to_lowercase();
        let matches = self.list(RecordQuery::new().filter(move |u: &User| {
            u.email.as_deref().is_some_and(|e| e.to_lowercase() == email)
        }))?;
        Ok(matches.into_iter().next())
    }

    pub fn by_role(&self, role: &str) -> RepoResult<Vec<User>> {
        let role = role.to_string();
        self.list(RecordQuery::new().filter(move |u: &User| u.role.as_deref() == Some(role.as_str())))
    }
}
