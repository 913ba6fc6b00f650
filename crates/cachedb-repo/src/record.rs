use std::cmp::Ordering;
use std::fmt;

use cachedb_types::Entity;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{RepoError, RepoResult};

/// A typed entity kind stored in one fixed collection.
///
/// Implementors serialize to a flat JSON object carrying `id`; fields the
/// type does not know about should be kept in a flattened map so records
/// survive remote schema additions.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Collection this kind lives in.
    const COLLECTION: &'static str;

    fn id(&self) -> &str;
}

pub(crate) fn to_entity<T: Record>(record: &T) -> RepoResult<Entity> {
    let encode_error = |reason: String| RepoError::Encode {
        collection: T::COLLECTION,
        reason,
    };
    let value = serde_json::to_value(record).map_err(|e| encode_error(e.to_string()))?;
    Entity::from_value(value).map_err(|e| encode_error(e.to_string()))
}

pub(crate) fn from_entity<T: Record>(entity: &Entity) -> RepoResult<T> {
    let decode_error = |reason: String| RepoError::Decode {
        collection: T::COLLECTION,
        id: entity.id.clone(),
        reason,
    };
    let value = entity.to_value().map_err(|e| decode_error(e.to_string()))?;
    serde_json::from_value(value).map_err(|e| decode_error(e.to_string()))
}

/// Predicate over records.
pub type RecordFilter<T> = dyn Fn(&T) -> bool + Send + Sync;
/// Ordering over records.
pub type RecordComparator<T> = dyn Fn(&T, &T) -> Ordering + Send + Sync;

/// Typed filter, sort, and pagination for [`Repository::list`](crate::Repository::list).
pub struct RecordQuery<T> {
    filter: Option<Box<RecordFilter<T>>>,
    sort: Option<Box<RecordComparator<T>>>,
    limit: Option<usize>,
    offset: usize,
}

impl<T> Default for RecordQuery<T> {
    fn default() -> Self {
        Self {
            filter: None,
            sort: None,
            limit: None,
            offset: 0,
        }
    }
}

impl<T> RecordQuery<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, f: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Box::new(f));
        self
    }

    pub fn sort(mut self, f: impl Fn(&T, &T) -> Ordering + Send + Sync + 'static) -> Self {
        self.sort = Some(Box::new(f));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Filter, then sort, then take the `[offset, offset + limit)` window.
    pub fn apply(&self, records: Vec<T>) -> Vec<T> {
        let mut selected: Vec<T> = match &self.filter {
            Some(filter) => records.into_iter().filter(|r| filter(r)).collect(),
            None => records,
        };
        if let Some(sort) = &self.sort {
            selected.sort_by(|a, b| sort(a, b));
        }
        selected
            .into_iter()
            .skip(self.offset)
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

impl<T> fmt::Debug for RecordQuery<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordQuery")
            .field("filter", &self.filter.is_some())
            .field("sort", &self.sort.is_some())
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .finish()
    }
}
