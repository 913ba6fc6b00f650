use std::cmp::Ordering;
use std::fmt;

use cachedb_types::Entity;
use regex::{Regex, RegexBuilder};
use serde_json::Value;

use crate::error::{StoreError, StoreResult};

/// Predicate over entities.
pub type Filter = dyn Fn(&Entity) -> bool + Send + Sync;

/// Ordering over entities.
pub type Comparator = dyn Fn(&Entity, &Entity) -> Ordering + Send + Sync;

/// Options for [`DocumentStore::list`](crate::DocumentStore::list).
///
/// Applied in a fixed order: filter, then sort, then the
/// `[offset, offset + limit)` window.
#[derive(Default)]
pub struct ListOptions {
    pub filter: Option<Box<Filter>>,
    pub sort: Option<Box<Comparator>>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, f: impl Fn(&Entity) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Box::new(f));
        self
    }

    pub fn sort(mut self, f: impl Fn(&Entity, &Entity) -> Ordering + Send + Sync + 'static) -> Self {
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

    /// Run filter, sort, and pagination over `entities`.
    pub fn apply<'a>(&self, entities: impl Iterator<Item = &'a Entity>) -> Vec<Entity> {
        let mut selected: Vec<Entity> = match &self.filter {
            Some(filter) => entities.filter(|e| filter(*e)).cloned().collect(),
            None => entities.cloned().collect(),
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

impl fmt::Debug for ListOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListOptions")
            .field("filter", &self.filter.is_some())
            .field("sort", &self.sort.is_some())
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .finish()
    }
}

/// Options for [`DocumentStore::search`](crate::DocumentStore::search).
#[derive(Clone, Debug, Default)]
pub struct SearchOptions {
    /// Collections to scan, in this order. All collections when unset.
    pub collections: Option<Vec<String>>,
    /// Fields to match against. The whole serialized entity when unset.
    pub fields: Option<Vec<String>>,
    /// Stop after this many hits.
    pub limit: Option<usize>,
}

impl SearchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collections<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.collections = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One search match.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchHit {
    pub collection: String,
    pub entity: Entity,
}

/// Compile a search query as a case-insensitive regular expression.
pub fn compile_query(query: &str) -> StoreResult<Regex> {
    RegexBuilder::new(query)
        .case_insensitive(true)
        .build()
        .map_err(|e| StoreError::InvalidQuery {
            query: query.to_string(),
            reason: e.to_string(),
        })
}

/// The text a query is matched against.
///
/// With `fields`, their values joined by single spaces (missing fields are
/// empty, strings are used verbatim, other values as JSON). Otherwise the
/// compact JSON form of the whole entity.
pub fn haystack(entity: &Entity, fields: Option<&[String]>) -> String {
    match fields {
        Some(fields) => fields
            .iter()
            .map(|f| match entity.field(f) {
                Some(Value::String(s)) => s,
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" "),
        None => serde_json::to_string(entity).unwrap_or_default(),
    }
}
