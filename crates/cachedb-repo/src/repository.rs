use std::marker::PhantomData;
use std::sync::Arc;

use cachedb_store::{DocumentStore, ListOptions, SearchOptions};
use cachedb_types::{temporal, Entity, Source, Timestamp};
use serde_json::Value;
use tracing::warn;

use crate::error::RepoResult;
use crate::record::{from_entity, to_entity, Record, RecordFilter, RecordQuery};

/// Typed access to the collection of one record kind.
///
/// Cheap to clone; every clone shares the same store.
pub struct Repository<T> {
    store: Arc<DocumentStore>,
    _kind: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _kind: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Repository<T>
where
    T: Record,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("collection", &T::COLLECTION)
            .finish()
    }
}

impl<T: Record> Repository<T> {
    /// Bind `store` to this kind's collection.
    pub fn new(store: Arc<DocumentStore>) -> Self {
        Self {
            store,
            _kind: PhantomData,
        }
    }

    /// The shared store behind this repository.
    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    /// The collection this kind lives in.
    pub fn collection(&self) -> &'static str {
        T::COLLECTION
    }

    /// Decode every entity, skipping (and logging) those of the wrong shape.
    fn decode_all(entities: Vec<Entity>) -> Vec<T> {
        entities
            .iter()
            .filter_map(|entity| match from_entity(entity) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(collection = T::COLLECTION, error = %e, "skipping undecodable entity");
                    None
                }
            })
            .collect()
    }

    /// Look up one record by id.
    pub fn get(&self, id: &str) -> RepoResult<Option<T>> {
        match self.store.get(T::COLLECTION, id)? {
            Some(entity) => Ok(Some(from_entity(&entity)?)),
            None => Ok(None),
        }
    }

    /// Look up several ids in order. Missing ids are skipped.
    pub fn get_many<I, S>(&self, ids: I) -> RepoResult<Vec<T>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut records = Vec::new();
        for id in ids {
            if let Some(record) = self.get(id.as_ref())? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Store a record fetched from the API.
    pub fn save(&self, record: &T) -> RepoResult<()> {
        self.save_as(record, Source::Api)
    }

    /// Store a record, stamping `source` if it carries no metadata yet.
    pub fn save_as(&self, record: &T, source: Source) -> RepoResult<()> {
        let mut entity = to_entity(record)?;
        entity.stamp(source);
        self.store.set(T::COLLECTION, entity)?;
        Ok(())
    }

    /// Store a batch and mark the collection as synced.
    pub fn save_many(&self, records: &[T]) -> RepoResult<()> {
        let entities = records.iter().map(to_entity).collect::<RepoResult<Vec<_>>>()?;
        self.store.set_many(T::COLLECTION, entities)?;
        Ok(())
    }

    pub(crate) fn save_entities(&self, entities: Vec<Entity>) -> RepoResult<()> {
        self.store.set_many(T::COLLECTION, entities)?;
        Ok(())
    }

    /// Remove one record. Returns whether it existed.
    pub fn delete(&self, id: &str) -> RepoResult<bool> {
        Ok(self.store.delete(T::COLLECTION, id)?)
    }

    /// Records selected by `query`.
    pub fn list(&self, query: RecordQuery<T>) -> RepoResult<Vec<T>> {
        let entities = self.store.list(T::COLLECTION, &ListOptions::new())?;
        Ok(query.apply(Self::decode_all(entities)))
    }

    /// Every record in the collection, in id order.
    pub fn all(&self) -> RepoResult<Vec<T>> {
        self.list(RecordQuery::new())
    }

    /// Records whose `field` equals `value` exactly.
    pub fn find_by(&self, field: &str, value: &Value) -> RepoResult<Vec<T>> {
        let field = field.to_string();
        let value = value.clone();
        let options = ListOptions::new().filter(move |e| e.field(&field).as_ref() == Some(&value));
        let entities = self.store.list(T::COLLECTION, &options)?;
        Ok(Self::decode_all(entities))
    }

    /// The first record whose `field` equals `value`.
    pub fn find_one_by(&self, field: &str, value: &Value) -> RepoResult<Option<T>> {
        Ok(self.find_by(field, value)?.into_iter().next())
    }

    /// Case-insensitive regex search within this collection.
    pub fn search(
        &self,
        query: &str,
        fields: Option<&[&str]>,
        limit: Option<usize>,
    ) -> RepoResult<Vec<T>> {
        let mut options = SearchOptions::new().collections([T::COLLECTION]);
        if let Some(fields) = fields {
            options = options.fields(fields.iter().copied());
        }
        if let Some(limit) = limit {
            options = options.limit(limit);
        }
        let hits = self.store.search(query, &options)?;
        Ok(Self::decode_all(hits.into_iter().map(|hit| hit.entity).collect()))
    }

    /// Number of records, optionally only those matching `filter`.
    pub fn count(&self, filter: Option<&RecordFilter<T>>) -> RepoResult<usize> {
        match filter {
            None => Ok(self.store.count(T::COLLECTION, None)?),
            Some(filter) => Ok(self.all()?.iter().filter(|r| filter(*r)).count()),
        }
    }

    /// Remove every record and forget the last sync time.
    pub fn clear(&self) -> RepoResult<()> {
        Ok(self.store.clear(T::COLLECTION)?)
    }

    /// When the collection was last bulk-synced.
    pub fn last_sync(&self) -> RepoResult<Option<Timestamp>> {
        Ok(self.store.get_last_sync(T::COLLECTION)?)
    }

    /// True when the collection was never bulk-synced or is older than `max_age`.
    pub fn needs_sync(&self, max_age: chrono::Duration) -> RepoResult<bool> {
        Ok(match self.last_sync()? {
            None => true,
            Some(last) => temporal::now() - last > max_age,
        })
    }

    /// Mark the collection as synced now.
    pub fn update_sync_time(&self) -> RepoResult<Timestamp> {
        Ok(self.store.update_last_sync(T::COLLECTION)?)
    }
}
