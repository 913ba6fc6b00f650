use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::thread;

use cachedb_types::{
    temporal, validate_collection_name, Collection, DatabaseMetadata, Entity, ExportFile, Source,
    Timestamp,
};
use cachedb_write::{write_json, FallbackWriter, WriteStrategy};
use tracing::{debug, info, warn};

use crate::backup::BackupManager;
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::query::{compile_query, haystack, Filter, ListOptions, SearchHit, SearchOptions};
use crate::recovery::recover_directory;
use crate::stats::{CollectionStats, StoreStats};

/// Lifecycle of a [`DocumentStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreState {
    Uninitialized,
    Initializing,
    Ready,
}

/// Everything loaded from the database directory.
struct Database {
    collections: BTreeMap<String, Collection>,
    metadata: DatabaseMetadata,
}

enum State {
    Uninitialized,
    Initializing,
    Ready(Database),
}

/// The collection/entity persistence engine.
///
/// Holds every collection of one database directory in memory and mirrors
/// each to `<name>.json`. Reads never touch disk. Every mutation snapshots
/// the affected collection into `backups/`, applies the change to a copy,
/// writes the collection file, and only then swaps the copy in and touches
/// `metadata.json`. A failed write therefore leaves memory matching disk.
///
/// Reads share a lock; mutations are serialized. Separate processes writing
/// the same directory are not coordinated.
pub struct DocumentStore {
    config: StoreConfig,
    writer: Arc<dyn WriteStrategy>,
    backups: BackupManager,
    state: RwLock<State>,
}

impl DocumentStore {
    /// An uninitialized store using the configured (or probed) write profile.
    pub fn new(config: StoreConfig) -> Self {
        let writer: Arc<dyn WriteStrategy> =
            Arc::new(FallbackWriter::new(config.resolved_write_profile()));
        Self::with_writer(config, writer)
    }

    /// An uninitialized store writing through `writer`.
    pub fn with_writer(config: StoreConfig, writer: Arc<dyn WriteStrategy>) -> Self {
        let backups = BackupManager::new(
            config.backups_dir(),
            config.backup_retention,
            Arc::clone(&writer),
        );
        Self {
            config,
            writer,
            backups,
            state: RwLock::new(State::Uninitialized),
        }
    }

    /// Create and initialize in one step.
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        let store = Self::new(config);
        store.initialize()?;
        Ok(store)
    }

    /// The configuration this store was built with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The database directory, `<root>/<instance>`.
    pub fn db_dir(&self) -> PathBuf {
        self.config.db_dir()
    }

    /// Backup rotation for this database.
    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StoreState {
        match *self.state.read().expect("lock poisoned") {
            State::Uninitialized => StoreState::Uninitialized,
            State::Initializing => StoreState::Initializing,
            State::Ready(_) => StoreState::Ready,
        }
    }

    // ---------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------

    /// Create directories, repair damaged files, and load every collection.
    ///
    /// Retries with linear backoff; returns immediately if already ready.
    pub fn initialize(&self) -> StoreResult<()> {
        {
            let mut state = self.state.write().expect("lock poisoned");
            match *state {
                State::Ready(_) => return Ok(()),
                State::Initializing => {
                    return Err(StoreError::Initialization {
                        path: self.db_dir(),
                        attempts: 0,
                        cause: "initialization already in progress".into(),
                    })
                }
                State::Uninitialized => *state = State::Initializing,
            }
        }

        let attempts = self.config.init_retries.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.load_database() {
                Ok(db) => {
                    *self.state.write().expect("lock poisoned") = State::Ready(db);
                    return Ok(());
                }
                Err(e) => {
                    warn!(path = %self.db_dir().display(), attempt, error = %e, "database initialization failed");
                    last_error = Some(e);
                    if attempt < attempts {
                        thread::sleep(self.config.retry_backoff(attempt));
                    }
                }
            }
        }

        *self.state.write().expect("lock poisoned") = State::Uninitialized;
        Err(StoreError::Initialization {
            path: self.db_dir(),
            attempts,
            cause: last_error.map(|e| e.to_string()).unwrap_or_default(),
        })
    }

    /// Drop the in-memory state. The store must be initialized again.
    pub fn close(&self) {
        *self.state.write().expect("lock poisoned") = State::Uninitialized;
        debug!(path = %self.db_dir().display(), "store closed");
    }

    fn load_database(&self) -> StoreResult<Database> {
        let db_dir = self.db_dir();
        let backups_dir = self.config.backups_dir();
        fs::create_dir_all(&db_dir)?;
        fs::create_dir_all(&backups_dir)?;

        let report = recover_directory(&db_dir, &backups_dir, self.writer.as_ref())?;
        let metadata = self.load_metadata()?;
        let collections = self.load_collections()?;

        info!(
            path = %db_dir.display(),
            collections = collections.len(),
            restored = report.restored.len(),
            unrecoverable = report.unrecoverable.len(),
            "database initialized"
        );
        Ok(Database {
            collections,
            metadata,
        })
    }

    fn load_metadata(&self) -> StoreResult<DatabaseMetadata> {
        let path = self.config.metadata_path();
        match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<DatabaseMetadata>(&text) {
                Ok(metadata) => return Ok(metadata),
                Err(e) => warn!(path = %path.display(), error = %e, "corrupt metadata; recreating"),
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "creating metadata");
            }
            Err(e) => return Err(e.into()),
        }

        let metadata = DatabaseMetadata::new();
        write_json(self.writer.as_ref(), &path, &metadata)?;
        Ok(metadata)
    }

    fn load_collections(&self) -> StoreResult<BTreeMap<String, Collection>> {
        let mut collections = BTreeMap::new();
        for entry in fs::read_dir(self.db_dir())? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            let Some(name) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(".json"))
            else {
                continue;
            };
            if validate_collection_name(name).is_err() {
                continue;
            }

            let loaded = fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|text| Collection::from_json(&text).map_err(|e| e.to_string()));
            let collection = match loaded {
                Ok(mut collection) => {
                    collection.normalize(name);
                    collection
                }
                Err(e) => {
                    warn!(collection = name, error = %e, "failed to load collection; starting empty");
                    Collection::new()
                }
            };
            collections.insert(name.to_string(), collection);
        }
        Ok(collections)
    }

    // ---------------------------------------------------------------
    // Internal helpers
    // ---------------------------------------------------------------

    fn read<R>(&self, f: impl FnOnce(&Database) -> R) -> StoreResult<R> {
        match &*self.state.read().expect("lock poisoned") {
            State::Ready(db) => Ok(f(db)),
            _ => Err(StoreError::NotInitialized(self.db_dir())),
        }
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut Database) -> StoreResult<R>) -> StoreResult<R> {
        match &mut *self.state.write().expect("lock poisoned") {
            State::Ready(db) => f(db),
            _ => Err(StoreError::NotInitialized(self.db_dir())),
        }
    }

    /// Snapshot `collection` before it changes. Failures are logged only.
    fn backup(&self, name: &str, collection: &Collection) {
        if collection.is_empty() && !self.config.collection_path(name).exists() {
            return;
        }
        if let Err(e) = self.backups.snapshot(name, collection) {
            warn!(collection = name, error = %e, "backup failed; continuing without one");
        }
    }

    /// Persist `collection`, install it, then touch the metadata file.
    ///
    /// `synced` becomes the database `lastSync` once the collection is on disk.
    fn commit(
        &self,
        db: &mut Database,
        name: &str,
        collection: Collection,
        synced: Option<Timestamp>,
    ) -> StoreResult<()> {
        write_json(
            self.writer.as_ref(),
            &self.config.collection_path(name),
            &collection,
        )?;
        db.collections.insert(name.to_string(), collection);
        if synced.is_some() {
            db.metadata.last_sync = synced;
        }
        self.persist_metadata(&mut db.metadata)
    }

    fn persist_metadata(&self, metadata: &mut DatabaseMetadata) -> StoreResult<()> {
        metadata.touch();
        write_json(self.writer.as_ref(), &self.config.metadata_path(), metadata)?;
        Ok(())
    }

    fn working_copy(db: &Database, name: &str) -> Collection {
        db.collections.get(name).cloned().unwrap_or_default()
    }

    fn clear_in(&self, db: &mut Database, name: &str) -> StoreResult<()> {
        let mut collection = Self::working_copy(db, name);
        self.backup(name, &collection);
        collection.reset();
        self.commit(db, name, collection, None)
    }

    // ---------------------------------------------------------------
    // Entity operations
    // ---------------------------------------------------------------

    /// Look up one entity. Never touches disk.
    pub fn get(&self, name: &str, id: &str) -> StoreResult<Option<Entity>> {
        validate_collection_name(name)?;
        self.read(|db| {
            db.collections
                .get(name)
                .and_then(|c| c.entities.get(id))
                .cloned()
        })
    }

    /// Whether `id` exists in the collection.
    pub fn has(&self, name: &str, id: &str) -> StoreResult<bool> {
        validate_collection_name(name)?;
        self.read(|db| {
            db.collections
                .get(name)
                .is_some_and(|c| c.entities.contains_key(id))
        })
    }

    /// Insert or overwrite one entity. Leaves the collection's `lastSync` alone.
    pub fn set(&self, name: &str, entity: Entity) -> StoreResult<()> {
        validate_collection_name(name)?;
        entity.validate()?;
        self.mutate(|db| {
            let mut collection = Self::working_copy(db, name);
            self.backup(name, &collection);
            let mut entity = entity;
            entity.stamp(Source::Api);
            collection.insert(entity);
            self.commit(db, name, collection, None)
        })
    }

    /// Insert or overwrite a batch with one backup and one write, and mark
    /// the collection as synced now.
    pub fn set_many(&self, name: &str, entities: Vec<Entity>) -> StoreResult<()> {
        validate_collection_name(name)?;
        for entity in &entities {
            entity.validate()?;
        }
        self.mutate(|db| {
            let mut collection = Self::working_copy(db, name);
            self.backup(name, &collection);
            let count = entities.len();
            for mut entity in entities {
                entity.stamp(Source::Api);
                collection.insert(entity);
            }
            let now = temporal::now();
            collection.last_sync = Some(now);
            self.commit(db, name, collection, Some(now))?;
            debug!(collection = name, count, "batch stored");
            Ok(())
        })
    }

    /// Remove one entity. Returns whether it existed.
    pub fn delete(&self, name: &str, id: &str) -> StoreResult<bool> {
        validate_collection_name(name)?;
        self.mutate(|db| {
            let Some(current) = db.collections.get(name) else {
                return Ok(false);
            };
            if !current.entities.contains_key(id) {
                return Ok(false);
            }
            let mut collection = current.clone();
            self.backup(name, &collection);
            collection.entities.remove(id);
            self.commit(db, name, collection, None)?;
            Ok(true)
        })
    }

    /// Filter, sort, then paginate a collection's entities.
    pub fn list(&self, name: &str, options: &ListOptions) -> StoreResult<Vec<Entity>> {
        validate_collection_name(name)?;
        self.read(|db| match db.collections.get(name) {
            Some(collection) => options.apply(collection.entities.values()),
            None => Vec::new(),
        })
    }

    /// Number of entities, optionally only those matching `filter`.
    pub fn count(&self, name: &str, filter: Option<&Filter>) -> StoreResult<usize> {
        validate_collection_name(name)?;
        self.read(|db| {
            db.collections
                .get(name)
                .map(|c| match filter {
                    Some(f) => c.entities.values().filter(|e| f(*e)).count(),
                    None => c.len(),
                })
                .unwrap_or(0)
        })
    }

    // ---------------------------------------------------------------
    // Collection operations
    // ---------------------------------------------------------------

    /// Empty a collection and forget its last sync time.
    pub fn clear(&self, name: &str) -> StoreResult<()> {
        validate_collection_name(name)?;
        self.mutate(|db| self.clear_in(db, name))
    }

    /// [`clear`](Self::clear) every known collection.
    pub fn clear_all(&self) -> StoreResult<()> {
        self.mutate(|db| {
            let names: Vec<String> = db.collections.keys().cloned().collect();
            for name in &names {
                self.clear_in(db, name)?;
            }
            info!(collections = names.len(), "all collections cleared");
            Ok(())
        })
    }

    /// When the collection was last bulk-synced.
    pub fn get_last_sync(&self, name: &str) -> StoreResult<Option<Timestamp>> {
        validate_collection_name(name)?;
        self.read(|db| db.collections.get(name).and_then(|c| c.last_sync))
    }

    /// Mark a collection as bulk-synced now without changing its entities.
    pub fn update_last_sync(&self, name: &str) -> StoreResult<Timestamp> {
        validate_collection_name(name)?;
        self.mutate(|db| {
            let mut collection = Self::working_copy(db, name);
            let now = temporal::now();
            collection.last_sync = Some(now);
            self.commit(db, name, collection, Some(now))?;
            Ok(now)
        })
    }

    /// Names of every loaded collection, sorted.
    pub fn collection_names(&self) -> StoreResult<Vec<String>> {
        self.read(|db| db.collections.keys().cloned().collect())
    }

    /// A copy of the database metadata.
    pub fn metadata(&self) -> StoreResult<DatabaseMetadata> {
        self.read(|db| db.metadata.clone())
    }

    /// Replace a collection with its newest readable backup.
    ///
    /// Returns `false` when no backup exists.
    pub fn restore_backup(&self, name: &str) -> StoreResult<bool> {
        validate_collection_name(name)?;
        let Some(mut restored) = self.backups.restore_latest(name)? else {
            return Ok(false);
        };
        restored.normalize(name);
        self.mutate(|db| {
            if let Some(current) = db.collections.get(name) {
                self.backup(name, current);
            }
            self.commit(db, name, restored, None)?;
            info!(collection = name, "collection restored from backup");
            Ok(true)
        })
    }

    // ---------------------------------------------------------------
    // Search, export, import, statistics
    // ---------------------------------------------------------------

    /// Case-insensitive regex search across collections.
    ///
    /// Collections are scanned in the requested order (by name when none
    /// are given) and entities by id; scanning stops at `limit` hits.
    pub fn search(&self, query: &str, options: &SearchOptions) -> StoreResult<Vec<SearchHit>> {
        let re = compile_query(query)?;
        self.read(|db| {
            let names: Vec<&str> = match &options.collections {
                Some(names) => names.iter().map(String::as_str).collect(),
                None => db.collections.keys().map(String::as_str).collect(),
            };
            let limit = options.limit.unwrap_or(usize::MAX);
            let mut hits = Vec::new();
            if limit == 0 {
                return hits;
            }

            'scan: for name in names {
                let Some(collection) = db.collections.get(name) else {
                    continue;
                };
                for entity in collection.entities.values() {
                    if re.is_match(&haystack(entity, options.fields.as_deref())) {
                        hits.push(SearchHit {
                            collection: name.to_string(),
                            entity: entity.clone(),
                        });
                        if hits.len() >= limit {
                            break 'scan;
                        }
                    }
                }
            }
            hits
        })
    }

    /// Write the whole database to one file and return its path.
    ///
    /// Defaults to `exports/export_<stamp>.json` in the database directory.
    pub fn export(&self, path: Option<&Path>) -> StoreResult<PathBuf> {
        let export = self.read(|db| ExportFile {
            metadata: db.metadata.clone(),
            collections: db.collections.clone(),
            exported_at: temporal::now(),
        })?;

        let target = match path {
            Some(path) => path.to_path_buf(),
            None => self.config.exports_dir().join(format!(
                "export_{}.json",
                export.exported_at.format("%Y-%m-%dT%H-%M-%S-%3fZ")
            )),
        };
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        write_json(self.writer.as_ref(), &target, &export)?;
        info!(
            path = %target.display(),
            collections = export.collections.len(),
            "database exported"
        );
        Ok(target)
    }

    /// Merge collections from an export file into this database.
    ///
    /// Every existing collection is backed up first. Collections in the file
    /// replace their namesakes; collections absent from the file are kept.
    /// Returns the imported collection names.
    pub fn import(&self, path: &Path) -> StoreResult<Vec<String>> {
        let format_error = |reason: String| StoreError::ImportFormat {
            path: path.to_path_buf(),
            reason,
        };
        let text = fs::read_to_string(path).map_err(|e| format_error(e.to_string()))?;
        let export: ExportFile =
            serde_json::from_str(&text).map_err(|e| format_error(e.to_string()))?;
        for name in export.collections.keys() {
            validate_collection_name(name)?;
        }

        let imported = self.mutate(|db| {
            for (name, collection) in &db.collections {
                self.backup(name, collection);
            }

            let mut imported = Vec::with_capacity(export.collections.len());
            for (name, mut collection) in export.collections {
                let before = collection.len();
                collection.entities.retain(|_, e| e.validate().is_ok());
                if collection.len() != before {
                    warn!(collection = %name, dropped = before - collection.len(), "skipping invalid entities");
                }
                collection.normalize(&name);
                for entity in collection.entities.values_mut() {
                    entity.stamp(Source::Import);
                }
                write_json(
                    self.writer.as_ref(),
                    &self.config.collection_path(&name),
                    &collection,
                )?;
                db.collections.insert(name.clone(), collection);
                imported.push(name);
            }

            self.persist_metadata(&mut db.metadata)?;
            Ok(imported)
        })?;

        info!(path = %path.display(), collections = imported.len(), "database imported");
        Ok(imported)
    }

    /// Per-collection counts, sync times, and serialized sizes.
    pub fn stats(&self) -> StoreResult<StoreStats> {
        self.read(|db| -> StoreResult<StoreStats> {
            let mut collections = Vec::with_capacity(db.collections.len());
            for (name, collection) in &db.collections {
                collections.push(CollectionStats {
                    name: name.clone(),
                    count: collection.len(),
                    last_sync: collection.last_sync,
                    size_bytes: collection.size_bytes()?,
                });
            }
            Ok(StoreStats::new(collections, db.metadata.clone()))
        })?
    }
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("db_dir", &self.db_dir())
            .field("state", &self.state())
            .finish()
    }
}
