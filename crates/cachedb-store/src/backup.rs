use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use cachedb_types::{Collection, Timestamp};
use cachedb_write::{write_json, WriteStrategy};
use chrono::{Duration, NaiveDateTime, SubsecRound, Utc};
use tracing::{debug, warn};

use crate::error::StoreResult;

/// Timestamp suffix of backup file names (ISO 8601 with dashes).
const STAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S-%6fZ";

/// A backup file on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackupFile {
    pub collection: String,
    pub taken_at: Timestamp,
    pub path: PathBuf,
}

/// Timestamped snapshots of collections, pruned to a fixed count.
///
/// Files are named `<collection>_<stamp>.json`. Stamps handed out by one
/// manager are strictly increasing, so name order is age order even when
/// two snapshots are taken within the same microsecond.
pub struct BackupManager {
    dir: PathBuf,
    retention: usize,
    writer: Arc<dyn WriteStrategy>,
    last_stamp: Mutex<Option<Timestamp>>,
}

impl BackupManager {
    pub fn new(dir: PathBuf, retention: usize, writer: Arc<dyn WriteStrategy>) -> Self {
        Self {
            dir,
            retention,
            writer,
            last_stamp: Mutex::new(None),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    fn next_stamp(&self) -> Timestamp {
        let now = Utc::now().trunc_subsecs(6);
        let mut last = self.last_stamp.lock().expect("lock poisoned");
        let stamp = match *last {
            Some(prev) if now <= prev => prev + Duration::microseconds(1),
            _ => now,
        };
        *last = Some(stamp);
        stamp
    }

    fn file_name(collection: &str, stamp: &Timestamp) -> String {
        format!("{collection}_{}.json", stamp.format(STAMP_FORMAT))
    }

    fn parse_file_name(collection: &str, file_name: &str) -> Option<Timestamp> {
        let stamp = file_name
            .strip_prefix(collection)?
            .strip_prefix('_')?
            .strip_suffix(".json")?;
        NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    }

    /// Write a snapshot of `collection`, then prune old ones.
    ///
    /// Returns `None` when retention is zero.
    pub fn snapshot(&self, name: &str, collection: &Collection) -> StoreResult<Option<PathBuf>> {
        if self.retention == 0 {
            return Ok(None);
        }
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(Self::file_name(name, &self.next_stamp()));
        write_json(self.writer.as_ref(), &path, collection)?;
        debug!(collection = name, path = %path.display(), "backup written");
        self.prune(name);
        Ok(Some(path))
    }

    /// Backups of `name`, oldest first.
    pub fn list(&self, name: &str) -> StoreResult<Vec<BackupFile>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut backups = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if let Some(taken_at) = Self::parse_file_name(name, file_name) {
                backups.push(BackupFile {
                    collection: name.to_string(),
                    taken_at,
                    path: entry.path(),
                });
            }
        }
        backups.sort_by(|a, b| a.taken_at.cmp(&b.taken_at));
        Ok(backups)
    }

    /// Delete the oldest backups of `name` beyond the retention count.
    ///
    /// Returns how many were removed. Failures are logged, never raised.
    pub fn prune(&self, name: &str) -> usize {
        let backups = match self.list(name) {
            Ok(backups) => backups,
            Err(e) => {
                warn!(collection = name, error = %e, "cannot list backups for pruning");
                return 0;
            }
        };
        let excess = backups.len().saturating_sub(self.retention);
        let mut removed = 0;
        for backup in backups.iter().take(excess) {
            match fs::remove_file(&backup.path) {
                Ok(()) => removed += 1,
                Err(e) => {
                    warn!(path = %backup.path.display(), error = %e, "failed to remove old backup")
                }
            }
        }
        removed
    }

    /// The newest backup of `name` that still parses.
    pub fn restore_latest(&self, name: &str) -> StoreResult<Option<Collection>> {
        for backup in self.list(name)?.iter().rev() {
            let parsed = fs::read_to_string(&backup.path)
                .map_err(|e| e.to_string())
                .and_then(|text| Collection::from_json(&text).map_err(|e| e.to_string()));
            match parsed {
                Ok(collection) => return Ok(Some(collection)),
                Err(e) => warn!(path = %backup.path.display(), error = %e, "skipping unreadable backup"),
            }
        }
        Ok(None)
    }
}

impl std::fmt::Debug for BackupManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupManager")
            .field("dir", &self.dir)
            .field("retention", &self.retention)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cachedb_types::Entity;
    use cachedb_write::{FallbackWriter, WriteProfile};

    fn manager(dir: &Path, retention: usize) -> BackupManager {
        BackupManager::new(
            dir.join("backups"),
            retention,
            Arc::new(FallbackWriter::new(WriteProfile::default())),
        )
    }

    fn collection_with(ids: &[&str]) -> Collection {
        let mut c = Collection::new();
        for id in ids {
            c.insert(Entity::new(*id));
        }
        c
    }

    #[test]
    fn file_name_roundtrips_through_parser() {
        let stamp: Timestamp = "2026-10-16T08:09:10.123456Z".parse().unwrap();
        let name = BackupManager::file_name("users", &stamp);
        assert_eq!(name, "users_2026-10-16T08-09-10-123456Z.json");
        assert_eq!(BackupManager::parse_file_name("users", &name), Some(stamp));
    }

    #[test]
    fn parser_does_not_match_prefixed_collections() {
        let name = "users_archive_2026-10-16T08-09-10-123456Z.json";
        assert_eq!(BackupManager::parse_file_name("users", name), None);
        assert!(BackupManager::parse_file_name("users_archive", name).is_some());
    }

    #[test]
    fn stamps_are_strictly_increasing() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path(), 10);
        let mut prev = mgr.next_stamp();
        for _ in 0..1000 {
            let next = mgr.next_stamp();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn snapshot_writes_collection_json() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path(), 10);
        let collection = collection_with(&["a", "b"]);

        let path = mgr.snapshot("users", &collection).unwrap().unwrap();
        let text = fs::read_to_string(path).unwrap();
        assert_eq!(Collection::from_json(&text).unwrap(), collection);
    }

    #[test]
    fn retention_keeps_most_recent() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path(), 10);
        let mut written = Vec::new();
        for i in 0..14 {
            let id = format!("e{i}");
            written.push(mgr.snapshot("users", &collection_with(&[&id])).unwrap().unwrap());
        }

        let kept: Vec<PathBuf> = mgr.list("users").unwrap().into_iter().map(|b| b.path).collect();
        assert_eq!(kept.len(), 10);
        assert_eq!(kept, written[4..].to_vec());
    }

    #[test]
    fn pruning_is_per_collection() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path(), 2);
        mgr.snapshot("users", &collection_with(&["u"])).unwrap();
        for _ in 0..5 {
            mgr.snapshot("users_archive", &collection_with(&["a"])).unwrap();
        }
        assert_eq!(mgr.list("users").unwrap().len(), 1);
        assert_eq!(mgr.list("users_archive").unwrap().len(), 2);
    }

    #[test]
    fn zero_retention_disables_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path(), 0);
        assert!(mgr.snapshot("users", &Collection::new()).unwrap().is_none());
        assert!(mgr.list("users").unwrap().is_empty());
    }

    #[test]
    fn restore_latest_skips_corrupt_backups() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path(), 10);
        mgr.snapshot("users", &collection_with(&["good"])).unwrap();
        let newest = mgr.snapshot("users", &collection_with(&["bad"])).unwrap().unwrap();
        fs::write(newest, "{ broken").unwrap();

        let restored = mgr.restore_latest("users").unwrap().unwrap();
        assert!(restored.entities.contains_key("good"));
    }

    #[test]
    fn list_without_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path(), 10);
        assert!(mgr.list("users").unwrap().is_empty());
        assert!(mgr.restore_latest("users").unwrap().is_none());
    }
}
