//! Startup repair of a database directory.
//!
//! Runs before any collection is loaded. A collection file that is empty or
//! not valid JSON is replaced by its `<name>.json.tmp` sibling when that
//! sibling parses; a temp file whose collection file is missing is promoted
//! the same way. Whatever cannot be repaired is left for the loader, which
//! substitutes an empty collection. Finally every remaining `*.tmp` in the
//! directory and in `backups/` is removed.

use std::fs;
use std::path::{Path, PathBuf};

use cachedb_write::{temp_path, WriteStrategy};
use tracing::{info, warn};

use crate::config::metadata_file_name;
use crate::error::StoreResult;

/// What a recovery pass did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Collection files rebuilt from their temp sibling.
    pub restored: Vec<PathBuf>,
    /// Corrupt collection files with no usable temp sibling.
    pub unrecoverable: Vec<PathBuf>,
    pub temp_files_removed: usize,
    pub cleanup_failures: usize,
}

impl RecoveryReport {
    pub fn is_clean(&self) -> bool {
        self.restored.is_empty() && self.unrecoverable.is_empty() && self.temp_files_removed == 0
    }
}

/// Whether `bytes` hold a non-empty, parseable JSON document.
pub fn is_valid_json(bytes: &[u8]) -> bool {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return false;
    }
    serde_json::from_slice::<serde_json::Value>(bytes).is_ok()
}

fn read_valid(path: &Path) -> Option<Vec<u8>> {
    let bytes = fs::read(path).ok()?;
    is_valid_json(&bytes).then_some(bytes)
}

fn file_names(dir: &Path) -> StoreResult<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

/// Repair `db_dir` in place and sweep stale temp files.
pub fn recover_directory(
    db_dir: &Path,
    backups_dir: &Path,
    writer: &dyn WriteStrategy,
) -> StoreResult<RecoveryReport> {
    let mut report = RecoveryReport::default();
    let metadata = metadata_file_name();
    let names = file_names(db_dir)?;

    for name in &names {
        let target = if let Some(stem) = name.strip_suffix(".json.tmp") {
            // Only orphaned temp files; those with a sibling are handled below.
            let target = format!("{stem}.json");
            if target == metadata || names.contains(&target) {
                continue;
            }
            db_dir.join(target)
        } else if name.ends_with(".json") && name != metadata {
            let path = db_dir.join(name);
            match fs::read(&path) {
                Ok(bytes) if is_valid_json(&bytes) => continue,
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "unreadable collection file"),
            }
            path
        } else {
            continue;
        };

        restore_from_temp(&target, writer, &mut report);
    }

    sweep_temp_files(db_dir, &mut report);
    if backups_dir.is_dir() {
        sweep_temp_files(backups_dir, &mut report);
    }

    if !report.is_clean() {
        info!(
            path = %db_dir.display(),
            restored = report.restored.len(),
            unrecoverable = report.unrecoverable.len(),
            temp_files_removed = report.temp_files_removed,
            "recovery pass finished"
        );
    }
    Ok(report)
}

fn restore_from_temp(target: &Path, writer: &dyn WriteStrategy, report: &mut RecoveryReport) {
    let tmp = temp_path(target);
    let Some(bytes) = read_valid(&tmp) else {
        warn!(path = %target.display(), "corrupt collection file has no valid temp sibling");
        report.unrecoverable.push(target.to_path_buf());
        return;
    };

    // The writer stages through the same `.tmp` path and consumes it.
    match writer.write(target, &bytes) {
        Ok(outcome) if outcome.is_canonical() => {
            info!(path = %target.display(), method = %outcome.method, "restored collection file from temp");
            report.restored.push(target.to_path_buf());
        }
        Ok(_) => {
            warn!(path = %target.display(), "could not replace corrupt collection file");
            report.unrecoverable.push(target.to_path_buf());
        }
        Err(e) => {
            warn!(path = %target.display(), error = %e, "failed to restore collection file");
            report.unrecoverable.push(target.to_path_buf());
        }
    }
}

fn sweep_temp_files(dir: &Path, report: &mut RecoveryReport) {
    let names = match file_names(dir) {
        Ok(names) => names,
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "cannot list directory for temp cleanup");
            report.cleanup_failures += 1;
            return;
        }
    };

    for name in names.iter().filter(|n| n.ends_with(".tmp")) {
        let path = dir.join(name);
        match fs::remove_file(&path) {
            Ok(()) => report.temp_files_removed += 1,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to remove stale temp file");
                report.cleanup_failures += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cachedb_write::{FallbackWriter, WriteProfile};

    fn setup() -> (tempfile::TempDir, PathBuf, PathBuf, FallbackWriter) {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("default");
        let backups = db.join("backups");
        fs::create_dir_all(&backups).unwrap();
        (dir, db, backups, FallbackWriter::new(WriteProfile::default()))
    }

    const VALID: &str = r#"{"version":"1.0.0","lastSync":null,"entities":{"a":{"id":"a"}}}"#;

    #[test]
    fn valid_json_detection() {
        assert!(is_valid_json(b"{}"));
        assert!(is_valid_json(VALID.as_bytes()));
        assert!(!is_valid_json(b""));
        assert!(!is_valid_json(b"  \n"));
        assert!(!is_valid_json(b"{\"truncated\": "));
    }

    #[test]
    fn restores_corrupt_file_from_temp() {
        let (_dir, db, backups, writer) = setup();
        let target = db.join("users.json");
        fs::write(&target, "{ not json").unwrap();
        fs::write(temp_path(&target), VALID).unwrap();

        let report = recover_directory(&db, &backups, &writer).unwrap();
        assert_eq!(report.restored, vec![target.clone()]);
        assert_eq!(fs::read_to_string(&target).unwrap(), VALID);
        assert!(!temp_path(&target).exists());
    }

    #[test]
    fn restores_empty_file_from_temp() {
        let (_dir, db, backups, writer) = setup();
        let target = db.join("cards.json");
        fs::write(&target, "").unwrap();
        fs::write(temp_path(&target), VALID).unwrap();

        let report = recover_directory(&db, &backups, &writer).unwrap();
        assert_eq!(report.restored.len(), 1);
        assert_eq!(fs::read_to_string(&target).unwrap(), VALID);
    }

    #[test]
    fn promotes_orphaned_temp_file() {
        let (_dir, db, backups, writer) = setup();
        let target = db.join("groups.json");
        fs::write(temp_path(&target), VALID).unwrap();

        let report = recover_directory(&db, &backups, &writer).unwrap();
        assert_eq!(report.restored, vec![target.clone()]);
        assert_eq!(fs::read_to_string(&target).unwrap(), VALID);
    }

    #[test]
    fn leaves_corrupt_file_without_valid_temp() {
        let (_dir, db, backups, writer) = setup();
        let target = db.join("users.json");
        fs::write(&target, "garbage").unwrap();
        fs::write(temp_path(&target), "also garbage").unwrap();

        let report = recover_directory(&db, &backups, &writer).unwrap();
        assert_eq!(report.unrecoverable, vec![target.clone()]);
        assert_eq!(fs::read_to_string(&target).unwrap(), "garbage");
        // The useless temp file is swept.
        assert!(!temp_path(&target).exists());
        assert_eq!(report.temp_files_removed, 1);
    }

    #[test]
    fn valid_file_keeps_content_and_stale_temp_is_swept() {
        let (_dir, db, backups, writer) = setup();
        let target = db.join("users.json");
        fs::write(&target, VALID).unwrap();
        fs::write(temp_path(&target), r#"{"version":"1.0.0","entities":{}}"#).unwrap();
        fs::write(backups.join("users_2026-01-01T00-00-00-000000Z.json.tmp"), "x").unwrap();

        let report = recover_directory(&db, &backups, &writer).unwrap();
        assert!(report.restored.is_empty());
        assert_eq!(report.temp_files_removed, 2);
        assert_eq!(fs::read_to_string(&target).unwrap(), VALID);
    }

    #[test]
    fn metadata_is_not_restored_from_temp() {
        let (_dir, db, backups, writer) = setup();
        fs::write(db.join("metadata.json"), "").unwrap();
        fs::write(db.join("metadata.json.tmp"), "{}").unwrap();

        let report = recover_directory(&db, &backups, &writer).unwrap();
        assert!(report.restored.is_empty());
        assert_eq!(fs::read_to_string(db.join("metadata.json")).unwrap(), "");
    }

    #[test]
    fn clean_directory_reports_clean() {
        let (_dir, db, backups, writer) = setup();
        fs::write(db.join("users.json"), VALID).unwrap();
        let report = recover_directory(&db, &backups, &writer).unwrap();
        assert!(report.is_clean());
    }
}
