use std::path::{Path, PathBuf};
use std::time::Duration;

use cachedb_write::WriteProfile;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Overrides the database root directory.
pub const ROOT_ENV: &str = "CACHEDB_ROOT";
/// Overrides the database instance name.
pub const INSTANCE_ENV: &str = "CACHEDB_INSTANCE";

const METADATA_FILE: &str = "metadata.json";
const BACKUPS_DIR: &str = "backups";
const EXPORTS_DIR: &str = "exports";

/// Where a database lives and how it behaves.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding one subdirectory per instance.
    pub root: PathBuf,
    /// Instance name; the database directory is `root/instance`.
    pub instance: String,
    /// Backups kept per collection. Zero disables backups.
    pub backup_retention: usize,
    /// Initialization attempts before giving up.
    pub init_retries: u32,
    /// Base delay between attempts, multiplied by the attempt number.
    pub retry_backoff_ms: u64,
    /// Write capabilities; probed at startup when unset.
    pub write_profile: Option<WriteProfile>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            instance: "default".to_string(),
            backup_retention: 10,
            init_retries: 3,
            retry_backoff_ms: 100,
            write_profile: None,
        }
    }
}

fn default_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cachedb")
}

impl StoreConfig {
    /// Defaults rooted at `root`.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Read a TOML file, then apply environment overrides.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Config(format!("{}: {e}", path.display())))?;
        Ok(Self::from_toml_str(&text)?.with_overrides(|key| std::env::var(key).ok()))
    }

    pub fn from_toml_str(text: &str) -> StoreResult<Self> {
        toml::from_str(text).map_err(|e| StoreError::Config(e.to_string()))
    }

    /// Apply overrides from `lookup` (normally the process environment).
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(root) = lookup(ROOT_ENV).filter(|v| !v.trim().is_empty()) {
            self.root = PathBuf::from(root);
        }
        if let Some(instance) = lookup(INSTANCE_ENV).filter(|v| !v.trim().is_empty()) {
            self.instance = instance;
        }
        self
    }

    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = instance.into();
        self
    }

    pub fn with_write_profile(mut self, profile: WriteProfile) -> Self {
        self.write_profile = Some(profile);
        self
    }

    /// The configured profile, or a fresh probe.
    pub fn resolved_write_profile(&self) -> WriteProfile {
        self.write_profile.unwrap_or_else(WriteProfile::detect)
    }

    /// Delay before retrying after `attempt` failed.
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(u64::from(attempt)))
    }

    pub fn db_dir(&self) -> PathBuf {
        self.root.join(&self.instance)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.db_dir().join(METADATA_FILE)
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.db_dir().join(BACKUPS_DIR)
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.db_dir().join(EXPORTS_DIR)
    }

    pub fn collection_path(&self, name: &str) -> PathBuf {
        self.db_dir().join(format!("{name}.json"))
    }
}

/// File name of the metadata record inside a database directory.
pub(crate) fn metadata_file_name() -> &'static str {
    METADATA_FILE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = StoreConfig::default();
        assert_eq!(c.instance, "default");
        assert_eq!(c.backup_retention, 10);
        assert_eq!(c.init_retries, 3);
        assert_eq!(c.retry_backoff_ms, 100);
        assert!(c.write_profile.is_none());
        assert!(c.root.ends_with(".cachedb"));
    }

    #[test]
    fn layout_paths() {
        let c = StoreConfig::at("/data").with_instance("prod");
        assert_eq!(c.db_dir(), PathBuf::from("/data/prod"));
        assert_eq!(c.metadata_path(), PathBuf::from("/data/prod/metadata.json"));
        assert_eq!(c.backups_dir(), PathBuf::from("/data/prod/backups"));
        assert_eq!(
            c.collection_path("datasets"),
            PathBuf::from("/data/prod/datasets.json")
        );
    }

    #[test]
    fn backoff_is_linear() {
        let c = StoreConfig::default();
        assert_eq!(c.retry_backoff(1), Duration::from_millis(100));
        assert_eq!(c.retry_backoff(3), Duration::from_millis(300));
    }

    #[test]
    fn overrides_replace_root_and_instance() {
        let c = StoreConfig::at("/data").with_overrides(|key| match key {
            ROOT_ENV => Some("/override".into()),
            INSTANCE_ENV => Some("staging".into()),
            _ => None,
        });
        assert_eq!(c.db_dir(), PathBuf::from("/override/staging"));
    }

    #[test]
    fn blank_overrides_are_ignored() {
        let c = StoreConfig::at("/data").with_overrides(|_| Some("  ".into()));
        assert_eq!(c.db_dir(), PathBuf::from("/data/default"));
    }

    #[test]
    fn parses_partial_toml() {
        let c = StoreConfig::from_toml_str(
            r#"
            root = "/srv/cache"
            backup_retention = 3

            [write_profile]
            bundled = true
            signing_restricted = false
            "#,
        )
        .unwrap();
        assert_eq!(c.root, PathBuf::from("/srv/cache"));
        assert_eq!(c.backup_retention, 3);
        assert_eq!(c.init_retries, 3);
        assert!(c.resolved_write_profile().bundled);
    }

    #[test]
    fn rejects_bad_toml() {
        assert!(matches!(
            StoreConfig::from_toml_str("backup_retention = \"many\""),
            Err(StoreError::Config(_))
        ));
    }
}
