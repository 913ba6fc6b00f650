//! Process-wide shared stores, one per database directory.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};

use tracing::debug;

use crate::config::StoreConfig;
use crate::error::StoreResult;
use crate::store::DocumentStore;

fn registry() -> &'static Mutex<HashMap<PathBuf, Arc<DocumentStore>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<PathBuf, Arc<DocumentStore>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// The initialized store for `config`'s database directory.
///
/// The first call for a directory opens it; later calls return the same
/// instance and ignore any other differences in `config`.
pub fn shared(config: StoreConfig) -> StoreResult<Arc<DocumentStore>> {
    let mut stores = registry().lock().expect("lock poisoned");
    let key = config.db_dir();
    if let Some(store) = stores.get(&key) {
        return Ok(Arc::clone(store));
    }

    let store = Arc::new(DocumentStore::open(config)?);
    debug!(path = %key.display(), "shared store opened");
    stores.insert(key, Arc::clone(&store));
    Ok(store)
}

/// Close and forget every shared store.
pub fn reset() {
    let mut stores = registry().lock().expect("lock poisoned");
    for store in stores.values() {
        store.close();
    }
    stores.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use cachedb_types::Entity;
    use cachedb_write::WriteProfile;

    fn config(dir: &std::path::Path) -> StoreConfig {
        StoreConfig::at(dir).with_write_profile(WriteProfile::default())
    }

    #[test]
    fn same_directory_shares_one_instance() {
        let dir = tempfile::tempdir().unwrap();
        let a = shared(config(dir.path())).unwrap();
        let b = shared(config(dir.path())).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        a.set("users", Entity::new("u1")).unwrap();
        assert!(b.has("users", "u1").unwrap());
    }

    #[test]
    fn instances_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let a = shared(config(dir.path()).with_instance("alpha")).unwrap();
        let b = shared(config(dir.path()).with_instance("beta")).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));

        a.set("users", Entity::new("u1")).unwrap();
        assert!(!b.has("users", "u1").unwrap());
    }
}
