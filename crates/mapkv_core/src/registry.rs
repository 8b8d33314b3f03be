//! Registry of open stores.
//!
//! A [`StoreRegistry`] hands out one live [`Store`] per (directory, name),
//! so independent parts of an application can open "the same" store and
//! share its engine instead of fighting over the file lock.
//!
//! Groups give each user or environment its own directory under the
//! registry root:
//!
//! ```rust,no_run
//! use mapkv_core::{Builder, StoreRegistry};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(StoreRegistry::with_root("/data/app"));
//! let alice = registry.group("alice")?;
//! let settings = alice.open(|dir| Builder::new(dir, "settings").blocking())?;
//! # Ok::<(), mapkv_core::CoreError>(())
//! ```

use crate::error::{CoreError, CoreResult};
use crate::layout::StorePaths;
use crate::store::{Builder, Store};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

type StoreKey = (PathBuf, String);

/// Directories are compared in canonical form, so `dir` and `dir/.` name
/// the same store.
fn store_key(dir: &Path, name: &str) -> StoreKey {
    let dir = fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
    (dir, name.to_string())
}

/// Keeps one open [`Store`] per (directory, name).
#[derive(Debug, Default)]
pub struct StoreRegistry {
    root: Option<PathBuf>,
    stores: Mutex<HashMap<StoreKey, Store>>,
}

impl StoreRegistry {
    /// Creates a registry without a root directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry whose groups live under `root`.
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        Self {
            root: Some(root.as_ref().to_path_buf()),
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// Root directory, if any.
    #[must_use]
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Returns the open store for the builder's (directory, name), or
    /// builds it.
    ///
    /// The builder's settings are ignored when the store is already open.
    ///
    /// # Errors
    ///
    /// Returns any error of [`Builder::build`].
    pub fn open(&self, builder: Builder) -> CoreResult<Store> {
        StorePaths::new(builder.dir(), builder.name()).ensure_dir()?;
        let key = (fs::canonicalize(builder.dir())?, builder.name().to_string());
        let mut stores = self.stores.lock();
        if let Some(store) = stores.get(&key) {
            if !store.is_closed() {
                return Ok(store.clone());
            }
        }
        let store = builder.build()?;
        debug!(dir = %key.0.display(), name = key.1.as_str(), "registered store");
        stores.insert(key, store.clone());
        Ok(store)
    }

    /// Returns the open store at (`dir`, `name`), if any.
    #[must_use]
    pub fn get(&self, dir: &Path, name: &str) -> Option<Store> {
        self.stores
            .lock()
            .get(&store_key(dir, name))
            .filter(|store| !store.is_closed())
            .cloned()
    }

    /// Closes and forgets the store at (`dir`, `name`). Returns `false` if
    /// it was not open.
    ///
    /// # Errors
    ///
    /// Returns the error of the final flush.
    pub fn close(&self, dir: &Path, name: &str) -> CoreResult<bool> {
        let removed = self
            .stores
            .lock()
            .remove(&store_key(dir, name));
        match removed {
            Some(store) => store.close().map(|()| true),
            None => Ok(false),
        }
    }

    /// Closes every store. The first error is returned after all stores
    /// were closed.
    ///
    /// # Errors
    ///
    /// Returns the first error of a final flush.
    pub fn close_all(&self) -> CoreResult<()> {
        let stores: Vec<Store> = self.stores.lock().drain().map(|(_, s)| s).collect();
        let mut first = None;
        for store in stores {
            if let Err(e) = store.close() {
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Number of registered stores.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stores.lock().len()
    }

    /// Returns `true` if no store is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stores.lock().is_empty()
    }

    /// Returns the group `group_id`, rooted at `<root>/<group_id>`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] if the registry has no root or
    /// the id is not a plain directory name.
    pub fn group(self: &Arc<Self>, group_id: &str) -> CoreResult<StoreGroup> {
        let root = self
            .root
            .as_ref()
            .ok_or_else(|| CoreError::invalid_config("registry has no root directory"))?;
        if group_id.is_empty()
            || group_id == "."
            || group_id == ".."
            || group_id.contains(['/', '\\'])
        {
            return Err(CoreError::invalid_config(format!(
                "group id {group_id:?} is not a plain directory name"
            )));
        }
        Ok(StoreGroup {
            registry: Arc::clone(self),
            dir: root.join(group_id),
        })
    }
}

/// Stores of one group, all in the same directory.
#[derive(Debug, Clone)]
pub struct StoreGroup {
    registry: Arc<StoreRegistry>,
    dir: PathBuf,
}

impl StoreGroup {
    /// Directory of the group.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Opens a store in the group. `configure` receives the group directory
    /// and returns the builder to use.
    ///
    /// # Errors
    ///
    /// Returns any error of [`Builder::build`].
    pub fn open(&self, configure: impl FnOnce(&Path) -> Builder) -> CoreResult<Store> {
        let mut builder = configure(&self.dir);
        builder.set_dir(self.dir.clone());
        self.registry.open(builder)
    }

    /// Returns the open store `name` of the group, if any.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Store> {
        self.registry.get(&self.dir, name)
    }

    /// Closes store `name` of the group.
    ///
    /// # Errors
    ///
    /// Returns the error of the final flush.
    pub fn close(&self, name: &str) -> CoreResult<bool> {
        self.registry.close(&self.dir, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_returns_live_instance() {
        let dir = tempdir().unwrap();
        let registry = StoreRegistry::new();
        let a = registry
            .open(Builder::new(dir.path(), "s").blocking())
            .unwrap();
        let b = registry
            .open(Builder::new(dir.path(), "s").blocking())
            .unwrap();
        assert!(a.same_store(&b));
        assert_eq!(registry.len(), 1);

        a.put_int("n", 1).unwrap();
        assert_eq!(b.get_int("n", 0), 1);
    }

    #[test]
    fn equivalent_paths_share_one_store() {
        let dir = tempdir().unwrap();
        let registry = StoreRegistry::new();
        let a = registry
            .open(Builder::new(dir.path(), "s").blocking())
            .unwrap();
        let dotted = dir.path().join(".");
        let b = registry
            .open(Builder::new(&dotted, "s").blocking())
            .unwrap();
        assert!(a.same_store(&b));
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&dotted, "s").is_some());

        assert!(registry.close(&dotted, "s").unwrap());
        assert!(a.is_closed());
    }

    #[test]
    fn close_then_reopen_gives_new_instance() {
        let dir = tempdir().unwrap();
        let registry = StoreRegistry::new();
        let a = registry
            .open(Builder::new(dir.path(), "s").blocking())
            .unwrap();
        assert!(registry.close(dir.path(), "s").unwrap());
        assert!(a.is_closed());
        assert!(!registry.close(dir.path(), "s").unwrap());

        let b = registry
            .open(Builder::new(dir.path(), "s").blocking())
            .unwrap();
        assert!(!a.same_store(&b));
        assert!(registry.get(dir.path(), "s").is_some());
    }

    #[test]
    fn groups_are_separate_directories() {
        let dir = tempdir().unwrap();
        let registry = Arc::new(StoreRegistry::with_root(dir.path()));
        let alice = registry.group("alice").unwrap();
        let bob = registry.group("bob").unwrap();

        let a = alice.open(|d| Builder::new(d, "prefs").blocking()).unwrap();
        let b = bob.open(|d| Builder::new(d, "prefs").blocking()).unwrap();
        assert!(!a.same_store(&b));
        assert_eq!(a.path(), dir.path().join("alice"));

        a.put_string("name", "alice").unwrap();
        assert_eq!(b.get_string("name"), None);
        assert!(alice.get("prefs").is_some());
        registry.close_all().unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn group_requires_root_and_plain_id() {
        let registry = Arc::new(StoreRegistry::new());
        assert!(registry.group("x").is_err());

        let dir = tempdir().unwrap();
        let rooted = Arc::new(StoreRegistry::with_root(dir.path()));
        assert!(rooted.group("../escape").is_err());
        assert!(rooted.group("").is_err());
    }
}
