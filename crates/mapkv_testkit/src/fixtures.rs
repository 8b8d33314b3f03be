//! Test fixtures and store helpers.
//!
//! Provides convenience functions for setting up throwaway stores and
//! common test scenarios.

use mapkv_core::{Builder, Store, StorePaths};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Name used for fixture stores.
pub const TEST_STORE: &str = "test";

/// A store in its own temporary directory, removed on drop.
pub struct TestStore {
    /// The store instance.
    pub store: Store,
    configure: fn(Builder) -> Builder,
    temp_dir: TempDir,
}

impl TestStore {
    /// Opens a fresh store with default settings, loading in the foreground.
    pub fn new() -> Self {
        Self::with(|b| b)
    }

    /// Opens a fresh store with extra builder settings.
    ///
    /// `configure` is reused by [`reopen`](Self::reopen), so it is a plain
    /// function rather than a closure.
    pub fn with(configure: fn(Builder) -> Builder) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = open_in(temp_dir.path(), configure);
        Self {
            store,
            configure,
            temp_dir,
        }
    }

    /// Opens a store over existing file contents, as after a crash.
    pub fn from_image(image: &[u8]) -> Self {
        Self::from_image_and(image, |_| {})
    }

    /// Like [`from_image`](Self::from_image), letting `prepare` place
    /// extra files (staging image, redo marker) before the store opens.
    pub fn from_image_and(image: &[u8], prepare: impl FnOnce(&StorePaths)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let paths = StorePaths::new(temp_dir.path(), TEST_STORE);
        fs::write(paths.primary(), image).expect("Failed to write store image");
        prepare(&paths);
        let configure: fn(Builder) -> Builder = |b| b;
        let store = open_in(temp_dir.path(), configure);
        Self {
            store,
            configure,
            temp_dir,
        }
    }

    /// Closes the store and opens it again from disk.
    pub fn reopen(&mut self) {
        self.store.close().expect("Failed to close store");
        self.store = open_in(self.temp_dir.path(), self.configure);
    }

    /// Opens a second, independent handle on the same file.
    ///
    /// Only meaningful for multi-process stores; a single-process store
    /// refuses the second opener.
    pub fn open_peer(&self) -> Store {
        open_in(self.temp_dir.path(), self.configure)
    }

    /// Directory of the store.
    pub fn dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// File names of the store.
    pub fn paths(&self) -> StorePaths {
        StorePaths::new(self.temp_dir.path(), TEST_STORE)
    }

    /// Current contents of the store file.
    pub fn file_bytes(&self) -> Vec<u8> {
        fs::read(self.paths().primary()).expect("Failed to read store file")
    }
}

impl Default for TestStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestStore {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

fn open_in(dir: &Path, configure: fn(Builder) -> Builder) -> Store {
    configure(Builder::new(dir, TEST_STORE).blocking())
        .build()
        .expect("Failed to open test store")
}

/// Runs a test with a temporary store.
///
/// # Example
///
/// ```rust
/// use mapkv_testkit::with_temp_store;
///
/// with_temp_store(|store| {
///     store.put_int("answer", 42).unwrap();
///     assert_eq!(store.get_int("answer", 0), 42);
/// });
/// ```
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&Store) -> R,
{
    let fixture = TestStore::new();
    f(&fixture.store)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// A store holding `count` int keys `key-0000..` with value = index.
    pub fn populated_store(count: usize) -> TestStore {
        let fixture = TestStore::new();
        let mut batch = fixture.edit();
        for i in 0..count {
            batch = batch.put_int(&format!("key-{i:04}"), i32::try_from(i).unwrap_or(i32::MAX));
        }
        batch.commit().expect("Failed to populate store");
        fixture
    }

    /// A store with one key of every value type.
    pub fn all_types_store() -> TestStore {
        let fixture = TestStore::new();
        fixture.put_bool("bool", true).expect("put");
        fixture.put_int("int", -7).expect("put");
        fixture.put_float("float", 0.5).expect("put");
        fixture.put_long("long", 1 << 40).expect("put");
        fixture.put_double("double", 2.25).expect("put");
        fixture.put_string("string", "text").expect("put");
        fixture.put_bytes("bytes", &[1, 2, 3]).expect("put");
        fixture
            .put_string_set("set", ["a".to_string(), "b".to_string()].into())
            .expect("put");
        fixture
    }
}
