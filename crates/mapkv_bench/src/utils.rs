//! Benchmark utilities.

use mapkv_core::{Builder, CommitMode, Store};
use rand::Rng;
use tempfile::TempDir;

/// Generate random data of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate a random lowercase string of the specified length.
pub fn random_string(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen_range(b'a'..=b'z') as char).collect()
}

/// Generate `count` distinct keys.
pub fn generate_keys(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("key-{i:08}")).collect()
}

/// Opens a store in a fresh temporary directory.
///
/// The directory is returned alongside and must outlive the store.
pub fn open_store(mode: CommitMode) -> (TempDir, Store) {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let store = Builder::new(dir.path(), "bench")
        .commit_mode(mode)
        .blocking()
        .build()
        .expect("Failed to open store");
    (dir, store)
}

/// Opens a store holding `count` string values of `value_size` bytes.
pub fn populated_store(count: usize, value_size: usize) -> (TempDir, Store) {
    let (dir, store) = open_store(CommitMode::Async);
    let value = random_string(value_size);
    let mut batch = store.edit();
    for key in generate_keys(count) {
        batch = batch.put_string(&key, &value);
    }
    batch.commit().expect("Failed to populate store");
    (dir, store)
}
