//! Two handles sharing one file in multi-process mode.
//!
//! Each handle owns its own lock descriptor and mapping, which is exactly
//! what two processes would have, so most of these run in one test
//! process. `another_process_writes_are_observed` re-runs this test binary
//! as a real second process.

use mapkv_core::{Builder, ChangeOrigin, Config, Store};
use std::path::Path;
use std::process::Command;
use std::time::Duration;
use tempfile::tempdir;

/// Store directory handed to the child process.
const CHILD_DIR_ENV: &str = "MAPKV_CHILD_STORE_DIR";

fn open_shared(dir: &Path) -> Store {
    Builder::new(dir, "shared")
        .multi_process()
        .blocking()
        .build()
        .unwrap()
}

fn open_unwatched(dir: &Path) -> Store {
    Builder::new(dir, "shared")
        .config(Config::default().watch_interval(None))
        .multi_process()
        .blocking()
        .build()
        .unwrap()
}

#[test]
fn writes_are_visible_to_the_other_handle() {
    let dir = tempdir().unwrap();
    let a = open_unwatched(dir.path());
    let b = open_unwatched(dir.path());
    assert!(!a.same_store(&b));

    a.put_int("x", 1).unwrap();
    assert_eq!(b.get_int("x", 0), 1);

    b.put_string("y", "from b").unwrap();
    assert_eq!(a.get_string("y").as_deref(), Some("from b"));

    a.put_int("x", 2).unwrap();
    assert_eq!(b.get_int("x", 0), 2);

    assert!(b.remove("x").unwrap());
    assert!(!a.contains("x"));
    assert!(!a.remove("x").unwrap());
}

#[test]
fn overwrites_append_instead_of_patching() {
    let dir = tempdir().unwrap();
    let a = open_unwatched(dir.path());
    let b = open_unwatched(dir.path());

    a.put_int("n", 1).unwrap();
    let before = a.info().unwrap().data_end;
    a.put_int("n", 2).unwrap();
    assert!(a.info().unwrap().data_end > before);
    assert_eq!(a.stats().in_place_updates, 0);
    assert_eq!(b.get_int("n", 0), 2);
}

#[test]
fn growth_by_one_handle_is_followed_by_the_other() {
    let dir = tempdir().unwrap();
    let a = open_unwatched(dir.path());
    let b = open_unwatched(dir.path());
    let capacity = b.info().unwrap().capacity;

    let mut batch = a.edit();
    for i in 0..2000 {
        batch = batch.put_string(&format!("key{i}"), "some value to fill the file");
    }
    batch.commit().unwrap();

    assert_eq!(b.len(), 2000);
    assert_eq!(
        b.get_string("key1999").as_deref(),
        Some("some value to fill the file")
    );
    assert!(b.info().unwrap().capacity > capacity);
}

#[test]
fn compaction_by_one_handle_keeps_the_other_consistent() {
    let dir = tempdir().unwrap();
    let a = open_unwatched(dir.path());
    let b = open_unwatched(dir.path());

    for i in 0..100 {
        a.put_int(&format!("k{i}"), i).unwrap();
    }
    for i in 0..90 {
        a.remove(&format!("k{i}")).unwrap();
    }
    assert_eq!(b.len(), 10);

    let capacity = a.info().unwrap().capacity;
    a.force_compact().unwrap();
    // Shared files are never shrunk
    assert_eq!(a.info().unwrap().capacity, capacity);

    assert_eq!(b.len(), 10);
    assert_eq!(b.get_int("k95", 0), 95);
    b.put_int("after", 1).unwrap();
    assert_eq!(a.get_int("after", 0), 1);
    assert_eq!(a.get_int("k99", 0), 99);
}

#[test]
fn clear_reaches_the_other_handle() {
    let dir = tempdir().unwrap();
    let a = open_unwatched(dir.path());
    let b = open_unwatched(dir.path());
    a.put_int("x", 1).unwrap();
    assert_eq!(b.len(), 1);

    let events = b.subscribe();
    a.clear().unwrap();
    assert!(b.is_empty());
    let event = events.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(event.origin, ChangeOrigin::External);
    assert_eq!(event.key, None);
}

#[test]
fn watcher_notifies_without_reads() {
    let dir = tempdir().unwrap();
    let a = open_shared(dir.path());
    let b = open_shared(dir.path());
    let events = b.subscribe();

    a.put_string("greeting", "hello").unwrap();

    let event = events.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(event.origin, ChangeOrigin::External);
    assert_eq!(event.key.as_deref(), Some("greeting"));
    assert_eq!(b.get_string("greeting").as_deref(), Some("hello"));
    assert!(b.stats().external_syncs >= 1);
}

#[test]
fn reopened_handle_sees_everything() {
    let dir = tempdir().unwrap();
    let a = open_unwatched(dir.path());
    let b = open_unwatched(dir.path());
    a.put_long("a", 1).unwrap();
    b.put_long("b", 2).unwrap();
    a.close().unwrap();
    b.close().unwrap();

    let c = open_unwatched(dir.path());
    assert_eq!(c.get_long("a", 0), 1);
    assert_eq!(c.get_long("b", 0), 2);
}

/// Body of the child process; does nothing unless spawned by
/// `another_process_writes_are_observed`.
#[test]
fn child_writes_x() {
    let Some(dir) = std::env::var_os(CHILD_DIR_ENV) else {
        return;
    };
    let store = open_unwatched(Path::new(&dir));
    store.put_int("x", 1).unwrap();
    store.close().unwrap();
}

#[test]
fn another_process_writes_are_observed() {
    let dir = tempdir().unwrap();
    let store = open_shared(dir.path());
    store.put_int("x", 0).unwrap();
    let events = store.subscribe();

    let output = Command::new(std::env::current_exe().unwrap())
        .args(["child_writes_x", "--exact", "--test-threads=1"])
        .env(CHILD_DIR_ENV, dir.path())
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "child failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let event = events.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(event.origin, ChangeOrigin::External);
    assert_eq!(event.key.as_deref(), Some("x"));
    assert_eq!(store.get_int("x", -1), 1);
    store.close().unwrap();
}
