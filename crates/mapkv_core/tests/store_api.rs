//! Integration tests for the typed store API.

use mapkv_core::{
    Builder, CborEncoder, ChangeListener, ChangeOrigin, CommitMode, Config, CoreError, Store,
    StorePaths, Value, MAX_KEY_SIZE, MAX_VALUE_SIZE,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::tempdir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Point {
    x: i32,
    y: i32,
}

fn open(dir: &Path) -> Store {
    Builder::new(dir, "s").blocking().build().unwrap()
}

fn tags() -> BTreeSet<String> {
    ["red", "green", "blue"].iter().map(|s| s.to_string()).collect()
}

#[test]
fn every_type_survives_reopen() {
    let dir = tempdir().unwrap();
    let store = open(dir.path());
    store.put_bool("bool", true).unwrap();
    store.put_int("int", -42).unwrap();
    store.put_float("float", 1.5).unwrap();
    store.put_long("long", i64::MAX).unwrap();
    store.put_double("double", -0.25).unwrap();
    store.put_string("string", "héllo").unwrap();
    store.put_string("empty", "").unwrap();
    store.put_bytes("bytes", &[0, 1, 2, 255]).unwrap();
    store.put_string_set("set", tags()).unwrap();
    store.close().unwrap();

    let store = open(dir.path());
    assert!(store.get_bool("bool", false));
    assert_eq!(store.get_int("int", 0), -42);
    assert_eq!(store.get_float("float", 0.0), 1.5);
    assert_eq!(store.get_long("long", 0), i64::MAX);
    assert_eq!(store.get_double("double", 0.0), -0.25);
    assert_eq!(store.get_string("string").as_deref(), Some("héllo"));
    assert_eq!(store.get_string("empty").as_deref(), Some(""));
    assert_eq!(store.get_bytes("bytes"), Some(vec![0, 1, 2, 255]));
    assert_eq!(store.get_string_set("set"), Some(tags()));
    assert_eq!(store.len(), 9);
}

#[test]
fn missing_and_mismatched_keys_give_defaults() {
    let dir = tempdir().unwrap();
    let store = open(dir.path());
    store.put_string("name", "ada").unwrap();

    assert_eq!(store.get_int("missing", 7), 7);
    assert_eq!(store.get_int("name", 7), 7);
    assert!(!store.get_bool("name", false));
    assert_eq!(store.get_string_or("missing", "fallback"), "fallback");
    assert_eq!(store.get_bytes("name"), None);
    assert!(store.contains("name"));
    assert!(!store.contains("missing"));
}

#[test]
fn overwrite_with_other_type_replaces_value() {
    let dir = tempdir().unwrap();
    let store = open(dir.path());
    store.put_int("k", 1).unwrap();
    store.put_string("k", "now a string").unwrap();
    assert_eq!(store.get_int("k", -1), -1);
    assert_eq!(store.get_string("k").as_deref(), Some("now a string"));
    store.close().unwrap();

    let store = open(dir.path());
    assert_eq!(store.get_value("k"), Some(Value::String("now a string".into())));
    assert_eq!(store.len(), 1);
}

#[test]
fn remove_reports_presence() {
    let dir = tempdir().unwrap();
    let store = open(dir.path());
    store.put_long("k", 5).unwrap();
    assert!(store.remove("k").unwrap());
    assert!(!store.remove("k").unwrap());
    assert!(!store.contains("k"));
    store.close().unwrap();

    let store = open(dir.path());
    assert!(store.is_empty());
}

#[test]
fn invalid_keys_are_rejected() {
    let dir = tempdir().unwrap();
    let store = open(dir.path());
    assert!(matches!(
        store.put_int("", 1),
        Err(CoreError::InvalidKey { .. })
    ));
    let long = "k".repeat(MAX_KEY_SIZE + 1);
    assert!(matches!(
        store.put_int(&long, 1),
        Err(CoreError::InvalidKey { .. })
    ));
    let longest = "k".repeat(MAX_KEY_SIZE);
    store.put_int(&longest, 1).unwrap();
    assert_eq!(store.get_int(&longest, 0), 1);
}

#[test]
fn in_place_overwrites_do_not_grow_the_file() {
    let dir = tempdir().unwrap();
    let store = Builder::new(dir.path(), "s")
        .commit_mode(CommitMode::Async)
        .blocking()
        .build()
        .unwrap();

    store.put_int("counter", 0).unwrap();
    let before = store.info().unwrap();
    for i in 1..=10_000 {
        store.put_int("counter", i).unwrap();
    }
    let after = store.info().unwrap();

    assert_eq!(store.get_int("counter", 0), 10_000);
    assert_eq!(after.data_end, before.data_end);
    assert_eq!(after.capacity, before.capacity);
    assert_eq!(after.garbage_bytes, 0);
    assert_eq!(store.stats().in_place_updates, 10_000);
    store.close().unwrap();

    let store = open(dir.path());
    assert_eq!(store.get_int("counter", 0), 10_000);
}

#[test]
fn compaction_reclaims_removed_keys() {
    let dir = tempdir().unwrap();
    let config = Config::default()
        .commit_mode(CommitMode::Async)
        // Keep automatic compaction out of the way
        .gc_garbage_ratio(1.0);
    let store = Builder::new(dir.path(), "s")
        .config(config)
        .blocking()
        .build()
        .unwrap();

    for i in 0..1000 {
        store
            .put_string(&format!("key-{i:04}"), &format!("value number {i}"))
            .unwrap();
    }
    for i in 100..1000 {
        assert!(store.remove(&format!("key-{i:04}")).unwrap());
    }
    let before = store.info().unwrap();
    let file = StorePaths::new(dir.path(), "s").primary();
    let len_before = std::fs::metadata(&file).unwrap().len();

    let result = store.force_compact().unwrap();
    let after = store.info().unwrap();

    assert_eq!(result.records_kept, 100);
    assert!(result.bytes_saved() > 0);
    assert_eq!(after.keys, 100);
    assert_eq!(after.garbage_bytes, 0);
    assert!(after.data_end < before.data_end);
    assert!(after.capacity < before.capacity);
    assert!(std::fs::metadata(&file).unwrap().len() < len_before);

    for i in 0..100 {
        assert_eq!(
            store.get_string(&format!("key-{i:04}")),
            Some(format!("value number {i}"))
        );
    }
    store.close().unwrap();

    let store = open(dir.path());
    assert_eq!(store.len(), 100);
    assert_eq!(store.get_string("key-0099").as_deref(), Some("value number 99"));
    assert!(!store.contains("key-0100"));
}

#[test]
fn automatic_compaction_keeps_data() {
    let dir = tempdir().unwrap();
    let config = Config::default()
        .commit_mode(CommitMode::Async)
        .gc_min_bytes(1024)
        .gc_garbage_ratio(0.5);
    let store = Builder::new(dir.path(), "s")
        .config(config)
        .blocking()
        .build()
        .unwrap();

    // Growing strings never fit in place
    let mut value = String::new();
    for i in 0..500 {
        value.push('x');
        store.put_string("growing", &value).unwrap();
        store.put_int(&format!("n{}", i % 10), i).unwrap();
    }

    assert!(store.stats().compactions > 0);
    assert_eq!(store.get_string("growing").map(|s| s.len()), Some(500));
    assert_eq!(store.get_int("n9", 0), 499);
    store.close().unwrap();

    let store = open(dir.path());
    assert_eq!(store.len(), 11);
    assert_eq!(store.get_string("growing").map(|s| s.len()), Some(500));
}

#[test]
fn clear_is_idempotent() {
    let dir = tempdir().unwrap();
    let store = open(dir.path());
    store.put_int("a", 1).unwrap();
    store.put_string("b", "two").unwrap();

    store.clear().unwrap();
    assert!(store.is_empty());
    store.clear().unwrap();
    assert!(store.is_empty());

    store.put_int("c", 3).unwrap();
    store.close().unwrap();

    let store = open(dir.path());
    assert_eq!(store.keys(), vec!["c".to_string()]);
}

#[test]
fn editor_applies_in_order() {
    let dir = tempdir().unwrap();
    let store = open(dir.path());
    store.put_int("stale", 1).unwrap();

    store
        .edit()
        .clear()
        .put_string("user", "ada")
        .put_int("age", 36)
        .put_int("age", 37)
        .remove("user")
        .commit()
        .unwrap();

    assert!(!store.contains("stale"));
    assert!(!store.contains("user"));
    assert_eq!(store.get_int("age", 0), 37);

    store
        .put_all(vec![
            ("x".to_string(), Value::Long(1)),
            ("y".to_string(), Value::Bool(true)),
        ])
        .unwrap();
    assert_eq!(store.len(), 3);
}

#[test]
fn editor_rejects_batch_with_bad_key() {
    let dir = tempdir().unwrap();
    let store = open(dir.path());
    let result = store.edit().put_int("ok", 1).put_int("", 2).commit();
    assert!(matches!(result, Err(CoreError::InvalidKey { .. })));
    assert!(!store.contains("ok"));
}

#[test]
fn failed_batch_changes_nothing_and_notifies_nobody() {
    let dir = tempdir().unwrap();
    let store = open(dir.path());
    store.put_int("a", 0).unwrap();
    let events = store.subscribe();
    let sequence = store.info().unwrap().sequence;

    let oversized = vec![0u8; MAX_VALUE_SIZE + 1];
    let result = store
        .edit()
        .put_int("a", 1)
        .put_string("fresh", "new")
        .put_bytes("b", &oversized)
        .commit();

    assert!(matches!(result, Err(CoreError::ValueTooLarge { .. })));
    assert_eq!(store.get_int("a", -1), 0);
    assert!(!store.contains("fresh"));
    assert!(!store.contains("b"));
    assert_eq!(store.info().unwrap().sequence, sequence);
    assert!(events.recv_timeout(Duration::from_millis(200)).is_err());
    store.close().unwrap();

    let store = open(dir.path());
    assert_eq!(store.get_int("a", -1), 0);
    assert!(!store.contains("fresh"));
}

#[test]
fn objects_round_trip_through_encoder() {
    let dir = tempdir().unwrap();
    let encoder = CborEncoder::<Point>::new("Point");
    let store = Builder::new(dir.path(), "s")
        .encoder(encoder.clone())
        .blocking()
        .build()
        .unwrap();

    store
        .put_object("origin", &Point { x: 0, y: 0 }, &encoder)
        .unwrap();
    store
        .put_object("corner", &Point { x: 3, y: -4 }, &encoder)
        .unwrap();
    assert_eq!(
        store.get_object::<Point>("corner").as_deref(),
        Some(&Point { x: 3, y: -4 })
    );
    // Wrong type parameter
    assert!(store.get_object::<String>("corner").is_none());
    store.close().unwrap();

    let store = Builder::new(dir.path(), "s")
        .encoder(encoder)
        .blocking()
        .build()
        .unwrap();
    assert_eq!(
        store.get_object::<Point>("origin").as_deref(),
        Some(&Point { x: 0, y: 0 })
    );
}

#[test]
fn unregistered_encoder_is_rejected_on_write() {
    let dir = tempdir().unwrap();
    let store = open(dir.path());
    let encoder = CborEncoder::<Point>::new("Point");
    let result = store.put_object("p", &Point { x: 1, y: 1 }, &encoder);
    assert!(matches!(
        result,
        Err(CoreError::EncoderNotRegistered { tag }) if tag == "Point"
    ));
}

#[test]
fn unknown_tags_are_kept_but_unreadable() {
    let dir = tempdir().unwrap();
    let encoder = CborEncoder::<Point>::new("Point");
    let store = Builder::new(dir.path(), "s")
        .encoder(encoder.clone())
        .blocking()
        .build()
        .unwrap();
    store.put_object("p", &Point { x: 9, y: 8 }, &encoder).unwrap();
    store.put_int("n", 1).unwrap();
    store.close().unwrap();

    // Without the encoder the value is opaque but survives compaction
    let store = open(dir.path());
    assert!(store.contains("p"));
    assert!(store.get_object::<Point>("p").is_none());
    assert_eq!(store.get_int("n", 0), 1);
    store.put_int("n", 2).unwrap();
    store.force_compact().unwrap();
    store.close().unwrap();

    let store = Builder::new(dir.path(), "s")
        .encoder(encoder)
        .blocking()
        .build()
        .unwrap();
    assert_eq!(
        store.get_object::<Point>("p").as_deref(),
        Some(&Point { x: 9, y: 8 })
    );
    assert_eq!(store.get_int("n", 0), 2);
}

fn wait_for<T>(seen: &Mutex<Vec<T>>, count: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while seen.lock().unwrap().len() < count && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn listeners_see_committed_values() {
    let dir = tempdir().unwrap();
    let store = open(dir.path());
    let seen = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&seen);
    let listener: Arc<dyn ChangeListener> = Arc::new(move |store: &Store, key: Option<&str>| {
        let value = key.map(|k| store.get_int(k, -1));
        sink.lock().unwrap().push((key.map(str::to_string), value));
    });
    store.register_listener(Arc::clone(&listener));
    // Registering twice is a no-op
    store.register_listener(Arc::clone(&listener));

    store.put_int("a", 1).unwrap();
    wait_for(&seen, 1);
    store.put_int("a", 2).unwrap();
    wait_for(&seen, 2);
    store.clear().unwrap();
    wait_for(&seen, 3);

    let seen_now = seen.lock().unwrap().clone();
    assert_eq!(
        seen_now,
        vec![
            (Some("a".to_string()), Some(1)),
            (Some("a".to_string()), Some(2)),
            (None, None),
        ]
    );

    assert!(store.unregister_listener(&listener));
    assert!(!store.unregister_listener(&listener));
    store.put_int("a", 3).unwrap();
    store.commit().unwrap();
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(seen.lock().unwrap().len(), 3);
}

#[test]
fn subscribers_receive_ordered_events() {
    let dir = tempdir().unwrap();
    let store = open(dir.path());
    let events = store.subscribe();

    store.put_int("a", 1).unwrap();
    store.put_int("a", 2).unwrap();
    store.clear().unwrap();

    let received: Vec<_> = (0..3)
        .map(|_| events.recv_timeout(Duration::from_secs(5)).unwrap())
        .collect();
    assert!(received.iter().all(|e| e.origin == ChangeOrigin::Local));
    assert_eq!(received[0].key.as_deref(), Some("a"));
    assert_eq!(received[1].key.as_deref(), Some("a"));
    assert_eq!(received[2].key, None);
    assert!(received[0].sequence < received[1].sequence);
    assert!(received[1].sequence < received[2].sequence);
}

#[test]
fn removing_absent_key_notifies_nobody() {
    let dir = tempdir().unwrap();
    let store = open(dir.path());
    let events = store.subscribe();
    assert!(!store.remove("ghost").unwrap());
    store.put_int("real", 1).unwrap();
    let first = events.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(first.key.as_deref(), Some("real"));
}

#[test]
fn closed_store_returns_defaults_and_errors() {
    let dir = tempdir().unwrap();
    let store = open(dir.path());
    store.put_int("k", 1).unwrap();
    let clone = store.clone();
    store.close().unwrap();
    store.close().unwrap();

    assert!(clone.is_closed());
    assert_eq!(clone.get_int("k", 0), 0);
    assert!(matches!(clone.put_int("k", 2), Err(CoreError::StoreClosed)));
}

#[test]
fn second_exclusive_open_is_locked() {
    let dir = tempdir().unwrap();
    let _store = open(dir.path());
    let second = Builder::new(dir.path(), "s").blocking().build();
    assert!(matches!(second, Err(CoreError::StoreLocked)));
}

#[test]
fn manual_mode_flushes_on_commit() {
    let dir = tempdir().unwrap();
    let store = Builder::new(dir.path(), "s")
        .commit_mode(CommitMode::Manual)
        .blocking()
        .build()
        .unwrap();
    store.put_string("draft", "unsaved").unwrap();
    store.commit().unwrap();
    store.put_string("draft", "saved!!").unwrap();
    store.close().unwrap();

    let store = open(dir.path());
    assert_eq!(store.get_string("draft").as_deref(), Some("saved!!"));
}

#[test]
fn background_load_serves_reads() {
    let dir = tempdir().unwrap();
    let store = open(dir.path());
    for i in 0..200 {
        store.put_int(&format!("k{i}"), i).unwrap();
    }
    store.close().unwrap();

    let store = Builder::new(dir.path(), "s").build().unwrap();
    assert_eq!(store.get_int("k199", 0), 199);
    assert_eq!(store.len(), 200);
}
