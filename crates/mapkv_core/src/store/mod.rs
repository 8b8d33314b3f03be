//! The store handle.
//!
//! A [`Store`] is a cheap, cloneable handle; all clones share one engine.
//! Mutations are serialized by a store-level write lock, reads share the
//! read lock and never touch the file beyond a header peek in
//! multi-process mode.
//!
//! ```rust,no_run
//! use mapkv_core::Builder;
//!
//! let store = Builder::new("/tmp/app", "settings").blocking().build()?;
//! store.put_int("launches", store.get_int("launches", 0) + 1)?;
//! store.close()?;
//! # Ok::<(), mapkv_core::CoreError>(())
//! ```

mod builder;
mod editor;
mod engine;

pub use builder::Builder;
pub use editor::Editor;
pub use engine::LoadReport;

use crate::change_feed::{ChangeEvent, ChangeFeed, ChangeListener};
use crate::compaction::CompactionResult;
use crate::config::{CommitMode, Config};
use crate::coordination::ChangeWatcher;
use crate::error::{CoreError, CoreResult};
use crate::layout::StorePaths;
use crate::payload::PayloadCodec;
use crate::stats::{StatsSnapshot, StoreStats};
use crate::types::MAX_KEY_SIZE;
use editor::EditOp;
use engine::{Ctx, Engine};
use mapkv_codec::{EncoderRegistry, ObjectEncoder, Value};
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Weak};
use tracing::{debug, error, warn};

enum State {
    Loading,
    Ready(Engine),
    Failed(String),
    Closed,
}

struct Shared {
    paths: StorePaths,
    config: Config,
    encoders: EncoderRegistry,
    payload: PayloadCodec,
    state: RwLock<State>,
    ready: Mutex<bool>,
    ready_cv: Condvar,
    feed: ChangeFeed,
    stats: StoreStats,
    watcher: Mutex<Option<Box<dyn ChangeWatcher>>>,
}

impl Shared {
    fn ctx(&self) -> Ctx<'_> {
        Ctx {
            paths: &self.paths,
            config: &self.config,
            payload: &self.payload,
            stats: &self.stats,
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(mut watcher) = self.watcher.get_mut().take() {
            watcher.stop();
        }
        if let State::Ready(engine) = self.state.get_mut() {
            if engine.is_dirty() {
                if let Err(e) = engine.flush(CommitMode::Sync) {
                    warn!(store = self.paths.name(), error = %e, "flush on drop failed");
                }
            }
        }
    }
}

/// Size and layout figures of an open store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreInfo {
    /// Live keys.
    pub keys: usize,
    /// Logical end of the log.
    pub data_end: usize,
    /// Size of the mapped file.
    pub capacity: usize,
    /// Bytes of records no key refers to.
    pub garbage_bytes: usize,
    /// Header sequence.
    pub sequence: u64,
}

/// Handle to an open store.
#[derive(Clone)]
pub struct Store {
    shared: Arc<Shared>,
}

impl Store {
    fn new(
        paths: StorePaths,
        config: Config,
        encoders: EncoderRegistry,
        payload: PayloadCodec,
        watcher: Option<Box<dyn ChangeWatcher>>,
    ) -> CoreResult<Self> {
        let store = Self {
            shared: Arc::new(Shared {
                paths,
                config,
                encoders,
                payload,
                state: RwLock::new(State::Loading),
                ready: Mutex::new(false),
                ready_cv: Condvar::new(),
                feed: ChangeFeed::new(),
                stats: StoreStats::new(),
                watcher: Mutex::new(watcher),
            }),
        };

        let weak = Arc::downgrade(&store.shared);
        store.shared.feed.start(move |event| match weak.upgrade() {
            Some(shared) => {
                let store = Store { shared };
                store.shared.feed.deliver(&store, &event);
                true
            }
            None => false,
        })?;
        Ok(store)
    }

    /// Opens the engine and wakes waiting callers.
    fn load(&self) -> CoreResult<()> {
        let shared = &self.shared;
        let outcome = match Engine::open(&shared.ctx()) {
            Ok(engine) => {
                *shared.state.write() = State::Ready(engine);
                Ok(())
            }
            Err(e) => {
                error!(store = shared.paths.name(), error = %e, "failed to load store");
                *shared.state.write() = State::Failed(e.to_string());
                Err(e)
            }
        };
        *shared.ready.lock() = true;
        shared.ready_cv.notify_all();

        if outcome.is_ok() {
            self.start_watcher();
        }
        outcome
    }

    fn start_watcher(&self) {
        let mut slot = self.shared.watcher.lock();
        let Some(watcher) = slot.as_mut() else {
            return;
        };
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let poll = Box::new(move || match weak.upgrade() {
            Some(shared) => {
                Store { shared }.catch_up();
                true
            }
            None => false,
        });
        if let Err(e) = watcher.start(poll) {
            warn!(store = self.shared.paths.name(), error = %e, "change watcher did not start");
        }
    }

    fn wait_ready(&self) {
        let mut ready = self.shared.ready.lock();
        while !*ready {
            self.shared.ready_cv.wait(&mut ready);
        }
    }

    /// Picks up changes made by other processes, if any.
    fn catch_up(&self) {
        let shared = &self.shared;
        let stale = matches!(
            &*shared.state.read(),
            State::Ready(e) if e.is_multi_process() && e.has_external_change()
        );
        if !stale {
            return;
        }

        let ctx = shared.ctx();
        let events = {
            let mut state = shared.state.write();
            let State::Ready(engine) = &mut *state else {
                return;
            };
            if !engine.has_external_change() {
                return;
            }
            let lock = engine.process_lock();
            // Finishing another process's compaction needs the write lock
            let exclusive = shared.paths.redo_marker().exists();
            let guard = if exclusive {
                lock.write_guard()
            } else {
                lock.read_guard()
            };
            let synced = guard.and_then(|_guard| engine.sync_external(&ctx, exclusive));
            match synced {
                Ok(keys) => {
                    let sequence = engine.sequence();
                    keys.into_iter()
                        .map(|key| ChangeEvent::external(sequence, key))
                        .collect::<Vec<_>>()
                }
                Err(e) => {
                    warn!(store = shared.paths.name(), error = %e, "failed to sync external changes");
                    return;
                }
            }
        };
        shared.feed.emit(events);
    }

    fn read<R>(&self, f: impl FnOnce(&Engine) -> R) -> Option<R> {
        self.wait_ready();
        self.catch_up();
        match &*self.shared.state.read() {
            State::Ready(engine) => Some(f(engine)),
            _ => None,
        }
    }

    /// Runs a mutation under both locks, flushes and queues notifications.
    fn write<R>(
        &self,
        mode: CommitMode,
        f: impl FnOnce(&mut Engine, &Ctx<'_>) -> CoreResult<(R, Vec<Option<String>>)>,
    ) -> CoreResult<R> {
        self.wait_ready();
        let shared = &self.shared;
        let ctx = shared.ctx();
        let mut events = Vec::new();

        let result = {
            let mut state = shared.state.write();
            let engine = match &mut *state {
                State::Ready(engine) => engine,
                State::Failed(message) => return Err(CoreError::load_failed(message.clone())),
                State::Closed | State::Loading => return Err(CoreError::StoreClosed),
            };
            let lock = engine.process_lock();
            let _guard = lock.write_guard()?;

            if engine.is_multi_process() {
                let external = engine.sync_external(&ctx, true)?;
                let sequence = engine.sequence();
                events.extend(
                    external
                        .into_iter()
                        .map(|key| ChangeEvent::external(sequence, key)),
                );
            }

            f(engine, &ctx).and_then(|(value, keys)| {
                engine.maybe_compact(&ctx);
                engine.flush(mode)?;
                let sequence = engine.sequence();
                events.extend(keys.into_iter().map(|key| ChangeEvent::local(sequence, key)));
                Ok(value)
            })
        };

        shared.feed.emit(events);
        result
    }

    fn value_of<R>(&self, key: &str, extract: impl FnOnce(&Value) -> Option<R>) -> Option<R> {
        self.shared.stats.record_read();
        self.read(|engine| {
            let slot = engine.index.get(key)?;
            match &slot.value {
                Some(value) => extract(value),
                None => {
                    self.shared.stats.record_soft_failure();
                    debug!(key, "stored value is unreadable, using default");
                    None
                }
            }
        })
        .flatten()
    }

    // === Getters ===

    /// Reads a boolean.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.value_of(key, Value::as_bool).unwrap_or(default)
    }

    /// Reads an `i32`.
    pub fn get_int(&self, key: &str, default: i32) -> i32 {
        self.value_of(key, Value::as_int).unwrap_or(default)
    }

    /// Reads an `f32`.
    pub fn get_float(&self, key: &str, default: f32) -> f32 {
        self.value_of(key, Value::as_float).unwrap_or(default)
    }

    /// Reads an `i64`.
    pub fn get_long(&self, key: &str, default: i64) -> i64 {
        self.value_of(key, Value::as_long).unwrap_or(default)
    }

    /// Reads an `f64`.
    pub fn get_double(&self, key: &str, default: f64) -> f64 {
        self.value_of(key, Value::as_double).unwrap_or(default)
    }

    /// Reads a string.
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.value_of(key, |v| v.as_str().map(str::to_string))
    }

    /// Reads a string, falling back to `default`.
    pub fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_string(key).unwrap_or_else(|| default.to_string())
    }

    /// Reads a byte array.
    pub fn get_bytes(&self, key: &str) -> Option<Vec<u8>> {
        self.value_of(key, |v| v.as_bytes().map(<[u8]>::to_vec))
    }

    /// Reads a string set.
    pub fn get_string_set(&self, key: &str) -> Option<BTreeSet<String>> {
        self.value_of(key, |v| v.as_string_set().cloned())
    }

    /// Reads the raw value of a key, whatever its type.
    pub fn get_value(&self, key: &str) -> Option<Value> {
        self.value_of(key, |v| Some(v.clone()))
    }

    /// Reads an object decoded by its registered encoder.
    ///
    /// Returns `None` if the key is missing, holds another type, its tag has
    /// no encoder, or `T` is not the encoder's object type. The decoded
    /// object is cached until the key changes.
    pub fn get_object<T>(&self, key: &str) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        self.shared.stats.record_read();
        let encoders = &self.shared.encoders;
        self.read(|engine| {
            let slot = engine.index.get(key)?;
            if let Some(object) = slot.cached_object() {
                return Arc::clone(object).downcast::<T>().ok();
            }
            let Some(Value::Object { tag, data }) = &slot.value else {
                return None;
            };
            match encoders.decode(tag, data) {
                Some(Ok(object)) => Arc::clone(slot.cache_object(object)).downcast::<T>().ok(),
                Some(Err(e)) => {
                    self.shared.stats.record_soft_failure();
                    debug!(key, tag = tag.as_str(), error = %e, "object failed to decode");
                    None
                }
                None => {
                    debug!(key, tag = tag.as_str(), "no encoder registered for tag");
                    None
                }
            }
        })
        .flatten()
    }

    /// Returns `true` if the key is live, whatever its type.
    pub fn contains(&self, key: &str) -> bool {
        self.read(|engine| engine.index.contains(key))
            .unwrap_or(false)
    }

    /// Live keys in arbitrary order.
    pub fn keys(&self) -> Vec<String> {
        self.read(|engine| engine.index.iter().map(|(k, _)| k.to_string()).collect())
            .unwrap_or_default()
    }

    /// Every readable entry.
    pub fn get_all(&self) -> HashMap<String, Value> {
        self.read(|engine| {
            engine
                .index
                .iter()
                .filter_map(|(k, slot)| slot.value.clone().map(|v| (k.to_string(), v)))
                .collect()
        })
        .unwrap_or_default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.read(|engine| engine.index.len()).unwrap_or(0)
    }

    /// Returns `true` if no key is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // === Writers ===

    /// Stores a boolean.
    ///
    /// # Errors
    ///
    /// Fails on an invalid key, a closed store or an I/O error. Failed
    /// writes leave the store unchanged.
    pub fn put_bool(&self, key: &str, value: bool) -> CoreResult<()> {
        self.put_value(key, Value::Bool(value))
    }

    /// Stores an `i32`.
    ///
    /// # Errors
    ///
    /// See [`put_bool`](Self::put_bool).
    pub fn put_int(&self, key: &str, value: i32) -> CoreResult<()> {
        self.put_value(key, Value::Int(value))
    }

    /// Stores an `f32`.
    ///
    /// # Errors
    ///
    /// See [`put_bool`](Self::put_bool).
    pub fn put_float(&self, key: &str, value: f32) -> CoreResult<()> {
        self.put_value(key, Value::Float(value))
    }

    /// Stores an `i64`.
    ///
    /// # Errors
    ///
    /// See [`put_bool`](Self::put_bool).
    pub fn put_long(&self, key: &str, value: i64) -> CoreResult<()> {
        self.put_value(key, Value::Long(value))
    }

    /// Stores an `f64`.
    ///
    /// # Errors
    ///
    /// See [`put_bool`](Self::put_bool).
    pub fn put_double(&self, key: &str, value: f64) -> CoreResult<()> {
        self.put_value(key, Value::Double(value))
    }

    /// Stores a string.
    ///
    /// # Errors
    ///
    /// See [`put_bool`](Self::put_bool).
    pub fn put_string(&self, key: &str, value: &str) -> CoreResult<()> {
        self.put_value(key, Value::String(value.to_string()))
    }

    /// Stores a byte array.
    ///
    /// # Errors
    ///
    /// See [`put_bool`](Self::put_bool).
    pub fn put_bytes(&self, key: &str, value: &[u8]) -> CoreResult<()> {
        self.put_value(key, Value::Bytes(value.to_vec()))
    }

    /// Stores a string set.
    ///
    /// # Errors
    ///
    /// See [`put_bool`](Self::put_bool).
    pub fn put_string_set(&self, key: &str, value: BTreeSet<String>) -> CoreResult<()> {
        self.put_value(key, Value::StringSet(value))
    }

    /// Stores an object through `encoder`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EncoderNotRegistered`] if the encoder's tag was
    /// not registered with the builder, or the encoder's own error.
    pub fn put_object<E: ObjectEncoder>(
        &self,
        key: &str,
        object: &E::Object,
        encoder: &E,
    ) -> CoreResult<()> {
        let data = encoder.encode(object)?;
        self.put_value(
            key,
            Value::Object {
                tag: encoder.tag().to_string(),
                data,
            },
        )
    }

    /// Stores a value of any type.
    ///
    /// # Errors
    ///
    /// See [`put_bool`](Self::put_bool) and [`put_object`](Self::put_object).
    pub fn put_value(&self, key: &str, value: Value) -> CoreResult<()> {
        self.check_entry(key, &value)?;
        self.write(self.shared.config.commit_mode, |engine, ctx| {
            engine.put(key, &value, ctx)?;
            Ok(((), vec![Some(key.to_string())]))
        })
    }

    /// Stores several values under one lock with a single flush.
    ///
    /// # Errors
    ///
    /// See [`Editor::commit`].
    pub fn put_all(&self, entries: impl IntoIterator<Item = (String, Value)>) -> CoreResult<()> {
        let ops: Vec<EditOp> = entries
            .into_iter()
            .map(|(key, value)| EditOp::Put(key, value))
            .collect();
        self.apply_batch(ops, self.shared.config.commit_mode)
    }

    /// Removes a key. Returns `false` if it was not present.
    ///
    /// # Errors
    ///
    /// Fails on a closed store or an I/O error.
    pub fn remove(&self, key: &str) -> CoreResult<bool> {
        self.write(self.shared.config.commit_mode, |engine, ctx| {
            let removed = engine.remove(key, ctx)?;
            let keys = if removed { vec![Some(key.to_string())] } else { Vec::new() };
            Ok((removed, keys))
        })
    }

    /// Removes every key and resets the file to an empty log.
    ///
    /// # Errors
    ///
    /// Fails on a closed store or an I/O error.
    pub fn clear(&self) -> CoreResult<()> {
        self.write(self.shared.config.commit_mode, |engine, ctx| {
            engine.clear(ctx)?;
            Ok(((), vec![None]))
        })
    }

    /// Starts a batch of changes.
    #[must_use]
    pub fn edit(&self) -> Editor<'_> {
        Editor::new(self)
    }

    pub(crate) fn apply_batch(&self, ops: Vec<EditOp>, mode: CommitMode) -> CoreResult<()> {
        for op in &ops {
            if let EditOp::Put(key, value) = op {
                self.check_entry(key, value)?;
            }
        }
        self.write(mode, |engine, ctx| {
            let keys = engine.apply_batch(ops, ctx)?;
            Ok(((), keys))
        })
    }

    fn check_entry(&self, key: &str, value: &Value) -> CoreResult<()> {
        validate_key(key)?;
        if let Value::Object { tag, .. } = value {
            if !self.shared.encoders.contains(tag) {
                return Err(CoreError::EncoderNotRegistered { tag: tag.clone() });
            }
        }
        Ok(())
    }

    // === Durability and maintenance ===

    /// Flushes all writes to disk and waits for completion.
    ///
    /// # Errors
    ///
    /// Fails on a closed store or an I/O error.
    pub fn commit(&self) -> CoreResult<()> {
        self.write(CommitMode::Sync, |_, _| Ok(((), Vec::new())))
    }

    /// Schedules a flush of all writes without waiting.
    ///
    /// # Errors
    ///
    /// Fails on a closed store or an I/O error.
    pub fn apply(&self) -> CoreResult<()> {
        self.write(CommitMode::Async, |_, _| Ok(((), Vec::new())))
    }

    /// Compacts the log now, whatever the garbage ratio.
    ///
    /// # Errors
    ///
    /// Fails on a closed store or an I/O error; the log is then unchanged.
    pub fn force_compact(&self) -> CoreResult<CompactionResult> {
        self.write(CommitMode::Sync, |engine, ctx| Ok((engine.compact(ctx)?, Vec::new())))
    }

    /// Flushes and closes the store. Later calls return defaults or
    /// [`CoreError::StoreClosed`]. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails; the store is closed anyway.
    pub fn close(&self) -> CoreResult<()> {
        self.wait_ready();
        if let Some(mut watcher) = self.shared.watcher.lock().take() {
            watcher.stop();
        }
        let previous = std::mem::replace(&mut *self.shared.state.write(), State::Closed);
        self.shared.feed.stop();
        match previous {
            State::Ready(mut engine) => {
                if engine.is_dirty() {
                    engine.flush(CommitMode::Sync)?;
                }
                debug!(store = self.shared.paths.name(), "closed store");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Returns `true` once [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        matches!(&*self.shared.state.read(), State::Closed)
    }

    // === Observation ===

    /// Registers a listener. Registering the same `Arc` twice has no effect.
    pub fn register_listener(&self, listener: Arc<dyn ChangeListener>) {
        self.shared.feed.register(listener);
    }

    /// Unregisters a listener. Returns `false` if it was not registered.
    pub fn unregister_listener(&self, listener: &Arc<dyn ChangeListener>) -> bool {
        self.shared.feed.unregister(listener)
    }

    /// Subscribes to change events through a channel.
    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        self.shared.feed.subscribe()
    }

    /// Snapshot of the store's counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// What happened while loading, once loaded.
    pub fn load_report(&self) -> Option<LoadReport> {
        self.read(Engine::load_report)
    }

    /// Current size figures.
    pub fn info(&self) -> Option<StoreInfo> {
        self.read(|engine| StoreInfo {
            keys: engine.index.len(),
            data_end: engine.data_end(),
            capacity: engine.capacity(),
            garbage_bytes: engine.index.garbage_bytes(),
            sequence: engine.sequence(),
        })
    }

    /// Directory of the store.
    pub fn path(&self) -> &Path {
        self.shared.paths.dir()
    }

    /// Name of the store.
    pub fn name(&self) -> &str {
        self.shared.paths.name()
    }

    /// Configuration the store was opened with.
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Returns `true` if both handles refer to the same open store.
    pub fn same_store(&self, other: &Store) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.shared.paths.dir())
            .field("name", &self.shared.paths.name())
            .field("feed", &self.shared.feed)
            .finish_non_exhaustive()
    }
}

fn validate_key(key: &str) -> CoreResult<()> {
    if key.is_empty() {
        return Err(CoreError::invalid_key("key is empty"));
    }
    if key.len() > MAX_KEY_SIZE {
        return Err(CoreError::invalid_key(format!(
            "key is {} bytes, limit is {MAX_KEY_SIZE}",
            key.len()
        )));
    }
    Ok(())
}
