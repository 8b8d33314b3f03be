use super::Store;
use crate::config::CommitMode;
use crate::error::{CoreError, CoreResult};
use mapkv_codec::{ObjectEncoder, Value};
use std::collections::BTreeSet;

pub(crate) enum EditOp {
    Put(String, Value),
    Remove(String),
    Clear,
}

/// A batch of changes applied under one lock with a single flush.
///
/// Operations run in the order they were added. Listeners are notified
/// once the whole batch is written.
///
/// ```rust,no_run
/// # fn demo(store: &mapkv_core::Store) -> mapkv_core::CoreResult<()> {
/// store
///     .edit()
///     .put_string("user", "ada")
///     .put_int("age", 36)
///     .remove("guest")
///     .commit()?;
/// # Ok(())
/// # }
/// ```
#[must_use = "an editor does nothing until commit() or apply()"]
pub struct Editor<'a> {
    store: &'a Store,
    ops: Vec<EditOp>,
    error: Option<CoreError>,
}

impl<'a> Editor<'a> {
    pub(crate) fn new(store: &'a Store) -> Self {
        Self {
            store,
            ops: Vec::new(),
            error: None,
        }
    }

    /// Queues a value of any type.
    pub fn put_value(mut self, key: &str, value: Value) -> Self {
        self.ops.push(EditOp::Put(key.to_string(), value));
        self
    }

    /// Queues a boolean.
    pub fn put_bool(self, key: &str, value: bool) -> Self {
        self.put_value(key, Value::Bool(value))
    }

    /// Queues an `i32`.
    pub fn put_int(self, key: &str, value: i32) -> Self {
        self.put_value(key, Value::Int(value))
    }

    /// Queues an `f32`.
    pub fn put_float(self, key: &str, value: f32) -> Self {
        self.put_value(key, Value::Float(value))
    }

    /// Queues an `i64`.
    pub fn put_long(self, key: &str, value: i64) -> Self {
        self.put_value(key, Value::Long(value))
    }

    /// Queues an `f64`.
    pub fn put_double(self, key: &str, value: f64) -> Self {
        self.put_value(key, Value::Double(value))
    }

    /// Queues a string.
    pub fn put_string(self, key: &str, value: &str) -> Self {
        self.put_value(key, Value::String(value.to_string()))
    }

    /// Queues a byte array.
    pub fn put_bytes(self, key: &str, value: &[u8]) -> Self {
        self.put_value(key, Value::Bytes(value.to_vec()))
    }

    /// Queues a string set.
    pub fn put_string_set(self, key: &str, value: BTreeSet<String>) -> Self {
        self.put_value(key, Value::StringSet(value))
    }

    /// Queues an object. Encoding errors are reported by `commit`/`apply`.
    pub fn put_object<E: ObjectEncoder>(mut self, key: &str, object: &E::Object, encoder: &E) -> Self {
        match encoder.encode(object) {
            Ok(data) => self.put_value(
                key,
                Value::Object {
                    tag: encoder.tag().to_string(),
                    data,
                },
            ),
            Err(e) => {
                self.error.get_or_insert(e.into());
                self
            }
        }
    }

    /// Queues a removal.
    pub fn remove(mut self, key: &str) -> Self {
        self.ops.push(EditOp::Remove(key.to_string()));
        self
    }

    /// Queues removal of every key.
    pub fn clear(mut self) -> Self {
        self.ops.push(EditOp::Clear);
        self
    }

    /// Number of queued operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns `true` if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Writes the batch and waits until it is durable.
    ///
    /// # Errors
    ///
    /// Returns the first queued encoding error, an invalid key, an
    /// unregistered encoder tag, an oversized value or an I/O error. The
    /// batch applies as a whole or not at all: on error no key changes and
    /// no listener is notified.
    pub fn commit(self) -> CoreResult<()> {
        self.finish(CommitMode::Sync)
    }

    /// Writes the batch and schedules the flush without waiting.
    ///
    /// # Errors
    ///
    /// See [`commit`](Self::commit).
    pub fn apply(self) -> CoreResult<()> {
        self.finish(CommitMode::Async)
    }

    fn finish(self, mode: CommitMode) -> CoreResult<()> {
        if let Some(e) = self.error {
            return Err(e);
        }
        if self.ops.is_empty() {
            return Ok(());
        }
        self.store.apply_batch(self.ops, mode)
    }
}

impl std::fmt::Debug for Editor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Editor")
            .field("store", &self.store.name())
            .field("ops", &self.ops.len())
            .field("error", &self.error)
            .finish()
    }
}
