//! In-memory index over the append log.
//!
//! The index maps every live key to the location of its newest record and
//! to the decoded value, so reads never touch the file. It also keeps the
//! garbage tally that drives compaction.

use crate::record::RecordKind;
use mapkv_codec::{Value, ValueType};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// A decoded object shared between readers.
pub type CachedObject = Arc<dyn Any + Send + Sync>;

/// Location and decoded value of a key's newest record.
#[derive(Clone)]
pub struct Slot {
    /// Offset of the record in the log.
    pub offset: usize,
    /// Encoded record length.
    pub len: usize,
    /// Kind of the record (always a value kind).
    pub kind: RecordKind,
    /// Decoded value, `None` if it could not be decrypted or decoded.
    pub value: Option<Value>,
    object: OnceLock<CachedObject>,
}

impl Slot {
    /// Creates a slot for a freshly written or scanned record.
    #[must_use]
    pub fn new(offset: usize, len: usize, kind: RecordKind, value: Option<Value>) -> Self {
        Self {
            offset,
            len,
            kind,
            value,
            object: OnceLock::new(),
        }
    }

    /// Type of the stored value.
    #[must_use]
    pub fn value_type(&self) -> Option<ValueType> {
        self.kind.value_type()
    }

    /// Returns the decoded object if one was cached.
    #[must_use]
    pub fn cached_object(&self) -> Option<&CachedObject> {
        self.object.get()
    }

    /// Caches a decoded object and returns the cached instance.
    ///
    /// If another reader cached one first, that one wins.
    pub fn cache_object(&self, object: CachedObject) -> &CachedObject {
        self.object.get_or_init(|| object)
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .field("kind", &self.kind)
            .field("value", &self.value)
            .field("object_cached", &self.object.get().is_some())
            .finish()
    }
}

/// Key to slot map with garbage accounting.
#[derive(Debug, Default)]
pub struct Index {
    slots: HashMap<String, Slot>,
    garbage_bytes: usize,
    garbage_records: usize,
}

impl Index {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Slot> {
        self.slots.get(key)
    }

    /// Returns `true` if the key is live.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    /// Points `key` at a new record; the previous record becomes garbage.
    pub fn insert(&mut self, key: String, slot: Slot) -> Option<Slot> {
        let old = self.slots.insert(key, slot);
        if let Some(old) = &old {
            self.add_garbage(old.len);
        }
        old
    }

    /// Records a removal. The tombstone itself and the removed record are
    /// both garbage.
    pub fn remove(&mut self, key: &str, tombstone_len: usize) -> Option<Slot> {
        self.add_garbage(tombstone_len);
        let old = self.slots.remove(key);
        if let Some(old) = &old {
            self.add_garbage(old.len);
        }
        old
    }

    /// Replaces the value of a slot rewritten in place.
    ///
    /// The record keeps its offset and length; the object cache is reset.
    pub fn update_in_place(&mut self, key: &str, value: Option<Value>) {
        if let Some(slot) = self.slots.get_mut(key) {
            slot.value = value;
            slot.object = OnceLock::new();
        }
    }

    /// Accounts bytes that no live key refers to.
    pub fn add_garbage(&mut self, bytes: usize) {
        self.garbage_bytes += bytes;
        self.garbage_records += 1;
    }

    /// Bytes of superseded, removed and damaged records.
    #[must_use]
    pub fn garbage_bytes(&self) -> usize {
        self.garbage_bytes
    }

    /// Number of garbage records.
    #[must_use]
    pub fn garbage_records(&self) -> usize {
        self.garbage_records
    }

    /// Sum of the lengths of all live records.
    #[must_use]
    pub fn live_bytes(&self) -> usize {
        self.slots.values().map(|s| s.len).sum()
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if no key is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterates over live keys and slots in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Slot)> {
        self.slots.iter().map(|(k, s)| (k.as_str(), s))
    }

    /// Live keys ordered by record offset.
    #[must_use]
    pub fn keys_by_offset(&self) -> Vec<String> {
        let mut entries: Vec<(&String, usize)> =
            self.slots.iter().map(|(k, s)| (k, s.offset)).collect();
        entries.sort_unstable_by_key(|(_, offset)| *offset);
        entries.into_iter().map(|(k, _)| k.clone()).collect()
    }

    /// Moves a slot after compaction.
    pub(crate) fn relocate(&mut self, key: &str, offset: usize) {
        if let Some(slot) = self.slots.get_mut(key) {
            slot.offset = offset;
        }
    }

    /// Puts back a slot saved before a failed batch, without touching the
    /// garbage tally.
    pub(crate) fn restore_slot(&mut self, key: String, slot: Option<Slot>) {
        match slot {
            Some(slot) => {
                self.slots.insert(key, slot);
            }
            None => {
                self.slots.remove(&key);
            }
        }
    }

    /// Puts back a garbage tally of `(bytes, records)`.
    pub(crate) fn restore_garbage(&mut self, (bytes, records): (usize, usize)) {
        self.garbage_bytes = bytes;
        self.garbage_records = records;
    }

    /// Forgets all garbage after compaction.
    pub(crate) fn reset_garbage(&mut self) {
        self.garbage_bytes = 0;
        self.garbage_records = 0;
    }

    /// Drops every key and all garbage.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.reset_garbage();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_slot(offset: usize, v: i32) -> Slot {
        Slot::new(
            offset,
            20,
            RecordKind::plain(ValueType::Int),
            Some(Value::Int(v)),
        )
    }

    #[test]
    fn insert_and_get() {
        let mut index = Index::new();
        index.insert("a".to_string(), int_slot(32, 1));
        assert_eq!(index.get("a").unwrap().value, Some(Value::Int(1)));
        assert!(index.contains("a"));
        assert_eq!(index.len(), 1);
        assert_eq!(index.garbage_bytes(), 0);
    }

    #[test]
    fn overwrite_counts_garbage() {
        let mut index = Index::new();
        index.insert("a".to_string(), int_slot(32, 1));
        index.insert("a".to_string(), int_slot(52, 2));
        assert_eq!(index.garbage_bytes(), 20);
        assert_eq!(index.garbage_records(), 1);
        assert_eq!(index.live_bytes(), 20);
    }

    #[test]
    fn remove_counts_both_records() {
        let mut index = Index::new();
        index.insert("a".to_string(), int_slot(32, 1));
        let old = index.remove("a", 12);
        assert!(old.is_some());
        assert_eq!(index.garbage_bytes(), 32);
        assert!(index.is_empty());
    }

    #[test]
    fn remove_missing_still_counts_tombstone() {
        let mut index = Index::new();
        assert!(index.remove("nope", 12).is_none());
        assert_eq!(index.garbage_bytes(), 12);
    }

    #[test]
    fn in_place_update_resets_cache() {
        let mut index = Index::new();
        index.insert("a".to_string(), int_slot(32, 1));
        index.get("a").unwrap().cache_object(Arc::new(5u8));
        assert!(index.get("a").unwrap().cached_object().is_some());

        index.update_in_place("a", Some(Value::Int(2)));
        let slot = index.get("a").unwrap();
        assert_eq!(slot.value, Some(Value::Int(2)));
        assert!(slot.cached_object().is_none());
        assert_eq!(slot.offset, 32);
    }

    #[test]
    fn first_cached_object_wins() {
        let slot = int_slot(32, 1);
        slot.cache_object(Arc::new(1u32));
        let kept = slot.cache_object(Arc::new(2u32));
        assert_eq!(kept.downcast_ref::<u32>(), Some(&1));
    }

    #[test]
    fn keys_by_offset_sorted() {
        let mut index = Index::new();
        index.insert("c".to_string(), int_slot(92, 1));
        index.insert("a".to_string(), int_slot(32, 1));
        index.insert("b".to_string(), int_slot(52, 1));
        assert_eq!(index.keys_by_offset(), vec!["a", "b", "c"]);
    }

    #[test]
    fn clear_resets_everything() {
        let mut index = Index::new();
        index.insert("a".to_string(), int_slot(32, 1));
        index.insert("a".to_string(), int_slot(52, 1));
        index.clear();
        assert!(index.is_empty());
        assert_eq!(index.garbage_bytes(), 0);
    }
}
