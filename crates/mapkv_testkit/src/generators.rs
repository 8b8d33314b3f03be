//! Property-based test generators using proptest.
//!
//! Provides strategies for keys, values and operation sequences, plus a
//! plain `HashMap` model to check a store against.

use mapkv_core::{Store, Value, MAX_KEY_SIZE};
use proptest::prelude::*;
use std::collections::{BTreeSet, HashMap};

/// Strategy for generating valid keys from a small alphabet, so that
/// sequences revisit the same keys often.
pub fn key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-e][a-e0-9]{0,3}").expect("Invalid regex")
}

/// Strategy for generating keys with mixed characters and lengths.
pub fn wide_key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9_./é -]{1,64}")
        .expect("Invalid regex")
        .prop_filter("key must fit", |k| !k.is_empty() && k.len() <= MAX_KEY_SIZE)
}

/// Strategy for generating string sets.
pub fn string_set_strategy() -> impl Strategy<Value = BTreeSet<String>> {
    prop::collection::btree_set("[a-z]{0,8}", 0..6)
}

/// Strategy for generating non-object values.
///
/// Floats are finite so that stored and model values compare equal.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(Value::Int),
        (-1.0e6f32..1.0e6f32).prop_map(Value::Float),
        any::<i64>().prop_map(Value::Long),
        (-1.0e12f64..1.0e12f64).prop_map(Value::Double),
        ".{0,40}".prop_map(Value::String),
        prop::collection::vec(any::<u8>(), 0..64).prop_map(Value::Bytes),
        string_set_strategy().prop_map(Value::StringSet),
    ]
}

/// One mutation of a store.
#[derive(Debug, Clone)]
pub enum StoreOperation {
    /// Store a value.
    Put {
        /// Key to write.
        key: String,
        /// Value to write.
        value: Value,
    },
    /// Remove a key.
    Remove {
        /// Key to remove.
        key: String,
    },
    /// Remove every key.
    Clear,
    /// Compact the log.
    Compact,
}

/// Strategy for generating store operations.
pub fn store_operation_strategy() -> impl Strategy<Value = StoreOperation> {
    prop_oneof![
        8 => (key_strategy(), value_strategy())
            .prop_map(|(key, value)| StoreOperation::Put { key, value }),
        3 => key_strategy().prop_map(|key| StoreOperation::Remove { key }),
        1 => Just(StoreOperation::Compact),
        1 => Just(StoreOperation::Clear),
    ]
}

/// Strategy for generating a sequence of operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<StoreOperation>> {
    prop::collection::vec(store_operation_strategy(), min_ops..max_ops)
}

/// Reference model: what the store should contain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Model {
    /// Expected contents.
    pub entries: HashMap<String, Value>,
}

impl Model {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies an operation to the model.
    pub fn apply(&mut self, op: &StoreOperation) {
        match op {
            StoreOperation::Put { key, value } => {
                self.entries.insert(key.clone(), value.clone());
            }
            StoreOperation::Remove { key } => {
                self.entries.remove(key);
            }
            StoreOperation::Clear => self.entries.clear(),
            StoreOperation::Compact => {}
        }
    }
}

/// Applies an operation to a store.
pub fn apply_to_store(store: &Store, op: &StoreOperation) -> mapkv_core::CoreResult<()> {
    match op {
        StoreOperation::Put { key, value } => store.put_value(key, value.clone()),
        StoreOperation::Remove { key } => store.remove(key).map(|_| ()),
        StoreOperation::Clear => store.clear(),
        StoreOperation::Compact => store.force_compact().map(|_| ()),
    }
}

/// Applies every operation to both the store and a fresh model, returning
/// the model.
pub fn run_operations(store: &Store, ops: &[StoreOperation]) -> Model {
    let mut model = Model::new();
    for op in ops {
        apply_to_store(store, op).expect("operation failed");
        model.apply(op);
    }
    model
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
