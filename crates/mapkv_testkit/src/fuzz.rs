//! Fuzz testing harnesses for MapKV.
//!
//! These targets take arbitrary bytes and can be driven by cargo-fuzz, by
//! proptest, or by a fixed corpus. None of them may panic on any input.

use crate::fixtures::TestStore;
use crate::generators::{apply_to_store, Model, StoreOperation};
use mapkv_core::record::{parse_at, Parsed};
use mapkv_core::{inspect, Value, ValueType};

/// Fuzz target for record framing.
///
/// Parses a record at every offset; a parsed record must lie inside the
/// input.
pub fn fuzz_record_parse(data: &[u8]) {
    for offset in 0..data.len() {
        match parse_at(data, offset, data.len()) {
            Parsed::Record(view) => {
                assert!(view.offset + view.len <= data.len());
                assert!(!view.key.is_empty());
            }
            Parsed::Damaged { len, .. } => assert!(offset + len <= data.len()),
            Parsed::Invalid { .. } => {}
        }
    }
}

/// Fuzz target for read-only file inspection.
pub fn fuzz_inspect(data: &[u8]) {
    let report = inspect(data);
    assert!(report.scan.end <= data.len().max(report.scan.start));
    assert_eq!(report.file_len, data.len());
}

/// Fuzz target for value payloads.
///
/// Decodes the input as every value type; whatever decodes must encode
/// back to the same bytes. String sets are exempt (duplicates and
/// non-minimal varints collapse), as are objects whose tag is readable but
/// too long to write.
pub fn fuzz_value_payload(data: &[u8]) {
    for value_type in ValueType::ALL {
        let Ok(value) = Value::decode_payload(value_type, data) else {
            continue;
        };
        assert_eq!(value.value_type(), value_type);
        match value_type {
            ValueType::StringSet => {}
            ValueType::Object => {
                if let Ok(encoded) = value.encode_payload() {
                    assert_eq!(encoded, data, "object payload changed on round trip");
                }
            }
            _ => {
                let encoded = value.encode_payload().expect("decoded value must encode");
                assert_eq!(encoded, data, "{value_type} payload changed on round trip");
            }
        }
    }
}

/// Fuzz target for opening arbitrary files.
///
/// Any file contents must open: damage is recovered, never reported. The
/// store must then accept writes and keep them across a reopen.
pub fn fuzz_store_open(data: &[u8]) {
    let mut fixture = TestStore::from_image(data);
    for key in fixture.keys() {
        let _ = fixture.get_value(&key);
    }
    let survivors = fixture.len();

    fixture
        .put_string("__fuzz_marker", "written after recovery")
        .expect("recovered store must accept writes");
    fixture.reopen();
    assert_eq!(
        fixture.get_string("__fuzz_marker").as_deref(),
        Some("written after recovery")
    );
    assert!(fixture.len() <= survivors + 1);
}

/// Fuzz target for operation sequences.
///
/// Bytes are decoded into operations on a few keys and applied to both a
/// store and a model; contents must match before and after a reopen.
pub fn fuzz_store_operations(data: &[u8]) {
    let mut fixture = TestStore::new();
    let mut model = Model::new();

    for chunk in data.chunks(4) {
        let op = decode_operation(chunk);
        apply_to_store(&fixture, &op).expect("operation failed");
        model.apply(&op);
    }
    assert_eq!(fixture.get_all(), model.entries);

    fixture.reopen();
    assert_eq!(fixture.get_all(), model.entries);
}

fn decode_operation(chunk: &[u8]) -> StoreOperation {
    let byte = |i: usize| chunk.get(i).copied().unwrap_or(0);
    let key = format!("k{}", byte(1) % 8);
    match byte(0) % 16 {
        0 => StoreOperation::Clear,
        1 => StoreOperation::Compact,
        2..=4 => StoreOperation::Remove { key },
        5..=8 => StoreOperation::Put {
            key,
            value: Value::Int(i32::from(byte(2)) - i32::from(byte(3))),
        },
        9..=11 => StoreOperation::Put {
            key,
            value: Value::String("s".repeat(usize::from(byte(2) % 32))),
        },
        12 | 13 => StoreOperation::Put {
            key,
            value: Value::Bytes(chunk.to_vec()),
        },
        _ => StoreOperation::Put {
            key,
            value: Value::Long(i64::from(byte(2)) << 32),
        },
    }
}
