//! File format test vectors for MapKV.
//!
//! These vectors pin the byte layout of records, headers and redo markers
//! so that any implementation reading MapKV files can be checked against
//! the same bytes.

use serde::{Deserialize, Serialize};

/// A record test vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordVector {
    /// Unique identifier for this vector.
    pub id: String,
    /// Human-readable description.
    pub description: String,
    /// Kind byte.
    pub kind: u8,
    /// Record key.
    pub key: String,
    /// Value bytes as stored (hex-encoded).
    pub value_hex: String,
    /// Full encoded record (hex-encoded).
    pub expected_hex: String,
}

/// A header test vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderVector {
    /// Unique identifier for this vector.
    pub id: String,
    /// End of the record stream.
    pub data_end: u64,
    /// Mutation counter.
    pub sequence: u64,
    /// Compaction counter.
    pub generation: u32,
    /// Encoded header (hex-encoded).
    pub expected_hex: String,
}

/// A test vector for input that must be rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestVector {
    /// Unique identifier for this vector.
    pub id: String,
    /// Human-readable description.
    pub description: String,
    /// Input data (hex-encoded).
    pub input_hex: String,
    /// Expected error message.
    pub expected_error: String,
}

/// A redo marker test vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerVector {
    /// Unique identifier for this vector.
    pub id: String,
    /// Staging image the marker commits (hex-encoded).
    pub image_hex: String,
    /// Encoded marker (hex-encoded).
    pub expected_hex: String,
}

fn record(id: &str, description: &str, kind: u8, key: &str, value_hex: &str, expected_hex: &str) -> RecordVector {
    RecordVector {
        id: id.into(),
        description: description.into(),
        kind,
        key: key.into(),
        value_hex: value_hex.into(),
        expected_hex: expected_hex.into(),
    }
}

/// Record encoding vectors, one per kind.
pub fn record_vectors() -> Vec<RecordVector> {
    vec![
        record("bool_true", "bool true", 0x01, "on", "01", "010200010000006f6e01d8da3b4b"),
        record(
            "int_42",
            "int 42, little-endian",
            0x02,
            "count",
            "2a000000",
            "02050004000000636f756e742a000000ae2d73bb",
        ),
        record(
            "float_1_5",
            "float 1.5",
            0x03,
            "ratio",
            "0000c03f",
            "03050004000000726174696f0000c03f89d07ba5",
        ),
        record(
            "long_neg2",
            "long -2, two's complement",
            0x04,
            "big",
            "feffffffffffffff",
            "04030008000000626967feffffffffffffff8d632465",
        ),
        record(
            "double_0_5",
            "double 0.5",
            0x05,
            "pi",
            "000000000000e03f",
            "050200080000007069000000000000e03fd24a2967",
        ),
        record(
            "string_ada",
            "string, raw UTF-8",
            0x06,
            "name",
            "616461",
            "060400030000006e616d65616461163f6877",
        ),
        record("string_empty", "empty string", 0x06, "e", "", "06010000000000658d48e238"),
        record(
            "bytes",
            "byte array",
            0x07,
            "raw",
            "00ff",
            "0703000200000072617700fff6d36dc4",
        ),
        record(
            "string_set",
            "set {a, bc}, varint-prefixed items",
            0x08,
            "tags",
            "0161026263",
            "08040005000000746167730161026263ed695c44",
        ),
        record(
            "object",
            "object with tag Point and CBOR map {}",
            0x09,
            "pt",
            "05506f696e74a0",
            "09020007000000707405506f696e74a08828bae0",
        ),
        record("tombstone", "removal", 0x0f, "gone", "", "0f040000000000676f6e65097548d2"),
        record(
            "encrypted_string",
            "string with the encrypted flag set",
            0x46,
            "secret",
            "00010203",
            "46060004000000736563726574000102037dd82fa9",
        ),
    ]
}

/// Header encoding vectors.
pub fn header_vectors() -> Vec<HeaderVector> {
    let header = |id: &str, data_end, sequence, generation, expected_hex: &str| HeaderVector {
        id: id.into(),
        data_end,
        sequence,
        generation,
        expected_hex: expected_hex.into(),
    };
    vec![
        header(
            "empty",
            32,
            0,
            0,
            "4d504b560100000020000000000000000000000000000000000000001293896b",
        ),
        header(
            "page_end",
            4096,
            7,
            2,
            "4d504b5601000000001000000000000007000000000000000200000017d9a6bc",
        ),
        header(
            "compacted",
            32,
            1,
            1,
            "4d504b5601000000200000000000000001000000000000000100000018b89048",
        ),
    ]
}

/// Redo marker vectors.
pub fn marker_vectors() -> Vec<MarkerVector> {
    vec![MarkerVector {
        id: "compacted_empty".into(),
        image_hex: "4d504b5601000000200000000000000001000000000000000100000018b89048".into(),
        expected_hex: "4d4b524420000000000000001cdf4421f50d8638".into(),
    }]
}

/// Records that must not parse.
pub fn damaged_record_vectors() -> Vec<TestVector> {
    let vector = |id: &str, description: &str, input_hex: &str, expected_error: &str| TestVector {
        id: id.into(),
        description: description.into(),
        input_hex: input_hex.into(),
        expected_error: expected_error.into(),
    };
    vec![
        vector(
            "bad_crc",
            "int record with the checksum's last byte changed",
            "02050004000000636f756e742a000000ae2d73bc",
            "checksum mismatch",
        ),
        vector(
            "unknown_kind",
            "kind byte 0x20 is not a value type",
            "200200010000006f6e01d8da3b4b",
            "invalid record kind",
        ),
        vector(
            "empty_key",
            "zero-length key",
            "01000001000000010000000000",
            "empty key",
        ),
        vector("zeros", "zero fill after the log", "0000000000000000000000", "invalid record kind"),
    ]
}

/// Encodes bytes as lowercase hexadecimal.
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Decodes a hexadecimal string to bytes.
pub fn hex_decode(hex: &str) -> Vec<u8> {
    let hex = hex.replace([' ', '\n', '\r'], "");
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).expect("Invalid hex"))
        .collect()
}

/// Generate all test vectors as JSON.
pub fn all_vectors_json() -> String {
    let vectors = AllTestVectors {
        records: record_vectors(),
        headers: header_vectors(),
        markers: marker_vectors(),
        damaged: damaged_record_vectors(),
    };

    serde_json::to_string_pretty(&vectors).expect("Failed to serialize vectors")
}

#[derive(Debug, Serialize, Deserialize)]
struct AllTestVectors {
    records: Vec<RecordVector>,
    headers: Vec<HeaderVector>,
    markers: Vec<MarkerVector>,
    damaged: Vec<TestVector>,
}
