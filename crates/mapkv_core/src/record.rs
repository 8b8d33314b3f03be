//! Record format of the append log.
//!
//! ```text
//! | kind (1) | key_len u16 (2) | value_len u32 (4) | key | value | crc32 (4) |
//! ```
//!
//! All integers are little-endian. The low six bits of `kind` hold the value
//! type code (or [`TOMBSTONE_CODE`]); bit `0x40` marks an encrypted value.
//! The CRC covers every byte before it and is always written last, so a
//! record whose CRC matches was completely written.

use mapkv_codec::ValueType;

/// Fixed bytes before the key: kind, key length, value length.
pub const RECORD_PREFIX: usize = 7;

/// Size of the trailing checksum.
pub const CRC_SIZE: usize = 4;

/// Bytes a record needs beyond its key and value.
pub const RECORD_OVERHEAD: usize = RECORD_PREFIX + CRC_SIZE;

/// Type code of a remove record.
pub const TOMBSTONE_CODE: u8 = 15;

const ENCRYPTED_FLAG: u8 = 0x40;
const TYPE_MASK: u8 = 0x3f;

/// What a record holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// A value of the given type.
    Value {
        /// Type of the value.
        value_type: ValueType,
        /// Whether the value bytes are cipher output.
        encrypted: bool,
    },
    /// The key was removed.
    Tombstone,
}

impl RecordKind {
    /// Plaintext value kind.
    #[must_use]
    pub const fn plain(value_type: ValueType) -> Self {
        Self::Value {
            value_type,
            encrypted: false,
        }
    }

    /// Encodes the kind byte.
    #[must_use]
    pub const fn to_byte(self) -> u8 {
        match self {
            Self::Value {
                value_type,
                encrypted,
            } => {
                if encrypted {
                    value_type.code() | ENCRYPTED_FLAG
                } else {
                    value_type.code()
                }
            }
            Self::Tombstone => TOMBSTONE_CODE,
        }
    }

    /// Decodes a kind byte; `None` for unknown codes or stray bits.
    #[must_use]
    pub const fn from_byte(b: u8) -> Option<Self> {
        if b & !(TYPE_MASK | ENCRYPTED_FLAG) != 0 {
            return None;
        }
        let code = b & TYPE_MASK;
        let encrypted = b & ENCRYPTED_FLAG != 0;
        if code == TOMBSTONE_CODE {
            return if encrypted { None } else { Some(Self::Tombstone) };
        }
        match ValueType::from_code(code) {
            Some(value_type) => Some(Self::Value {
                value_type,
                encrypted,
            }),
            None => None,
        }
    }

    /// Returns the value type, or `None` for a tombstone.
    #[must_use]
    pub const fn value_type(self) -> Option<ValueType> {
        match self {
            Self::Value { value_type, .. } => Some(value_type),
            Self::Tombstone => None,
        }
    }

    /// Returns `true` if the value bytes are encrypted.
    #[must_use]
    pub const fn is_encrypted(self) -> bool {
        matches!(self, Self::Value { encrypted: true, .. })
    }
}

/// Returns the encoded length of a record.
#[must_use]
pub const fn record_len(key_len: usize, value_len: usize) -> usize {
    RECORD_OVERHEAD + key_len + value_len
}

/// Encodes a complete record, checksum included.
///
/// Callers validate key and value lengths beforehand.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn encode_record(kind: RecordKind, key: &str, value: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(record_len(key.len(), value.len()));
    buf.push(kind.to_byte());
    buf.extend_from_slice(&(key.len() as u16).to_le_bytes());
    buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
    buf.extend_from_slice(key.as_bytes());
    buf.extend_from_slice(value);
    let crc = compute_crc32(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    buf
}

/// A well-formed record inside a byte slice.
#[derive(Debug, Clone, Copy)]
pub struct RecordView<'a> {
    /// Offset of the record's first byte.
    pub offset: usize,
    /// Total encoded length.
    pub len: usize,
    /// Decoded kind.
    pub kind: RecordKind,
    /// The key.
    pub key: &'a str,
    /// Value bytes as stored (possibly encrypted).
    pub value: &'a [u8],
}

impl RecordView<'_> {
    /// Offset of the value bytes within the log.
    #[must_use]
    pub fn value_offset(&self) -> usize {
        self.offset + RECORD_PREFIX + self.key.len()
    }
}

/// Outcome of parsing one record.
#[derive(Debug)]
pub enum Parsed<'a> {
    /// The record is intact.
    Record(RecordView<'a>),
    /// Framing is plausible but the contents fail verification.
    ///
    /// `len` is where the next record would start if this one is skipped.
    Damaged {
        /// Encoded length according to the record's own header.
        len: usize,
        /// The key, if its bytes are still UTF-8.
        key: Option<&'a str>,
        /// What failed.
        reason: &'static str,
    },
    /// The bytes cannot be a record; the log ends here.
    Invalid {
        /// What failed.
        reason: &'static str,
    },
}

/// Parses the record starting at `offset`, not reading past `limit`.
#[must_use]
pub fn parse_at(bytes: &[u8], offset: usize, limit: usize) -> Parsed<'_> {
    let limit = limit.min(bytes.len());
    if offset + RECORD_PREFIX > limit {
        return Parsed::Invalid {
            reason: "truncated record prefix",
        };
    }
    let Some(kind) = RecordKind::from_byte(bytes[offset]) else {
        return Parsed::Invalid {
            reason: "invalid record kind",
        };
    };
    let key_len = usize::from(u16::from_le_bytes([bytes[offset + 1], bytes[offset + 2]]));
    let value_len = u32::from_le_bytes([
        bytes[offset + 3],
        bytes[offset + 4],
        bytes[offset + 5],
        bytes[offset + 6],
    ]) as usize;
    if key_len == 0 {
        return Parsed::Invalid {
            reason: "empty key",
        };
    }
    if kind == RecordKind::Tombstone && value_len != 0 {
        return Parsed::Invalid {
            reason: "tombstone with value",
        };
    }
    let len = record_len(key_len, value_len);
    if limit - offset < len {
        return Parsed::Invalid {
            reason: "record extends past end of log",
        };
    }

    let body_end = offset + len - CRC_SIZE;
    let stored = u32::from_le_bytes([
        bytes[body_end],
        bytes[body_end + 1],
        bytes[body_end + 2],
        bytes[body_end + 3],
    ]);
    let key_start = offset + RECORD_PREFIX;
    let key = std::str::from_utf8(&bytes[key_start..key_start + key_len]).ok();
    if compute_crc32(&bytes[offset..body_end]) != stored {
        return Parsed::Damaged {
            len,
            key,
            reason: "checksum mismatch",
        };
    }

    let Some(key) = key else {
        return Parsed::Damaged {
            len,
            key: None,
            reason: "key is not UTF-8",
        };
    };
    Parsed::Record(RecordView {
        offset,
        len,
        kind,
        key,
        value: &bytes[key_start + key_len..body_end],
    })
}

/// Computes the CRC32 (IEEE) of `data`.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}
