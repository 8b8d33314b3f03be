//! Typed values and their binary payload encodings.

use crate::error::{CodecError, CodecResult};
use crate::string_set;
use serde::Serialize;
use std::collections::BTreeSet;

/// Longest accepted object encoder tag, in bytes.
pub const MAX_TAG_LEN: usize = 50;

/// The storable value types and their stable on-disk codes.
///
/// Codes are part of the file format and must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[repr(u8)]
pub enum ValueType {
    /// `bool`, one byte.
    Bool = 1,
    /// `i32`, four bytes little-endian.
    Int = 2,
    /// `f32`, four bytes little-endian.
    Float = 3,
    /// `i64`, eight bytes little-endian.
    Long = 4,
    /// `f64`, eight bytes little-endian.
    Double = 5,
    /// UTF-8 string, raw bytes.
    String = 6,
    /// Byte array, raw bytes.
    Bytes = 7,
    /// Set of strings, varint length-prefixed.
    StringSet = 8,
    /// Tagged object produced by an [`ObjectEncoder`](crate::ObjectEncoder).
    Object = 9,
}

impl ValueType {
    /// All value types, in code order.
    pub const ALL: [ValueType; 9] = [
        ValueType::Bool,
        ValueType::Int,
        ValueType::Float,
        ValueType::Long,
        ValueType::Double,
        ValueType::String,
        ValueType::Bytes,
        ValueType::StringSet,
        ValueType::Object,
    ];

    /// Returns the on-disk code.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Looks up a type by its on-disk code.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Bool),
            2 => Some(Self::Int),
            3 => Some(Self::Float),
            4 => Some(Self::Long),
            5 => Some(Self::Double),
            6 => Some(Self::String),
            7 => Some(Self::Bytes),
            8 => Some(Self::StringSet),
            9 => Some(Self::Object),
            _ => None,
        }
    }

    /// Returns the encoded width of fixed-width types.
    #[must_use]
    pub const fn fixed_size(self) -> Option<usize> {
        match self {
            Self::Bool => Some(1),
            Self::Int | Self::Float => Some(4),
            Self::Long | Self::Double => Some(8),
            _ => None,
        }
    }

    /// Returns `true` for bool and the numeric types.
    #[must_use]
    pub const fn is_primitive(self) -> bool {
        self.fixed_size().is_some()
    }

    /// Returns a lowercase name for display.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Long => "long",
            Self::Double => "double",
            Self::String => "string",
            Self::Bytes => "bytes",
            Self::StringSet => "string_set",
            Self::Object => "object",
        }
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed value as stored in a record.
///
/// Objects are kept in their encoded form together with the tag of the
/// encoder that produced them; decoding them requires the encoder registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Boolean value.
    Bool(bool),
    /// 32-bit signed integer.
    Int(i32),
    /// 32-bit float.
    Float(f32),
    /// 64-bit signed integer.
    Long(i64),
    /// 64-bit float.
    Double(f64),
    /// UTF-8 string.
    String(String),
    /// Byte array.
    Bytes(Vec<u8>),
    /// Set of strings.
    StringSet(BTreeSet<String>),
    /// Encoded object.
    Object {
        /// Tag of the encoder that produced `data`.
        tag: String,
        /// Encoder output.
        data: Vec<u8>,
    },
}

impl Value {
    /// Returns the type of this value.
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::Long(_) => ValueType::Long,
            Value::Double(_) => ValueType::Double,
            Value::String(_) => ValueType::String,
            Value::Bytes(_) => ValueType::Bytes,
            Value::StringSet(_) => ValueType::StringSet,
            Value::Object { .. } => ValueType::Object,
        }
    }

    /// Encodes the value into its record payload.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidTag`] for an object with an empty or
    /// overlong tag.
    pub fn encode_payload(&self) -> CodecResult<Vec<u8>> {
        let bytes = match self {
            Value::Bool(v) => vec![u8::from(*v)],
            Value::Int(v) => v.to_le_bytes().to_vec(),
            Value::Float(v) => v.to_le_bytes().to_vec(),
            Value::Long(v) => v.to_le_bytes().to_vec(),
            Value::Double(v) => v.to_le_bytes().to_vec(),
            Value::String(v) => v.as_bytes().to_vec(),
            Value::Bytes(v) => v.clone(),
            Value::StringSet(v) => string_set::encode(v),
            Value::Object { tag, data } => encode_object(tag, data)?,
        };
        Ok(bytes)
    }

    /// Decodes a record payload of the given type.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is malformed for `value_type`.
    pub fn decode_payload(value_type: ValueType, bytes: &[u8]) -> CodecResult<Value> {
        let value = match value_type {
            ValueType::Bool => match fixed::<1>(value_type, bytes)? {
                [0] => Value::Bool(false),
                [1] => Value::Bool(true),
                [b] => {
                    return Err(CodecError::decoding_failed(format!(
                        "invalid bool byte {b:#04x}"
                    )))
                }
            },
            ValueType::Int => Value::Int(i32::from_le_bytes(fixed(value_type, bytes)?)),
            ValueType::Float => Value::Float(f32::from_le_bytes(fixed(value_type, bytes)?)),
            ValueType::Long => Value::Long(i64::from_le_bytes(fixed(value_type, bytes)?)),
            ValueType::Double => Value::Double(f64::from_le_bytes(fixed(value_type, bytes)?)),
            ValueType::String => Value::String(
                std::str::from_utf8(bytes)
                    .map_err(|_| CodecError::InvalidUtf8)?
                    .to_string(),
            ),
            ValueType::Bytes => Value::Bytes(bytes.to_vec()),
            ValueType::StringSet => Value::StringSet(string_set::decode(bytes)?),
            ValueType::Object => {
                let (tag, data) = split_object(bytes)?;
                Value::Object {
                    tag: tag.to_string(),
                    data: data.to_vec(),
                }
            }
        };
        Ok(value)
    }

    /// Returns the boolean, if this is a `Bool`.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the integer, if this is an `Int`.
    #[must_use]
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the float, if this is a `Float`.
    #[must_use]
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the long, if this is a `Long`.
    #[must_use]
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the double, if this is a `Double`.
    #[must_use]
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string, if this is a `String`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the bytes, if this is `Bytes`.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the set, if this is a `StringSet`.
    #[must_use]
    pub fn as_string_set(&self) -> Option<&BTreeSet<String>> {
        match self {
            Value::StringSet(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<BTreeSet<String>> for Value {
    fn from(v: BTreeSet<String>) -> Self {
        Value::StringSet(v)
    }
}

fn fixed<const N: usize>(value_type: ValueType, bytes: &[u8]) -> CodecResult<[u8; N]> {
    bytes.try_into().map_err(|_| CodecError::InvalidLength {
        type_name: value_type.name(),
        expected: N,
        actual: bytes.len(),
    })
}

/// Checks that `tag` can be stored in an object payload.
///
/// # Errors
///
/// Returns [`CodecError::InvalidTag`] if the tag is empty or longer than
/// [`MAX_TAG_LEN`] bytes.
pub fn validate_tag(tag: &str) -> CodecResult<()> {
    if tag.is_empty() || tag.len() > MAX_TAG_LEN {
        return Err(CodecError::invalid_tag(tag));
    }
    Ok(())
}

/// Builds an object payload: `tag_len (1) | tag | data`.
///
/// # Errors
///
/// Returns [`CodecError::InvalidTag`] if the tag is not storable.
#[allow(clippy::cast_possible_truncation)]
pub fn encode_object(tag: &str, data: &[u8]) -> CodecResult<Vec<u8>> {
    validate_tag(tag)?;
    let mut out = Vec::with_capacity(1 + tag.len() + data.len());
    // validate_tag bounds the length well below 256
    out.push(tag.len() as u8);
    out.extend_from_slice(tag.as_bytes());
    out.extend_from_slice(data);
    Ok(out)
}

/// Splits an object payload into its tag and encoder bytes.
///
/// # Errors
///
/// Returns an error if the payload is shorter than its tag header or the
/// tag is not valid UTF-8.
pub fn split_object(bytes: &[u8]) -> CodecResult<(&str, &[u8])> {
    let (&tag_len, rest) = bytes.split_first().ok_or(CodecError::UnexpectedEof)?;
    let tag_len = usize::from(tag_len);
    if tag_len == 0 || rest.len() < tag_len {
        return Err(CodecError::UnexpectedEof);
    }
    let (tag, data) = rest.split_at(tag_len);
    let tag = std::str::from_utf8(tag).map_err(|_| CodecError::InvalidUtf8)?;
    Ok((tag, data))
}
