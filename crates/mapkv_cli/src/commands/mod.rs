//! CLI command implementations.

pub mod compact;
pub mod dump;
pub mod get;
pub mod inspect;
pub mod put;
pub mod verify;

use clap::ValueEnum;
use mapkv_core::layout::HEADER_SIZE;
use mapkv_core::record::{RecordKind, RecordView};
use mapkv_core::{AesGcmCipher, Builder, Cipher, EncryptionKey, Header, Store, StorePaths, Value};
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Value type accepted by `put`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ValueKind {
    /// `true` or `false`.
    Bool,
    /// 32-bit integer.
    Int,
    /// 32-bit float.
    Float,
    /// 64-bit integer.
    Long,
    /// 64-bit float.
    Double,
    /// UTF-8 text.
    String,
    /// Hex-encoded bytes.
    Bytes,
    /// Comma-separated strings.
    Set,
}

/// The store a command operates on.
pub struct Target {
    /// File names of the store.
    pub paths: StorePaths,
    key: Option<EncryptionKey>,
}

impl Target {
    /// Resolves the store and parses the optional hex key.
    pub fn new(dir: PathBuf, name: String, key_hex: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        let key = key_hex
            .map(|hex| hex_decode(hex).and_then(|bytes| Ok(EncryptionKey::from_bytes(&bytes)?)))
            .transpose()?;
        Ok(Self {
            paths: StorePaths::new(&dir, &name),
            key,
        })
    }

    /// Reads the store file without opening the store.
    pub fn read_file(&self) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let path = self.paths.primary();
        if !path.exists() {
            return Err(format!("No store found at {}", path.display()).into());
        }
        Ok(fs::read(path)?)
    }

    /// Opens the store, recovering it if needed.
    pub fn open(&self) -> Result<Store, Box<dyn std::error::Error>> {
        let mut builder = Builder::new(self.paths.dir(), self.paths.name()).blocking();
        if let Some(key) = &self.key {
            builder = builder.cipher(AesGcmCipher::new(key.clone()));
        }
        Ok(builder.build()?)
    }

    /// Cipher for decoding encrypted records read straight from the file.
    pub fn cipher(&self) -> Option<AesGcmCipher> {
        self.key.clone().map(AesGcmCipher::new)
    }
}

/// Upper bound for walking records: the header's end, or the whole file
/// if the header does not verify.
pub fn scan_limit(bytes: &[u8]) -> usize {
    match Header::decode(bytes) {
        Ok(header) => header.data_end().clamp(HEADER_SIZE, bytes.len().max(HEADER_SIZE)),
        Err(_) => bytes.len(),
    }
}

/// Decodes a record's value, decrypting with `cipher` when needed.
pub fn decode_record(view: &RecordView<'_>, cipher: Option<&dyn Cipher>) -> Result<Option<Value>, String> {
    let RecordKind::Value {
        value_type,
        encrypted,
    } = view.kind
    else {
        return Ok(None);
    };
    let plain = if encrypted {
        let cipher = cipher.ok_or("encrypted; pass --key to decode")?;
        cipher.decrypt(view.value).map_err(|e| e.to_string())?
    } else {
        view.value.to_vec()
    };
    Value::decode_payload(value_type, &plain)
        .map(Some)
        .map_err(|e| e.to_string())
}

/// Renders a value for text output.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Bool(v) => v.to_string(),
        Value::Int(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Long(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::String(v) => format!("{v:?}"),
        Value::Bytes(v) => format!("0x{}", hex_encode(v)),
        Value::StringSet(v) => format!("{v:?}"),
        Value::Object { tag, data } => format!("<{tag}: {} bytes>", data.len()),
    }
}

/// Parses command-line text as a value of `kind`.
pub fn parse_value(kind: ValueKind, text: &str) -> Result<Value, Box<dyn std::error::Error>> {
    let value = match kind {
        ValueKind::Bool => Value::Bool(text.parse()?),
        ValueKind::Int => Value::Int(text.parse()?),
        ValueKind::Float => Value::Float(text.parse()?),
        ValueKind::Long => Value::Long(text.parse()?),
        ValueKind::Double => Value::Double(text.parse()?),
        ValueKind::String => Value::String(text.to_string()),
        ValueKind::Bytes => Value::Bytes(hex_decode(text)?),
        ValueKind::Set => Value::StringSet(
            text.split(',')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect::<BTreeSet<_>>(),
        ),
    };
    Ok(value)
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_decode(text: &str) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let text = text.strip_prefix("0x").unwrap_or(text);
    if text.len() % 2 != 0 {
        return Err("hex input must have an even number of digits".into());
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            text.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| Box::<dyn std::error::Error>::from(format!("invalid hex at position {i}")))
        })
        .collect()
}

/// Formats a byte count.
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_kind() {
        assert_eq!(parse_value(ValueKind::Int, "-3").unwrap(), Value::Int(-3));
        assert_eq!(parse_value(ValueKind::Bool, "true").unwrap(), Value::Bool(true));
        assert_eq!(
            parse_value(ValueKind::Bytes, "0x00ff").unwrap(),
            Value::Bytes(vec![0, 255])
        );
        assert_eq!(
            parse_value(ValueKind::Set, "a,b,,a").unwrap(),
            Value::StringSet(["a".to_string(), "b".to_string()].into())
        );
        assert!(parse_value(ValueKind::Long, "ten").is_err());
        assert!(parse_value(ValueKind::Bytes, "abc").is_err());
    }

    #[test]
    fn key_must_be_32_bytes() {
        let dir = PathBuf::from(".");
        assert!(Target::new(dir.clone(), "s".into(), Some("ab".repeat(32).as_str())).is_ok());
        assert!(Target::new(dir, "s".into(), Some("abcd")).is_err());
    }
}
