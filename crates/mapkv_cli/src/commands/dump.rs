//! Dump command implementation.

use super::{decode_record, display_value, scan_limit, Format, Target};
use mapkv_core::layout::HEADER_SIZE;
use mapkv_core::record::{parse_at, Parsed, RecordKind};
use mapkv_core::{Cipher, Value};
use serde::Serialize;
use std::collections::HashMap;

/// One record for output.
#[derive(Debug, Serialize)]
pub struct RecordInfo {
    /// Offset in the store file.
    pub offset: usize,
    /// Encoded length.
    pub len: usize,
    /// Value type name, `tombstone` or `damaged`.
    pub kind: String,
    /// Record key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Whether the value bytes are encrypted.
    pub encrypted: bool,
    /// Whether this is the current record for its key.
    pub live: bool,
    /// Decoded value, when readable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Why the value or record could not be read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Runs the dump command.
pub fn run(
    target: &Target,
    skip: usize,
    limit: Option<usize>,
    format: Format,
) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = target.read_file()?;
    let cipher = target.cipher();
    let (records, end) = read_records(&bytes, cipher.as_ref().map(|c| c as &dyn Cipher));
    let records: Vec<RecordInfo> = records
        .into_iter()
        .skip(skip)
        .take(limit.unwrap_or(usize::MAX))
        .collect();

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&records)?),
        Format::Text => print_text_output(&records, end),
    }

    Ok(())
}

/// Reads every record up to the log end, returning them with the offset
/// where the log ends.
pub fn read_records(bytes: &[u8], cipher: Option<&dyn Cipher>) -> (Vec<RecordInfo>, (usize, &'static str)) {
    let limit = scan_limit(bytes);
    let mut records = Vec::new();
    let mut latest: HashMap<String, usize> = HashMap::new();
    let mut pos = HEADER_SIZE;

    let end = loop {
        match parse_at(bytes, pos, limit) {
            Parsed::Record(view) => {
                let (kind, encrypted) = match view.kind {
                    RecordKind::Value {
                        value_type,
                        encrypted,
                    } => (value_type.name().to_string(), encrypted),
                    RecordKind::Tombstone => ("tombstone".to_string(), false),
                };
                let (value, error) = match decode_record(&view, cipher) {
                    Ok(value) => (value, None),
                    Err(e) => (None, Some(e)),
                };
                latest.insert(view.key.to_string(), records.len());
                records.push(RecordInfo {
                    offset: pos,
                    len: view.len,
                    kind,
                    key: Some(view.key.to_string()),
                    encrypted,
                    live: false,
                    value,
                    error,
                });
                pos += view.len;
            }
            Parsed::Damaged { len, key, reason } => {
                // Older records of the key are not current either
                if let Some(key) = key {
                    latest.remove(key);
                }
                records.push(RecordInfo {
                    offset: pos,
                    len,
                    kind: "damaged".to_string(),
                    key: key.map(str::to_string),
                    encrypted: false,
                    live: false,
                    value: None,
                    error: Some(reason.to_string()),
                });
                pos += len;
            }
            Parsed::Invalid { reason } => break (pos, reason),
        }
    };

    for index in latest.into_values() {
        let record = &mut records[index];
        record.live = record.kind != "tombstone";
    }
    (records, end)
}

fn print_text_output(records: &[RecordInfo], (end, reason): (usize, &str)) {
    for record in records {
        let marker = if record.live { '*' } else { ' ' };
        let key = record.key.as_deref().unwrap_or("-");
        let detail = match (&record.value, &record.error) {
            (Some(value), _) => display_value(value),
            (None, Some(error)) => format!("({error})"),
            (None, None) => String::new(),
        };
        let lock = if record.encrypted { " [enc]" } else { "" };
        println!(
            "{marker} {:>10} {:>6}  {:<10}{lock} {key:?} {detail}",
            record.offset, record.len, record.kind
        );
    }
    println!();
    println!("{} record(s); log ends at {end} ({reason})", records.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapkv_core::{Builder, StorePaths};
    use std::fs;

    #[test]
    fn marks_latest_records_live() {
        let dir = tempfile::tempdir().unwrap();
        let store = Builder::new(dir.path(), "d").blocking().build().unwrap();
        store.put_string("a", "one").unwrap();
        store.put_string("a", "three").unwrap();
        store.put_int("b", 1).unwrap();
        store.put_int("gone", 1).unwrap();
        store.remove("gone").unwrap();
        store.close().unwrap();

        let bytes = fs::read(StorePaths::new(dir.path(), "d").primary()).unwrap();
        let (records, (end, _)) = read_records(&bytes, None);
        let live: Vec<_> = records
            .iter()
            .filter(|r| r.live)
            .map(|r| r.key.clone().unwrap())
            .collect();
        assert_eq!(records.len(), 5);
        assert_eq!(live, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(records[1].value, Some(Value::String("three".into())));
        assert_eq!(records[4].kind, "tombstone");
        assert_eq!(end, records[4].offset + records[4].len);
    }
}
