//! Verify command implementation.
//!
//! Verification only reads the file; anything it reports would be repaired
//! by the next open.

use super::{decode_record, scan_limit, Target};
use mapkv_core::layout::HEADER_SIZE;
use mapkv_core::record::{parse_at, Parsed, RecordKind};
use mapkv_core::{inspect, Cipher, HeaderStatus};
use std::collections::HashMap;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of records checked.
    pub records_checked: usize,
    /// Number of live values decoded.
    pub values_decoded: usize,
    /// Encrypted values skipped for lack of a key.
    pub values_skipped: usize,
    /// List of problems found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(target: &Target, check_values: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying store at {}", target.paths.primary().display());
    println!();

    let bytes = target.read_file()?;
    let mut result = verify_file(&bytes);
    if target.paths.staging().exists() || target.paths.redo_marker().exists() {
        result
            .errors
            .push("an interrupted compaction is pending".to_string());
    }
    if check_values {
        let cipher = target.cipher();
        verify_values(&bytes, cipher.as_ref().map(|c| c as &dyn Cipher), &mut result);
    }

    println!("Records checked: {}", result.records_checked);
    if check_values {
        println!("Values decoded:  {}", result.values_decoded);
        if result.values_skipped > 0 {
            println!("Values skipped:  {} (encrypted, no --key)", result.values_skipped);
        }
    }
    for error in &result.errors {
        println!("  - {error}");
    }

    println!();
    if result.is_ok() {
        println!("✓ Store verification passed");
        Ok(())
    } else {
        println!("✗ Store verification failed");
        Err("Verification failed".into())
    }
}

/// Checks the header and record framing.
pub fn verify_file(bytes: &[u8]) -> VerifyResult {
    let report = inspect(bytes);
    let mut result = VerifyResult {
        records_checked: report.scan.records + report.scan.damaged,
        ..VerifyResult::default()
    };

    match report.header {
        HeaderStatus::Valid(header) => {
            if header.data_end() > bytes.len() {
                result.errors.push(format!(
                    "header data end {} is past the file end {}",
                    header.data_end(),
                    bytes.len()
                ));
            }
        }
        HeaderStatus::Blank => {}
        HeaderStatus::Damaged(reason) => result.errors.push(format!("header: {reason}")),
    }
    if report.scan.damaged > 0 {
        result
            .errors
            .push(format!("{} damaged record(s)", report.scan.damaged));
    }
    if let Some(t) = report.scan.truncated {
        result
            .errors
            .push(format!("log is torn at offset {}: {}", t.offset, t.reason));
    }
    result
}

/// Decodes the latest value of every key.
pub fn verify_values(bytes: &[u8], cipher: Option<&dyn Cipher>, result: &mut VerifyResult) {
    let limit = scan_limit(bytes);
    let mut latest = HashMap::new();
    let mut pos = HEADER_SIZE;
    loop {
        match parse_at(bytes, pos, limit) {
            Parsed::Record(view) => {
                pos += view.len;
                latest.insert(view.key, view);
            }
            Parsed::Damaged { len, key, .. } => {
                if let Some(key) = key {
                    latest.remove(key);
                }
                pos += len;
            }
            Parsed::Invalid { .. } => break,
        }
    }

    for (key, view) in latest {
        match view.kind {
            RecordKind::Tombstone => {}
            RecordKind::Value { encrypted: true, .. } if cipher.is_none() => {
                result.values_skipped += 1;
            }
            RecordKind::Value { .. } => match decode_record(&view, cipher) {
                Ok(_) => result.values_decoded += 1,
                Err(e) => result.errors.push(format!("value of {key:?}: {e}")),
            },
        }
    }
}
