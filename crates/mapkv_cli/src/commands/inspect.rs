//! Inspect command implementation.

use super::{format_size, Format, Target};
use mapkv_core::{inspect, HeaderStatus};
use serde::Serialize;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store file path.
    pub path: String,
    /// File size in bytes.
    pub file_size: u64,
    /// Header state: `valid`, `blank` or `damaged`.
    pub header: String,
    /// Why the header failed, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_error: Option<String>,
    /// Stored end of the log.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_end: Option<u64>,
    /// Stored mutation counter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    /// Stored compaction counter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<u32>,
    /// End of the intact log found by scanning.
    pub scanned_end: usize,
    /// Intact records.
    pub records: usize,
    /// Damaged records that a load would skip.
    pub damaged_records: usize,
    /// Where a load would cut the log, if anywhere.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncate_at: Option<usize>,
    /// Live keys.
    pub live_keys: usize,
    /// Bytes of live records.
    pub live_bytes: usize,
    /// Bytes a compaction would reclaim.
    pub garbage_bytes: usize,
    /// Whether an interrupted compaction is waiting to be resolved.
    pub pending_compaction: bool,
}

/// Runs the inspect command.
pub fn run(target: &Target, format: Format) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = target.read_file()?;
    let report = inspect(&bytes);

    let mut result = InspectResult {
        path: target.paths.primary().display().to_string(),
        file_size: bytes.len() as u64,
        header: String::new(),
        header_error: None,
        data_end: None,
        sequence: None,
        generation: None,
        scanned_end: report.scan.end,
        records: report.scan.records,
        damaged_records: report.scan.damaged,
        truncate_at: report.scan.truncated.map(|t| t.offset),
        live_keys: report.live_keys,
        live_bytes: report.live_bytes,
        garbage_bytes: report.garbage_bytes,
        pending_compaction: target.paths.staging().exists() || target.paths.redo_marker().exists(),
    };
    match report.header {
        HeaderStatus::Valid(header) => {
            result.header = "valid".into();
            result.data_end = Some(header.data_end);
            result.sequence = Some(header.sequence.as_u64());
            result.generation = Some(header.generation.as_u32());
        }
        HeaderStatus::Blank => result.header = "blank".into(),
        HeaderStatus::Damaged(reason) => {
            result.header = "damaged".into();
            result.header_error = Some(reason);
        }
    }

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Text => print_text_output(&result),
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("MapKV Store Inspection");
    println!("======================");
    println!();
    println!("Path: {}", result.path);
    println!("Size: {}", format_size(result.file_size));
    println!();
    println!("Header: {}", result.header);
    if let Some(reason) = &result.header_error {
        println!("  Error:      {reason}");
    }
    if let (Some(end), Some(seq), Some(generation)) = (result.data_end, result.sequence, result.generation) {
        println!("  Data end:   {end}");
        println!("  Sequence:   {seq}");
        println!("  Generation: {generation}");
    }
    println!();
    println!("Log:");
    println!("  Scanned end:     {}", result.scanned_end);
    println!("  Records:         {}", result.records);
    println!("  Damaged records: {}", result.damaged_records);
    if let Some(offset) = result.truncate_at {
        println!("  Torn tail at:    {offset}");
    }
    println!();
    println!("Keys:");
    println!("  Live keys:  {}", result.live_keys);
    println!("  Live bytes: {}", format_size(result.live_bytes as u64));
    println!("  Garbage:    {}", format_size(result.garbage_bytes as u64));
    if result.pending_compaction {
        println!();
        println!("An interrupted compaction will be resolved on the next open.");
    }
}
