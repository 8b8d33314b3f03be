//! Compact command implementation.

use super::{format_size, Target};
use mapkv_core::layout::HEADER_SIZE;
use mapkv_core::inspect;

/// Runs the compact command.
pub fn run(target: &Target, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("Compacting store at {}", target.paths.primary().display());
    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    println!();

    if dry_run {
        let bytes = target.read_file()?;
        let report = inspect(&bytes);
        let before = report.scan.end as u64;
        let after = (HEADER_SIZE + report.live_bytes) as u64;

        println!("Compaction Analysis:");
        println!("  Records:    {}", report.scan.records);
        println!("  Live keys:  {}", report.live_keys);
        println!("  Log before: {}", format_size(before));
        println!("  Log after:  {}", format_size(after));
        println!("  Reclaimed:  {}", format_size(before.saturating_sub(after)));
        return Ok(());
    }

    target.read_file()?;
    let store = target.open()?;
    let result = store.force_compact()?;
    store.close()?;

    println!("  Records kept: {}", result.records_kept);
    println!("  Log before:   {}", format_size(result.bytes_before as u64));
    println!("  Log after:    {}", format_size(result.bytes_after as u64));
    println!("  File before:  {}", format_size(result.capacity_before as u64));
    println!("  File after:   {}", format_size(result.capacity_after as u64));
    println!();
    println!("✓ Compaction complete, {} saved", format_size(result.bytes_saved() as u64));

    Ok(())
}
