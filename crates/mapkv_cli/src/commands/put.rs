//! Put command implementation.

use super::{display_value, parse_value, Target, ValueKind};

/// Runs the put command, creating the store if needed.
pub fn run(
    target: &Target,
    key: &str,
    text: &str,
    kind: ValueKind,
) -> Result<(), Box<dyn std::error::Error>> {
    let value = parse_value(kind, text)?;
    let rendered = display_value(&value);
    let store = target.open()?;
    store.put_value(key, value)?;
    store.close()?;

    println!("{key} = {rendered}");
    Ok(())
}
