//! Get command implementation.

use super::{display_value, Format, Target};

/// Runs the get command.
///
/// A missing key, or one whose value cannot be decoded, is an error.
pub fn run(target: &Target, key: &str, format: Format) -> Result<(), Box<dyn std::error::Error>> {
    target.read_file()?;
    let store = target.open()?;
    let value = store.get_value(key);
    let present = store.contains(key);
    store.close()?;

    match (value, format) {
        (Some(value), Format::Json) => println!("{}", serde_json::to_string_pretty(&value)?),
        (Some(value), Format::Text) => println!("{}", display_value(&value)),
        (None, _) if present => {
            return Err(format!("Value of {key:?} cannot be decoded (wrong or missing --key?)").into())
        }
        (None, _) => return Err(format!("Key {key:?} not found").into()),
    }

    Ok(())
}
