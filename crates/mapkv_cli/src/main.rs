//! MapKV CLI
//!
//! Command-line tools for MapKV store maintenance.
//!
//! # Commands
//!
//! - `inspect` - Display file statistics and header fields
//! - `verify` - Verify file integrity without modifying it
//! - `compact` - Compact the log to reclaim space
//! - `dump` - Dump records in file order for debugging
//! - `get` - Print one value
//! - `put` - Store one value

mod commands;

use clap::{Parser, Subcommand};
use commands::{Format, ValueKind};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// MapKV command-line store tools.
#[derive(Parser)]
#[command(name = "mapkv")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the store files
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Store name (the file is `<name>.kv`)
    #[arg(global = true, short, long, default_value = "default")]
    name: String,

    /// Encryption key as 64 hex digits, for encrypted values
    #[arg(global = true, long)]
    key: Option<String>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display file statistics and header fields
    Inspect {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Verify file integrity without modifying it
    Verify {
        /// Also decode every live value
        #[arg(long)]
        values: bool,
    },

    /// Compact the log to reclaim space
    Compact {
        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Dump records in file order
    Dump {
        /// Maximum number of records to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Skip this many records
        #[arg(short, long, default_value = "0")]
        skip: usize,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Print one value
    Get {
        /// Key to read
        key: String,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Store one value
    Put {
        /// Key to write
        key: String,

        /// Value, parsed according to `--type`
        value: String,

        /// Value type
        #[arg(short = 't', long = "type", value_enum, default_value_t = ValueKind::String)]
        kind: ValueKind,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Version = cli.command {
        println!("MapKV CLI v{}", env!("CARGO_PKG_VERSION"));
        println!("File format v{}", mapkv_core::layout::FORMAT_VERSION);
        return Ok(());
    }

    let dir = cli.path.ok_or("Store directory required (--path)")?;
    let target = commands::Target::new(dir, cli.name, cli.key.as_deref())?;
    debug!(path = %target.paths.primary().display(), "opening store file");

    match cli.command {
        Commands::Inspect { format } => commands::inspect::run(&target, format)?,
        Commands::Verify { values } => commands::verify::run(&target, values)?,
        Commands::Compact { dry_run } => commands::compact::run(&target, dry_run)?,
        Commands::Dump {
            limit,
            skip,
            format,
        } => commands::dump::run(&target, skip, limit, format)?,
        Commands::Get { key, format } => commands::get::run(&target, &key, format)?,
        Commands::Put { key, value, kind } => commands::put::run(&target, &key, &value, kind)?,
        Commands::Version => {}
    }

    Ok(())
}
