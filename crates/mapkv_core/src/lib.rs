//! # MapKV Core
//!
//! An embedded key-value store kept in a memory-mapped, append-only file.
//!
//! This crate provides:
//! - Typed get/put for primitives, strings, bytes, string sets and objects
//! - In-place updates of same-length values, appends otherwise
//! - Crash recovery by checksummed records and staged compaction
//! - Optional per-value encryption
//! - Sharing one store file between processes
//! - Change notification
//!
//! ## Example
//!
//! ```rust
//! use mapkv_core::{Builder, ChangeListener, Store};
//! use std::sync::Arc;
//!
//! let dir = tempfile::tempdir()?;
//! let store = Builder::new(dir.path(), "settings").blocking().build()?;
//!
//! store.put_string("theme", "dark")?;
//! store.put_int("volume", 7)?;
//! assert_eq!(store.get_string("theme").as_deref(), Some("dark"));
//! assert_eq!(store.get_int("missing", -1), -1);
//!
//! let listener: Arc<dyn ChangeListener> =
//!     Arc::new(|_: &Store, key: Option<&str>| println!("changed: {key:?}"));
//! store.register_listener(listener);
//!
//! store.remove("volume")?;
//! store.close()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## File layout
//!
//! See [`layout`] for the files a store owns and [`record`] for the record
//! format.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change_feed;
mod cipher;
mod compaction;
mod config;
mod coordination;
mod error;
mod index;
pub mod layout;
mod payload;
pub mod record;
mod registry;
mod replay;
mod stats;
mod store;
mod types;
mod undo;

pub use change_feed::{ChangeEvent, ChangeListener, ChangeOrigin};
pub use cipher::Cipher;
#[cfg(feature = "encryption")]
pub use cipher::{AesGcmCipher, EncryptionKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use compaction::{CompactionResult, RecoveryOutcome};
pub use config::{CommitMode, Config};
pub use coordination::{ChangeWatcher, PollFn, PollingWatcher};
pub use error::{CoreError, CoreResult};
pub use layout::{Header, StorePaths};
pub use registry::{StoreGroup, StoreRegistry};
pub use replay::{inspect, FileReport, HeaderStatus, ScanReport, Truncation};
pub use stats::{StatsSnapshot, StoreStats};
pub use store::{Builder, Editor, LoadReport, Store, StoreInfo};
pub use types::{
    Generation, SequenceNumber, MAX_FILE_SIZE, MAX_KEY_SIZE, MAX_VALUE_SIZE, PAGE_SIZE,
};

// Re-export the value model so users need only this crate
pub use mapkv_codec::{
    CborEncoder, CodecError, CodecResult, DynEncoder, EncoderRegistry, ObjectEncoder,
    StringSetCodec, Value, ValueType,
};
