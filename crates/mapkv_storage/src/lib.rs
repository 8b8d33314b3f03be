//! # MapKV Storage
//!
//! Lowest-level storage abstraction for MapKV.
//!
//! A store keeps its whole log in one contiguous byte region that is read
//! in place and overwritten in place. This crate provides that region and
//! the advisory lock used to share it between processes. Regions are
//! **opaque bytes**: they know nothing about headers, records or keys.
//!
//! ## Available Regions
//!
//! - [`MmapRegion`] - A file mapped read-write with `memmap2`
//! - [`InMemoryRegion`] - A plain buffer, for tests and ephemeral stores
//!
//! ## Example
//!
//! ```rust
//! use mapkv_storage::{InMemoryRegion, MappedRegion};
//!
//! let mut region = InMemoryRegion::with_len(64);
//! region.write_at(8, b"hello").unwrap();
//! assert_eq!(region.read_at(8, 5).unwrap(), b"hello");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod lock;
mod memory;
mod mmap;
mod region;

pub use error::{StorageError, StorageResult};
pub use lock::{FileLock, LockGuard};
pub use memory::InMemoryRegion;
pub use mmap::MmapRegion;
pub use region::{MappedRegion, MAX_REGION_SIZE};
