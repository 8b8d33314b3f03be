//! # MapKV Testkit
//!
//! Test utilities for MapKV.
//!
//! This crate provides:
//! - Test fixtures and store helpers
//! - Property-based test generators using proptest
//! - Crash recovery harnesses over file images
//! - Fuzz testing harnesses
//! - Stress testing utilities
//! - File format test vectors
//!
//! ## Usage
//!
//! ```rust
//! use mapkv_testkit::prelude::*;
//!
//! with_temp_store(|store| {
//!     store.put_string("greeting", "hello").unwrap();
//!     assert_eq!(store.get_string("greeting").as_deref(), Some("hello"));
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod fuzz;
pub mod generators;
pub mod stress;
pub mod vectors;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::fuzz::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
    pub use crate::vectors::*;
}

pub use fixtures::*;
pub use fuzz::*;
pub use generators::*;
pub use stress::*;
pub use vectors::*;
