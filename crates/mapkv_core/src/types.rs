//! Core type definitions and format limits.

use std::fmt;

/// Allocation granularity of the store file.
pub const PAGE_SIZE: usize = 4096;

/// Maximum key length in bytes (the record stores it in a `u16`).
pub const MAX_KEY_SIZE: usize = u16::MAX as usize;

/// Maximum encoded value length in bytes.
pub const MAX_VALUE_SIZE: usize = 1 << 26;

/// Maximum size of a store file.
pub const MAX_FILE_SIZE: usize = mapkv_storage::MAX_REGION_SIZE;

/// Mutation counter stored in the file header.
///
/// Every put, remove, clear and compaction increments it. Other processes
/// compare it with the value they last saw to detect external writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SequenceNumber(pub u64);

impl SequenceNumber {
    /// Creates a new sequence number.
    #[must_use]
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// Returns the raw sequence value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next sequence number.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq:{}", self.0)
    }
}

/// Compaction counter stored in the file header.
///
/// A change of generation means every record offset may have moved, so a
/// process seeing one must rebuild its index instead of replaying the tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(pub u32);

impl Generation {
    /// Creates a new generation.
    #[must_use]
    pub const fn new(generation: u32) -> Self {
        Self(generation)
    }

    /// Returns the raw generation value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns the next generation.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen:{}", self.0)
    }
}

/// Rounds `expected` up to a power-of-two multiple of `capacity`.
///
/// Returns `None` if the result would exceed [`MAX_FILE_SIZE`].
#[must_use]
pub(crate) fn grow_capacity(capacity: usize, expected: usize) -> Option<usize> {
    if expected > MAX_FILE_SIZE {
        return None;
    }
    if expected <= PAGE_SIZE {
        return Some(PAGE_SIZE);
    }
    let mut capacity = capacity.max(PAGE_SIZE);
    while capacity < expected {
        capacity = capacity.checked_mul(2)?;
    }
    Some(capacity.min(MAX_FILE_SIZE))
}
