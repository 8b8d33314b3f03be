//! Crash recovery testing for MapKV.
//!
//! A store file is only ever changed through its mapping, so a crash is
//! fully described by the bytes that reached the disk. This module builds
//! those byte images for the interesting crash points and checks that a
//! store opened over them shows a consistent state.
//!
//! ## Test Strategy
//!
//! 1. **Torn append** - the last record is cut at every byte
//! 2. **Stale header** - the record landed but the header update did not
//! 3. **Compaction before the redo marker** - the staging image is discarded
//! 4. **Compaction after the redo marker** - the staging image is copied in
//!
//! ## Usage
//!
//! ```rust
//! use mapkv_testkit::crash::{CrashRecoveryHarness, LastWrite};
//! use mapkv_testkit::TestStore;
//!
//! let fixture = TestStore::new();
//! fixture.put_int("kept", 1).unwrap();
//! let last = LastWrite::capture(&fixture, |s| s.put_string("torn", "maybe").unwrap());
//!
//! let mut harness = CrashRecoveryHarness::new();
//! harness.check_last_write(&last);
//! harness.assert_all_passed();
//! ```

use crate::fixtures::TestStore;
use mapkv_core::layout::HEADER_SIZE;
use mapkv_core::record::compute_crc32;
use mapkv_core::{RecoveryOutcome, Store, StorePaths, Value};
use std::collections::HashMap;
use std::fs;

/// Points at which a crash can be simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashPoint {
    /// The last record reached the disk only up to byte `cut`.
    TornAppend {
        /// First file offset that was not written.
        cut: usize,
    },
    /// The record was written but the header still has the old end.
    StaleHeader,
    /// A compaction wrote its staging image but no redo marker.
    BeforeRedoMarker,
    /// A compaction wrote its redo marker but did not copy the image.
    AfterRedoMarker,
}

/// Result of a crash recovery test.
#[derive(Debug, Clone)]
pub struct CrashRecoveryResult {
    /// Whether the test passed.
    pub passed: bool,
    /// The simulated crash.
    pub point: CrashPoint,
    /// Expected live keys after recovery.
    pub expected_keys: usize,
    /// Actual live keys after recovery.
    pub actual_keys: usize,
    /// What went wrong.
    pub error: Option<String>,
}

impl CrashRecoveryResult {
    /// Creates a passing result.
    pub fn pass(point: CrashPoint, keys: usize) -> Self {
        Self {
            passed: true,
            point,
            expected_keys: keys,
            actual_keys: keys,
            error: None,
        }
    }

    /// Creates a failing result.
    pub fn fail(point: CrashPoint, expected: usize, actual: usize, error: impl Into<String>) -> Self {
        Self {
            passed: false,
            point,
            expected_keys: expected,
            actual_keys: actual,
            error: Some(error.into()),
        }
    }
}

/// The file before and after one mutation.
#[derive(Debug, Clone)]
pub struct LastWrite {
    /// File contents before the write.
    pub before: Vec<u8>,
    /// File contents after the write.
    pub after: Vec<u8>,
    /// Log end before the write.
    pub start: usize,
    /// Log end after the write.
    pub end: usize,
    /// Store contents before the write.
    pub expected: HashMap<String, Value>,
}

impl LastWrite {
    /// Runs `write` against the fixture and records the file around it.
    ///
    /// The write must append (a new key, a removal, or a value of another
    /// length) for the torn images to be meaningful.
    pub fn capture(fixture: &TestStore, write: impl FnOnce(&Store)) -> Self {
        fixture.commit().expect("Failed to flush before capture");
        let before = fixture.file_bytes();
        let start = fixture.info().expect("store is open").data_end;
        let expected = fixture.get_all();

        write(&fixture.store);
        fixture.commit().expect("Failed to flush after capture");
        let after = fixture.file_bytes();
        let end = fixture.info().expect("store is open").data_end;

        Self {
            before,
            after,
            start,
            end,
            expected,
        }
    }

    /// Images of the write torn at every byte, skipping cuts that leave
    /// the file unchanged.
    pub fn torn_images(&self) -> Vec<(CrashPoint, Vec<u8>)> {
        let mut images = Vec::new();
        for cut in self.start..self.end {
            let mut image = self.after.clone();
            image[cut..self.end].fill(0);
            if image != self.after {
                images.push((CrashPoint::TornAppend { cut }, image));
            }
        }
        images
    }

    /// Image with the new record but the old header.
    pub fn stale_header_image(&self) -> Vec<u8> {
        let mut image = self.after.clone();
        image[..HEADER_SIZE].copy_from_slice(&self.before[..HEADER_SIZE]);
        image
    }
}

/// Encodes a redo marker for `image`, as a committing compaction writes it.
pub fn redo_marker(image: &[u8]) -> [u8; 20] {
    let mut marker = [0u8; 20];
    marker[0..4].copy_from_slice(b"MKRD");
    marker[4..12].copy_from_slice(&(image.len() as u64).to_le_bytes());
    marker[12..16].copy_from_slice(&compute_crc32(image).to_le_bytes());
    let crc = compute_crc32(&marker[..16]);
    marker[16..20].copy_from_slice(&crc.to_le_bytes());
    marker
}

/// Writes the staging image and, if `committed`, its redo marker.
pub fn stage_compaction(paths: &StorePaths, image: &[u8], committed: bool) {
    fs::write(paths.staging(), image).expect("Failed to write staging image");
    if committed {
        fs::write(paths.redo_marker(), redo_marker(image)).expect("Failed to write redo marker");
    }
}

/// Compacted image of the fixture's current contents, built on a copy so
/// the fixture itself is untouched.
pub fn compacted_image(fixture: &TestStore) -> Vec<u8> {
    fixture.commit().expect("Failed to flush");
    let copy = TestStore::from_image(&fixture.file_bytes());
    copy.force_compact().expect("Failed to compact copy");
    let end = copy.info().expect("store is open").data_end;
    copy.file_bytes()[..end].to_vec()
}

/// Runs crash scenarios and collects their results.
#[derive(Debug, Default)]
pub struct CrashRecoveryHarness {
    /// Results of the checks run so far.
    pub results: Vec<CrashRecoveryResult>,
}

impl CrashRecoveryHarness {
    /// Creates an empty harness.
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks every torn image of `last` and the stale-header image: each
    /// must reopen to exactly the state before the write.
    pub fn check_last_write(&mut self, last: &LastWrite) {
        for (point, image) in last.torn_images() {
            let recovered = TestStore::from_image(&image);
            self.record(point, &last.expected, &recovered);
        }
        let recovered = TestStore::from_image(&last.stale_header_image());
        self.record(CrashPoint::StaleHeader, &last.expected, &recovered);
    }

    /// Checks both sides of the redo marker for a compaction of `fixture`.
    ///
    /// Compaction never changes contents, so both must reopen to the
    /// fixture's current state; only the recovery outcome differs.
    pub fn check_compaction(&mut self, fixture: &TestStore) {
        let image = compacted_image(fixture);
        let primary = fixture.file_bytes();
        let expected = fixture.get_all();

        for (point, committed, outcome) in [
            (CrashPoint::BeforeRedoMarker, false, RecoveryOutcome::Discarded),
            (CrashPoint::AfterRedoMarker, true, RecoveryOutcome::Redone),
        ] {
            let recovered = TestStore::from_image_and(&primary, |paths| {
                stage_compaction(paths, &image, committed);
            });
            let actual = recovered.load_report().map(|r| r.recovery);
            if actual == Some(outcome) {
                self.record(point, &expected, &recovered);
            } else {
                self.results.push(CrashRecoveryResult::fail(
                    point,
                    expected.len(),
                    recovered.len(),
                    format!("expected {outcome:?}, got {actual:?}"),
                ));
            }
        }
    }

    fn record(&mut self, point: CrashPoint, expected: &HashMap<String, Value>, recovered: &Store) {
        let actual = recovered.get_all();
        let result = if &actual == expected {
            CrashRecoveryResult::pass(point, actual.len())
        } else {
            let missing: Vec<&String> = expected
                .keys()
                .filter(|k| actual.get(*k) != expected.get(*k))
                .collect();
            let extra: Vec<&String> = actual.keys().filter(|k| !expected.contains_key(*k)).collect();
            CrashRecoveryResult::fail(
                point,
                expected.len(),
                actual.len(),
                format!("differing keys {missing:?}, unexpected keys {extra:?}"),
            )
        };
        self.results.push(result);
    }

    /// Results that failed.
    pub fn failures(&self) -> Vec<&CrashRecoveryResult> {
        self.results.iter().filter(|r| !r.passed).collect()
    }

    /// Panics with every failure if any check failed.
    pub fn assert_all_passed(&self) {
        let failures = self.failures();
        assert!(
            failures.is_empty(),
            "{} of {} crash checks failed: {failures:#?}",
            failures.len(),
            self.results.len()
        );
    }
}
