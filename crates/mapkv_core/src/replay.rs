//! Scanning and replaying the append log.
//!
//! The same scanner serves three purposes:
//! - the full load when a store is opened,
//! - the incremental replay of records appended by another process,
//! - read-only inspection of a file by tools.
//!
//! ## Recovery rules
//!
//! - A record that cannot be framed (unknown kind, empty key, running past
//!   the end) ends the log there.
//! - A checksum failure on the last record ends the log there: the write
//!   was torn by a crash.
//! - A checksum failure on an inner record skips that record as garbage.
//!   If its key is still readable, the key is dropped as if removed, so an
//!   older record of the key never becomes current again.
//! - Damaged records with nothing intact after them count as the torn
//!   tail and are cut as well.

use crate::index::{Index, Slot};
use crate::layout::{Header, HEADER_SIZE};
use crate::payload::PayloadCodec;
use crate::record::{parse_at, Parsed, RecordKind, RecordView};
use tracing::{debug, warn};

/// One step of a scan.
#[derive(Debug)]
pub(crate) enum ScanItem<'a> {
    /// An intact record.
    Record(RecordView<'a>),
    /// A damaged inner record that was skipped.
    Damaged {
        offset: usize,
        len: usize,
        key: Option<&'a str>,
        reason: &'static str,
    },
}

/// Where and why a scan stopped before its limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Truncation {
    /// Offset at which the log was cut.
    pub offset: usize,
    /// Why the record at `offset` was rejected.
    pub reason: &'static str,
}

/// Summary of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanReport {
    /// Offset the scan started at.
    pub start: usize,
    /// Logical end of the log after the scan.
    pub end: usize,
    /// Intact records seen.
    pub records: usize,
    /// Damaged inner records skipped.
    pub damaged: usize,
    /// Set if the scan ended before its limit.
    pub truncated: Option<Truncation>,
}

/// Scans records in `bytes[start..limit]`, calling `visit` for each one.
///
/// Damaged records are held back until an intact record follows them; a
/// run of damage reaching the end of the log is a torn tail and truncates
/// at its first record.
pub(crate) fn scan<'a>(
    bytes: &'a [u8],
    start: usize,
    limit: usize,
    mut visit: impl FnMut(ScanItem<'a>),
) -> ScanReport {
    let limit = limit.min(bytes.len());
    let mut report = ScanReport {
        start,
        ..ScanReport::default()
    };
    let mut pending: Vec<ScanItem<'a>> = Vec::new();
    let mut pos = start;

    while pos < limit {
        let stop = match parse_at(bytes, pos, limit) {
            Parsed::Record(view) => {
                report.damaged += pending.len();
                pending.drain(..).for_each(&mut visit);
                pos += view.len;
                report.records += 1;
                visit(ScanItem::Record(view));
                None
            }
            Parsed::Damaged { len, key, reason } if pos + len < limit => {
                pending.push(ScanItem::Damaged {
                    offset: pos,
                    len,
                    key,
                    reason,
                });
                pos += len;
                None
            }
            Parsed::Damaged { reason, .. } | Parsed::Invalid { reason } => Some(reason),
        };
        if let Some(reason) = stop {
            report.truncated = Some(match pending.first() {
                Some(ScanItem::Damaged { offset, reason, .. }) => Truncation {
                    offset: *offset,
                    reason: *reason,
                },
                _ => Truncation {
                    offset: pos,
                    reason,
                },
            });
            break;
        }
    }

    report.end = report.truncated.map_or(pos, |cut| cut.offset);
    report
}

/// Applies one scanned item to the index.
///
/// Returns the affected key: the key of an intact record, or the key a
/// damaged record took out of the index.
pub(crate) fn apply<'a>(index: &mut Index, codec: &PayloadCodec, item: ScanItem<'a>) -> Option<&'a str> {
    match item {
        ScanItem::Record(view) => {
            match view.kind {
                RecordKind::Tombstone => {
                    index.remove(view.key, view.len);
                }
                kind @ RecordKind::Value { .. } => {
                    let value = match codec.decode(kind, view.value) {
                        Ok(value) => Some(value),
                        Err(e) => {
                            debug!(key = view.key, error = %e, "stored value is unreadable");
                            None
                        }
                    };
                    index.insert(
                        view.key.to_string(),
                        Slot::new(view.offset, view.len, kind, value),
                    );
                }
            }
            Some(view.key)
        }
        ScanItem::Damaged {
            offset,
            len,
            key,
            reason,
        } => {
            warn!(offset, len, key = ?key, reason, "skipping damaged record");
            match key {
                Some(key) => index.remove(key, len).map(|_| key),
                None => {
                    index.add_garbage(len);
                    None
                }
            }
        }
    }
}

/// Header status found by [`inspect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderStatus {
    /// The header verified.
    Valid(Header),
    /// The file has never been written.
    Blank,
    /// The header failed verification; records were found by scanning.
    Damaged(String),
}

/// Read-only analysis of a store file.
#[derive(Debug, Clone)]
pub struct FileReport {
    /// Size of the file in bytes.
    pub file_len: usize,
    /// Header status.
    pub header: HeaderStatus,
    /// Record scan summary.
    pub scan: ScanReport,
    /// Live keys.
    pub live_keys: usize,
    /// Live record bytes.
    pub live_bytes: usize,
    /// Garbage bytes.
    pub garbage_bytes: usize,
}

impl FileReport {
    /// Returns `true` if opening the file would change nothing.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        matches!(self.header, HeaderStatus::Valid(_) | HeaderStatus::Blank)
            && self.scan.damaged == 0
            && self.scan.truncated.is_none()
    }
}

/// Analyses the bytes of a store file without modifying anything.
///
/// Values are not decrypted; encrypted values count as live like any other.
#[must_use]
pub fn inspect(bytes: &[u8]) -> FileReport {
    let (header, limit) = if Header::is_blank(bytes) {
        (HeaderStatus::Blank, HEADER_SIZE)
    } else {
        match Header::decode(bytes) {
            Ok(h) => {
                let limit = h.data_end().min(bytes.len());
                (HeaderStatus::Valid(h), limit)
            }
            Err(e) => (HeaderStatus::Damaged(e.to_string()), bytes.len()),
        }
    };

    let mut index = Index::new();
    let codec = PayloadCodec::new(None, false);
    let mut scan_report = scan(bytes, HEADER_SIZE, limit, |item| {
        // Skip decoding: only sizes matter here
        match item {
            ScanItem::Record(view) => match view.kind {
                RecordKind::Tombstone => {
                    index.remove(view.key, view.len);
                }
                kind => {
                    index.insert(
                        view.key.to_string(),
                        Slot::new(view.offset, view.len, kind, None),
                    );
                }
            },
            other => {
                apply(&mut index, &codec, other);
            }
        }
    });
    if matches!(header, HeaderStatus::Damaged(_)) {
        // A full-mapping scan always ends at the zero fill
        if scan_report
            .truncated
            .is_some_and(|t| bytes[t.offset..].iter().all(|b| *b == 0))
        {
            scan_report.truncated = None;
        }
    }

    FileReport {
        file_len: bytes.len(),
        header,
        scan: scan_report,
        live_keys: index.len(),
        live_bytes: index.live_bytes(),
        garbage_bytes: index.garbage_bytes(),
    }
}
