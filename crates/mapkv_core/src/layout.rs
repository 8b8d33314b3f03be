//! Store file layout.
//!
//! Every store lives in a directory and owns five files named after it:
//!
//! ```text
//! <path>/
//! ├─ <name>.kv        # primary log, memory-mapped
//! ├─ <name>.kv.tmp    # compaction staging image
//! ├─ <name>.kv.redo   # compaction commit marker
//! ├─ <name>.kv.undo   # old bytes of the latest in-place overwrite
//! └─ <name>.kv.lock   # advisory lock shared between processes
//! ```
//!
//! The primary file starts with a fixed [`Header`]:
//!
//! ```text
//! | magic "MPKV" (4) | version u16 | flags u16 | data_end u64 |
//! | sequence u64 | generation u32 | header_crc32 (4) |
//! ```

use crate::error::{CoreError, CoreResult};
use crate::record::compute_crc32;
use crate::types::{Generation, SequenceNumber};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Magic bytes at the start of every store file.
pub const MAGIC: [u8; 4] = *b"MPKV";

/// Current on-disk format version.
pub const FORMAT_VERSION: u16 = 1;

/// Size of the file header; records start right after it.
pub const HEADER_SIZE: usize = 32;

const SEQUENCE_OFFSET: usize = 16;

/// Paths of the files belonging to one store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    dir: PathBuf,
    name: String,
}

impl StorePaths {
    /// Creates the path set for store `name` in `dir`.
    #[must_use]
    pub fn new(dir: &Path, name: &str) -> Self {
        Self {
            dir: dir.to_path_buf(),
            name: name.to_string(),
        }
    }

    /// Directory holding the store.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Store name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Primary log file.
    #[must_use]
    pub fn primary(&self) -> PathBuf {
        self.dir.join(format!("{}.kv", self.name))
    }

    /// Compaction staging file.
    #[must_use]
    pub fn staging(&self) -> PathBuf {
        self.dir.join(format!("{}.kv.tmp", self.name))
    }

    /// Compaction commit marker.
    #[must_use]
    pub fn redo_marker(&self) -> PathBuf {
        self.dir.join(format!("{}.kv.redo", self.name))
    }

    /// Old bytes of the latest in-place overwrite.
    #[must_use]
    pub fn undo_log(&self) -> PathBuf {
        self.dir.join(format!("{}.kv.undo", self.name))
    }

    /// Advisory lock file.
    #[must_use]
    pub fn lock(&self) -> PathBuf {
        self.dir.join(format!("{}.kv.lock", self.name))
    }

    /// Creates the directory if needed and checks that it is one.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] if the path exists but is not a
    /// directory, or an I/O error if it cannot be created.
    pub fn ensure_dir(&self) -> CoreResult<()> {
        if self.dir.exists() && !self.dir.is_dir() {
            return Err(CoreError::invalid_config(format!(
                "path is not a directory: {}",
                self.dir.display()
            )));
        }
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// Makes directory entry changes (create, delete) durable.
    #[cfg(unix)]
    pub fn sync_dir(&self) -> CoreResult<()> {
        let dir = fs::File::open(&self.dir)?;
        dir.sync_all()?;
        Ok(())
    }

    /// Makes directory entry changes (create, delete) durable.
    ///
    /// On Windows, directory sync is not supported in the same way; NTFS
    /// journals metadata changes itself.
    #[cfg(not(unix))]
    pub fn sync_dir(&self) -> CoreResult<()> {
        Ok(())
    }
}

/// Removes a file, treating "not found" as success.
pub(crate) fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Decoded file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Format version.
    pub version: u16,
    /// Reserved flag bits, zero in this version.
    pub flags: u16,
    /// End of the record stream.
    pub data_end: u64,
    /// Mutation counter.
    pub sequence: SequenceNumber,
    /// Compaction counter.
    pub generation: Generation,
}

impl Header {
    /// Header of an empty store.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            version: FORMAT_VERSION,
            flags: 0,
            data_end: HEADER_SIZE as u64,
            sequence: SequenceNumber::new(0),
            generation: Generation::new(0),
        }
    }

    /// Returns `data_end` as a byte offset.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn data_end(&self) -> usize {
        self.data_end as usize
    }

    /// Encodes the header.
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&MAGIC);
        buf[4..6].copy_from_slice(&self.version.to_le_bytes());
        buf[6..8].copy_from_slice(&self.flags.to_le_bytes());
        buf[8..16].copy_from_slice(&self.data_end.to_le_bytes());
        buf[16..24].copy_from_slice(&self.sequence.as_u64().to_le_bytes());
        buf[24..28].copy_from_slice(&self.generation.as_u32().to_le_bytes());
        let crc = compute_crc32(&buf[..28]);
        buf[28..32].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Decodes and verifies a header.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are too short, the magic is wrong, the
    /// checksum fails or the version is unsupported.
    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(CoreError::corruption("header truncated"));
        }
        if bytes[0..4] != MAGIC {
            return Err(CoreError::corruption("bad magic"));
        }
        let stored = u32::from_le_bytes([bytes[28], bytes[29], bytes[30], bytes[31]]);
        let computed = compute_crc32(&bytes[..28]);
        if stored != computed {
            return Err(CoreError::ChecksumMismatch {
                expected: stored,
                actual: computed,
            });
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != FORMAT_VERSION {
            return Err(CoreError::corruption(format!(
                "unsupported format version {version}"
            )));
        }
        Ok(Self {
            version,
            flags: u16::from_le_bytes([bytes[6], bytes[7]]),
            data_end: read_u64(bytes, 8),
            sequence: SequenceNumber::new(read_u64(bytes, SEQUENCE_OFFSET)),
            generation: Generation::new(u32::from_le_bytes([
                bytes[24], bytes[25], bytes[26], bytes[27],
            ])),
        })
    }

    /// Returns `true` if `bytes` begins with an all-zero header, as in a
    /// freshly created file.
    #[must_use]
    pub fn is_blank(bytes: &[u8]) -> bool {
        bytes.len() >= HEADER_SIZE && bytes[..HEADER_SIZE].iter().all(|b| *b == 0)
    }

    /// Reads the raw sequence field without verifying the header.
    ///
    /// Used as a cheap change check; the caller re-reads the full header
    /// under the file lock before trusting anything else.
    #[must_use]
    pub fn peek_sequence(bytes: &[u8]) -> Option<SequenceNumber> {
        (bytes.len() >= HEADER_SIZE).then(|| SequenceNumber::new(read_u64(bytes, SEQUENCE_OFFSET)))
    }
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(raw)
}
