//! Undo journal for in-place overwrites.
//!
//! Before a same-length value is overwritten inside the log, the bytes it
//! replaces (value and checksum) are saved to `<name>.kv.undo`. If the
//! process dies halfway through the overwrite the record fails its
//! checksum on the next open; [`restore`] then writes the saved bytes back
//! so the key keeps its previous value instead of disappearing.
//!
//! The journal holds one entry, the latest overwrite:
//!
//! ```text
//! magic "MKUN" | record_offset u64 | record_len u32 | patch_at u32 |
//! patch_len u32 | crc32 of the preceding fields | old bytes
//! ```
//!
//! An entry is only applied if the record it names is damaged and the
//! record patched with the old bytes passes its checksum again.

use crate::error::CoreResult;
use crate::layout::{remove_if_exists, StorePaths};
use crate::record::{compute_crc32, parse_at, Parsed};
use mapkv_storage::MappedRegion;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use tracing::{debug, warn};

const UNDO_MAGIC: [u8; 4] = *b"MKUN";
const UNDO_PREFIX: usize = 28;

/// One saved overwrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UndoEntry {
    /// Where the overwritten record starts.
    pub(crate) record_offset: usize,
    pub(crate) record_len: usize,
    /// Start of the patched bytes, relative to the record.
    pub(crate) patch_at: usize,
    pub(crate) old: Vec<u8>,
}

impl UndoEntry {
    #[allow(clippy::cast_possible_truncation)]
    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(UNDO_PREFIX + self.old.len());
        buf.extend_from_slice(&UNDO_MAGIC);
        buf.extend_from_slice(&(self.record_offset as u64).to_le_bytes());
        buf.extend_from_slice(&(self.record_len as u32).to_le_bytes());
        buf.extend_from_slice(&(self.patch_at as u32).to_le_bytes());
        buf.extend_from_slice(&(self.old.len() as u32).to_le_bytes());
        let crc = compute_crc32(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf.extend_from_slice(&self.old);
        buf
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < UNDO_PREFIX || bytes[0..4] != UNDO_MAGIC {
            return None;
        }
        let u32_at = |at: usize| {
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };
        if u32_at(24) != compute_crc32(&bytes[..24]) {
            return None;
        }
        let mut offset = [0u8; 8];
        offset.copy_from_slice(&bytes[4..12]);
        let record_offset = usize::try_from(u64::from_le_bytes(offset)).ok()?;
        let record_len = u32_at(12) as usize;
        let patch_at = u32_at(16) as usize;
        let patch_len = u32_at(20) as usize;
        let old = bytes.get(UNDO_PREFIX..UNDO_PREFIX + patch_len)?.to_vec();
        if patch_at + patch_len > record_len {
            return None;
        }
        Some(Self {
            record_offset,
            record_len,
            patch_at,
            old,
        })
    }
}

/// The journal file of one store.
#[derive(Debug)]
pub(crate) struct UndoLog {
    file: File,
}

impl UndoLog {
    pub(crate) fn open(paths: &StorePaths) -> CoreResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(paths.undo_log())?;
        Ok(Self { file })
    }

    /// Replaces the journal with `entry`. With `durable` set the entry is
    /// on disk when this returns.
    pub(crate) fn save(&mut self, entry: &UndoEntry, durable: bool) -> CoreResult<()> {
        let bytes = entry.encode();
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&bytes)?;
        self.file.set_len(bytes.len() as u64)?;
        if durable {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Forgets the saved entry. Used once record offsets change.
    pub(crate) fn clear(&mut self) -> CoreResult<()> {
        self.file.set_len(0)?;
        Ok(())
    }
}

/// Rolls back an overwrite torn by a crash. Returns `true` if a record
/// was restored. The journal file is removed either way.
pub(crate) fn restore(paths: &StorePaths, region: &mut dyn MappedRegion) -> CoreResult<bool> {
    let path = paths.undo_log();
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    };

    let restored = match UndoEntry::decode(&bytes) {
        Some(entry) => roll_back(region, &entry)?,
        None => {
            if !bytes.is_empty() {
                debug!(store = paths.name(), "ignoring unreadable undo entry");
            }
            false
        }
    };
    if restored {
        region.flush()?;
        warn!(store = paths.name(), "rolled back torn in-place write");
    }
    remove_if_exists(&path)?;
    Ok(restored)
}

fn roll_back(region: &mut dyn MappedRegion, entry: &UndoEntry) -> CoreResult<bool> {
    let start = entry.record_offset;
    let Some(end) = start.checked_add(entry.record_len) else {
        return Ok(false);
    };
    let Some(current) = region.as_slice().get(start..end) else {
        return Ok(false);
    };
    match parse_at(current, 0, current.len()) {
        Parsed::Damaged { len, .. } if len == entry.record_len => {}
        _ => return Ok(false),
    }

    let mut patched = current.to_vec();
    patched[entry.patch_at..entry.patch_at + entry.old.len()].copy_from_slice(&entry.old);
    match parse_at(&patched, 0, patched.len()) {
        Parsed::Record(view) if view.len == entry.record_len => {}
        _ => return Ok(false),
    }
    region.write_at(start + entry.patch_at, &entry.old)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{encode_record, RecordKind};
    use mapkv_codec::ValueType;
    use mapkv_storage::InMemoryRegion;
    use tempfile::tempdir;

    const AT: usize = 40;

    fn long_rec(v: i64) -> Vec<u8> {
        encode_record(RecordKind::plain(ValueType::Long), "k", &v.to_le_bytes())
    }

    /// A region holding `record` at `AT` and the entry saving it.
    fn setup(record: &[u8]) -> (InMemoryRegion, UndoEntry) {
        let mut region = InMemoryRegion::with_len(256);
        region.write_at(AT, record).unwrap();
        let patch_at = record.len() - 8 - 4;
        let entry = UndoEntry {
            record_offset: AT,
            record_len: record.len(),
            patch_at,
            old: record[patch_at..].to_vec(),
        };
        (region, entry)
    }

    fn saved(paths: &StorePaths, entry: &UndoEntry) {
        let mut log = UndoLog::open(paths).unwrap();
        log.save(entry, true).unwrap();
    }

    #[test]
    fn entry_survives_encoding() {
        let (_, entry) = setup(&long_rec(1));
        assert_eq!(UndoEntry::decode(&entry.encode()), Some(entry));
    }

    #[test]
    fn damaged_entry_is_rejected() {
        let (_, entry) = setup(&long_rec(1));
        let mut bytes = entry.encode();
        bytes[5] ^= 0xFF;
        assert_eq!(UndoEntry::decode(&bytes), None);
        assert_eq!(UndoEntry::decode(&bytes[..UNDO_PREFIX - 1]), None);
    }

    #[test]
    fn torn_value_is_rolled_back() {
        let dir = tempdir().unwrap();
        let paths = StorePaths::new(dir.path(), "t");
        let old = long_rec(1);
        let (mut region, entry) = setup(&old);
        saved(&paths, &entry);

        // Half of the new value reached the file, its checksum did not
        let new = long_rec(2);
        region.write_at(AT + entry.patch_at, &new[entry.patch_at..entry.patch_at + 4]).unwrap();

        assert!(restore(&paths, &mut region).unwrap());
        assert_eq!(&region.data()[AT..AT + old.len()], old.as_slice());
        assert!(!paths.undo_log().exists());
    }

    #[test]
    fn finished_write_is_kept() {
        let dir = tempdir().unwrap();
        let paths = StorePaths::new(dir.path(), "t");
        let (mut region, entry) = setup(&long_rec(1));
        saved(&paths, &entry);

        let new = long_rec(2);
        region.write_at(AT, &new).unwrap();

        assert!(!restore(&paths, &mut region).unwrap());
        assert_eq!(&region.data()[AT..AT + new.len()], new.as_slice());
    }

    #[test]
    fn unrelated_damage_is_left_alone() {
        let dir = tempdir().unwrap();
        let paths = StorePaths::new(dir.path(), "t");
        let (mut region, entry) = setup(&long_rec(1));
        saved(&paths, &entry);

        // Damage in the key, which the entry does not cover
        region.write_at(AT + 7, b"q").unwrap();
        let before = region.data();

        assert!(!restore(&paths, &mut region).unwrap());
        assert_eq!(region.data(), before);
    }

    #[test]
    fn missing_journal_is_clean() {
        let dir = tempdir().unwrap();
        let paths = StorePaths::new(dir.path(), "t");
        let mut region = InMemoryRegion::with_len(64);
        assert!(!restore(&paths, &mut region).unwrap());
    }

    #[test]
    fn clear_empties_the_journal() {
        let dir = tempdir().unwrap();
        let paths = StorePaths::new(dir.path(), "t");
        let (_, entry) = setup(&long_rec(1));
        let mut log = UndoLog::open(&paths).unwrap();
        log.save(&entry, false).unwrap();
        log.clear().unwrap();
        assert_eq!(fs::metadata(paths.undo_log()).unwrap().len(), 0);
    }
}
