//! Log compaction.
//!
//! Compaction rewrites the log so that it holds only the newest record of
//! every live key. The new image is staged on disk before the primary file
//! is touched:
//!
//! 1. write the image to `<name>.kv.tmp` and fsync it;
//! 2. write the redo marker `<name>.kv.redo` (image length and checksum),
//!    fsync it and the directory;
//! 3. copy the image over the mapped primary file, zero the old tail, flush;
//! 4. delete the marker, then the staging file.
//!
//! A crash before step 2 completes leaves the old log intact and the
//! leftovers are discarded on open. A crash after it is finished on open by
//! [`recover`], which repeats step 3.

use crate::error::{CoreError, CoreResult};
use crate::index::Index;
use crate::layout::{remove_if_exists, Header, StorePaths, HEADER_SIZE};
use crate::record::compute_crc32;
use mapkv_storage::MappedRegion;
use std::fs;
use std::io::Write;
use tracing::{info, warn};

const MARKER_MAGIC: [u8; 4] = *b"MKRD";
const MARKER_SIZE: usize = 20;
const ZERO_CHUNK: usize = 64 * 1024;

/// Result of a compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompactionResult {
    /// Live records copied to the new image.
    pub records_kept: usize,
    /// Superseded, removed and damaged records dropped.
    pub records_dropped: usize,
    /// Log length before compaction.
    pub bytes_before: usize,
    /// Log length after compaction.
    pub bytes_after: usize,
    /// File size before compaction.
    pub capacity_before: usize,
    /// File size after compaction.
    pub capacity_after: usize,
}

impl CompactionResult {
    /// Bytes removed from the log.
    #[must_use]
    pub fn bytes_saved(&self) -> usize {
        self.bytes_before.saturating_sub(self.bytes_after)
    }
}

/// A compacted log ready to be committed.
#[derive(Debug)]
pub(crate) struct Image {
    pub(crate) bytes: Vec<u8>,
    pub(crate) header: Header,
    /// New offset of every live key.
    pub(crate) relocations: Vec<(String, usize)>,
}

/// Builds an image holding the live records of `index`, copied verbatim
/// from `log` in offset order.
pub(crate) fn build_image(log: &[u8], index: &Index, header: &Header) -> CoreResult<Image> {
    let mut bytes = vec![0u8; HEADER_SIZE];
    let mut relocations = Vec::with_capacity(index.len());

    for key in index.keys_by_offset() {
        let Some(slot) = index.get(&key) else {
            continue;
        };
        let record = log.get(slot.offset..slot.offset + slot.len).ok_or_else(|| {
            CoreError::corruption(format!("record of {key:?} lies outside the log"))
        })?;
        relocations.push((key, bytes.len()));
        bytes.extend_from_slice(record);
    }

    let header = Header {
        data_end: bytes.len() as u64,
        sequence: header.sequence.next(),
        generation: header.generation.next(),
        ..*header
    };
    bytes[..HEADER_SIZE].copy_from_slice(&header.encode());

    Ok(Image {
        bytes,
        header,
        relocations,
    })
}

/// Writes `image` over the primary region following the staged protocol.
///
/// `old_end` is the log length being replaced; bytes between the image
/// end and `old_end` are zeroed. If `shrink_to` is set the region is
/// truncated to that length before the staging files are removed.
pub(crate) fn commit_image(
    paths: &StorePaths,
    region: &mut dyn MappedRegion,
    image: &[u8],
    old_end: usize,
    shrink_to: Option<usize>,
) -> CoreResult<()> {
    write_synced(&paths.staging(), image)?;
    write_synced(&paths.redo_marker(), &encode_marker(image))?;
    paths.sync_dir()?;

    overwrite(region, image, old_end)?;

    if let Some(len) = shrink_to {
        if len >= image.len() && len < region.len() {
            region.resize(len)?;
        }
    }

    remove_if_exists(&paths.redo_marker())?;
    remove_if_exists(&paths.staging())?;
    paths.sync_dir()?;
    Ok(())
}

/// Outcome of open-time compaction recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// No compaction was in flight.
    Clean,
    /// A committed compaction was finished.
    Redone,
    /// An uncommitted compaction was abandoned.
    Discarded,
}

/// Finishes or abandons a compaction interrupted by a crash.
pub(crate) fn recover(
    paths: &StorePaths,
    region: &mut dyn MappedRegion,
) -> CoreResult<RecoveryOutcome> {
    let marker_path = paths.redo_marker();
    let staging_path = paths.staging();

    if marker_path.exists() {
        let marker = fs::read(&marker_path)?;
        match decode_marker(&marker) {
            Some((image_len, image_crc)) => {
                let image = fs::read(&staging_path).unwrap_or_default();
                if image.len() == image_len && compute_crc32(&image) == image_crc {
                    let end = region.len();
                    overwrite(region, &image, end)?;
                    remove_if_exists(&marker_path)?;
                    remove_if_exists(&staging_path)?;
                    paths.sync_dir()?;
                    info!(
                        store = paths.name(),
                        image_len, "finished interrupted compaction"
                    );
                    return Ok(RecoveryOutcome::Redone);
                }
                warn!(
                    store = paths.name(),
                    "staging image does not match redo marker, discarding"
                );
            }
            None => warn!(store = paths.name(), "redo marker is damaged, discarding"),
        }
    }

    let removed_marker = remove_if_exists(&marker_path)?;
    let removed_staging = remove_if_exists(&staging_path)?;
    if removed_marker || removed_staging {
        paths.sync_dir()?;
        info!(store = paths.name(), "discarded uncommitted compaction");
        Ok(RecoveryOutcome::Discarded)
    } else {
        Ok(RecoveryOutcome::Clean)
    }
}

fn overwrite(region: &mut dyn MappedRegion, image: &[u8], old_end: usize) -> CoreResult<()> {
    if region.len() < image.len() {
        region.resize(image.len())?;
    }
    region.write_at(0, image)?;
    let end = old_end.min(region.len());
    zero_range(region, image.len(), end)?;
    region.flush()?;
    Ok(())
}

/// Zeroes `region[start..end]`.
pub(crate) fn zero_range(
    region: &mut dyn MappedRegion,
    start: usize,
    end: usize,
) -> CoreResult<()> {
    let zeros = vec![0u8; ZERO_CHUNK.min(end.saturating_sub(start))];
    let mut pos = start;
    while pos < end {
        let n = (end - pos).min(zeros.len());
        region.write_at(pos, &zeros[..n])?;
        pos += n;
    }
    Ok(())
}

fn write_synced(path: &std::path::Path, bytes: &[u8]) -> CoreResult<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}

pub(crate) fn encode_marker(image: &[u8]) -> [u8; MARKER_SIZE] {
    let mut buf = [0u8; MARKER_SIZE];
    buf[0..4].copy_from_slice(&MARKER_MAGIC);
    buf[4..12].copy_from_slice(&(image.len() as u64).to_le_bytes());
    buf[12..16].copy_from_slice(&compute_crc32(image).to_le_bytes());
    let crc = compute_crc32(&buf[..16]);
    buf[16..20].copy_from_slice(&crc.to_le_bytes());
    buf
}

fn decode_marker(bytes: &[u8]) -> Option<(usize, u32)> {
    if bytes.len() != MARKER_SIZE || bytes[0..4] != MARKER_MAGIC {
        return None;
    }
    let stored = u32::from_le_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
    if stored != compute_crc32(&bytes[..16]) {
        return None;
    }
    let mut len = [0u8; 8];
    len.copy_from_slice(&bytes[4..12]);
    let image_len = usize::try_from(u64::from_le_bytes(len)).ok()?;
    let image_crc = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
    Some((image_len, image_crc))
}
