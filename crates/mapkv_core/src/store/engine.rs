//! The mapped log plus its index.
//!
//! `Engine` owns everything that must change together: the mapped region,
//! the index and the in-memory copy of the header. All methods expect the
//! caller to hold the store's write lock (or read lock for `&self`).

use super::editor::EditOp;
use crate::compaction::{self, CompactionResult, RecoveryOutcome};
use crate::config::{CommitMode, Config};
use crate::coordination::ProcessLock;
use crate::error::{CoreError, CoreResult};
use crate::index::{Index, Slot};
use crate::layout::{Header, StorePaths, HEADER_SIZE};
use crate::payload::PayloadCodec;
use crate::record::{encode_record, record_len, RecordKind, CRC_SIZE, RECORD_PREFIX};
use crate::replay::{self, ScanReport};
use crate::stats::StoreStats;
use crate::types::{grow_capacity, SequenceNumber, MAX_FILE_SIZE, MAX_VALUE_SIZE, PAGE_SIZE};
use crate::undo::{self, UndoEntry, UndoLog};
use mapkv_codec::Value;
use mapkv_storage::{MappedRegion, MmapRegion};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What happened while opening a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    /// Compaction recovery outcome.
    pub recovery: RecoveryOutcome,
    /// Scan summary.
    pub scan: ScanReport,
    /// Whether the header had to be rewritten.
    pub header_repaired: bool,
    /// Plaintext values encrypted because a cipher is now configured.
    pub encrypted_on_load: usize,
    /// Whether an in-place write torn by a crash was undone.
    pub rolled_back_write: bool,
}

/// Shared context of engine operations.
pub(crate) struct Ctx<'a> {
    pub(crate) paths: &'a StorePaths,
    pub(crate) config: &'a Config,
    pub(crate) payload: &'a PayloadCodec,
    pub(crate) stats: &'a StoreStats,
}

pub(crate) struct Engine {
    lock: Arc<ProcessLock>,
    region: Box<dyn MappedRegion>,
    /// Journal of in-place writes, single-process mode only.
    undo: Option<UndoLog>,
    /// An in-place write was journaled but not yet flushed.
    unflushed_patch: bool,
    pub(crate) index: Index,
    header: Header,
    dirty: bool,
    load_report: LoadReport,
}

impl Engine {
    /// Opens, recovers and loads the primary file.
    pub(crate) fn open(ctx: &Ctx<'_>) -> CoreResult<Self> {
        let lock = Arc::new(ProcessLock::acquire(ctx.paths, ctx.config.multi_process)?);
        let guard_lock = Arc::clone(&lock);
        let _guard = guard_lock.write_guard()?;

        let mut region = MmapRegion::open(&ctx.paths.primary(), ctx.config.initial_capacity)?;
        let recovery = compaction::recover(ctx.paths, &mut region)?;
        let rolled_back = undo::restore(ctx.paths, &mut region)?;
        let undo = if ctx.config.multi_process {
            None
        } else {
            Some(UndoLog::open(ctx.paths)?)
        };
        Self::load(lock, Box::new(region), undo, (recovery, rolled_back), ctx)
    }

    fn load(
        lock: Arc<ProcessLock>,
        region: Box<dyn MappedRegion>,
        undo: Option<UndoLog>,
        (recovery, rolled_back_write): (RecoveryOutcome, bool),
        ctx: &Ctx<'_>,
    ) -> CoreResult<Self> {
        let mut engine = Self {
            lock,
            region,
            undo,
            unflushed_patch: false,
            index: Index::new(),
            header: Header::empty(),
            dirty: false,
            load_report: LoadReport {
                recovery,
                scan: ScanReport::default(),
                header_repaired: false,
                encrypted_on_load: 0,
                rolled_back_write,
            },
        };
        engine.rescan(ctx)?;
        engine.encrypt_plaintext(ctx)?;

        info!(
            store = ctx.paths.name(),
            keys = engine.index.len(),
            data_end = engine.header.data_end(),
            capacity = engine.region.len(),
            garbage = engine.index.garbage_bytes(),
            "loaded store"
        );
        Ok(engine)
    }

    /// Rebuilds the index from the region, repairing the header if needed.
    fn rescan(&mut self, ctx: &Ctx<'_>) -> CoreResult<()> {
        let bytes = self.region.as_slice();
        if bytes.len() < HEADER_SIZE {
            return Err(CoreError::corruption("file is smaller than its header"));
        }

        let blank = Header::is_blank(bytes);
        let (stored, limit) = if blank {
            (None, HEADER_SIZE)
        } else {
            match Header::decode(bytes) {
                Ok(h) if h.data_end() >= HEADER_SIZE => (Some(h), h.data_end().min(bytes.len())),
                Ok(h) => {
                    warn!(
                        store = ctx.paths.name(),
                        data_end = h.data_end,
                        "header points into itself, scanning whole file"
                    );
                    (None, bytes.len())
                }
                Err(e) => {
                    warn!(
                        store = ctx.paths.name(),
                        error = %e,
                        "damaged header, scanning whole file"
                    );
                    (None, bytes.len())
                }
            }
        };

        let mut index = Index::new();
        let report = replay::scan(bytes, HEADER_SIZE, limit, |item| {
            replay::apply(&mut index, ctx.payload, item);
        });

        let mut header = stored.unwrap_or_else(|| Header {
            sequence: SequenceNumber::new(1),
            ..Header::empty()
        });
        let repaired = stored.map_or(true, |h| h.data_end() != report.end);
        header.data_end = report.end as u64;

        if let Some(cut) = report.truncated {
            if stored.is_some() {
                warn!(
                    store = ctx.paths.name(),
                    offset = cut.offset,
                    reason = cut.reason,
                    "truncating torn tail"
                );
                ctx.stats.record_truncation();
            }
        }
        if repaired {
            // Stale bytes past the end must never be replayed again
            compaction::zero_range(self.region.as_mut(), report.end, limit)?;
            self.region.write_at(0, &header.encode())?;
            self.region.flush()?;
        }

        self.index = index;
        self.header = header;
        self.load_report.scan = report;
        self.load_report.header_repaired = repaired && !blank;
        Ok(())
    }

    /// Rewrites plaintext values that the configured cipher should protect.
    fn encrypt_plaintext(&mut self, ctx: &Ctx<'_>) -> CoreResult<()> {
        if !ctx.payload.has_cipher() {
            return Ok(());
        }
        let pending: Vec<(String, Value)> = self
            .index
            .iter()
            .filter(|(_, slot)| ctx.payload.needs_encryption(slot.kind))
            .filter_map(|(key, slot)| slot.value.clone().map(|v| (key.to_string(), v)))
            .collect();
        if pending.is_empty() {
            return Ok(());
        }
        for (key, value) in &pending {
            self.append_value(key, value, ctx)?;
        }
        // Drop the plaintext copies from the file
        self.compact(ctx)?;
        self.load_report.encrypted_on_load = pending.len();
        info!(
            store = ctx.paths.name(),
            count = pending.len(),
            "encrypted plaintext values"
        );
        Ok(())
    }

    pub(crate) fn load_report(&self) -> LoadReport {
        self.load_report
    }

    pub(crate) fn process_lock(&self) -> Arc<ProcessLock> {
        Arc::clone(&self.lock)
    }

    pub(crate) fn is_multi_process(&self) -> bool {
        self.lock.is_multi_process()
    }

    pub(crate) fn sequence(&self) -> u64 {
        self.header.sequence.as_u64()
    }

    pub(crate) fn data_end(&self) -> usize {
        self.header.data_end()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.region.len()
    }

    // === Writes ===

    /// Writes a value, in place when possible.
    pub(crate) fn put(&mut self, key: &str, value: &Value, ctx: &Ctx<'_>) -> CoreResult<()> {
        let (kind, stored) = encode_value(value, ctx)?;
        self.put_encoded(key, kind, &stored, value, ctx)?;
        Ok(())
    }

    /// Writes an encoded value. Returns the bytes an in-place write
    /// replaced, with their offset.
    fn put_encoded(
        &mut self,
        key: &str,
        kind: RecordKind,
        stored: &[u8],
        value: &Value,
        ctx: &Ctx<'_>,
    ) -> CoreResult<Option<(usize, Vec<u8>)>> {
        let len = record_len(key.len(), stored.len());
        let in_place = !self.is_multi_process()
            && self
                .index
                .get(key)
                .is_some_and(|slot| slot.kind == kind && slot.len == len);
        if in_place {
            let patch = self.write_in_place(key, kind, stored, value, ctx)?;
            ctx.stats.record_in_place(stored.len() as u64);
            return Ok(patch);
        }

        self.write_record(key, kind, stored, Some(value.clone()), ctx)?;
        ctx.stats.record_append(len as u64);
        Ok(None)
    }

    /// Applies a batch as one unit. If any edit fails the log, the header
    /// and the index are left as they were before the batch.
    ///
    /// Returns the changed keys; `None` stands for "everything" (the batch
    /// cleared the store).
    pub(crate) fn apply_batch(
        &mut self,
        ops: Vec<EditOp>,
        ctx: &Ctx<'_>,
    ) -> CoreResult<Vec<Option<String>>> {
        // Edits before the last clear have no effect
        let cleared = ops.iter().rposition(|op| matches!(op, EditOp::Clear));
        let skip = cleared.map_or(0, |at| at + 1);

        let mut staged = Vec::with_capacity(ops.len() - skip);
        for op in ops.into_iter().skip(skip) {
            match op {
                EditOp::Put(key, value) => {
                    let (kind, stored) = encode_value(&value, ctx)?;
                    staged.push(Staged::Put {
                        key,
                        kind,
                        stored,
                        value,
                    });
                }
                EditOp::Remove(key) => staged.push(Staged::Remove(key)),
                EditOp::Clear => {}
            }
        }

        if cleared.is_some() {
            return self.replace_all(staged, ctx);
        }

        let needed = staged.iter().map(Staged::record_len).sum();
        self.ensure_space(needed, ctx)?;

        let mut checkpoint = Checkpoint::new(&self.header, &self.index, needed);
        let mut keys = Vec::with_capacity(staged.len());
        for op in staged {
            checkpoint.track(&self.index, op.key());
            let step = match &op {
                Staged::Put {
                    key,
                    kind,
                    stored,
                    value,
                } => self
                    .put_encoded(key, *kind, stored, value, ctx)
                    .map(|patch| {
                        checkpoint.patches.extend(patch);
                        true
                    }),
                Staged::Remove(key) => self.remove(key, ctx),
            };
            match step {
                Ok(true) => keys.push(Some(op.into_key())),
                Ok(false) => {}
                Err(e) => {
                    self.roll_back(checkpoint, ctx);
                    return Err(e);
                }
            }
        }
        Ok(keys)
    }

    /// Replaces the whole log with the result of `staged` applied to an
    /// empty store, through the compaction commit.
    fn replace_all(
        &mut self,
        staged: Vec<Staged>,
        ctx: &Ctx<'_>,
    ) -> CoreResult<Vec<Option<String>>> {
        let mut order: Vec<Option<(String, RecordKind, Vec<u8>, Value)>> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        for op in staged {
            match op {
                Staged::Put {
                    key,
                    kind,
                    stored,
                    value,
                } => match positions.get(&key) {
                    Some(&at) => order[at] = Some((key, kind, stored, value)),
                    None => {
                        positions.insert(key.clone(), order.len());
                        order.push(Some((key, kind, stored, value)));
                    }
                },
                Staged::Remove(key) => {
                    if let Some(&at) = positions.get(&key) {
                        order[at] = None;
                    }
                }
            }
        }

        let mut image = compaction::build_image(&[], &Index::new(), &self.header)?;
        let mut index = Index::new();
        let mut keys = vec![None];
        for (key, kind, stored, value) in order.into_iter().flatten() {
            let record = encode_record(kind, &key, &stored);
            if image.bytes.len() + record.len() > MAX_FILE_SIZE {
                return Err(CoreError::StoreFull {
                    required: image.bytes.len() + record.len(),
                    limit: MAX_FILE_SIZE,
                });
            }
            ctx.stats.record_append(record.len() as u64);
            index.insert(
                key.clone(),
                Slot::new(image.bytes.len(), record.len(), kind, Some(value)),
            );
            image.bytes.extend_from_slice(&record);
            keys.push(Some(key));
        }
        image.header.data_end = image.bytes.len() as u64;
        image.bytes[..HEADER_SIZE].copy_from_slice(&image.header.encode());

        self.commit(image, ctx)?;
        self.index = index;
        Ok(keys)
    }

    /// Restores the state saved in `checkpoint` after a failed batch.
    fn roll_back(&mut self, checkpoint: Checkpoint, ctx: &Ctx<'_>) {
        if let Err(e) = self.restore_bytes(&checkpoint) {
            warn!(store = ctx.paths.name(), error = %e, "batch rollback failed, reloading");
            if let Err(e) = self.rescan(ctx) {
                warn!(store = ctx.paths.name(), error = %e, "reload after failed rollback failed");
            }
            return;
        }
        for (key, slot) in checkpoint.slots {
            self.index.restore_slot(key, slot);
        }
        self.index.restore_garbage(checkpoint.garbage);
        self.header = checkpoint.header;
        debug!(store = ctx.paths.name(), "rolled back failed batch");
    }

    fn restore_bytes(&mut self, checkpoint: &Checkpoint) -> CoreResult<()> {
        for (at, old) in checkpoint.patches.iter().rev() {
            self.region.write_at(*at, old)?;
        }
        // Appends may have left bytes past the end without moving it
        let start = checkpoint.header.data_end();
        let end = (start + checkpoint.appended_at_most).min(self.region.len());
        compaction::zero_range(self.region.as_mut(), start, end)?;
        self.region.write_at(0, &checkpoint.header.encode())?;
        self.region.flush()?;
        Ok(())
    }

    /// Appends a value record regardless of the in-place rule.
    fn append_value(&mut self, key: &str, value: &Value, ctx: &Ctx<'_>) -> CoreResult<()> {
        let (kind, stored) = ctx.payload.encode(value)?;
        self.write_record(key, kind, &stored, Some(value.clone()), ctx)
    }

    /// Appends a tombstone. Returns `false` if the key was not live.
    pub(crate) fn remove(&mut self, key: &str, ctx: &Ctx<'_>) -> CoreResult<bool> {
        if !self.index.contains(key) {
            return Ok(false);
        }
        self.write_record(key, RecordKind::Tombstone, &[], None, ctx)?;
        ctx.stats.record_remove(record_len(key.len(), 0) as u64);
        Ok(true)
    }

    fn write_in_place(
        &mut self,
        key: &str,
        kind: RecordKind,
        stored: &[u8],
        value: &Value,
        ctx: &Ctx<'_>,
    ) -> CoreResult<Option<(usize, Vec<u8>)>> {
        let Some(offset) = self.index.get(key).map(|slot| slot.offset) else {
            return Ok(None);
        };
        let record = encode_record(kind, key, stored);
        let value_at = RECORD_PREFIX + key.len();
        let crc_at = record.len() - CRC_SIZE;
        let old = self
            .region
            .read_at(offset + value_at, record.len() - value_at)?
            .to_vec();

        if let Some(undo) = self.undo.as_mut() {
            let durable = ctx.config.commit_mode == CommitMode::Sync;
            // The journal only covers one write; the previous one must be on disk
            if durable && self.unflushed_patch {
                self.region.flush()?;
            }
            undo.save(
                &UndoEntry {
                    record_offset: offset,
                    record_len: record.len(),
                    patch_at: value_at,
                    old: old.clone(),
                },
                durable,
            )?;
            self.unflushed_patch = true;
        }

        self.region
            .write_at(offset + value_at, &record[value_at..crc_at])?;
        self.region.write_at(offset + crc_at, &record[crc_at..])?;
        self.bump_header(self.header.data_end())?;

        self.index.update_in_place(key, Some(value.clone()));
        Ok(Some((offset + value_at, old)))
    }

    /// Appends one record at the end of the log, making room first.
    fn write_record(
        &mut self,
        key: &str,
        kind: RecordKind,
        stored: &[u8],
        value: Option<Value>,
        ctx: &Ctx<'_>,
    ) -> CoreResult<()> {
        let record = encode_record(kind, key, stored);
        self.ensure_space(record.len(), ctx)?;

        let offset = self.header.data_end();
        let crc_at = record.len() - CRC_SIZE;
        self.region.write_at(offset, &record[..crc_at])?;
        self.region.write_at(offset + crc_at, &record[crc_at..])?;
        self.bump_header(offset + record.len())?;

        match kind {
            RecordKind::Tombstone => {
                self.index.remove(key, record.len());
            }
            RecordKind::Value { .. } => {
                self.index
                    .insert(key.to_string(), Slot::new(offset, record.len(), kind, value));
            }
        }
        Ok(())
    }

    fn bump_header(&mut self, data_end: usize) -> CoreResult<()> {
        let header = Header {
            data_end: data_end as u64,
            sequence: self.header.sequence.next(),
            ..self.header
        };
        self.region.write_at(0, &header.encode())?;
        self.header = header;
        self.dirty = true;
        Ok(())
    }

    /// Makes room for `needed` more bytes by compacting or growing.
    fn ensure_space(&mut self, needed: usize, ctx: &Ctx<'_>) -> CoreResult<()> {
        let end = self.header.data_end();
        let capacity = self.region.len();
        if end + needed <= capacity {
            return Ok(());
        }

        let garbage = self.index.garbage_bytes();
        if garbage >= ctx.config.gc_min_bytes && end.saturating_sub(garbage) + needed <= capacity {
            self.compact(ctx)?;
            if self.header.data_end() + needed <= self.region.len() {
                return Ok(());
            }
        }

        let required = self.header.data_end() + needed;
        let new_capacity = grow_capacity(self.region.len(), required).ok_or(CoreError::StoreFull {
            required,
            limit: MAX_FILE_SIZE,
        })?;
        self.region.resize(new_capacity)?;
        ctx.stats.record_grow();
        info!(
            store = ctx.paths.name(),
            from = capacity,
            to = new_capacity,
            "grew store file"
        );
        Ok(())
    }

    /// Compacts if enough of the log is garbage. Failures are logged only:
    /// the triggering write already succeeded.
    pub(crate) fn maybe_compact(&mut self, ctx: &Ctx<'_>) -> Option<CompactionResult> {
        let garbage = self.index.garbage_bytes();
        let data = self.header.data_end().saturating_sub(HEADER_SIZE);
        #[allow(clippy::cast_precision_loss)]
        let ratio = if data == 0 { 0.0 } else { garbage as f64 / data as f64 };
        if garbage < ctx.config.gc_min_bytes || ratio < ctx.config.gc_garbage_ratio {
            return None;
        }
        match self.compact(ctx) {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(store = ctx.paths.name(), error = %e, "automatic compaction failed");
                None
            }
        }
    }

    /// Rewrites the log with live records only.
    pub(crate) fn compact(&mut self, ctx: &Ctx<'_>) -> CoreResult<CompactionResult> {
        let records_dropped = self.index.garbage_records();
        let image = compaction::build_image(self.region.as_slice(), &self.index, &self.header)?;
        let result = self.commit(image, ctx)?;
        Ok(CompactionResult {
            records_dropped,
            ..result
        })
    }

    /// Replaces the log with an empty one. Returns `false` if it was empty.
    pub(crate) fn clear(&mut self, ctx: &Ctx<'_>) -> CoreResult<bool> {
        let had_keys = !self.index.is_empty();
        let image = compaction::build_image(self.region.as_slice(), &Index::new(), &self.header)?;
        self.commit(image, ctx)?;
        self.index.clear();
        Ok(had_keys)
    }

    fn commit(&mut self, image: compaction::Image, ctx: &Ctx<'_>) -> CoreResult<CompactionResult> {
        let bytes_before = self.header.data_end();
        let capacity_before = self.region.len();
        let shrink_to = self.shrink_target(image.bytes.len(), ctx);

        if let Err(e) = compaction::commit_image(
            ctx.paths,
            self.region.as_mut(),
            &image.bytes,
            bytes_before,
            shrink_to,
        ) {
            warn!(store = ctx.paths.name(), error = %e, "compaction failed, reloading");
            if compaction::recover(ctx.paths, self.region.as_mut()).is_ok() {
                self.rescan(ctx)?;
            }
            return Err(e);
        }

        for (key, offset) in &image.relocations {
            self.index.relocate(key, *offset);
        }
        self.index.reset_garbage();
        self.forget_patches()?;
        self.header = image.header;
        self.dirty = false;
        ctx.stats.record_compaction(image.bytes.len() as u64);

        let result = CompactionResult {
            records_kept: image.relocations.len(),
            records_dropped: 0,
            bytes_before,
            bytes_after: image.bytes.len(),
            capacity_before,
            capacity_after: self.region.len(),
        };
        info!(
            store = ctx.paths.name(),
            bytes_before,
            bytes_after = result.bytes_after,
            capacity = result.capacity_after,
            "compacted store"
        );
        Ok(result)
    }

    /// Capacity to shrink to after compaction, single-process mode only.
    fn shrink_target(&self, image_len: usize, ctx: &Ctx<'_>) -> Option<usize> {
        if self.is_multi_process() {
            return None;
        }
        let target = grow_capacity(PAGE_SIZE, image_len + PAGE_SIZE)?
            .max(ctx.config.initial_capacity);
        (target < self.region.len()).then_some(target)
    }

    /// Flushes according to `mode`.
    pub(crate) fn flush(&mut self, mode: CommitMode) -> CoreResult<()> {
        match mode {
            CommitMode::Sync => {
                self.region.flush()?;
                self.dirty = false;
                self.unflushed_patch = false;
            }
            CommitMode::Async => {
                self.region.flush_async()?;
                self.dirty = false;
            }
            CommitMode::Manual => {}
        }
        Ok(())
    }

    /// Empties the undo journal once the records it names have moved.
    fn forget_patches(&mut self) -> CoreResult<()> {
        if let Some(undo) = self.undo.as_mut() {
            undo.clear()?;
        }
        self.unflushed_patch = false;
        Ok(())
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty
    }

    // === Multi-process ===

    /// Returns `true` if another process changed the file since our last
    /// look.
    pub(crate) fn has_external_change(&self) -> bool {
        Header::peek_sequence(self.region.as_slice()) != Some(self.header.sequence)
    }

    /// Catches up with changes written by other processes.
    ///
    /// Must be called with the file lock held. A compaction that another
    /// process left half done is finished first, which needs the lock held
    /// `exclusive`ly; under a shared lock the sync is skipped until then.
    /// Returns the changed keys; `None` stands for "everything" (the store
    /// was cleared).
    pub(crate) fn sync_external(
        &mut self,
        ctx: &Ctx<'_>,
        exclusive: bool,
    ) -> CoreResult<Vec<Option<String>>> {
        self.region.reload()?;
        let mut redone = false;
        if ctx.paths.redo_marker().exists() {
            if !exclusive {
                return Ok(Vec::new());
            }
            let outcome = compaction::recover(ctx.paths, self.region.as_mut())?;
            redone = outcome == RecoveryOutcome::Redone;
            if redone {
                warn!(
                    store = ctx.paths.name(),
                    "finished compaction interrupted in another process"
                );
            }
        }
        let bytes = self.region.as_slice();
        let header = match Header::decode(bytes) {
            Ok(h) => h,
            Err(e) => {
                warn!(store = ctx.paths.name(), error = %e, "unreadable header written by another process");
                return Ok(Vec::new());
            }
        };
        if !redone
            && header.sequence == self.header.sequence
            && header.generation == self.header.generation
        {
            return Ok(Vec::new());
        }
        let limit = header.data_end().min(bytes.len());

        let changed = if redone || header.generation != self.header.generation {
            let mut index = Index::new();
            replay::scan(bytes, HEADER_SIZE, limit, |item| {
                replay::apply(&mut index, ctx.payload, item);
            });
            let changed = diff(&self.index, &index);
            self.index = index;
            changed
        } else if header.data_end() > self.header.data_end() {
            let mut changed = Vec::new();
            let index = &mut self.index;
            replay::scan(bytes, self.header.data_end(), limit, |item| {
                if let Some(key) = replay::apply(index, ctx.payload, item) {
                    changed.push(Some(key.to_string()));
                }
            });
            changed
        } else {
            Vec::new()
        };

        debug!(
            store = ctx.paths.name(),
            changed = changed.len(),
            sequence = header.sequence.as_u64(),
            "synced external changes"
        );
        self.header = header;
        ctx.stats.record_external_sync();
        Ok(changed)
    }
}

/// Encodes a value for the log, enforcing the value size limit.
fn encode_value(value: &Value, ctx: &Ctx<'_>) -> CoreResult<(RecordKind, Vec<u8>)> {
    let (kind, stored) = ctx.payload.encode(value)?;
    if stored.len() > MAX_VALUE_SIZE {
        return Err(CoreError::ValueTooLarge {
            size: stored.len(),
            limit: MAX_VALUE_SIZE,
        });
    }
    Ok((kind, stored))
}

/// A batch edit with its value already encoded.
enum Staged {
    Put {
        key: String,
        kind: RecordKind,
        stored: Vec<u8>,
        value: Value,
    },
    Remove(String),
}

impl Staged {
    fn key(&self) -> &str {
        match self {
            Self::Put { key, .. } | Self::Remove(key) => key,
        }
    }

    fn into_key(self) -> String {
        match self {
            Self::Put { key, .. } | Self::Remove(key) => key,
        }
    }

    /// Upper bound of the bytes this edit appends.
    fn record_len(&self) -> usize {
        match self {
            Self::Put { key, stored, .. } => record_len(key.len(), stored.len()),
            Self::Remove(key) => record_len(key.len(), 0),
        }
    }
}

/// What a batch must put back if one of its edits fails.
struct Checkpoint {
    header: Header,
    appended_at_most: usize,
    garbage: (usize, usize),
    /// Slot of every touched key before the batch, `None` if it was absent.
    slots: HashMap<String, Option<Slot>>,
    /// Bytes replaced by in-place writes, in write order.
    patches: Vec<(usize, Vec<u8>)>,
}

impl Checkpoint {
    fn new(header: &Header, index: &Index, appended_at_most: usize) -> Self {
        Self {
            header: *header,
            appended_at_most,
            garbage: (index.garbage_bytes(), index.garbage_records()),
            slots: HashMap::new(),
            patches: Vec::new(),
        }
    }

    fn track(&mut self, index: &Index, key: &str) {
        if !self.slots.contains_key(key) {
            self.slots.insert(key.to_string(), index.get(key).cloned());
        }
    }
}

/// Keys whose value differs between two indexes.
fn diff(old: &Index, new: &Index) -> Vec<Option<String>> {
    if new.is_empty() && !old.is_empty() {
        return vec![None];
    }
    let mut changed: Vec<Option<String>> = new
        .iter()
        .filter(|(key, slot)| {
            old.get(key)
                .map_or(true, |prev| prev.kind != slot.kind || prev.value != slot.value)
        })
        .map(|(key, _)| Some(key.to_string()))
        .collect();
    changed.extend(
        old.iter()
            .filter(|(key, _)| !new.contains(key))
            .map(|(key, _)| Some(key.to_string())),
    );
    changed
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("keys", &self.index.len())
            .field("header", &self.header)
            .field("capacity", &self.region.len())
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}
