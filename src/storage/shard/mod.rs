//! Shard Module
//!
//! One capacity-bounded, disk-backed map from a byte string to an identifier.
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header (48 bytes, bincode)                                   │
//! │   Magic "APSH" (4) | Version u16 | Flags u16 | Capacity u64  │
//! │   SlotCount u64 | FirstId u64 | EntryCount u64 | DataEnd u64 │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Slot Table (SlotCount × 16 bytes, open addressing)           │
//! │   [Tag: u32][KeyLen: u32][RecordOffset: u64]                 │
//! │   (Tag = 0 means empty slot)                                 │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Id Table (Capacity × 8 bytes)                                │
//! │   [RecordOffset: u64] in insertion (= identifier) order      │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Data Region (grows on demand)                                │
//! │   [KeyLen: u32][Id: u64][Key][CRC32: u32]                    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The whole file is memory-mapped. Lookups hash the key with xxh3, probe
//! the slot table linearly and compare the key bytes in the data region.

mod format;
mod recovery;

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use memmap2::{MmapMut, MmapOptions};

use crate::error::{AptaError, Result};
use crate::identifier::{self, Identifier};

use format::{
    hash_key, read_u64, record_len, tag_of, write_record, write_u64, Record, ShardHeader, Slot,
    HEADER_SIZE, INITIAL_DATA_BYTES,
};

pub use recovery::RecoveryReport;

// =============================================================================
// Lifecycle
// =============================================================================

/// Where a shard is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardState {
    /// Accepts new keys
    Writable,
    /// At capacity; existing keys stay queryable
    Sealed,
    /// File handle released
    Closed,
}

/// Open file plus its mapping
struct Backing {
    file: File,
    map: MmapMut,
}

/// Result of probing the slot table for a key
pub(crate) enum Probe {
    Found(u64),
    Vacant(u64),
}

/// A capacity-bounded on-disk map from byte strings to identifiers
///
/// ## Concurrency
/// - `get`/`contains`/`sequence_of` take `&self` and only read the mapping
/// - `put`/`close` take `&mut self`
///
/// Callers share a shard across threads behind a `RwLock`.
pub struct Shard {
    path: PathBuf,
    header: ShardHeader,
    backing: Option<Backing>,
    state: ShardState,
    recovery: Option<RecoveryReport>,
}

impl Shard {
    /// Open the shard at `path`, creating it if the file does not exist
    ///
    /// `capacity` and `first_id` only apply to a newly created file; an
    /// existing file keeps the geometry recorded in its header.
    pub fn open(path: &Path, capacity: u64, first_id: Identifier) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Self::create(path, capacity, first_id)
        }
    }

    /// Create a new, empty shard file. Fails if `path` already exists.
    pub fn create(path: &Path, capacity: u64, first_id: Identifier) -> Result<Self> {
        let header = ShardHeader::new(capacity, identifier::to_stored(first_id))?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| open_error(path, e))?;
        file.set_len(header.layout().data_start() + INITIAL_DATA_BYTES)?;

        let map = map_file(&file)?;
        let mut shard = Self {
            path: path.to_path_buf(),
            header,
            backing: Some(Backing { file, map }),
            state: ShardState::Writable,
            recovery: None,
        };
        shard.sync_header()?;

        tracing::debug!(
            "Created shard {} (capacity={}, first_id={})",
            path.display(),
            capacity,
            first_id
        );
        Ok(shard)
    }

    /// Open an existing shard file
    ///
    /// A shard that was not closed cleanly is recovered before use.
    pub fn load(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| open_error(path, e))?;

        let file_len = file.metadata()?.len();
        if file_len < HEADER_SIZE as u64 {
            return Err(AptaError::StorageOpen {
                path: path.to_path_buf(),
                reason: format!("file too short ({} bytes)", file_len),
            });
        }

        let mut map = map_file(&file)?;
        let mut header = ShardHeader::decode(&map).map_err(|e| AptaError::StorageOpen {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        if header.data_end > file_len {
            return Err(AptaError::StorageOpen {
                path: path.to_path_buf(),
                reason: format!(
                    "file truncated: data ends at {} but file is {} bytes",
                    header.data_end, file_len
                ),
            });
        }

        let recovery = if header.is_dirty() {
            let report = recovery::recover(&mut map, &mut header).map_err(|e| {
                AptaError::StorageOpen {
                    path: path.to_path_buf(),
                    reason: format!("recovery failed: {}", e),
                }
            })?;
            tracing::warn!(
                "Shard {} was not closed cleanly: {} entries recovered, {} discarded",
                path.display(),
                report.entries_recovered,
                report.entries_discarded
            );
            Some(report)
        } else {
            None
        };

        let state = if header.entry_count >= header.capacity {
            ShardState::Sealed
        } else {
            ShardState::Writable
        };

        let mut shard = Self {
            path: path.to_path_buf(),
            header,
            backing: Some(Backing { file, map }),
            state,
            recovery,
        };
        if shard.recovery.is_some() {
            shard.sync_header()?;
        }

        tracing::debug!(
            "Loaded shard {} ({} of {} entries, {:?})",
            path.display(),
            shard.header.entry_count,
            shard.header.capacity,
            shard.state
        );
        Ok(shard)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Look up the identifier stored for `key`
    pub fn get(&self, key: &[u8]) -> Result<Option<Identifier>> {
        let map = self.mapped()?;
        match probe(map, &self.header, key)? {
            Probe::Found(id) => Ok(Some(identifier::from_stored(id)?)),
            Probe::Vacant(_) => Ok(None),
        }
    }

    /// Whether `key` is stored here
    pub fn contains(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Reverse lookup through the id table
    pub fn sequence_of(&self, id: Identifier) -> Result<Option<Vec<u8>>> {
        let id = identifier::to_stored(id);
        if id < self.header.first_id || id - self.header.first_id >= self.header.entry_count {
            return Ok(None);
        }

        let map = self.mapped()?;
        let record = self.record_at(map, id - self.header.first_id)?;
        Ok(Some(record.key.to_vec()))
    }

    /// Visit every entry in identifier order
    pub fn for_each<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], Identifier),
    {
        let map = self.mapped()?;
        for local in 0..self.header.entry_count {
            let record = self.record_at(map, local)?;
            f(record.key, identifier::from_stored(record.id)?);
        }
        Ok(())
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Insert a new mapping
    ///
    /// Fails with `ShardFull` once the shard is sealed, `ShardClosed` after
    /// `close()`, and `DuplicateKey` if `key` is already present.
    pub fn put(&mut self, key: &[u8], id: Identifier) -> Result<()> {
        match self.state {
            ShardState::Closed => return Err(AptaError::ShardClosed),
            ShardState::Sealed => {
                return Err(AptaError::ShardFull {
                    capacity: self.header.capacity,
                })
            }
            ShardState::Writable => {}
        }

        let id = identifier::to_stored(id);
        debug_assert_eq!(id, self.header.first_id + self.header.entry_count);

        let key_len = u32::try_from(key.len()).map_err(|_| {
            AptaError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("key of {} bytes is too long", key.len()),
            ))
        })?;

        let slot = match probe(self.mapped()?, &self.header, key)? {
            Probe::Found(_) => return Err(AptaError::DuplicateKey),
            Probe::Vacant(slot) => slot,
        };

        self.mark_dirty()?;

        let record_offset = self.header.data_end;
        let new_end = record_offset + record_len(key.len()) as u64;
        self.reserve(new_end)?;

        let layout = self.header.layout();
        let local = self.header.entry_count;
        let map = self.mapped_mut()?;

        // Record, then id table, then slot: recovery trusts the id table.
        write_record(map, record_offset as usize, key, id);
        write_u64(map, layout.id_offset(local), record_offset);
        Slot {
            tag: tag_of(hash_key(key)),
            key_len,
            record_offset,
        }
        .write(map, layout.slot_offset(slot));

        self.header.entry_count += 1;
        self.header.data_end = new_end;
        self.write_header()?;

        if self.header.entry_count == self.header.capacity {
            self.state = ShardState::Sealed;
            tracing::debug!("Shard {} sealed at {} entries", self.path.display(), local + 1);
        }

        Ok(())
    }

    /// Persist pending writes without closing
    pub fn flush(&self) -> Result<()> {
        let backing = self.backing.as_ref().ok_or(AptaError::ShardClosed)?;
        backing.map.flush()?;
        Ok(())
    }

    /// Flush, mark the file clean and release it
    ///
    /// Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.state == ShardState::Closed {
            return Ok(());
        }

        self.header.set_dirty(false);
        self.sync_header()?;

        if let Some(backing) = self.backing.take() {
            backing.file.sync_all()?;
        }
        self.state = ShardState::Closed;

        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Number of entries (tracked, not scanned)
    pub fn len(&self) -> usize {
        self.header.entry_count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.header.entry_count == 0
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> u64 {
        self.header.capacity
    }

    /// Identifier of the first entry; entries hold `first_id..first_id + len`
    pub fn first_id(&self) -> u64 {
        self.header.first_id
    }

    pub fn state(&self) -> ShardState {
        self.state
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// What recovery did when this shard was loaded, if it had to run
    pub fn recovery(&self) -> Option<&RecoveryReport> {
        self.recovery.as_ref()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn mapped(&self) -> Result<&[u8]> {
        self.backing
            .as_ref()
            .map(|b| &b.map[..])
            .ok_or(AptaError::ShardClosed)
    }

    fn mapped_mut(&mut self) -> Result<&mut [u8]> {
        self.backing
            .as_mut()
            .map(|b| &mut b.map[..])
            .ok_or(AptaError::ShardClosed)
    }

    fn record_at<'a>(&self, map: &'a [u8], local: u64) -> Result<Record<'a>> {
        let offset = read_u64(map, self.header.layout().id_offset(local));
        Record::parse(map, offset, self.header.data_end)
    }

    /// Set the dirty flag and get it to disk before the first mutation
    fn mark_dirty(&mut self) -> Result<()> {
        if self.header.is_dirty() {
            return Ok(());
        }
        self.header.set_dirty(true);
        self.write_header()?;
        let backing = self.backing.as_ref().ok_or(AptaError::ShardClosed)?;
        backing.map.flush_range(0, HEADER_SIZE)?;
        Ok(())
    }

    fn write_header(&mut self) -> Result<()> {
        let header = self.header;
        header.encode(self.mapped_mut()?)
    }

    fn sync_header(&mut self) -> Result<()> {
        self.write_header()?;
        self.flush()
    }

    /// Grow the file (and remap) until `end` fits
    fn reserve(&mut self, end: u64) -> Result<()> {
        let current = self.mapped()?.len() as u64;
        if end <= current {
            return Ok(());
        }

        let data_start = self.header.layout().data_start();
        let doubled = data_start + 2 * (current - data_start).max(INITIAL_DATA_BYTES);
        self.grow_to(doubled.max(end))
    }

    /// Extend the file to `new_len` and swap in a mapping of the new size
    ///
    /// On failure the file keeps its old length and the old mapping stays
    /// in place, so the shard remains usable.
    fn grow_to(&mut self, new_len: u64) -> Result<()> {
        let backing = self.backing.as_mut().ok_or(AptaError::ShardClosed)?;
        let old_len = backing.map.len() as u64;

        backing.map.flush()?;
        backing.file.set_len(new_len)?;

        let map = match map_file(&backing.file) {
            Ok(map) => map,
            Err(e) => {
                if let Err(undo) = backing.file.set_len(old_len) {
                    tracing::error!(
                        "Failed to restore {} to {} bytes: {}",
                        self.path.display(),
                        old_len,
                        undo
                    );
                }
                return Err(e);
            }
        };
        backing.map = map;

        tracing::trace!("Grew shard {} to {} bytes", self.path.display(), new_len);
        Ok(())
    }
}

/// Find `key`, or the empty slot where it would go
pub(crate) fn probe(map: &[u8], header: &ShardHeader, key: &[u8]) -> Result<Probe> {
    let layout = header.layout();
    let mask = layout.slot_mask();
    let hash = hash_key(key);
    let tag = tag_of(hash);

    let mut slot_index = hash & mask;
    for _ in 0..header.slot_count {
        let slot = Slot::read(map, layout.slot_offset(slot_index));
        if slot.is_empty() {
            return Ok(Probe::Vacant(slot_index));
        }
        if slot.tag == tag && slot.key_len as usize == key.len() {
            let record = Record::parse(map, slot.record_offset, header.data_end)?;
            if record.key == key {
                return Ok(Probe::Found(record.id));
            }
        }
        slot_index = (slot_index + 1) & mask;
    }

    Err(AptaError::Corrupt("slot table has no free slot".to_string()))
}

fn map_file(file: &File) -> Result<MmapMut> {
    // SAFETY: shard files are owned exclusively by one pool; nothing else
    // resizes or writes them while mapped.
    let map = unsafe { MmapOptions::new().map_mut(file)? };
    Ok(map)
}

fn open_error(path: &Path, e: io::Error) -> AptaError {
    AptaError::StorageOpen {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}
