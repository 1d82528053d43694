//! Shard file layout
//!
//! Byte-level helpers shared by the shard and its recovery pass. Every
//! function here works on the mapped file as a plain byte slice.

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

use crate::config::MAX_SHARD_CAPACITY;
use crate::error::{AptaError, Result};

// =============================================================================
// Constants
// =============================================================================

/// Magic bytes identifying a shard file
pub(crate) const MAGIC: [u8; 4] = *b"APSH";

/// Current shard format version
pub(crate) const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) + Flags (2) + 5 × u64 (40) = 48 bytes
pub(crate) const HEADER_SIZE: usize = 48;

/// Slot: Tag (4) + KeyLen (4) + RecordOffset (8)
pub(crate) const SLOT_SIZE: usize = 16;

/// Id table entry: RecordOffset (8)
pub(crate) const ID_ENTRY_SIZE: usize = 8;

/// Record framing: KeyLen (4) + Id (8) + CRC (4)
pub(crate) const RECORD_OVERHEAD: usize = 16;

/// Header flag: the shard was opened for writing and not closed since
pub(crate) const FLAG_DIRTY: u16 = 0b1;

/// Smallest slot table
const MIN_SLOTS: u64 = 8;

/// Data region size of a freshly created shard
pub(crate) const INITIAL_DATA_BYTES: u64 = 64 * 1024;

// =============================================================================
// Header
// =============================================================================

/// Fixed-size header at offset 0, encoded with bincode (fixint, little endian)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ShardHeader {
    pub magic: [u8; 4],
    pub version: u16,
    pub flags: u16,
    /// Maximum number of entries
    pub capacity: u64,
    /// Slot table length, a power of two
    pub slot_count: u64,
    /// Identifier of the first entry ever stored here
    pub first_id: u64,
    /// Number of entries stored
    pub entry_count: u64,
    /// End of the last record in the data region
    pub data_end: u64,
}

impl ShardHeader {
    pub fn new(capacity: u64, first_id: u64) -> Result<Self> {
        let slot_count = slot_count_for(capacity)?;
        let data_start = index_end(capacity, slot_count).ok_or_else(|| {
            AptaError::Config(format!("shard capacity {} too large", capacity))
        })?;
        Ok(Self {
            magic: MAGIC,
            version: VERSION,
            flags: 0,
            capacity,
            slot_count,
            first_id,
            entry_count: 0,
            data_end: data_start,
        })
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(AptaError::Corrupt("file shorter than header".to_string()));
        }

        let header: Self = bincode::deserialize(&buf[..HEADER_SIZE])
            .map_err(|e| AptaError::Corrupt(format!("unreadable header: {}", e)))?;

        if header.magic != MAGIC {
            return Err(AptaError::Corrupt(format!(
                "invalid magic: expected APSH, got {:?}",
                header.magic
            )));
        }
        if header.version != VERSION {
            return Err(AptaError::Corrupt(format!(
                "unsupported version: {}",
                header.version
            )));
        }
        if slot_count_for(header.capacity).ok() != Some(header.slot_count) {
            return Err(AptaError::Corrupt(format!(
                "inconsistent geometry: capacity={} slots={}",
                header.capacity, header.slot_count
            )));
        }
        let data_start = index_end(header.capacity, header.slot_count).ok_or_else(|| {
            AptaError::Corrupt(format!(
                "index regions of capacity {} do not fit in memory",
                header.capacity
            ))
        })?;
        if header.entry_count > header.capacity {
            return Err(AptaError::Corrupt(format!(
                "entry count {} exceeds capacity {}",
                header.entry_count, header.capacity
            )));
        }
        if header.data_end < data_start {
            return Err(AptaError::Corrupt("data end inside index region".to_string()));
        }

        Ok(header)
    }

    pub fn encode(&self, buf: &mut [u8]) -> Result<()> {
        let mut out = &mut buf[..HEADER_SIZE];
        bincode::serialize_into(&mut out, self)
            .map_err(|e| AptaError::Corrupt(format!("cannot encode header: {}", e)))
    }

    pub fn layout(&self) -> Layout {
        Layout {
            capacity: self.capacity,
            slot_count: self.slot_count,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.flags & FLAG_DIRTY != 0
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        if dirty {
            self.flags |= FLAG_DIRTY;
        } else {
            self.flags &= !FLAG_DIRTY;
        }
    }
}

/// Slot table sized for a load factor of at most one half
fn slot_count_for(capacity: u64) -> Result<u64> {
    if capacity == 0 {
        return Err(AptaError::Config("shard capacity must be at least 1".to_string()));
    }
    if capacity > MAX_SHARD_CAPACITY {
        return Err(AptaError::Config(format!(
            "shard capacity {} exceeds the maximum of {}",
            capacity, MAX_SHARD_CAPACITY
        )));
    }
    capacity
        .checked_mul(2)
        .and_then(u64::checked_next_power_of_two)
        .map(|n| n.max(MIN_SLOTS))
        .ok_or_else(|| AptaError::Config(format!("shard capacity {} too large", capacity)))
}

// =============================================================================
// Region Offsets
// =============================================================================

/// End of the id table, or `None` if it is not addressable on this target
///
/// Every `Layout` offset is below this value, so once it fits in `usize`
/// the unchecked offset math cannot overflow.
fn index_end(capacity: u64, slot_count: u64) -> Option<u64> {
    let slots = slot_count.checked_mul(SLOT_SIZE as u64)?;
    let ids = capacity.checked_mul(ID_ENTRY_SIZE as u64)?;
    let end = (HEADER_SIZE as u64).checked_add(slots)?.checked_add(ids)?;
    usize::try_from(end).ok().map(|_| end)
}

/// Offsets of the fixed regions that follow the header
#[derive(Debug, Clone, Copy)]
pub(crate) struct Layout {
    capacity: u64,
    slot_count: u64,
}

impl Layout {
    pub fn slot_offset(&self, slot: u64) -> usize {
        HEADER_SIZE + (slot as usize) * SLOT_SIZE
    }

    pub fn id_offset(&self, local: u64) -> usize {
        self.slot_offset(self.slot_count) + (local as usize) * ID_ENTRY_SIZE
    }

    pub fn data_start(&self) -> u64 {
        self.id_offset(self.capacity) as u64
    }

    pub fn slot_mask(&self) -> u64 {
        self.slot_count - 1
    }
}

// =============================================================================
// Slots
// =============================================================================

/// One entry of the open-addressing table. A zero tag marks an empty slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Slot {
    pub tag: u32,
    pub key_len: u32,
    pub record_offset: u64,
}

impl Slot {
    pub fn is_empty(&self) -> bool {
        self.tag == 0
    }

    pub fn read(buf: &[u8], at: usize) -> Self {
        Self {
            tag: read_u32(buf, at),
            key_len: read_u32(buf, at + 4),
            record_offset: read_u64(buf, at + 8),
        }
    }

    pub fn write(&self, buf: &mut [u8], at: usize) {
        buf[at..at + 4].copy_from_slice(&self.tag.to_le_bytes());
        buf[at + 4..at + 8].copy_from_slice(&self.key_len.to_le_bytes());
        buf[at + 8..at + 16].copy_from_slice(&self.record_offset.to_le_bytes());
    }
}

/// Stable key hash used for slot placement
pub(crate) fn hash_key(key: &[u8]) -> u64 {
    xxh3_64(key)
}

/// High half of the hash, never zero
pub(crate) fn tag_of(hash: u64) -> u32 {
    ((hash >> 32) as u32).max(1)
}

// =============================================================================
// Records
// =============================================================================

/// Bytes a record for a key of this length occupies
pub(crate) fn record_len(key_len: usize) -> usize {
    RECORD_OVERHEAD + key_len
}

/// Write `[KeyLen][Id][Key][CRC]` at `at`
pub(crate) fn write_record(buf: &mut [u8], at: usize, key: &[u8], id: u64) {
    let key_len = (key.len() as u32).to_le_bytes();
    let id_bytes = id.to_le_bytes();

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&key_len);
    hasher.update(&id_bytes);
    hasher.update(key);
    let crc = hasher.finalize();

    let key_at = at + 12;
    let crc_at = key_at + key.len();
    buf[at..at + 4].copy_from_slice(&key_len);
    buf[at + 4..key_at].copy_from_slice(&id_bytes);
    buf[key_at..crc_at].copy_from_slice(key);
    buf[crc_at..crc_at + 4].copy_from_slice(&crc.to_le_bytes());
}

/// A record borrowed from the mapped data region
#[derive(Debug)]
pub(crate) struct Record<'a> {
    pub key: &'a [u8],
    pub id: u64,
    crc: u32,
}

impl<'a> Record<'a> {
    /// Parse the record at `at`; `limit` is the end of valid data
    pub fn parse(buf: &'a [u8], at: u64, limit: u64) -> Result<Self> {
        let limit = limit.min(buf.len() as u64);
        let header_end = at.checked_add(12).filter(|&end| end <= limit).ok_or_else(|| {
            AptaError::Corrupt(format!("record at {} runs past end of data", at))
        })?;

        let at = at as usize;
        let key_len = read_u32(buf, at) as u64;
        let end = header_end + key_len + 4;
        if end > limit {
            return Err(AptaError::Corrupt(format!(
                "record at {} runs past end of data",
                at
            )));
        }

        let key_at = header_end as usize;
        let crc_at = key_at + key_len as usize;
        Ok(Self {
            key: &buf[key_at..crc_at],
            id: read_u64(buf, at + 4),
            crc: read_u32(buf, crc_at),
        })
    }

    pub fn len(&self) -> usize {
        record_len(self.key.len())
    }

    /// Recompute the checksum and compare it with the stored one
    pub fn verify(&self) -> bool {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&(self.key.len() as u32).to_le_bytes());
        hasher.update(&self.id.to_le_bytes());
        hasher.update(self.key);
        hasher.finalize() == self.crc
    }
}

// =============================================================================
// Integer Helpers
// =============================================================================

pub(crate) fn read_u32(buf: &[u8], at: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(bytes)
}

pub(crate) fn read_u64(buf: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(bytes)
}

pub(crate) fn write_u64(buf: &mut [u8], at: usize, value: u64) {
    buf[at..at + 8].copy_from_slice(&value.to_le_bytes());
}
