//! Shard Recovery
//!
//! Rebuilds a shard that was not closed cleanly.
//!
//! Writes land in the order record → id table → slot, so the id table is
//! the source of truth: every entry it names is re-validated in identifier
//! order, the first bad entry truncates the shard, and the slot table is
//! rebuilt from what survived.

use crate::error::{AptaError, Result};

use super::format::{hash_key, read_u64, tag_of, Record, ShardHeader, Slot};
use super::{probe, Probe};

/// Result of a recovery pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Entries that passed validation and were re-indexed
    pub entries_recovered: u64,

    /// Id table entries dropped past the first invalid one
    pub entries_discarded: u64,

    /// Whether anything was dropped
    pub was_truncated: bool,
}

/// Re-validate the id table and rebuild the slot table in place
pub(crate) fn recover(map: &mut [u8], header: &mut ShardHeader) -> Result<RecoveryReport> {
    let layout = header.layout();
    let data_start = layout.data_start();
    let limit = map.len() as u64;

    // Step 1: find the longest valid prefix of the id table
    let mut recovered = 0u64;
    let mut data_end = data_start;
    while recovered < header.capacity {
        let offset = read_u64(map, layout.id_offset(recovered));
        if offset != data_end {
            break;
        }
        let record = match Record::parse(map, offset, limit) {
            Ok(record) => record,
            Err(_) => break,
        };
        if !record.verify() || record.id != header.first_id + recovered {
            break;
        }
        data_end += record.len() as u64;
        recovered += 1;
    }

    // Step 2: clear everything past it
    let mut discarded = 0u64;
    for local in recovered..header.capacity {
        let at = layout.id_offset(local);
        if read_u64(map, at) != 0 {
            discarded += 1;
            map[at..at + 8].fill(0);
        }
    }
    map[layout.slot_offset(0)..layout.slot_offset(header.slot_count)].fill(0);

    header.entry_count = 0;
    header.data_end = data_end;

    // Step 3: re-seat a slot for every surviving record
    for local in 0..recovered {
        let offset = read_u64(map, layout.id_offset(local));
        let (tag, key_len, slot) = {
            let record = Record::parse(map, offset, data_end)?;
            let slot = match probe(map, header, record.key)? {
                Probe::Vacant(slot) => slot,
                Probe::Found(id) => {
                    return Err(AptaError::Corrupt(format!(
                        "key of entry {} already stored as {}",
                        record.id, id
                    )))
                }
            };
            (tag_of(hash_key(record.key)), record.key.len() as u32, slot)
        };

        Slot {
            tag,
            key_len,
            record_offset: offset,
        }
        .write(map, layout.slot_offset(slot));
        header.entry_count += 1;
    }

    header.set_dirty(false);
    header.encode(map)?;

    Ok(RecoveryReport {
        entries_recovered: recovered,
        entries_discarded: discarded,
        was_truncated: discarded > 0,
    })
}
