//! Pool Module
//!
//! The deduplicating sequence-to-identifier engine.
//!
//! ## Responsibilities
//! - Bootstrap the shard list from `pooldata/` on startup
//! - Hand out exactly one identifier per distinct sequence, densely from 1
//! - Roll over to a new shard when the newest one is sealed
//! - Close every shard exactly once

use std::fmt;
use std::mem;
use std::path::Path;

use parking_lot::RwLock;

use crate::config::PoolConfig;
use crate::error::{AptaError, Result};
use crate::identifier::{self, Identifier, FIRST_IDENTIFIER};
use crate::storage::{Shard, ShardDirectory};

/// The pool engine
///
/// ## Concurrency Model
///
/// - **Lookups** take the shared side of `state` and run concurrently.
/// - **Registrations** first try a shared-lock lookup (duplicates are the
///   common case in HT-SELEX data). On a miss they take the exclusive side,
///   look up again, and only then allocate and insert. The re-check and the
///   insert happen under one exclusive guard, so two threads racing on the
///   same unseen sequence always end up with one identifier.
/// - `total_size` and the shard list live inside `state` and are only
///   mutated under the exclusive guard, together with the `put`.
pub struct Pool {
    /// Pool configuration
    config: PoolConfig,

    /// Where shard files live
    directory: ShardDirectory,

    /// Open shards and counters, or the terminal closed state
    state: RwLock<PoolState>,
}

enum PoolState {
    Open(ShardSet),
    Closed,
}

/// Shards ordered oldest → newest; only the last one receives inserts
struct ShardSet {
    shards: Vec<Shard>,
    total_size: u64,
    next_index: u32,
}

/// Point-in-time pool statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Distinct sequences across all shards
    pub total_size: u64,
    pub shard_count: usize,
    /// Entries in the newest shard
    pub active_shard_fill: usize,
    pub max_shard_capacity: u64,
}

impl Pool {
    /// Open or create the pool under `config.project_dir`
    ///
    /// On startup:
    /// 1. Create `pooldata/` if missing
    /// 2. Load every `data{N}.db`, oldest first
    /// 3. Check that identifier ranges are contiguous and sum the sizes
    /// 4. Create `data0.db` if there was nothing to load
    ///
    /// Any failure is fatal and surfaces as `PoolInit`.
    pub fn open(config: PoolConfig) -> Result<Self> {
        config.validate()?;

        let directory =
            ShardDirectory::open(&config.project_dir).map_err(|e| AptaError::PoolInit {
                path: config.project_dir.clone(),
                source: Box::new(e),
            })?;

        let set = ShardSet::bootstrap(&directory, config.max_shard_capacity).map_err(|e| {
            AptaError::PoolInit {
                path: directory.root().to_path_buf(),
                source: Box::new(e),
            }
        })?;

        tracing::info!(
            "Opened pool in {} ({} shards, {} sequences)",
            directory.root().display(),
            set.shards.len(),
            set.total_size
        );

        Ok(Self {
            config,
            directory,
            state: RwLock::new(PoolState::Open(set)),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified project directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(PoolConfig::builder().project_dir(path).build())
    }

    // =========================================================================
    // Registration / Lookup
    // =========================================================================

    /// Identifier of `sequence`, if registered
    pub fn lookup(&self, sequence: &[u8]) -> Result<Option<Identifier>> {
        let state = self.state.read();
        state.open()?.lookup(sequence)
    }

    /// Whether `sequence` is registered
    pub fn contains(&self, sequence: &[u8]) -> Result<bool> {
        Ok(self.lookup(sequence)?.is_some())
    }

    /// Register `sequence` and return its identifier
    ///
    /// Idempotent: a sequence registered before gets its existing
    /// identifier back and the pool does not grow.
    pub fn register(&self, sequence: &[u8]) -> Result<Identifier> {
        {
            let state = self.state.read();
            if let Some(id) = state.open()?.lookup(sequence)? {
                return Ok(id);
            }
        }

        let mut state = self.state.write();
        let set = state.open_mut()?;

        // Another writer may have inserted it between the two guards
        if let Some(id) = set.lookup(sequence)? {
            return Ok(id);
        }

        set.insert(sequence, &self.directory, self.config.max_shard_capacity)
    }

    /// Sequence registered under `id`, if any
    pub fn get_sequence(&self, id: Identifier) -> Result<Option<Vec<u8>>> {
        let state = self.state.read();
        let set = state.open()?;

        // first_id ascends with shard order
        let raw = identifier::to_stored(id);
        let pos = set.shards.partition_point(|shard| shard.first_id() <= raw);
        match pos.checked_sub(1) {
            Some(i) => set.shards[i].sequence_of(id),
            None => Ok(None),
        }
    }

    /// Visit every registered sequence in identifier order
    ///
    /// Holds the shared lock for the whole walk; registrations wait.
    pub fn for_each<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], Identifier),
    {
        let state = self.state.read();
        for shard in &state.open()?.shards {
            shard.for_each(&mut f)?;
        }
        Ok(())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Persist pending writes of every shard without closing
    pub fn flush(&self) -> Result<()> {
        let state = self.state.read();
        for shard in &state.open()?.shards {
            shard.flush()?;
        }
        Ok(())
    }

    /// Close every shard
    ///
    /// Valid exactly once; a second call fails with `PoolClosed`. All shards
    /// are closed even if one fails, and the first failure is returned.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.write();
        match mem::replace(&mut *state, PoolState::Closed) {
            PoolState::Open(mut set) => {
                let total = set.total_size;
                let count = set.shards.len();
                set.close_all()?;
                tracing::info!("Closed pool ({} shards, {} sequences)", count, total);
                Ok(())
            }
            PoolState::Closed => Err(AptaError::PoolClosed),
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.state.read(), PoolState::Closed)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Number of distinct sequences
    pub fn size(&self) -> Result<usize> {
        Ok(self.state.read().open()?.total_size as usize)
    }

    /// Number of shards, sealed ones included
    pub fn shard_count(&self) -> Result<usize> {
        Ok(self.state.read().open()?.shards.len())
    }

    /// Entries in the newest (writable) shard
    pub fn active_shard_fill(&self) -> Result<usize> {
        Ok(self.state.read().open()?.active()?.len())
    }

    pub fn stats(&self) -> Result<PoolStats> {
        let state = self.state.read();
        let set = state.open()?;
        Ok(PoolStats {
            total_size: set.total_size,
            shard_count: set.shards.len(),
            active_shard_fill: set.active()?.len(),
            max_shard_capacity: self.config.max_shard_capacity,
        })
    }

    /// The `pooldata` directory
    pub fn data_dir(&self) -> &Path {
        self.directory.root()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        if let PoolState::Open(set) = self.state.get_mut() {
            tracing::error!(
                "Pool in {} dropped without close(); closing {} shards",
                self.directory.root().display(),
                set.shards.len()
            );
            if let Err(e) = set.close_all() {
                tracing::error!("Failed to close shards on drop: {}", e);
            }
        }
    }
}

impl PoolState {
    fn open(&self) -> Result<&ShardSet> {
        match self {
            PoolState::Open(set) => Ok(set),
            PoolState::Closed => Err(AptaError::PoolClosed),
        }
    }

    fn open_mut(&mut self) -> Result<&mut ShardSet> {
        match self {
            PoolState::Open(set) => Ok(set),
            PoolState::Closed => Err(AptaError::PoolClosed),
        }
    }
}

impl ShardSet {
    fn bootstrap(directory: &ShardDirectory, capacity: u64) -> Result<Self> {
        let files = directory.discover()?;

        let mut shards = Vec::with_capacity(files.len().max(1));
        let mut total_size = 0u64;
        for file in &files {
            let shard = Shard::load(&file.path)?;

            let expected = identifier::to_stored(FIRST_IDENTIFIER) + total_size;
            if shard.first_id() != expected {
                return Err(AptaError::Corrupt(format!(
                    "{} starts at identifier {} but {} was expected",
                    file.path.display(),
                    shard.first_id(),
                    expected
                )));
            }

            total_size += shard.len() as u64;
            shards.push(shard);
        }

        let mut next_index = files.last().map(|f| f.index + 1).unwrap_or(0);
        if shards.is_empty() {
            shards.push(Shard::create(
                &directory.shard_path(next_index),
                capacity,
                FIRST_IDENTIFIER,
            )?);
            next_index += 1;
        }

        Ok(Self {
            shards,
            total_size,
            next_index,
        })
    }

    /// Search newest → oldest
    ///
    /// The order is a locality heuristic only: recently registered
    /// sequences tend to be queried again soon. Shard order says nothing
    /// about which keys a shard holds, so a miss means every shard was
    /// searched.
    fn lookup(&self, sequence: &[u8]) -> Result<Option<Identifier>> {
        for shard in self.shards.iter().rev() {
            if let Some(id) = shard.get(sequence)? {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    /// Allocate the next identifier and store `sequence` under it
    ///
    /// Must run under the exclusive guard, after a lookup miss.
    fn insert(
        &mut self,
        sequence: &[u8],
        directory: &ShardDirectory,
        capacity: u64,
    ) -> Result<Identifier> {
        let next = self
            .total_size
            .checked_add(1)
            .ok_or(AptaError::IdentifierOverflow)?;
        let id = identifier::from_stored(next)?;

        let result = self.active_mut()?.put(sequence, id);
        match result {
            Err(AptaError::ShardFull { .. }) => {
                self.roll_over(directory, capacity, id)?;
                self.active_mut()?.put(sequence, id)?;
            }
            result => result?,
        }

        self.total_size = next;
        Ok(id)
    }

    /// Flush the sealed shard and open the next one
    fn roll_over(
        &mut self,
        directory: &ShardDirectory,
        capacity: u64,
        first_id: Identifier,
    ) -> Result<()> {
        self.active()?.flush()?;

        let index = self.next_index;
        let shard = Shard::create(&directory.shard_path(index), capacity, first_id)?;
        self.shards.push(shard);
        self.next_index += 1;

        tracing::debug!(
            "Rolled over to shard {} at identifier {} ({} shards)",
            index,
            first_id,
            self.shards.len()
        );
        Ok(())
    }

    fn active(&self) -> Result<&Shard> {
        self.shards
            .last()
            .ok_or_else(|| AptaError::Corrupt("pool has no shards".to_string()))
    }

    fn active_mut(&mut self) -> Result<&mut Shard> {
        self.shards
            .last_mut()
            .ok_or_else(|| AptaError::Corrupt("pool has no shards".to_string()))
    }

    /// Close every shard, returning the first failure
    fn close_all(&mut self) -> Result<()> {
        let mut first_error = None;
        for shard in &mut self.shards {
            if let Err(e) = shard.close() {
                tracing::error!("Failed to close shard {}: {}", shard.path().display(), e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "sequences:          {}", self.total_size)?;
        writeln!(f, "shards:             {}", self.shard_count)?;
        writeln!(
            f,
            "active shard fill:  {}/{}",
            self.active_shard_fill, self.max_shard_capacity
        )
    }
}
