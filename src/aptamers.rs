//! Aptamer pool
//!
//! The contract the rest of the application talks to. Every sequence is
//! validated against the configured alphabet before it reaches the pool, so
//! an invalid read never touches storage. Registration rejects it with an
//! alphabet error; queries report it as not registered.

use std::path::Path;

use crate::alphabet::Alphabet;
use crate::config::PoolConfig;
use crate::error::Result;
use crate::identifier::Identifier;
use crate::pool::{Pool, PoolStats};

/// Validating front end over a `Pool`
pub struct AptamerPool {
    pool: Pool,
    alphabet: Alphabet,
}

impl AptamerPool {
    /// Open the pool described by `config`
    pub fn open(config: PoolConfig) -> Result<Self> {
        let alphabet = config.alphabet.clone();
        let pool = Pool::open(config)?;
        Ok(Self { pool, alphabet })
    }

    /// Open with default settings under `project_dir`
    pub fn open_path(project_dir: &Path) -> Result<Self> {
        Self::open(PoolConfig::builder().project_dir(project_dir).build())
    }

    /// Register a sequence, returning its (possibly existing) identifier
    pub fn register_aptamer(&self, sequence: &[u8]) -> Result<Identifier> {
        self.alphabet.validate(sequence)?;
        self.pool.register(sequence)
    }

    /// Identifier of a registered sequence; `None` means not registered
    ///
    /// A sequence outside the alphabet can never have been registered, so
    /// it is reported absent without a storage lookup.
    pub fn get_identifier(&self, sequence: &[u8]) -> Result<Option<Identifier>> {
        if self.alphabet.validate(sequence).is_err() {
            return Ok(None);
        }
        self.pool.lookup(sequence)
    }

    pub fn has_aptamer(&self, sequence: &[u8]) -> Result<bool> {
        Ok(self.get_identifier(sequence)?.is_some())
    }

    /// Sequence registered under `id`
    pub fn get_aptamer(&self, id: Identifier) -> Result<Option<Vec<u8>>> {
        self.pool.get_sequence(id)
    }

    /// Number of distinct sequences
    pub fn size(&self) -> Result<usize> {
        self.pool.size()
    }

    pub fn stats(&self) -> Result<PoolStats> {
        self.pool.stats()
    }

    pub fn flush(&self) -> Result<()> {
        self.pool.flush()
    }

    pub fn close(&self) -> Result<()> {
        self.pool.close()
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    /// The underlying pool, for iteration and reverse lookups
    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}
