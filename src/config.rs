//! Configuration for aptapool
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::alphabet::Alphabet;
use crate::error::{AptaError, Result};

/// Default number of entries a single shard may hold
pub const DEFAULT_MAX_SHARD_CAPACITY: u64 = 1_000_000;

/// Largest per-shard capacity a pool accepts
pub const MAX_SHARD_CAPACITY: u64 = 1 << 32;

/// Main configuration for a pool instance
#[derive(Debug, Clone)]
pub struct PoolConfig {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Project directory. Internal structure:
    ///   {project_dir}/
    ///     └── pooldata/
    ///           ├── data0.db
    ///           ├── data1.db
    ///           └── ...
    pub project_dir: PathBuf,

    /// Entries per shard before a new shard is opened
    pub max_shard_capacity: u64,

    // -------------------------------------------------------------------------
    // Boundary Configuration
    // -------------------------------------------------------------------------
    /// Symbols accepted by `AptamerPool`
    pub alphabet: Alphabet,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            project_dir: PathBuf::from("."),
            max_shard_capacity: DEFAULT_MAX_SHARD_CAPACITY,
            alphabet: Alphabet::dna(),
        }
    }
}

impl PoolConfig {
    /// Create a new config builder
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::default()
    }

    /// Reject settings the pool cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_shard_capacity == 0 {
            return Err(AptaError::Config(
                "max_shard_capacity must be at least 1".to_string(),
            ));
        }
        if self.max_shard_capacity > MAX_SHARD_CAPACITY {
            return Err(AptaError::Config(format!(
                "max_shard_capacity {} exceeds the maximum of {}",
                self.max_shard_capacity, MAX_SHARD_CAPACITY
            )));
        }
        Ok(())
    }
}

/// Builder for PoolConfig
#[derive(Default)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    /// Set the project directory (pool data lives under `pooldata/`)
    pub fn project_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.project_dir = path.into();
        self
    }

    /// Set the per-shard entry limit
    pub fn max_shard_capacity(mut self, capacity: u64) -> Self {
        self.config.max_shard_capacity = capacity;
        self
    }

    /// Set the alphabet used for boundary validation
    pub fn alphabet(mut self, alphabet: Alphabet) -> Self {
        self.config.alphabet = alphabet;
        self
    }

    pub fn build(self) -> PoolConfig {
        self.config
    }
}
