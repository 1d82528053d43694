//! Error types for aptapool
//!
//! Provides a unified error type for all operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using AptaError
pub type Result<T> = std::result::Result<T, AptaError>;

/// Unified error type for aptapool operations
#[derive(Debug, Error)]
pub enum AptaError {
    // -------------------------------------------------------------------------
    // Validation Errors (recoverable: the caller skips the offending read)
    // -------------------------------------------------------------------------
    #[error("Symbol {:?} at position {position} is not in the alphabet", printable(.symbol))]
    Alphabet { symbol: u8, position: usize },

    #[error("Empty sequence")]
    EmptySequence,

    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Startup Errors
    // -------------------------------------------------------------------------
    #[error("Cannot open shard {}: {reason}", .path.display())]
    StorageOpen { path: PathBuf, reason: String },

    #[error("Pool initialization failed in {}: {source}", .path.display())]
    PoolInit {
        path: PathBuf,
        #[source]
        source: Box<AptaError>,
    },

    // -------------------------------------------------------------------------
    // Shard Errors
    // -------------------------------------------------------------------------
    #[error("Shard is full ({capacity} entries)")]
    ShardFull { capacity: u64 },

    #[error("Shard is closed")]
    ShardClosed,

    #[error("Key already present in shard")]
    DuplicateKey,

    #[error("Shard corruption detected: {0}")]
    Corrupt(String),

    // -------------------------------------------------------------------------
    // Pool Errors
    // -------------------------------------------------------------------------
    #[error("Pool is closed")]
    PoolClosed,

    #[error("Identifier space exhausted")]
    IdentifierOverflow,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

fn printable(symbol: &u8) -> char {
    char::from(*symbol)
}

impl AptaError {
    /// Whether the caller may skip the offending input and carry on.
    ///
    /// Only validation failures qualify; storage and lifecycle errors leave
    /// the pool in a state the ingest pipeline must not continue past.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, AptaError::Alphabet { .. } | AptaError::EmptySequence)
    }
}
