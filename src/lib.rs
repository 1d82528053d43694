//! # aptapool
//!
//! A deduplicating sequence-to-identifier store for HT-SELEX data:
//! - Exactly one dense identifier per distinct sequence, starting at 1
//! - Transparent sharding across bounded, memory-mapped hash table files
//! - Restart from whatever shard files exist on disk
//! - Concurrent lookups, serialized registration of new sequences
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      AptamerPool                             │
//! │               (alphabet validation boundary)                 │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                         Pool                                 │
//! │        (dedup check + identifier allocation, RwLock)         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │  newest → oldest
//!          ┌────────────┼────────────┐
//!          ▼            ▼            ▼
//!   ┌───────────┐ ┌───────────┐ ┌───────────┐
//!   │  data0.db │ │  data1.db │ │  dataN.db │
//!   │ (Sealed)  │ │ (Sealed)  │ │(Writable) │
//!   └───────────┘ └───────────┘ └───────────┘
//!            pooldata/  (ShardDirectory)
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod alphabet;
pub mod identifier;
pub mod storage;
pub mod pool;
pub mod aptamers;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{AptaError, Result};
pub use config::PoolConfig;
pub use alphabet::Alphabet;
pub use identifier::Identifier;
pub use pool::{Pool, PoolStats};
pub use aptamers::AptamerPool;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of aptapool
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
