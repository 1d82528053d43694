//! Storage Module
//!
//! Persistent storage layer: bounded on-disk shards and the directory that
//! holds them.
//!
//! ## Responsibilities
//! - Map byte strings to identifiers on disk, one bounded shard per file
//! - Discover existing shard files on startup, in creation order
//! - Recover shards left dirty by an unclean shutdown
//!
//! Shards are alphabet-agnostic: keys are opaque bytes compared for
//! equality and hashed for placement.

mod directory;
mod shard;

pub use directory::{ShardDirectory, ShardFile};
pub use shard::{RecoveryReport, Shard, ShardState};
