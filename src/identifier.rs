//! Sequence identifiers
//!
//! Dense surrogate keys handed out in registration order, starting at 1.
//! Shard files always store them as 64-bit values; the in-memory width is
//! chosen at compile time.

use crate::error::{AptaError, Result};

/// Identifier assigned to a distinct sequence
#[cfg(not(feature = "wide-ids"))]
pub type Identifier = u32;

/// Identifier assigned to a distinct sequence
#[cfg(feature = "wide-ids")]
pub type Identifier = u64;

/// The identifier given to the very first registered sequence
pub const FIRST_IDENTIFIER: Identifier = 1;

/// Narrow a stored 64-bit value to an `Identifier`
pub(crate) fn from_stored(raw: u64) -> Result<Identifier> {
    Identifier::try_from(raw).map_err(|_| AptaError::IdentifierOverflow)
}

/// Widen an `Identifier` for storage
pub(crate) fn to_stored(id: Identifier) -> u64 {
    u64::from(id)
}
