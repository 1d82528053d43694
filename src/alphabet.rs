//! Alphabet validation
//!
//! Sequences are checked against the permitted symbol set before they reach
//! the pool. The storage core itself only compares and hashes bytes.

use crate::error::{AptaError, Result};

/// A set of permitted sequence symbols
#[derive(Clone, PartialEq, Eq)]
pub struct Alphabet {
    name: &'static str,
    allowed: [bool; 256],
}

impl Alphabet {
    /// Build an alphabet from an explicit symbol list
    pub fn from_symbols(symbols: &[u8]) -> Self {
        Self::named("custom", symbols)
    }

    /// Unambiguous DNA nucleotides (`ACGT`)
    pub fn dna() -> Self {
        Self::named("dna", b"ACGT")
    }

    /// Unambiguous RNA nucleotides (`ACGU`)
    pub fn rna() -> Self {
        Self::named("rna", b"ACGU")
    }

    /// DNA plus the IUPAC ambiguity codes
    pub fn iupac() -> Self {
        Self::named("iupac", b"ACGTRYSWKMBDHVN")
    }

    fn named(name: &'static str, symbols: &[u8]) -> Self {
        let mut allowed = [false; 256];
        for &symbol in symbols {
            allowed[symbol as usize] = true;
        }
        Self { name, allowed }
    }

    /// Short name of this alphabet ("dna", "rna", "iupac" or "custom")
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether a single symbol is permitted
    pub fn contains(&self, symbol: u8) -> bool {
        self.allowed[symbol as usize]
    }

    /// Check a whole sequence
    ///
    /// Fails on empty input, or reports the first offending symbol and
    /// its position.
    pub fn validate(&self, sequence: &[u8]) -> Result<()> {
        if sequence.is_empty() {
            return Err(AptaError::EmptySequence);
        }

        match sequence.iter().position(|&s| !self.contains(s)) {
            Some(position) => Err(AptaError::Alphabet {
                symbol: sequence[position],
                position,
            }),
            None => Ok(()),
        }
    }

    /// The permitted symbols, in byte order
    pub fn symbols(&self) -> Vec<u8> {
        (0..=u8::MAX).filter(|&s| self.contains(s)).collect()
    }
}

impl Default for Alphabet {
    fn default() -> Self {
        Self::dna()
    }
}

impl std::fmt::Debug for Alphabet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Alphabet")
            .field("name", &self.name)
            .field("symbols", &String::from_utf8_lossy(&self.symbols()))
            .finish()
    }
}
