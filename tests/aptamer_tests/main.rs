//! Tests for the validating AptamerPool boundary

use aptapool::{Alphabet, AptaError, AptamerPool, PoolConfig};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_aptamer_pool(alphabet: Alphabet) -> (TempDir, AptamerPool) {
    let temp_dir = TempDir::new().unwrap();
    let config = PoolConfig::builder()
        .project_dir(temp_dir.path())
        .max_shard_capacity(2)
        .alphabet(alphabet)
        .build();
    let pool = AptamerPool::open(config).unwrap();
    (temp_dir, pool)
}

// =============================================================================
// Contract Tests
// =============================================================================

#[test]
fn test_register_and_query() {
    let (_temp, pool) = setup_aptamer_pool(Alphabet::dna());

    assert_eq!(pool.register_aptamer(b"AAAA").unwrap(), 1);
    assert_eq!(pool.register_aptamer(b"CCCC").unwrap(), 2);
    assert_eq!(pool.register_aptamer(b"GGGG").unwrap(), 3);

    assert_eq!(pool.get_identifier(b"AAAA").unwrap(), Some(1));
    assert!(pool.has_aptamer(b"GGGG").unwrap());
    assert_eq!(pool.get_aptamer(2).unwrap(), Some(b"CCCC".to_vec()));
    assert_eq!(pool.size().unwrap(), 3);
    assert_eq!(pool.stats().unwrap().shard_count, 2);

    pool.close().unwrap();
}

#[test]
fn test_unregistered_sequence_is_absent() {
    let (_temp, pool) = setup_aptamer_pool(Alphabet::dna());

    pool.register_aptamer(b"ACGT").unwrap();

    assert_eq!(pool.get_identifier(b"TTTT").unwrap(), None);
    assert!(!pool.has_aptamer(b"TTTT").unwrap());

    pool.close().unwrap();
}

#[test]
fn test_invalid_sequence_never_stored() {
    let (_temp, pool) = setup_aptamer_pool(Alphabet::dna());

    let err = pool.register_aptamer(b"ACGN").unwrap_err();

    assert!(matches!(err, AptaError::Alphabet { symbol: b'N', position: 3 }));
    assert!(err.is_recoverable());
    assert_eq!(pool.size().unwrap(), 0);
    assert!(pool.pool().lookup(b"ACGN").unwrap().is_none());

    pool.close().unwrap();
}

#[test]
fn test_invalid_query_is_absent() {
    let (_temp, pool) = setup_aptamer_pool(Alphabet::dna());
    pool.register_aptamer(b"ACGT").unwrap();

    assert_eq!(pool.get_identifier(b"acgt").unwrap(), None);
    assert_eq!(pool.get_identifier(b"ACGN").unwrap(), None);
    assert_eq!(pool.get_identifier(b"").unwrap(), None);
    assert!(!pool.has_aptamer(b"ACGN").unwrap());
    assert!(!pool.has_aptamer(b"").unwrap());

    // Queries never register anything
    assert_eq!(pool.size().unwrap(), 1);

    pool.close().unwrap();
}

#[test]
fn test_rna_alphabet() {
    let (_temp, pool) = setup_aptamer_pool(Alphabet::rna());

    assert_eq!(pool.register_aptamer(b"ACGU").unwrap(), 1);
    assert!(pool.register_aptamer(b"ACGT").is_err());
    assert_eq!(pool.alphabet().name(), "rna");

    pool.close().unwrap();
}

#[test]
fn test_storage_errors_are_not_recoverable() {
    let (_temp, pool) = setup_aptamer_pool(Alphabet::dna());
    pool.close().unwrap();

    let err = pool.register_aptamer(b"ACGT").unwrap_err();
    assert!(matches!(err, AptaError::PoolClosed));
    assert!(!err.is_recoverable());
}

#[test]
fn test_reopen_with_open_path() {
    let temp_dir = TempDir::new().unwrap();

    {
        let pool = AptamerPool::open_path(temp_dir.path()).unwrap();
        pool.register_aptamer(b"ACGTACGT").unwrap();
        pool.flush().unwrap();
        pool.close().unwrap();
    }

    let pool = AptamerPool::open_path(temp_dir.path()).unwrap();
    assert_eq!(pool.get_identifier(b"ACGTACGT").unwrap(), Some(1));
    pool.close().unwrap();
}
