//! Tests for Pool
//!
//! These tests verify:
//! - Idempotent registration and dense identifiers
//! - Shard rollover and lookups across shards
//! - Restart durability and bootstrap checks
//! - The Open → Closed lifecycle

use std::collections::HashSet;

use aptapool::config::MAX_SHARD_CAPACITY;
use aptapool::{AptaError, Identifier, Pool, PoolConfig};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_pool(capacity: u64) -> (TempDir, Pool) {
    let temp_dir = TempDir::new().unwrap();
    let pool = open_pool(&temp_dir, capacity);
    (temp_dir, pool)
}

fn open_pool(temp_dir: &TempDir, capacity: u64) -> Pool {
    let config = PoolConfig::builder()
        .project_dir(temp_dir.path())
        .max_shard_capacity(capacity)
        .build();
    Pool::open(config).unwrap()
}

/// Distinct 12-mer for every `i`
fn sequence(i: usize) -> Vec<u8> {
    const BASES: &[u8; 4] = b"ACGT";
    (0..12).map(|k| BASES[(i >> (2 * k)) & 3]).collect()
}

// =============================================================================
// Open Tests
// =============================================================================

#[test]
fn test_open_creates_first_shard() {
    let (temp, pool) = setup_temp_pool(10);

    assert_eq!(pool.data_dir(), temp.path().join("pooldata"));
    assert!(temp.path().join("pooldata").join("data0.db").exists());
    assert_eq!(pool.size().unwrap(), 0);
    assert_eq!(pool.shard_count().unwrap(), 1);
    assert_eq!(pool.active_shard_fill().unwrap(), 0);

    pool.close().unwrap();
}

#[test]
fn test_open_rejects_zero_capacity() {
    let temp_dir = TempDir::new().unwrap();
    let config = PoolConfig::builder()
        .project_dir(temp_dir.path())
        .max_shard_capacity(0)
        .build();

    assert!(matches!(Pool::open(config), Err(AptaError::Config(_))));
}

#[test]
fn test_open_rejects_capacity_above_maximum() {
    let temp_dir = TempDir::new().unwrap();
    let config = PoolConfig::builder()
        .project_dir(temp_dir.path())
        .max_shard_capacity(MAX_SHARD_CAPACITY + 1)
        .build();

    assert!(matches!(Pool::open(config), Err(AptaError::Config(_))));
    assert!(!temp_dir.path().join("pooldata").exists());
}

#[test]
fn test_open_path_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let pool = Pool::open_path(temp_dir.path()).unwrap();

    assert_eq!(pool.config().max_shard_capacity, 1_000_000);
    pool.close().unwrap();
}

// =============================================================================
// Registration Tests
// =============================================================================

#[test]
fn test_register_is_idempotent() {
    let (_temp, pool) = setup_temp_pool(10);

    let first = pool.register(b"ACGTACGT").unwrap();
    assert_eq!(pool.size().unwrap(), 1);

    let second = pool.register(b"ACGTACGT").unwrap();
    assert_eq!(first, second);
    assert_eq!(pool.size().unwrap(), 1);

    pool.close().unwrap();
}

#[test]
fn test_identifiers_are_dense_from_one() {
    let (_temp, pool) = setup_temp_pool(1000);

    let ids: Vec<Identifier> = (0..100).map(|i| pool.register(&sequence(i)).unwrap()).collect();

    let expected: Vec<Identifier> = (1..=100).collect();
    assert_eq!(ids, expected);
    assert_eq!(pool.size().unwrap(), 100);

    pool.close().unwrap();
}

#[test]
fn test_distinct_sequences_get_distinct_identifiers() {
    let (_temp, pool) = setup_temp_pool(7);

    let mut seen = HashSet::new();
    for i in 0..50 {
        assert!(seen.insert(pool.register(&sequence(i)).unwrap()));
    }

    pool.close().unwrap();
}

#[test]
fn test_negative_lookup() {
    let (_temp, pool) = setup_temp_pool(10);
    pool.register(b"AAAA").unwrap();

    assert_eq!(pool.lookup(b"CCCC").unwrap(), None);
    assert!(!pool.contains(b"CCCC").unwrap());
    assert!(pool.contains(b"AAAA").unwrap());

    pool.close().unwrap();
}

#[test]
fn test_lookup_does_not_register() {
    let (_temp, pool) = setup_temp_pool(10);

    pool.lookup(b"AAAA").unwrap();

    assert_eq!(pool.size().unwrap(), 0);
    pool.close().unwrap();
}

// =============================================================================
// Rollover Tests
// =============================================================================

#[test]
fn test_rollover_example() {
    let (temp, pool) = setup_temp_pool(2);

    assert_eq!(pool.register(b"AAAA").unwrap(), 1);
    assert_eq!(pool.register(b"CCCC").unwrap(), 2);
    assert_eq!(pool.shard_count().unwrap(), 1);
    assert_eq!(pool.active_shard_fill().unwrap(), 2);

    assert_eq!(pool.register(b"GGGG").unwrap(), 3);
    assert_eq!(pool.shard_count().unwrap(), 2);
    assert_eq!(pool.active_shard_fill().unwrap(), 1);
    assert!(temp.path().join("pooldata").join("data1.db").exists());

    assert_eq!(pool.lookup(b"AAAA").unwrap(), Some(1));
    assert_eq!(pool.size().unwrap(), 3);

    pool.close().unwrap();
}

#[test]
fn test_rollover_past_capacity_plus_one() {
    let (_temp, pool) = setup_temp_pool(3);

    for i in 0..4 {
        pool.register(&sequence(i)).unwrap();
    }

    assert_eq!(pool.shard_count().unwrap(), 2);
    for i in 0..4 {
        assert_eq!(pool.lookup(&sequence(i)).unwrap(), Some((i + 1) as Identifier));
    }

    pool.close().unwrap();
}

#[test]
fn test_duplicates_from_old_shards_not_reinserted() {
    let (_temp, pool) = setup_temp_pool(2);

    for i in 0..10 {
        pool.register(&sequence(i)).unwrap();
    }
    assert_eq!(pool.shard_count().unwrap(), 5);

    // Sequence 0 lives in the oldest shard
    assert_eq!(pool.register(&sequence(0)).unwrap(), 1);
    assert_eq!(pool.size().unwrap(), 10);
    assert_eq!(pool.shard_count().unwrap(), 5);

    pool.close().unwrap();
}

// =============================================================================
// Reverse Lookup / Iteration Tests
// =============================================================================

#[test]
fn test_get_sequence_across_shards() {
    let (_temp, pool) = setup_temp_pool(3);

    for i in 0..10 {
        pool.register(&sequence(i)).unwrap();
    }

    for i in 0..10 {
        let id = (i + 1) as Identifier;
        assert_eq!(pool.get_sequence(id).unwrap(), Some(sequence(i)));
    }
    assert_eq!(pool.get_sequence(0).unwrap(), None);
    assert_eq!(pool.get_sequence(11).unwrap(), None);

    pool.close().unwrap();
}

#[test]
fn test_for_each_visits_in_identifier_order() {
    let (_temp, pool) = setup_temp_pool(4);

    for i in 0..9 {
        pool.register(&sequence(i)).unwrap();
    }

    let mut visited = Vec::new();
    pool.for_each(|seq, id| visited.push((id, seq.to_vec()))).unwrap();

    let expected: Vec<(Identifier, Vec<u8>)> =
        (0..9).map(|i| ((i + 1) as Identifier, sequence(i))).collect();
    assert_eq!(visited, expected);

    pool.close().unwrap();
}

#[test]
fn test_stats() {
    let (_temp, pool) = setup_temp_pool(4);

    for i in 0..6 {
        pool.register(&sequence(i)).unwrap();
    }

    let stats = pool.stats().unwrap();
    assert_eq!(stats.total_size, 6);
    assert_eq!(stats.shard_count, 2);
    assert_eq!(stats.active_shard_fill, 2);
    assert_eq!(stats.max_shard_capacity, 4);
    assert!(stats.to_string().contains("sequences:"));

    pool.close().unwrap();
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_restart_durability() {
    let temp_dir = TempDir::new().unwrap();

    {
        let pool = open_pool(&temp_dir, 5);
        for i in 0..23 {
            pool.register(&sequence(i)).unwrap();
        }
        pool.close().unwrap();
    }

    {
        let pool = open_pool(&temp_dir, 5);
        assert_eq!(pool.size().unwrap(), 23);
        assert_eq!(pool.shard_count().unwrap(), 5);
        for i in 0..23 {
            assert_eq!(pool.lookup(&sequence(i)).unwrap(), Some((i + 1) as Identifier));
        }
        pool.close().unwrap();
    }
}

#[test]
fn test_identifiers_continue_after_restart() {
    let temp_dir = TempDir::new().unwrap();

    {
        let pool = open_pool(&temp_dir, 2);
        pool.register(b"AAAA").unwrap();
        pool.register(b"CCCC").unwrap();
        pool.close().unwrap();
    }

    {
        // The only shard is full; the next registration rolls over
        let pool = open_pool(&temp_dir, 2);
        assert_eq!(pool.register(b"GGGG").unwrap(), 3);
        assert_eq!(pool.register(b"AAAA").unwrap(), 1);
        assert_eq!(pool.shard_count().unwrap(), 2);
        pool.close().unwrap();
    }
}

#[test]
fn test_reopen_after_unclean_shutdown() {
    let temp_dir = TempDir::new().unwrap();

    {
        let pool = open_pool(&temp_dir, 4);
        for i in 0..6 {
            pool.register(&sequence(i)).unwrap();
        }
        // Neither close() nor Drop runs
        std::mem::forget(pool);
    }

    let pool = open_pool(&temp_dir, 4);
    assert_eq!(pool.size().unwrap(), 6);
    assert_eq!(pool.register(&sequence(6)).unwrap(), 7);
    pool.close().unwrap();
}

#[test]
fn test_drop_without_close_still_persists() {
    let temp_dir = TempDir::new().unwrap();

    {
        let pool = open_pool(&temp_dir, 4);
        pool.register(b"ACGT").unwrap();
    }

    let pool = open_pool(&temp_dir, 4);
    assert_eq!(pool.lookup(b"ACGT").unwrap(), Some(1));
    pool.close().unwrap();
}

#[test]
fn test_ignores_non_shard_files() {
    let temp_dir = TempDir::new().unwrap();

    {
        let pool = open_pool(&temp_dir, 4);
        pool.register(b"ACGT").unwrap();
        pool.close().unwrap();
    }

    std::fs::write(temp_dir.path().join("pooldata").join("README"), b"hello").unwrap();

    let pool = open_pool(&temp_dir, 4);
    assert_eq!(pool.shard_count().unwrap(), 1);
    assert_eq!(pool.size().unwrap(), 1);
    pool.close().unwrap();
}

#[test]
fn test_corrupt_shard_fails_init() {
    let temp_dir = TempDir::new().unwrap();

    {
        let pool = open_pool(&temp_dir, 4);
        pool.close().unwrap();
    }

    std::fs::write(
        temp_dir.path().join("pooldata").join("data1.db"),
        vec![0u8; 1024],
    )
    .unwrap();

    let config = PoolConfig::builder()
        .project_dir(temp_dir.path())
        .max_shard_capacity(4)
        .build();
    let err = Pool::open(config).err().unwrap();
    assert!(matches!(err, AptaError::PoolInit { .. }));
}

#[test]
fn test_oversized_shard_header_fails_init() {
    let temp_dir = TempDir::new().unwrap();
    let pooldata = temp_dir.path().join("pooldata");
    std::fs::create_dir_all(&pooldata).unwrap();

    // Valid magic and version, but region sizes that overflow any address space
    let mut header = Vec::with_capacity(48);
    header.extend_from_slice(b"APSH");
    header.extend_from_slice(&1u16.to_le_bytes());
    header.extend_from_slice(&0u16.to_le_bytes());
    for field in [1u64 << 61, 1 << 62, 1, 0, 48] {
        header.extend_from_slice(&field.to_le_bytes());
    }
    std::fs::write(pooldata.join("data0.db"), &header).unwrap();

    let config = PoolConfig::builder()
        .project_dir(temp_dir.path())
        .max_shard_capacity(4)
        .build();
    let err = Pool::open(config).err().unwrap();
    match err {
        AptaError::PoolInit { source, .. } => {
            assert!(matches!(*source, AptaError::StorageOpen { .. }))
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_missing_middle_shard_fails_init() {
    let temp_dir = TempDir::new().unwrap();

    {
        let pool = open_pool(&temp_dir, 1);
        for i in 0..3 {
            pool.register(&sequence(i)).unwrap();
        }
        pool.close().unwrap();
    }

    std::fs::remove_file(temp_dir.path().join("pooldata").join("data1.db")).unwrap();

    let config = PoolConfig::builder()
        .project_dir(temp_dir.path())
        .max_shard_capacity(1)
        .build();
    let err = Pool::open(config).err().unwrap();
    match err {
        AptaError::PoolInit { source, .. } => assert!(matches!(*source, AptaError::Corrupt(_))),
        other => panic!("unexpected error: {}", other),
    }
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_operations_after_close_fail() {
    let (_temp, pool) = setup_temp_pool(10);
    pool.register(b"ACGT").unwrap();

    pool.close().unwrap();

    assert!(pool.is_closed());
    assert!(matches!(pool.register(b"ACGT"), Err(AptaError::PoolClosed)));
    assert!(matches!(pool.lookup(b"ACGT"), Err(AptaError::PoolClosed)));
    assert!(matches!(pool.size(), Err(AptaError::PoolClosed)));
    assert!(matches!(pool.get_sequence(1), Err(AptaError::PoolClosed)));
    assert!(matches!(pool.flush(), Err(AptaError::PoolClosed)));
}

#[test]
fn test_close_twice_fails() {
    let (_temp, pool) = setup_temp_pool(10);

    pool.close().unwrap();

    assert!(matches!(pool.close(), Err(AptaError::PoolClosed)));
}

#[test]
fn test_flush_keeps_pool_open() {
    let (_temp, pool) = setup_temp_pool(10);

    pool.register(b"ACGT").unwrap();
    pool.flush().unwrap();
    pool.register(b"TGCA").unwrap();

    assert_eq!(pool.size().unwrap(), 2);
    pool.close().unwrap();
}
