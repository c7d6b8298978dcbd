//! Integration tests for lock tables shared through separate mappings
//!
//! Each "worker" here attaches to the table file on its own, the same way
//! independent processes do, so every lock operation crosses mappings.

use shmcache_core::{LockTableConfig, LockTableConfigBuilder};
use shmcache_ipc::{LockStats, LockTable};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;

fn table_config(temp_dir: &TempDir, slots: u32) -> LockTableConfig {
    LockTableConfigBuilder::new()
        .with_path(temp_dir.path().join("cache.locks"))
        .with_slots(slots)
        .build()
        .unwrap()
}

/// Three workers share one slot: A reads, B writes and then streams while
/// C reads the partial entry, and B finally rewrites the entry from scratch.
#[test]
fn test_streaming_scenario_across_mappings() {
    let temp_dir = TempDir::new().unwrap();
    let config = table_config(&temp_dir, 16);
    let _owner = LockTable::create(&config).unwrap();

    let a = LockTable::open(&config.path).unwrap();
    let b = LockTable::open(&config.path).unwrap();
    let c = LockTable::open(&config.path).unwrap();
    const SLOT: usize = 9;

    assert!(a.slot(SLOT).unwrap().lock_shared());
    assert_eq!(b.slot(SLOT).unwrap().readers(), 1);
    assert!(!b.slot(SLOT).unwrap().lock_exclusive());
    a.slot(SLOT).unwrap().unlock_shared();

    assert!(b.slot(SLOT).unwrap().lock_exclusive());
    assert!(c.slot(SLOT).unwrap().is_writing());
    assert!(!c.slot(SLOT).unwrap().lock_shared());

    b.slot(SLOT).unwrap().start_appending();
    assert!(c.slot(SLOT).unwrap().lock_shared());
    assert_eq!(a.slot(SLOT).unwrap().to_string(), "1RWA");

    assert!(!b.slot(SLOT).unwrap().stop_appending_and_restore_exclusive());
    c.slot(SLOT).unwrap().unlock_shared();
    b.slot(SLOT).unwrap().unlock_exclusive();

    assert!(b.slot(SLOT).unwrap().lock_exclusive());
    assert_eq!(a.stats().writers, 1);
}

#[test]
fn test_workers_race_for_one_slot() {
    const WORKERS: usize = 6;
    const ROUNDS: usize = 2_000;

    let temp_dir = TempDir::new().unwrap();
    let config = table_config(&temp_dir, 4);
    let _owner = LockTable::create(&config).unwrap();

    let barrier = Arc::new(Barrier::new(WORKERS));
    let writers_inside = Arc::new(AtomicUsize::new(0));
    let readers_inside = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..WORKERS)
        .map(|worker| {
            let path = config.path.clone();
            let barrier = Arc::clone(&barrier);
            let writers_inside = Arc::clone(&writers_inside);
            let readers_inside = Arc::clone(&readers_inside);
            thread::spawn(move || {
                let table = LockTable::open(&path).unwrap();
                let lock = table.slot(2).unwrap();
                let mut granted = 0usize;
                barrier.wait();

                for round in 0..ROUNDS {
                    if (worker + round) % 3 == 0 {
                        if lock.lock_exclusive() {
                            assert_eq!(writers_inside.fetch_add(1, Ordering::SeqCst), 0);
                            assert_eq!(readers_inside.load(Ordering::SeqCst), 0);
                            writers_inside.fetch_sub(1, Ordering::SeqCst);
                            lock.unlock_exclusive();
                            granted += 1;
                        }
                    } else if lock.lock_shared() {
                        readers_inside.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(writers_inside.load(Ordering::SeqCst), 0);
                        readers_inside.fetch_sub(1, Ordering::SeqCst);
                        lock.unlock_shared();
                        granted += 1;
                    }
                }
                granted
            })
        })
        .collect();

    let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert!(granted > 0);

    let table = LockTable::open(&config.path).unwrap();
    assert_eq!(table.stats().idle, 4);
}

#[test]
fn test_stats_from_another_mapping() {
    let temp_dir = TempDir::new().unwrap();
    let config = table_config(&temp_dir, 10);
    let worker = LockTable::create(&config).unwrap();
    let observer = LockTable::open(&config.path).unwrap();

    assert!(worker.slot(0).unwrap().lock_shared());
    assert!(worker.slot(0).unwrap().lock_shared());
    assert!(worker.slot(5).unwrap().lock_exclusive());
    worker.slot(5).unwrap().start_appending();
    assert!(worker.slot(7).unwrap().lock_headers());

    let stats = observer.stats();
    assert_eq!(
        stats,
        LockStats {
            count: 10,
            readable: 2,
            writeable: 1,
            idle: 7,
            readers: 3,
            writers: 1,
            appenders: 1,
        }
    );
}
