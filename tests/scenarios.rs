//! End-to-end scenarios over `SkipList<SlabList<u32>>`.
//!
//! Run with: `cargo test --test scenarios`
//!
//! ```bash
//! # Watch lanes being built and torn down
//! RUST_LOG=dirlanes=debug cargo test --features tracing --test scenarios
//! ```

#![expect(clippy::unwrap_used, reason = "fail fast in tests")]

mod common;

use dirlanes::{
    EntryList, IndexConfig, IndexError, InsertFlags, InsertOutcome, SkipList, SlabList,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

type Index = SkipList<SlabList<u32>>;

fn index(prob: u32) -> Index {
    SkipList::create(SlabList::new(), prob).unwrap()
}

fn insert(index: &Index, key: u32) -> InsertOutcome<dirlanes::EntryId> {
    let id = index.list().alloc(key);
    let outcome = index.insert(&key, id, InsertFlags::NONE).unwrap();
    if !outcome.is_inserted() {
        index.list().free(id);
    }
    outcome
}

fn level0_sum(index: &Index) -> usize {
    index.lane_counts(0).iter().sum()
}

// =============================================================================
// Scenario A: below the fast-lane threshold
// =============================================================================

#[test]
fn scenario_a_rows_without_lanes() {
    common::init_tracing();
    let index = index(4);

    for key in [5, 1, 3] {
        assert!(insert(&index, key).is_inserted());
    }

    assert_eq!(index.lane_depth(), 0);
    assert_eq!(index.find(&3).unwrap().row, 2);
    assert_eq!(index.find(&1).unwrap().row, 1);
    assert_eq!(index.find(&5).unwrap().row, 3);
    assert_eq!(index.find(&4), Err(IndexError::NotFound));
}

// =============================================================================
// Scenario B: lanes appear, counts survive a delete
// =============================================================================

#[test]
fn scenario_b_lanes_and_counts() {
    common::init_tracing();
    let index = index(4);

    for key in 1..=20 {
        insert(&index, key);
    }
    assert!(index.lane_depth() >= 1);
    assert_eq!(level0_sum(&index), 20);

    let gone = index.delete(&10).unwrap();
    assert_eq!(gone.row, 10);
    assert_eq!(index.list().get(gone.entry), Some(10));
    index.list().free(gone.entry);

    assert_eq!(index.list().count(), 19);
    assert_eq!(level0_sum(&index), 19);
    for level in 0..index.lane_depth() {
        assert_eq!(index.lane_counts(level).iter().sum::<usize>(), 19, "lane {level}");
    }
    index.validate().unwrap();
}

// =============================================================================
// Scenario C: successor seek
// =============================================================================

#[test]
fn scenario_c_seek() {
    common::init_tracing();
    let index = index(2);

    for key in (10..=100).step_by(10) {
        insert(&index, key);
    }

    let next = index.seek(&35).unwrap();
    assert_eq!(index.list().get(next.entry), Some(40));
    assert_eq!(next.row, 4);

    let next = index.seek(&40).unwrap();
    assert_eq!(index.list().get(next.entry), Some(50));
    assert_eq!(next.row, 5);

    assert_eq!(index.seek(&100), Err(IndexError::NotFound));
    assert_eq!(index.seek(&150), Err(IndexError::NotFound));

    let first = index.seek(&1).unwrap();
    assert_eq!(index.list().get(first.entry), Some(10));
    assert_eq!(first.row, 1);
}

// =============================================================================
// Scenario D: a reader racing an insert sees before or after, never between
// =============================================================================

#[test]
fn scenario_d_find_during_insert() {
    common::init_tracing();

    const K: u32 = 5001;
    let index = Arc::new(index(4));

    // Even keys stay put, so K always sits at row 2502 when present.
    for key in (0..=10_000).step_by(2) {
        insert(&index, key);
    }
    let expected_row = 2502;

    let done = Arc::new(AtomicBool::new(false));
    let hits = Arc::new(AtomicUsize::new(0));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let index = Arc::clone(&index);
            let done = Arc::clone(&done);
            let hits = Arc::clone(&hits);
            thread::spawn(move || {
                while !done.load(Ordering::Acquire) {
                    match index.find(&K) {
                        Ok(hit) => {
                            assert_eq!(hit.row, expected_row);
                            hits.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(IndexError::NotFound | IndexError::Again) => {}
                        Err(err) => panic!("unexpected {err}"),
                    }
                }
            })
        })
        .collect();

    let id = index.list().alloc(K);
    for _ in 0..500 {
        loop {
            match index.insert(&K, id, InsertFlags::NONE) {
                Ok(outcome) => {
                    assert!(outcome.is_inserted());
                    break;
                }
                Err(IndexError::Again) => thread::yield_now(),
                Err(err) => panic!("insert failed: {err}"),
            }
        }
        loop {
            match index.delete(&K) {
                Ok(gone) => {
                    assert_eq!(gone.entry, id);
                    assert_eq!(gone.row, expected_row);
                    break;
                }
                Err(IndexError::Again) => thread::yield_now(),
                Err(err) => panic!("delete failed: {err}"),
            }
        }
    }
    done.store(true, Ordering::Release);

    for reader in readers {
        reader.join().unwrap();
    }

    assert_eq!(index.list().count(), 5001);
    assert_eq!(index.find(&K), Err(IndexError::NotFound));
    index.validate().unwrap();
}

// =============================================================================
// Round trip, idempotence, count invariant
// =============================================================================

#[test]
fn round_trip_leaves_no_lanes() {
    common::init_tracing();
    let index = index(2);
    let counters = index.alloc_counters();

    for key in 0..500 {
        insert(&index, key * 7 % 500);
    }
    assert!(index.lane_depth() > 1);

    for key in 0..500 {
        let gone = index.delete(&key).unwrap();
        index.list().free(gone.entry);
    }

    assert_eq!(index.list().count(), 0);
    assert_eq!(index.lane_depth(), 0);
    assert_eq!(index.dirnode_count(), 0);
    assert_eq!(counters.live(), 0);
    assert_eq!(index.list().allocated(), 0);
}

#[test]
fn duplicate_insert_is_idempotent() {
    common::init_tracing();
    let index = index(4);

    for key in 0..50 {
        insert(&index, key);
    }
    let before = index.lane_counts(0);

    let id = index.list().alloc(25);
    let outcome = index.insert(&25, id, InsertFlags::NONE).unwrap();
    assert!(!outcome.is_inserted());
    assert_eq!(outcome.error(), Some(IndexError::Exists));
    assert_eq!(outcome.located().row, 26);
    assert!(!index.list().is_linked(id));
    index.list().free(id);

    assert_eq!(index.list().count(), 50);
    assert_eq!(index.lane_counts(0), before);
}

#[test]
fn rows_match_linear_scan() {
    common::init_tracing();
    let index = SkipList::init(SlabList::new(), IndexConfig::with_prob(3)).unwrap();

    let mut state = 12_345_u32;
    for _ in 0..800 {
        state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        let key = state % 2000;
        let id = index.list().alloc(key);
        if !index.insert(&key, id, InsertFlags::NONE).unwrap().is_inserted() {
            index.list().free(id);
        }
        if state % 5 == 0 {
            if let Ok(gone) = index.delete(&(key / 2)) {
                index.list().free(gone.entry);
            }
        }
    }

    for (pos, key) in index.list().iter().enumerate() {
        let hit = index.find(&key).unwrap();
        assert_eq!(hit.row, pos + 1, "key {key}");
    }
    assert_eq!(level0_sum(&index), index.len());
    index.validate().unwrap();
}

#[test]
fn existing_entries_are_reachable_before_lanes() {
    common::init_tracing();

    // Entries linked before the index sees the list.
    let list = SlabList::new();
    let mut last = None;
    for key in [2_u32, 4, 6, 8] {
        let id = list.alloc(key);
        list.insert_after(id, last);
        last = Some(id);
    }

    let index = SkipList::create(list, 2).unwrap();
    assert_eq!(index.find(&6).unwrap().row, 3);

    insert(&index, 5);
    assert_eq!(index.find(&6).unwrap().row, 4);
    assert_eq!(index.list().values(), vec![2, 4, 5, 6, 8]);
}
