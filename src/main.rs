//! Debug binary for the concurrent mixed workload.
//!
//! Runs find/insert/delete/seek from several threads over one index and
//! reports stalls, errors and lane shape. Diagnoses hangs in the lane-bit
//! protocol or the admission lock.
//!
//! Run with:
//! ```bash
//! RUST_LOG=dirlanes=debug cargo run --features tracing
//! ```

#![allow(clippy::unwrap_used)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

use dirlanes::{IndexConfig, IndexError, InsertFlags, InsertOutcome, SkipList, SlabList};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

type Index = SkipList<SlabList<u64>>;

// =============================================================================
// Stall detection
// =============================================================================

/// Last key each worker started and when, in ms since `start`.
/// `u64::MAX` marks a finished worker.
struct Heartbeats {
    start: Instant,
    beats: Vec<(AtomicU64, AtomicU64)>,
}

impl Heartbeats {
    fn new(threads: usize) -> Self {
        Self {
            start: Instant::now(),
            beats: (0..threads)
                .map(|_| (AtomicU64::new(0), AtomicU64::new(0)))
                .collect(),
        }
    }

    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn beat(&self, t: usize, key: u64) {
        let (last_key, at) = &self.beats[t];
        last_key.store(key, Ordering::Relaxed);
        at.store(self.now_ms(), Ordering::Relaxed);
    }

    fn finish(&self, t: usize) {
        self.beats[t].1.store(u64::MAX, Ordering::Relaxed);
    }

    fn finished(&self) -> bool {
        self.beats
            .iter()
            .all(|(_, at)| at.load(Ordering::Relaxed) == u64::MAX)
    }

    /// `(thread, key, stalled_ms)` for workers silent longer than `limit_ms`.
    fn stalled(&self, limit_ms: u64) -> impl Iterator<Item = (usize, u64, u64)> + '_ {
        let now = self.now_ms();
        self.beats.iter().enumerate().filter_map(move |(t, (key, at))| {
            let at = at.load(Ordering::Relaxed);
            let silent = now.saturating_sub(at);
            (at != u64::MAX && silent > limit_ms).then_some((t, key.load(Ordering::Relaxed), silent))
        })
    }
}

fn spawn_watchdog(beats: &Arc<Heartbeats>, stop: &Arc<AtomicBool>) -> thread::JoinHandle<()> {
    let beats = Arc::clone(beats);
    let stop = Arc::clone(stop);
    thread::spawn(move || {
        while !stop.load(Ordering::Relaxed) && !beats.finished() {
            thread::sleep(Duration::from_millis(500));
            for (t, key, ms) in beats.stalled(2000) {
                eprintln!("!!! STALLED: T{t:02} on key={key} for {ms}ms");
            }
        }
    })
}

// =============================================================================
// Operations
// =============================================================================

#[derive(Default)]
struct Tally {
    inserted: AtomicUsize,
    existing: AtomicUsize,
    deleted: AtomicUsize,
    again: AtomicUsize,
    errors: AtomicUsize,
}

/// Insert `key`, freeing the caller-owned slot when it was not linked.
fn insert_key(index: &Index, key: u64, tally: &Tally) -> Result<(), IndexError> {
    let id = index.list().alloc(key);
    match index.insert(&key, id, InsertFlags::NONE) {
        Ok(InsertOutcome::Inserted(_)) => {
            tally.inserted.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
        Ok(InsertOutcome::Existing(_)) => {
            index.list().free(id);
            tally.existing.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
        Err(err) => {
            index.list().free(id);
            Err(err)
        }
    }
}

fn delete_key(index: &Index, key: u64, tally: &Tally) -> Result<(), IndexError> {
    match index.delete(&key) {
        Ok(gone) => {
            index.list().free(gone.entry);
            tally.deleted.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
        Err(IndexError::NotFound) => Ok(()),
        Err(err) => Err(err),
    }
}

// =============================================================================
// Mixed workload
// =============================================================================

fn run_mixed(threads: usize, ops_per_thread: usize, key_space: u64) {
    println!("\n{}", "=".repeat(80));
    println!("MIXED ({threads} threads, {ops_per_thread} ops/thread, {key_space} keys)");
    println!("{}", "=".repeat(80));

    let index: Arc<Index> =
        Arc::new(SkipList::init(SlabList::new(), IndexConfig::from_env()).unwrap());
    let tally = Arc::new(Tally::default());

    for key in (0..key_space).step_by(2) {
        insert_key(&index, key, &tally).unwrap();
    }
    eprintln!(
        "Pre-populated {} keys, {} lanes",
        index.len(),
        index.lane_depth()
    );

    let beats = Arc::new(Heartbeats::new(threads));
    let stop_watchdog = Arc::new(AtomicBool::new(false));
    let watchdog = spawn_watchdog(&beats, &stop_watchdog);

    let start = Instant::now();

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let index = Arc::clone(&index);
            let tally = Arc::clone(&tally);
            let beats = Arc::clone(&beats);
            thread::spawn(move || {
                let mut state = (t as u64 + 1).wrapping_mul(0x517c_c1b7_2722_0a95);

                for op in 0..ops_per_thread {
                    state = state
                        .wrapping_mul(6_364_136_223_846_793_005)
                        .wrapping_add(1);
                    let key = (state >> 16) % key_space;

                    beats.beat(t, key);

                    let op_start = Instant::now();
                    let result = match state % 10 {
                        0..=3 => index.find(&key).map(drop).or_else(not_found_ok),
                        4 | 5 => index.seek(&key).map(drop).or_else(not_found_ok),
                        6 | 7 => insert_key(&index, key, &tally),
                        _ => delete_key(&index, key, &tally),
                    };
                    let op_elapsed = op_start.elapsed();

                    if op_elapsed > Duration::from_millis(100) {
                        eprintln!("[T{t:02}] SLOW op {op} key={key} took {op_elapsed:?}");
                    }

                    match result {
                        Ok(()) => {}
                        Err(IndexError::Again) => {
                            tally.again.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            tally.errors.fetch_add(1, Ordering::Relaxed);
                            eprintln!("[T{t:02}] ERROR op {op} key={key}: {e}");
                        }
                    }
                }

                beats.finish(t);
            })
        })
        .collect();

    for h in handles {
        let _ = h.join();
    }

    stop_watchdog.store(true, Ordering::Relaxed);
    let _ = watchdog.join();

    let elapsed = start.elapsed();
    println!(
        "DONE: {} ops in {:?} ({:.0} ops/sec), len={}, lanes={}, dirnodes={}",
        threads * ops_per_thread,
        elapsed,
        (threads * ops_per_thread) as f64 / elapsed.as_secs_f64(),
        index.len(),
        index.lane_depth(),
        index.dirnode_count(),
    );
    println!(
        "inserted={} existing={} deleted={} again={} errors={}",
        tally.inserted.load(Ordering::Relaxed),
        tally.existing.load(Ordering::Relaxed),
        tally.deleted.load(Ordering::Relaxed),
        tally.again.load(Ordering::Relaxed),
        tally.errors.load(Ordering::Relaxed),
    );
    println!("{:#?}", index.stats());

    match index.validate() {
        Ok(report) => println!("lanes valid: {report:?}"),
        Err(violation) => eprintln!("!!! LANES BROKEN: {violation}"),
    }
}

fn not_found_ok(err: IndexError) -> Result<(), IndexError> {
    match err {
        IndexError::NotFound => Ok(()),
        err => Err(err),
    }
}

// =============================================================================
// Main
// =============================================================================

fn main() {
    dirlanes::init_tracing();

    eprintln!("dirlanes Mixed Workload Hang Detector");
    eprintln!("=====================================");
    eprintln!("Watchdog reports any worker silent for >2 seconds.");

    for run in 1..=5 {
        eprintln!("\n--- Run {run}/5 ---");
        run_mixed(8, 50_000, 20_000);
    }

    eprintln!("\nAll runs completed!");
}
