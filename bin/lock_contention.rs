//! Lock Contention Profiling Binary
//!
//! Profiles insert/delete latency together with the index retry counters to
//! find where contention comes from: lane bits (retries), head changes
//! (escalations, head resizes) or the admission lock (slow ops with few
//! retries). When tracing is enabled, retries-exhausted warnings from the
//! index and slow ops from this binary are written to a JSON log.
//!
//! Run with:
//! ```bash
//! # Without tracing (fast, just stats)
//! cargo run --release --features mimalloc --bin lock_contention
//!
//! # With tracing (writes to logs/lock_contention.json)
//! RUST_LOG=dirlanes=warn,lock_contention=warn cargo run --release --features "mimalloc,tracing" --bin lock_contention
//!
//! # View slow operations:
//! rg "SLOW_OP|retries exhausted" logs/lock_contention.json
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]

use dirlanes::{IndexError, IndexStatsSnapshot, InsertFlags, InsertOutcome, SkipList, SlabList};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[cfg(feature = "tracing")]
type TracingGuard = tracing_appender::non_blocking::WorkerGuard;

#[cfg(not(feature = "tracing"))]
type TracingGuard = ();

// =============================================================================
// Custom Tracing Initialization (JSON to file)
// =============================================================================

#[cfg(feature = "tracing")]
fn init_json_tracing() -> TracingGuard {
    use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

    let log_dir = "logs";
    let filter_str = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "dirlanes=warn,lock_contention=warn".to_string());

    let _ = std::fs::create_dir_all(log_dir);

    let file_appender = tracing_appender::rolling::never(log_dir, "lock_contention.json");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_thread_ids(true)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .json()
        .with_filter(EnvFilter::try_new(&filter_str).unwrap_or_else(|_| EnvFilter::new("warn")));

    let _ = tracing_subscriber::registry().with(file_layer).try_init();

    println!("Tracing enabled: logs/lock_contention.json (filter: {filter_str})");

    guard
}

#[cfg(not(feature = "tracing"))]
fn init_json_tracing() -> TracingGuard {
    println!("Tracing disabled (compile with --features tracing)");
}

// =============================================================================
// Operation Stats (Thread-Local + Aggregation)
// =============================================================================

/// Per-thread operation timing statistics
#[derive(Default)]
struct ThreadOpStats {
    max_op_ns: u64,

    /// Number of slow ops (>10ms)
    slow_ops_10ms: u64,

    /// Number of very slow ops (>100ms)
    slow_ops_100ms: u64,

    /// Operations that surfaced `Again` to the caller
    gave_up: u64,
}

impl ThreadOpStats {
    const fn record_op(&mut self, op_ns: u64) {
        if op_ns > self.max_op_ns {
            self.max_op_ns = op_ns;
        }

        if op_ns > 10_000_000 {
            self.slow_ops_10ms += 1;
        }

        if op_ns > 100_000_000 {
            self.slow_ops_100ms += 1;
        }
    }

    const fn merge(&mut self, other: &Self) {
        if other.max_op_ns > self.max_op_ns {
            self.max_op_ns = other.max_op_ns;
        }

        self.slow_ops_10ms += other.slow_ops_10ms;
        self.slow_ops_100ms += other.slow_ops_100ms;
        self.gave_up += other.gave_up;
    }
}

// =============================================================================
// Benchmark Runner
// =============================================================================

struct BenchmarkConfig {
    threads: usize,
    ops_per_thread: usize,
    prob: u32,
}

struct RunResult {
    elapsed: Duration,
    stats: ThreadOpStats,
    index: IndexStatsSnapshot,
    final_len: usize,
    lanes: usize,
}

fn run_benchmark(config: &BenchmarkConfig) -> RunResult {
    let index = Arc::new(SkipList::create(SlabList::<u64>::new(), config.prob).unwrap());

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let index = Arc::clone(&index);
            let ops = config.ops_per_thread;
            let threads = config.threads;

            thread::spawn(move || {
                let mut stats = ThreadOpStats::default();

                for i in 0..ops {
                    // Interleaved keys put every thread in the same spans.
                    let key = (i * threads + t) as u64;
                    let delete = i % 4 == 3;

                    let op_start = Instant::now();
                    let result = if delete {
                        let victim = key - 2 * threads as u64;
                        index.delete(&victim).map(|gone| {
                            index.list().free(gone.entry);
                        })
                    } else {
                        let id = index.list().alloc(key);
                        match index.insert(&key, id, InsertFlags::NONE) {
                            Ok(InsertOutcome::Inserted(_)) => Ok(()),
                            Ok(InsertOutcome::Existing(_)) => {
                                index.list().free(id);
                                Ok(())
                            }
                            Err(err) => {
                                index.list().free(id);
                                Err(err)
                            }
                        }
                    };
                    let op_elapsed = op_start.elapsed().as_nanos() as u64;

                    stats.record_op(op_elapsed);
                    if result == Err(IndexError::Again) {
                        stats.gave_up += 1;
                    }

                    if op_elapsed > 100_000_000 {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(
                            thread = t,
                            op_index = i,
                            key,
                            elapsed_ms = op_elapsed as f64 / 1_000_000.0,
                            "SLOW_OP"
                        );

                        #[cfg(not(feature = "tracing"))]
                        eprintln!(
                            "[T{:02}] SLOW_OP: i={} key={} took {:.2}ms",
                            t,
                            i,
                            key,
                            op_elapsed as f64 / 1_000_000.0
                        );
                    }
                }

                stats
            })
        })
        .collect();

    let mut merged = ThreadOpStats::default();
    for h in handles {
        let thread_stats = h.join().unwrap();
        merged.merge(&thread_stats);
    }

    RunResult {
        elapsed: start.elapsed(),
        stats: merged,
        index: index.stats(),
        final_len: index.len(),
        lanes: index.lane_depth(),
    }
}

fn print_stats(config: &BenchmarkConfig, result: &RunResult, baseline: Duration) {
    let elapsed = result.elapsed;
    let stats = &result.stats;
    let index = &result.index;

    let total_ops = config.threads * config.ops_per_thread;
    let ops_per_sec = total_ops as f64 / elapsed.as_secs_f64();

    println!("\n{}", "=".repeat(80));
    println!(
        "RESULTS: {} threads x {} ops = {} total (prob {})",
        config.threads, config.ops_per_thread, total_ops, config.prob
    );
    println!("{}", "=".repeat(80));

    println!("\n--- Timing ---");
    println!("Elapsed:     {elapsed:?}");
    println!("Throughput:  {ops_per_sec:.0} ops/sec");

    println!("\n--- Operation Latency ---");
    println!(
        "Max op:      {:.2} ms",
        stats.max_op_ns as f64 / 1_000_000.0
    );
    println!("Slow >10ms:  {}", stats.slow_ops_10ms);
    println!("Slow >100ms: {}", stats.slow_ops_100ms);

    println!("\n--- Index Counters ---");
    println!("Inserts:           {}", index.inserts);
    println!("Deletes:           {}", index.deletes);
    println!("Lane retries:      {}", index.retries);
    println!("Escalations:       {}", index.escalations);
    println!("Retries exhausted: {}", index.contention);
    println!("DirNodes created:  {}", index.dirnodes_created);
    println!("DirNodes removed:  {}", index.dirnodes_removed);
    println!("Head resizes:      {}", index.head_resizes);
    println!("Final len / lanes: {} / {}", result.final_len, result.lanes);

    if stats.gave_up > 0 {
        println!("\n!!! {} operations surfaced Again to the caller", stats.gave_up);
    }

    let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
    let baseline_ms = baseline.as_secs_f64() * 1000.0;
    if baseline_ms > 0.0 && elapsed_ms > baseline_ms * 3.0 {
        let ratio = elapsed_ms / baseline_ms;
        println!("\n!!! OUTLIER DETECTED: This run was ~{ratio:.1}x slower than median");
    }
}

// =============================================================================
// Main
// =============================================================================

fn main() {
    let _guard = init_json_tracing();

    println!("Lock Contention Profiling");
    println!("=========================\n");

    let configs = vec![
        BenchmarkConfig {
            threads: 8,
            ops_per_thread: 50_000,
            prob: 4,
        },
        BenchmarkConfig {
            threads: 32,
            ops_per_thread: 20_000,
            prob: 4,
        },
    ];

    for config in &configs {
        println!(
            "\nRunning: {} threads x {} ops (prob {})...",
            config.threads, config.ops_per_thread, config.prob
        );

        let mut results: Vec<RunResult> = Vec::new();
        for run in 1..=5 {
            print!("  Run {run}/5... ");
            std::io::Write::flush(&mut std::io::stdout()).unwrap();

            let result = run_benchmark(config);
            println!("{:?}", result.elapsed);

            results.push(result);
        }

        let mut sorted: Vec<Duration> = results.iter().map(|result| result.elapsed).collect();
        sorted.sort_by_key(Duration::as_nanos);
        let baseline = sorted.get(sorted.len() / 2).copied().unwrap_or_default();

        let (slowest_idx, slowest_result) = results
            .iter()
            .enumerate()
            .max_by_key(|(_, result)| result.elapsed.as_nanos())
            .unwrap();

        println!("\n>>> Slowest run was #{} <<<", slowest_idx + 1);
        println!("Baseline (median) run: {baseline:?}");
        print_stats(config, slowest_result, baseline);

        let (fastest_idx, fastest_result) = results
            .iter()
            .enumerate()
            .min_by_key(|(_, result)| result.elapsed.as_nanos())
            .unwrap();

        println!(
            "\nFastest run #{}: {:?} (ratio: {:.1}x)",
            fastest_idx + 1,
            fastest_result.elapsed,
            slowest_result.elapsed.as_secs_f64() / fastest_result.elapsed.as_secs_f64()
        );
    }
}
