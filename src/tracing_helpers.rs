//! Zero-cost logging macros for the index.
//!
//! With the `tracing` feature these forward to the `tracing` crate; without it
//! they expand to nothing, so descent loops pay no formatting cost.
//!
//! ```bash
//! # Watch lane restructuring while running the integration tests
//! RUST_LOG=dirlanes::skiplist=debug cargo test --features tracing --test scenarios
//!
//! # Every descent step (very noisy)
//! RUST_LOG=dirlanes::skiplist::traverse=trace cargo test --features tracing
//! ```
//!
//! Levels used by the crate:
//! - `trace`: lane steps and bit acquisition during descent
//! - `debug`: DirNode creation/removal, head growth and shrink
//! - `warn`: retries exhausted, contention surfaced to the caller
//! - `error`: lane invariants found broken by `validate()`

#![allow(unused_macros, unused_imports)]

/// Trace-level event. No-op without the `tracing` feature.
#[cfg(feature = "tracing")]
macro_rules! trace_log {
    ($($arg:tt)*) => {
        tracing::trace!($($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_log {
    ($($arg:tt)*) => {};
}

/// Debug-level event. No-op without the `tracing` feature.
#[cfg(feature = "tracing")]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

/// Warn-level event. No-op without the `tracing` feature.
#[cfg(feature = "tracing")]
macro_rules! warn_log {
    ($($arg:tt)*) => {
        tracing::warn!($($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! warn_log {
    ($($arg:tt)*) => {};
}

/// Error-level event. No-op without the `tracing` feature.
#[cfg(feature = "tracing")]
macro_rules! error_log {
    ($($arg:tt)*) => {
        tracing::error!($($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! error_log {
    ($($arg:tt)*) => {};
}

pub(crate) use debug_log;
pub(crate) use error_log;
pub(crate) use trace_log;
pub(crate) use warn_log;

// ============================================================================
//  Subscriber setup for binaries
// ============================================================================

/// Install a console + NDJSON file subscriber for the binaries.
///
/// The filter comes from `RUST_LOG` (default `info`); the file goes to
/// `$DIRLANES_LOG_DIR/dirlanes.jsonl` (default `logs/`). Does nothing
/// without the `tracing` feature, or when a subscriber is already set.
#[cfg(feature = "tracing")]
pub fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, Layer, Registry};

    let make_filter =
        || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let log_dir = std::env::var("DIRLANES_LOG_DIR").unwrap_or_else(|_| "logs".to_string());
    let file = tracing_appender::rolling::never(log_dir, "dirlanes.jsonl");

    let console_layer = tracing_subscriber::fmt::layer()
        .with_thread_ids(true)
        .with_target(true)
        .compact()
        .with_filter(make_filter());

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .json()
        .with_filter(make_filter());

    let _ = Registry::default()
        .with(console_layer)
        .with(file_layer)
        .try_init();
}

/// No-op without the `tracing` feature.
#[cfg(not(feature = "tracing"))]
pub const fn init_tracing() {}
