//! Shared setup for the integration tests.
//!
//! The test build enables the crate's `tracing` feature, so lane restructuring,
//! exhausted retries and `validate()` failures from every test land in
//! `$DIRLANES_LOG_DIR/dirlanes.jsonl` (default `logs/`). Filter with `RUST_LOG`:
//!
//! ```bash
//! RUST_LOG=dirlanes::skiplist=debug cargo test --test stress_tests
//! jq 'select(.level == "WARN")' logs/dirlanes.jsonl
//! ```

#![allow(dead_code)]

use std::sync::Once;

static INIT: Once = Once::new();

/// Install the crate's subscriber once per test binary.
pub fn init_tracing() {
    INIT.call_once(dirlanes::init_tracing);
}
