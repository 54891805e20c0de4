//! Loom tests for SimpleLocking.
//!
//! Loom explores every interleaving of a small model. `parking_lot` is not
//! loom-aware, so these tests drive a reduced copy of the monitor built on
//! loom's `Mutex` and `Condvar` with the same predicates as the real one.
//!
//! Run with: `RUSTFLAGS="--cfg loom" cargo test --lib simple_lock::loom_tests`
//!
//! NOTE: Keep models to two or three threads; state space grows fast.

#![expect(clippy::unwrap_used, reason = "fail fast in tests")]

use loom::sync::atomic::{AtomicUsize, Ordering};
use loom::sync::{Arc, Condvar, Mutex};
use loom::thread;
use std::collections::VecDeque;

const EFFECTIVE: u8 = 1 << 1;
const WAITING: u8 = 1 << 2;

#[derive(Default)]
struct LoomState {
    readers: usize,
    writers: VecDeque<(u64, u8)>,
    next_ticket: u64,
}

impl LoomState {
    fn writers_block_readers(&self) -> bool {
        self.writers.iter().any(|&(_, f)| f & (WAITING | EFFECTIVE) != 0)
    }

    fn writer_may_proceed(&self, ticket: u64) -> bool {
        self.readers == 0 && self.writers.front().is_some_and(|&(t, _)| t == ticket)
    }

    fn set_flags(&mut self, ticket: u64, flags: u8) {
        if let Some(entry) = self.writers.iter_mut().find(|(t, _)| *t == ticket) {
            entry.1 = flags;
        }
    }
}

/// Reduced SimpleLocking for loom.
struct LoomLocking {
    state: Mutex<LoomState>,
    cond: Condvar,
}

impl LoomLocking {
    fn new() -> Self {
        Self {
            state: Mutex::new(LoomState::default()),
            cond: Condvar::new(),
        }
    }

    fn read_lock(&self) {
        let mut state = self.state.lock().unwrap();
        while state.writers_block_readers() {
            state = self.cond.wait(state).unwrap();
        }
        state.readers += 1;
    }

    fn read_unlock(&self) {
        let mut state = self.state.lock().unwrap();
        state.readers -= 1;
        drop(state);
        self.cond.notify_all();
    }

    fn prelock(&self) -> u64 {
        let mut state = self.state.lock().unwrap();
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.writers.push_back((ticket, 0));
        ticket
    }

    fn write_lock(&self, ticket: u64) {
        let mut state = self.state.lock().unwrap();
        state.set_flags(ticket, WAITING);
        while !state.writer_may_proceed(ticket) {
            state = self.cond.wait(state).unwrap();
        }
        state.set_flags(ticket, EFFECTIVE);
    }

    fn write_unlock(&self, ticket: u64) {
        let mut state = self.state.lock().unwrap();
        state.writers.retain(|&(t, _)| t != ticket);
        drop(state);
        self.cond.notify_all();
    }

    /// Upgrade a held read lock (reader count already includes the caller).
    fn upgrade(&self) -> u64 {
        let mut state = self.state.lock().unwrap();
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.readers -= 1;
        state.writers.push_front((ticket, WAITING));
        self.cond.notify_all();
        while !state.writer_may_proceed(ticket) {
            state = self.cond.wait(state).unwrap();
        }
        state.set_flags(ticket, EFFECTIVE);
        ticket
    }
}

/// Two writers never overlap.
#[test]
fn test_loom_writer_exclusion() {
    loom::model(|| {
        let locking = Arc::new(LoomLocking::new());
        let counter = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let locking = Arc::clone(&locking);
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    let ticket = locking.prelock();
                    locking.write_lock(ticket);
                    let v = counter.load(Ordering::Relaxed);
                    counter.store(v + 1, Ordering::Relaxed);
                    locking.write_unlock(ticket);
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(counter.load(Ordering::Relaxed), 2);
    });
}

/// A reader never observes a writer's half-done update.
#[test]
fn test_loom_reader_writer_exclusion() {
    loom::model(|| {
        let locking = Arc::new(LoomLocking::new());
        let pair = Arc::new((AtomicUsize::new(0), AtomicUsize::new(0)));

        let writer = {
            let locking = Arc::clone(&locking);
            let pair = Arc::clone(&pair);
            thread::spawn(move || {
                let ticket = locking.prelock();
                locking.write_lock(ticket);
                pair.0.store(1, Ordering::Relaxed);
                pair.1.store(1, Ordering::Relaxed);
                locking.write_unlock(ticket);
            })
        };

        let reader = {
            let locking = Arc::clone(&locking);
            let pair = Arc::clone(&pair);
            thread::spawn(move || {
                locking.read_lock();
                let a = pair.0.load(Ordering::Relaxed);
                let b = pair.1.load(Ordering::Relaxed);
                locking.read_unlock();
                assert_eq!(a, b);
            })
        };

        writer.join().unwrap();
        reader.join().unwrap();
    });
}

/// Two concurrent upgraders both complete, one after the other.
#[test]
fn test_loom_double_upgrade_no_deadlock() {
    loom::model(|| {
        let locking = Arc::new(LoomLocking::new());
        let counter = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let locking = Arc::clone(&locking);
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    locking.read_lock();
                    let ticket = locking.upgrade();
                    let v = counter.load(Ordering::Relaxed);
                    counter.store(v + 1, Ordering::Relaxed);
                    locking.write_unlock(ticket);
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(counter.load(Ordering::Relaxed), 2);
    });
}
