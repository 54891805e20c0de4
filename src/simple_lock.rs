//! Filepath: src/simple_lock.rs
//!
//! Readers/writer/upgrade lock with strict writer FIFO.
//!
//! [`SimpleLocking`] is the shared lock group (one per directory index);
//! [`SimpleLock`] is a per-operation handle whose [`LockKind`] is fixed at
//! creation, except that a read lock may be upgraded to a write lock in
//! place.
//!
//! # Protocol
//! All waiting happens on a single `parking_lot` mutex + condition variable
//! pair (monitor pattern). Every release broadcasts; each waiter re-checks
//! its own predicate:
//!
//! | Waiter | Proceeds when |
//! |--------|---------------|
//! | reader | no writer in the FIFO is waiting or effective |
//! | writer | no active readers AND it heads the writer FIFO |
//!
//! A *prelocked* writer holds its FIFO position without waiting and
//! without holding back new readers. Writers queued behind it (and, once
//! those wait, new readers) stall until it locks or unlocks.
//!
//! ```rust
//! use dirlanes::simple_lock::SimpleLocking;
//!
//! let locking = SimpleLocking::new();
//!
//! let mut read = locking.read_lock();
//! read.lock().unwrap();
//! read.upgrade().unwrap(); // now exclusive, never released in between
//! assert!(locking.is_write_locked());
//! read.unlock().unwrap();
//! ```

use std::collections::VecDeque;
use std::fmt as StdFmt;
use std::marker::PhantomData;
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};


#[cfg(loom)]
mod loom_tests;

// ============================================================================
//  Member Flags
// ============================================================================

/// Registered in one of the group's lists.
const LIST: u8 = 1 << 0;

/// Holding the lock.
const EFFECTIVE: u8 = 1 << 1;

/// Blocked in `lock()` / `upgrade()`.
const WAITING: u8 = 1 << 2;

// ============================================================================
//  LockKind / LockError
// ============================================================================

/// What a [`SimpleLock`] acquires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    /// Acquires nothing; every operation succeeds immediately.
    ///
    /// Used by batch operations whose caller already holds the group.
    None,
    /// Shared access.
    Read,
    /// Exclusive access.
    Write,
}

/// Misuse of a [`SimpleLock`] handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockError {
    /// `unlock` or `upgrade` on a handle that does not hold the lock.
    NotHeld,
    /// `lock` or `prelock` on a handle that already holds or reserved it.
    AlreadyHeld,
    /// Operation not valid for this kind (prelock of a read lock, upgrade of
    /// a write lock).
    WrongKind,
}

impl StdFmt::Display for LockError {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        match self {
            Self::NotHeld => write!(f, "lock is not held by this handle"),
            Self::AlreadyHeld => write!(f, "lock is already held by this handle"),
            Self::WrongKind => write!(f, "operation not valid for this lock kind"),
        }
    }
}

impl std::error::Error for LockError {}

// ============================================================================
//  SimpleLocking
// ============================================================================

/// One registered lock handle.
#[derive(Debug)]
struct Member {
    ticket: u64,
    thread: ThreadId,
    flags: u8,
}

#[derive(Debug, Default)]
struct LockingState {
    /// Effective readers.
    readers: usize,
    read_list: VecDeque<Member>,
    write_list: VecDeque<Member>,
    next_ticket: u64,
}

impl LockingState {
    fn issue_ticket(&mut self) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket = self.next_ticket.wrapping_add(1);
        ticket
    }

    /// Readers must wait while any writer is waiting for or holding the lock.
    fn writers_block_readers(&self) -> bool {
        self.write_list
            .iter()
            .any(|m| m.flags & (WAITING | EFFECTIVE) != 0)
    }

    fn writer_may_proceed(&self, ticket: u64) -> bool {
        self.readers == 0 && self.write_list.front().is_some_and(|m| m.ticket == ticket)
    }

    fn writer_mut(&mut self, ticket: u64) -> Option<&mut Member> {
        self.write_list.iter_mut().find(|m| m.ticket == ticket)
    }

    fn reader_mut(&mut self, ticket: u64) -> Option<&mut Member> {
        self.read_list.iter_mut().find(|m| m.ticket == ticket)
    }

    fn take_reader(&mut self, ticket: u64) -> Option<Member> {
        let pos = self.read_list.iter().position(|m| m.ticket == ticket)?;
        self.read_list.remove(pos)
    }

    fn take_writer(&mut self, ticket: u64) -> Option<Member> {
        let pos = self.write_list.iter().position(|m| m.ticket == ticket)?;
        self.write_list.remove(pos)
    }
}

/// A lock group: the shared state every [`SimpleLock`] handle of one
/// directory index coordinates through.
#[derive(Debug, Default)]
pub struct SimpleLocking {
    state: Mutex<LockingState>,
    cond: Condvar,
}

impl SimpleLocking {
    /// A group with no holders.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A new, not yet acquired, read handle.
    #[must_use]
    pub fn read_lock(&self) -> SimpleLock<'_> {
        SimpleLock::new(self, LockKind::Read)
    }

    /// A new, not yet acquired, write handle.
    #[must_use]
    pub fn write_lock(&self) -> SimpleLock<'_> {
        SimpleLock::new(self, LockKind::Write)
    }

    /// A handle that acquires nothing.
    #[must_use]
    pub fn none_lock(&self) -> SimpleLock<'_> {
        SimpleLock::new(self, LockKind::None)
    }

    /// Number of effective readers.
    #[must_use]
    pub fn readers(&self) -> usize {
        self.state.lock().readers
    }

    /// Number of write handles registered (prelocked, waiting or effective).
    #[must_use]
    pub fn queued_writers(&self) -> usize {
        self.state.lock().write_list.len()
    }

    /// Is a writer currently effective?
    #[must_use]
    pub fn is_write_locked(&self) -> bool {
        self.writer_thread().is_some()
    }

    /// Thread owning the effective write lock, if any.
    #[must_use]
    pub fn writer_thread(&self) -> Option<ThreadId> {
        self.state
            .lock()
            .write_list
            .front()
            .filter(|m| m.flags & EFFECTIVE != 0)
            .map(|m| m.thread)
    }
}

// ============================================================================
//  SimpleLock
// ============================================================================

/// A per-operation handle on a [`SimpleLocking`] group.
///
/// The handle is released on drop if still held (or reserved by
/// `prelock`), so early returns through `?` never leak the group.
///
/// Handles are `!Send`: the group records the owning thread at registration
/// and the handle must be released from that thread.
#[derive(Debug)]
#[must_use = "a lock handle does nothing until `lock()` is called"]
pub struct SimpleLock<'a> {
    locking: &'a SimpleLocking,
    kind: LockKind,

    /// Set while registered in one of the group's lists.
    ticket: Option<u64>,

    /// Set once the lock is held (not merely reserved).
    effective: bool,

    _marker: PhantomData<*mut ()>,
}

impl Drop for SimpleLock<'_> {
    fn drop(&mut self) {
        if self.ticket.is_some() {
            let _ = self.unlock();
        }
    }
}

impl<'a> SimpleLock<'a> {
    fn new(locking: &'a SimpleLocking, kind: LockKind) -> Self {
        Self {
            locking,
            kind,
            ticket: None,
            effective: false,
            _marker: PhantomData,
        }
    }

    /// What this handle acquires.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> LockKind {
        self.kind
    }

    /// Is the lock held (for `None` handles: always false)?
    #[inline]
    #[must_use]
    pub const fn is_held(&self) -> bool {
        self.effective
    }

    /// Is the handle registered in the group without holding it yet?
    #[inline]
    #[must_use]
    pub const fn is_prelocked(&self) -> bool {
        self.ticket.is_some() && !self.effective
    }

    /// Does this handle give exclusive access?
    #[inline]
    #[must_use]
    pub fn is_exclusive(&self) -> bool {
        self.effective && self.kind == LockKind::Write
    }

    /// Acquire the lock, blocking as the protocol requires.
    ///
    /// # Errors
    /// [`LockError::AlreadyHeld`] if the handle already holds the lock.
    pub fn lock(&mut self) -> Result<(), LockError> {
        match self.kind {
            LockKind::None => Ok(()),
            LockKind::Read => self.lock_read(),
            LockKind::Write => self.lock_write(),
        }
    }

    /// Release the lock, or withdraw a prelock reservation.
    ///
    /// # Errors
    /// [`LockError::NotHeld`] if the handle is not registered.
    pub fn unlock(&mut self) -> Result<(), LockError> {
        if self.kind == LockKind::None {
            return Ok(());
        }

        let ticket = self.ticket.take().ok_or(LockError::NotHeld)?;
        let mut state = self.locking.state.lock();

        match self.kind {
            LockKind::Read => {
                if state.take_reader(ticket).is_some() && self.effective {
                    state.readers -= 1;
                }
            }
            LockKind::Write => {
                let _ = state.take_writer(ticket);
            }
            LockKind::None => {}
        }

        self.effective = false;
        drop(state);
        self.locking.cond.notify_all();

        Ok(())
    }

    /// Reserve a place in the writer FIFO without waiting.
    ///
    /// New readers are not held back by the reservation itself. A later
    /// `lock()` reuses the reserved position.
    ///
    /// # Errors
    /// [`LockError::WrongKind`] for non-write handles,
    /// [`LockError::AlreadyHeld`] if already registered.
    pub fn prelock(&mut self) -> Result<(), LockError> {
        if self.kind != LockKind::Write {
            return Err(LockError::WrongKind);
        }

        if self.ticket.is_some() {
            return Err(LockError::AlreadyHeld);
        }

        let mut state = self.locking.state.lock();
        let ticket = state.issue_ticket();

        state.write_list.push_back(Member {
            ticket,
            thread: thread::current().id(),
            flags: LIST,
        });
        self.ticket = Some(ticket);

        Ok(())
    }

    /// Turn a held read lock into a write lock without releasing it.
    ///
    /// The handle jumps to the front of the writer FIFO and waits for the
    /// remaining readers to drain.
    ///
    /// # Errors
    /// [`LockError::WrongKind`] for non-read handles,
    /// [`LockError::NotHeld`] if the read lock is not held.
    pub fn upgrade(&mut self) -> Result<(), LockError> {
        if self.kind != LockKind::Read {
            return Err(LockError::WrongKind);
        }

        let ticket = match self.ticket {
            Some(ticket) if self.effective => ticket,
            _ => return Err(LockError::NotHeld),
        };

        let mut state = self.locking.state.lock();

        let member = state.take_reader(ticket).ok_or(LockError::NotHeld)?;
        state.readers -= 1;
        state.write_list.push_front(Member {
            ticket,
            thread: member.thread,
            flags: LIST | WAITING,
        });
        self.kind = LockKind::Write;
        self.effective = false;

        // Other upgraders may be waiting for the reader count we just dropped.
        self.locking.cond.notify_all();

        while !state.writer_may_proceed(ticket) {
            self.locking.cond.wait(&mut state);
        }

        if let Some(member) = state.writer_mut(ticket) {
            member.flags = LIST | EFFECTIVE;
        }
        self.effective = true;

        Ok(())
    }

    fn lock_read(&mut self) -> Result<(), LockError> {
        if self.ticket.is_some() {
            return Err(LockError::AlreadyHeld);
        }

        let mut state = self.locking.state.lock();
        let ticket = state.issue_ticket();

        state.read_list.push_back(Member {
            ticket,
            thread: thread::current().id(),
            flags: LIST | WAITING,
        });
        self.ticket = Some(ticket);

        while state.writers_block_readers() {
            self.locking.cond.wait(&mut state);
        }

        if let Some(member) = state.reader_mut(ticket) {
            member.flags = LIST | EFFECTIVE;
        }
        state.readers += 1;
        self.effective = true;

        Ok(())
    }

    fn lock_write(&mut self) -> Result<(), LockError> {
        if self.effective {
            return Err(LockError::AlreadyHeld);
        }

        let mut state = self.locking.state.lock();

        let ticket = if let Some(ticket) = self.ticket {
            ticket
        } else {
            let ticket = state.issue_ticket();
            state.write_list.push_back(Member {
                ticket,
                thread: thread::current().id(),
                flags: LIST,
            });
            self.ticket = Some(ticket);
            ticket
        };

        if let Some(member) = state.writer_mut(ticket) {
            member.flags |= WAITING;
        }

        while !state.writer_may_proceed(ticket) {
            self.locking.cond.wait(&mut state);
        }

        if let Some(member) = state.writer_mut(ticket) {
            member.flags = LIST | EFFECTIVE;
        }
        self.effective = true;

        Ok(())
    }
}
