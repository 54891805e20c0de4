//! Filepath: src/skiplist/insert.rs
//!
//! Insertion: splice an entry into the base list and, when its precomputed
//! level says so, thread a new DirNode for it into the lanes.

use parking_lot::MutexGuard;

use crate::dirnode::{DirNode, DirNodeId};
use crate::list::EntryList;
use crate::simple_lock::SimpleLock;
use crate::skiplist::traverse::{Landing, LaneMode, LanesGuard, OnEqual, Scan, TraversalVector};
use crate::skiplist::{Abort, IndexError, InsertFlags, InsertOutcome, Located, SkipList, bump};
use crate::tracing_helpers::{debug_log, warn_log};

impl<L: EntryList> SkipList<L> {
    /// Link `entry` (keyed by `key`) into the list.
    ///
    /// `entry` must be unlinked. When an equal entry is already linked the
    /// list is left unchanged and [`InsertOutcome::Existing`] names it.
    ///
    /// # Errors
    /// [`IndexError::NoMemory`] when DirNode storage cannot grow;
    /// [`IndexError::Again`] when contention outlasts `insert_retries`.
    pub fn insert(
        &self,
        key: &L::Key,
        entry: L::Entry,
        flags: InsertFlags,
    ) -> Result<InsertOutcome<L::Entry>, IndexError> {
        bump(&self.stats.inserts);

        // Fixed for every attempt.
        let level = self.levelup(flags);

        self.retry("insert", self.config.insert_retries, |_| {
            let admission = self.insert_admission(level)?;
            self.insert_attempt(key, entry, level, admission.is_exclusive())
        })
    }

    /// [`insert`](Self::insert) for callers holding the admission lock
    /// exclusively.
    ///
    /// # Errors
    /// As [`insert`](Self::insert).
    pub fn insert_batch(
        &self,
        key: &L::Key,
        entry: L::Entry,
        flags: InsertFlags,
    ) -> Result<InsertOutcome<L::Entry>, IndexError> {
        bump(&self.stats.inserts);

        let level = self.levelup(flags);

        self.retry("insert", self.config.insert_retries, |_| {
            let _admission = self.list.locking().none_lock();
            self.insert_attempt(key, entry, level, true)
        })
    }

    /// Admission for one insert attempt.
    ///
    /// Growing the head needs exclusive access: the writer reserves its
    /// queue position and DirNode storage before it blocks. So does an insert
    /// into a list without lanes, reached by upgrading the read lock.
    fn insert_admission(&self, level: Option<usize>) -> Result<SimpleLock<'_>, Abort> {
        let depth = self.lanes.lock().depth();

        if level.is_some_and(|level| level >= depth) {
            let mut admission = self.list.create_wlock();
            admission.prelock()?;
            self.lanes.lock().arena.reserve(2)?;
            admission.lock()?;
            return Ok(admission);
        }

        let mut admission = self.list.create_rlock();
        admission.lock()?;
        if self.list.count() == 0 || self.lanes.lock().head.is_none() {
            admission.upgrade()?;
        }
        Ok(admission)
    }

    fn insert_attempt(
        &self,
        key: &L::Key,
        entry: L::Entry,
        level: Option<usize>,
        exclusive: bool,
    ) -> Result<InsertOutcome<L::Entry>, Abort> {
        let mut lanes = self.lanes.lock();
        let mut tv = TraversalVector::new();
        let result = self.insert_in_lanes(&mut lanes, &mut tv, key, entry, level, exclusive);
        self.release_all(&mut lanes, &mut tv);
        result
    }

    fn insert_in_lanes(
        &self,
        lanes: &mut LanesGuard<'_, L::Entry>,
        tv: &mut TraversalVector,
        key: &L::Key,
        entry: L::Entry,
        level: Option<usize>,
        exclusive: bool,
    ) -> Result<InsertOutcome<L::Entry>, Abort> {
        // The head may have changed since admission was chosen.
        let depth = lanes.depth();
        if !exclusive && (lanes.head.is_none() || level.is_some_and(|level| level >= depth)) {
            return Err(Abort::Again);
        }

        let span = match self.descend(lanes, key, LaneMode::Write, OnEqual::Stop, tv)? {
            Landing::Exact { entry, row } => {
                return Ok(InsertOutcome::Existing(Located { entry, row }));
            }
            Landing::Span(span) => span,
        };

        // Allocate before the base list changes.
        let node = level.map(|level| DirNode::between(entry, level)).transpose()?;

        let (pred, succ, offset) =
            match MutexGuard::unlocked(lanes, || self.scan(key, span.from, span.until)) {
                Scan::Found { entry, offset } => {
                    return Ok(InsertOutcome::Existing(Located {
                        entry,
                        row: span.step + offset,
                    }));
                }
                Scan::Gap { pred, succ, offset } => (pred, succ, offset),
            };

        MutexGuard::unlocked(lanes, || match succ {
            Some(succ) => self.list.insert_before(entry, succ),
            None => self.list.insert_after(entry, pred),
        });
        let row = span.step + offset;

        // A stop right next to an existing one buys nothing.
        let interior = pred != span.from && !(succ.is_some() && succ == span.until);

        match node {
            Some(node) if interior => {
                let entries = self.list.count().saturating_sub(1);
                if let Err(err) = self.attach(lanes, tv, node, row, entries) {
                    warn_log!(%err, row, "DirNode not threaded, counting entry only");
                    lanes.increment_counts(tv.hops(), 0);
                }
            }
            _ => lanes.increment_counts(tv.hops(), 0),
        }

        Ok(InsertOutcome::Inserted(Located { entry, row }))
    }

    /// Thread `node`, whose entry now sits at `row`, growing the head first
    /// if the node reaches above it. `entries` is the list length before the
    /// insert, the wrap count of any new lane.
    ///
    /// Nothing is changed when an error is returned.
    fn attach(
        &self,
        lanes: &mut LanesGuard<'_, L::Entry>,
        tv: &mut TraversalVector,
        node: DirNode<L::Entry>,
        row: usize,
        entries: usize,
    ) -> Result<DirNodeId, IndexError> {
        let level = node.level();
        lanes.arena.reserve(2)?;

        let depth = lanes.depth();
        if level >= depth {
            let head = lanes.grow_head(level + 1, entries)?;
            tv.extend_to(head, level + 1);
            bump(&self.stats.head_resizes);
            debug_log!(from = depth, to = level + 1, "head grown");
        }

        let id = lanes.arena.insert(node)?;
        lanes.thread(id, tv.hops(), row);
        bump(&self.stats.dirnodes_created);
        debug_log!(level, row, "DirNode threaded");

        Ok(id)
    }
}
