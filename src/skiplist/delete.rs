//! Filepath: src/skiplist/delete.rs
//!
//! Removal: unsplice an entry, merge or decrement the spans around it, drop
//! its DirNode if it has one, and prune a neighbouring stop the removal
//! made redundant.
//!
//! Emptying the top lane shrinks the head, which needs the exclusive
//! admission lock. A shared attempt that would do so aborts with
//! [`Abort::Escalate`] and every later attempt of the same call runs
//! exclusive.

use parking_lot::MutexGuard;

use crate::dirnode::DirNodeId;
use crate::list::EntryList;
use crate::skiplist::traverse::{
    Edge, Landing, LaneMode, LanesGuard, OnEqual, Scan, TraversalVector,
};
use crate::skiplist::{Abort, IndexError, Located, SkipList, bump};
use crate::tracing_helpers::debug_log;

impl<L: EntryList> SkipList<L> {
    /// Unlink the entry equal to `key`. The caller keeps ownership of the
    /// returned entry.
    ///
    /// # Errors
    /// [`IndexError::NotFound`]; [`IndexError::Again`] when contention
    /// outlasts `delete_retries` attempts.
    pub fn delete(&self, key: &L::Key) -> Result<Located<L::Entry>, IndexError> {
        bump(&self.stats.deletes);

        self.retry("delete", self.config.delete_retries, |exclusive| {
            let mut admission = if exclusive {
                self.list.create_wlock()
            } else {
                self.list.create_rlock()
            };
            admission.lock()?;
            if !exclusive && self.lanes.lock().head.is_none() {
                admission.upgrade()?;
            }

            self.delete_attempt(key, admission.is_exclusive())
        })
    }

    /// [`delete`](Self::delete) for callers holding the admission lock
    /// exclusively.
    ///
    /// # Errors
    /// As [`delete`](Self::delete).
    pub fn delete_batch(&self, key: &L::Key) -> Result<Located<L::Entry>, IndexError> {
        bump(&self.stats.deletes);
        self.retry("delete", self.config.delete_retries, |_| {
            self.delete_attempt(key, true)
        })
    }

    fn delete_attempt(&self, key: &L::Key, exclusive: bool) -> Result<Located<L::Entry>, Abort> {
        if matches!(
            self.probe_edges(key),
            Edge::Empty | Edge::Below(_) | Edge::Above
        ) {
            return Err(IndexError::NotFound.into());
        }

        let mut lanes = self.lanes.lock();
        let mut tv = TraversalVector::new();
        let result = self.delete_in_lanes(&mut lanes, &mut tv, key, exclusive);
        self.release_all(&mut lanes, &mut tv);
        result
    }

    fn delete_in_lanes(
        &self,
        lanes: &mut LanesGuard<'_, L::Entry>,
        tv: &mut TraversalVector,
        key: &L::Key,
        exclusive: bool,
    ) -> Result<Located<L::Entry>, Abort> {
        if !exclusive && lanes.head.is_none() {
            return Err(Abort::Again);
        }

        let span = match self.descend(lanes, key, LaneMode::Write, OnEqual::Descend, tv)? {
            Landing::Span(span) => span,
            Landing::Exact { .. } => return Err(IndexError::Invalid.into()),
        };

        if let Some(node) = span.exact {
            return self.delete_dirnode(lanes, tv, node, span.step, exclusive);
        }

        let (entry, offset) =
            match MutexGuard::unlocked(lanes, || self.scan(key, span.from, span.until)) {
                Scan::Found { entry, offset } => (entry, offset),
                Scan::Gap { .. } => return Err(IndexError::NotFound.into()),
            };

        MutexGuard::unlocked(lanes, || self.list.delete(entry));
        lanes.decrement_counts(tv.hops(), 0);

        self.prune_redundant(lanes, tv, exclusive);

        Ok(Located {
            entry,
            row: span.step + offset,
        })
    }

    /// Remove the entry marked by lane stop `node` together with the stop.
    /// `step` is the row of the stop's level-0 predecessor.
    fn delete_dirnode(
        &self,
        lanes: &mut LanesGuard<'_, L::Entry>,
        tv: &mut TraversalVector,
        node: DirNodeId,
        step: usize,
        exclusive: bool,
    ) -> Result<Located<L::Entry>, Abort> {
        let entry = lanes.arena[node]
            .entry()
            .ok_or(Abort::Fail(IndexError::Invalid))?;
        let level = lanes.arena[node].level();

        let empties_top = level + 1 == lanes.depth() && lanes.population(level) == 1;
        if empties_top && !exclusive {
            return Err(Abort::Escalate);
        }

        self.claim(lanes, tv, node)?;

        let row = step + lanes.junction(tv.hop(0).node, 0).count;

        MutexGuard::unlocked(lanes, || self.list.delete(entry));

        lanes.unthread(node, tv.hops(), 1);
        tv.forget_claim();
        lanes.decrement_counts(tv.hops(), level + 1);
        bump(&self.stats.dirnodes_removed);
        debug_log!(level, row, "DirNode removed with its entry");

        if exclusive {
            self.shrink_lanes(lanes, tv);
        }

        Ok(Located { entry, row })
    }

    /// Drop the stop right after the level-0 path stop when the removal left
    /// the two adjacent and it is no taller than its predecessor.
    ///
    /// Opportunistic: skipped whenever any of its spans is busy.
    fn prune_redundant(
        &self,
        lanes: &mut LanesGuard<'_, L::Entry>,
        tv: &mut TraversalVector,
        exclusive: bool,
    ) {
        let Some(head) = lanes.head else { return };
        let cur = tv.hop(0).node;
        let span = lanes.junction(cur, 0);
        if span.count != 1 || span.next == head {
            return;
        }

        let victim = span.next;
        let level = lanes.arena[victim].level();
        if level > lanes.arena[cur].level() {
            return;
        }

        let empties_top = level + 1 == lanes.depth() && lanes.population(level) == 1;
        if empties_top && !exclusive {
            return;
        }

        let clear = (0..=level).all(|lv| {
            lanes.junction(tv.hop(lv).node, lv).next == victim
                && lanes.junction(victim, lv).lock.is_free()
        });
        if !clear {
            return;
        }

        lanes.unthread(victim, tv.hops(), 0);
        bump(&self.stats.dirnodes_removed);
        debug_log!(level, "redundant DirNode pruned");

        if exclusive {
            self.shrink_lanes(lanes, tv);
        }
    }

    /// Drop empty top lanes (exclusive admission only).
    fn shrink_lanes(&self, lanes: &mut LanesGuard<'_, L::Entry>, tv: &mut TraversalVector) {
        let depth = lanes.depth();
        let trimmed = lanes.trimmed_depth();
        if trimmed == depth {
            return;
        }

        self.truncate_hops(lanes, tv, trimmed);
        lanes.shrink_head();
        bump(&self.stats.head_resizes);
        debug_log!(from = depth, to = trimmed, "head shrunk");
    }
}
