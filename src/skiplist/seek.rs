//! Successor lookup: the first entry strictly greater than a key.

use parking_lot::MutexGuard;

use crate::list::EntryList;
use crate::skiplist::traverse::{
    Edge, Landing, LaneMode, LanesGuard, OnEqual, Scan, TraversalVector,
};
use crate::skiplist::{Abort, IndexError, Located, SkipList, bump};

impl<L: EntryList> SkipList<L> {
    /// First entry strictly greater than `key`, with its row.
    ///
    /// A key below the first entry yields the first entry (row 1).
    ///
    /// # Errors
    /// [`IndexError::NotFound`] when `key` is at or past the last entry;
    /// [`IndexError::Again`] when contention outlasts `seek_retries`.
    pub fn seek(&self, key: &L::Key) -> Result<Located<L::Entry>, IndexError> {
        bump(&self.stats.seeks);

        self.retry("seek", self.config.seek_retries, |_| {
            let mut admission = self.list.create_rlock();
            admission.lock()?;
            self.seek_attempt(key)
        })
    }

    /// [`seek`](Self::seek) for callers already holding the admission lock.
    ///
    /// # Errors
    /// As [`seek`](Self::seek).
    pub fn seek_batch(&self, key: &L::Key) -> Result<Located<L::Entry>, IndexError> {
        bump(&self.stats.seeks);
        self.retry("seek", self.config.seek_retries, |_| self.seek_attempt(key))
    }

    fn seek_attempt(&self, key: &L::Key) -> Result<Located<L::Entry>, Abort> {
        match self.probe_edges(key) {
            Edge::Empty | Edge::Above | Edge::Last(..) => {
                return Err(IndexError::NotFound.into());
            }
            Edge::Below(first) => return Ok(Located { entry: first, row: 1 }),
            Edge::First(_) | Edge::Inside => {}
        }

        let mut lanes = self.lanes.lock();
        let mut tv = TraversalVector::new();
        let result = self.seek_in_lanes(&mut lanes, &mut tv, key);
        self.release_all(&mut lanes, &mut tv);
        result
    }

    fn seek_in_lanes(
        &self,
        lanes: &mut LanesGuard<'_, L::Entry>,
        tv: &mut TraversalVector,
        key: &L::Key,
    ) -> Result<Located<L::Entry>, Abort> {
        let span = match self.descend(lanes, key, LaneMode::Read, OnEqual::StepPast, tv)? {
            Landing::Span(span) => span,
            Landing::Exact { .. } => return Err(IndexError::Invalid.into()),
        };

        let found = MutexGuard::unlocked(lanes, || match self.scan(key, span.from, span.until) {
            Scan::Found { entry, offset } => self.list.next(entry).map(|succ| Located {
                entry: succ,
                row: span.step + offset + 1,
            }),
            Scan::Gap { succ, offset, .. } => succ.map(|succ| Located {
                entry: succ,
                row: span.step + offset,
            }),
        });

        found.ok_or(Abort::Fail(IndexError::NotFound))
    }
}
