//! Exact lookup.

use parking_lot::MutexGuard;

use crate::list::EntryList;
use crate::skiplist::traverse::{
    Edge, Landing, LaneMode, LanesGuard, OnEqual, Scan, TraversalVector,
};
use crate::skiplist::{Abort, IndexError, Located, SkipList, bump};

impl<L: EntryList> SkipList<L> {
    /// Find the entry equal to `key` and its row.
    ///
    /// # Errors
    /// [`IndexError::NotFound`]; [`IndexError::Again`] when contention
    /// outlasts `find_retries` attempts.
    pub fn find(&self, key: &L::Key) -> Result<Located<L::Entry>, IndexError> {
        bump(&self.stats.finds);

        self.retry("find", self.config.find_retries, |_| {
            let mut admission = self.list.create_rlock();
            admission.lock()?;
            self.find_attempt(key)
        })
    }

    /// [`find`](Self::find) for callers already holding the admission lock.
    ///
    /// # Errors
    /// As [`find`](Self::find).
    pub fn find_batch(&self, key: &L::Key) -> Result<Located<L::Entry>, IndexError> {
        bump(&self.stats.finds);
        self.retry("find", self.config.find_retries, |_| self.find_attempt(key))
    }

    fn find_attempt(&self, key: &L::Key) -> Result<Located<L::Entry>, Abort> {
        match self.probe_edges(key) {
            Edge::Empty | Edge::Below(_) | Edge::Above => {
                return Err(IndexError::NotFound.into());
            }
            Edge::First(entry) => return Ok(Located { entry, row: 1 }),
            Edge::Last(entry, row) => return Ok(Located { entry, row }),
            Edge::Inside => {}
        }

        let mut lanes = self.lanes.lock();
        let mut tv = TraversalVector::new();
        let result = self.find_in_lanes(&mut lanes, &mut tv, key);
        self.release_all(&mut lanes, &mut tv);
        result
    }

    fn find_in_lanes(
        &self,
        lanes: &mut LanesGuard<'_, L::Entry>,
        tv: &mut TraversalVector,
        key: &L::Key,
    ) -> Result<Located<L::Entry>, Abort> {
        let span = match self.descend(lanes, key, LaneMode::Read, OnEqual::Stop, tv)? {
            Landing::Exact { entry, row } => return Ok(Located { entry, row }),
            Landing::Span(span) => span,
        };

        match MutexGuard::unlocked(lanes, || self.scan(key, span.from, span.until)) {
            Scan::Found { entry, offset } => Ok(Located {
                entry,
                row: span.step + offset,
            }),
            Scan::Gap { .. } => Err(IndexError::NotFound.into()),
        }
    }
}
