//! Filepath: src/skiplist/traverse.rs
//!
//! Lane descent and lane-bit bookkeeping.
//!
//! A descent starts at the head's top lane and moves right while the next
//! stop's entry is smaller than the key, dropping a lane otherwise. Every
//! span it stands in is covered by a bit taken on the junction that opens
//! it: a reader slot in [`LaneMode::Read`], the write bit in
//! [`LaneMode::Write`]. Moving right is hand-over-hand: the next span's bit
//! is taken before the current one is released. Dropping a lane keeps the
//! upper bit, so a finished descent holds one bit per lane (the
//! [`TraversalVector`]) and the level-0 span it ends in brackets the
//! base-list stretch the operation may read or change.
//!
//! Readers never wait: a write bit or a removal claim on their way turns
//! into [`Abort::Again`]. Writers set the write bit at once, turning new
//! readers away, then wait on the lane condition variable for the readers
//! already inside to leave.

use std::cmp::Ordering;

use parking_lot::MutexGuard;

use crate::dirnode::DirNodeId;
use crate::lanelock::LaneBits;
use crate::list::EntryList;
use crate::skiplist::lanes::Lanes;
use crate::skiplist::{Abort, IndexError, SkipList};
use crate::tracing_helpers::trace_log;

pub(crate) type LanesGuard<'a, E> = MutexGuard<'a, Lanes<E>>;

// ============================================================================
//  Descent policy
// ============================================================================

/// Which bit a descent takes on each span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LaneMode {
    Read,
    Write,
}

/// What a descent does when a lane stop's entry equals the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OnEqual {
    /// Stop and report the stop (find, insert).
    Stop,
    /// Remember the stop and keep descending to collect its predecessor in
    /// every lane (delete).
    Descend,
    /// Treat it as smaller and move past it (seek).
    StepPast,
}

// ============================================================================
//  TraversalVector
// ============================================================================

/// Where a descent stood in one lane.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Hop {
    /// Stop whose junction opens the span.
    pub(crate) node: DirNodeId,
    /// Row of that stop's entry (0 for the head).
    pub(crate) step: usize,
    /// Bit held on the junction.
    pub(crate) held: LaneBits,
}

/// A node claimed for removal: removal bit and write bit on every junction.
#[derive(Debug, Clone, Copy)]
struct Claim {
    node: DirNodeId,
}

/// One [`Hop`] per lane, index = level, plus an optional removal claim.
#[derive(Debug, Default)]
pub(crate) struct TraversalVector {
    hops: Vec<Hop>,
    claim: Option<Claim>,
}

impl TraversalVector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn reset(&mut self, head: DirNodeId, depth: usize) {
        debug_assert!(!self.holds_any(), "traversal vector reused while holding bits");
        self.hops.clear();
        self.claim = None;
        self.extend_to(head, depth);
    }

    /// Add unheld head hops up to `depth` lanes (lanes added by head growth).
    pub(crate) fn extend_to(&mut self, head: DirNodeId, depth: usize) {
        while self.hops.len() < depth {
            self.hops.push(Hop {
                node: head,
                step: 0,
                held: LaneBits::None,
            });
        }
    }

    #[inline]
    pub(crate) fn hops(&self) -> &[Hop] {
        &self.hops
    }

    #[inline]
    pub(crate) fn hop(&self, level: usize) -> Hop {
        self.hops[level]
    }

    /// Forget the claimed node after it has been freed.
    pub(crate) fn forget_claim(&mut self) {
        self.claim = None;
    }

    fn holds_any(&self) -> bool {
        self.claim.is_some() || self.hops.iter().any(|hop| hop.held != LaneBits::None)
    }

    /// Record `hop` for `level`, returning what it replaces.
    fn replace(&mut self, level: usize, hop: Hop) -> Hop {
        std::mem::replace(&mut self.hops[level], hop)
    }
}

// ============================================================================
//  Descent results
// ============================================================================

/// Level-0 span a descent ended in.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Span<E> {
    /// Entry of the stop opening the span; `None` for the head.
    pub(crate) from: Option<E>,
    /// Row of `from` (0 for the head).
    pub(crate) step: usize,
    /// Entry of the next stop; `None` when the span runs to the list end.
    pub(crate) until: Option<E>,
    /// Stop whose entry equals the key, seen under [`OnEqual::Descend`].
    pub(crate) exact: Option<DirNodeId>,
}

/// Result of a descent.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Landing<E> {
    /// A lane stop's entry equals the key (under [`OnEqual::Stop`]).
    Exact { entry: E, row: usize },
    /// The key, if present, lies inside this span.
    Span(Span<E>),
}

/// Result of scanning the base list inside a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scan<E> {
    /// `entry` equals the key, `offset` steps after the span start.
    Found { entry: E, offset: usize },
    /// No entry equals the key; it would go between `pred` and `succ`
    /// (either may be the list end), `offset` steps after the span start.
    Gap {
        pred: Option<E>,
        succ: Option<E>,
        offset: usize,
    },
}

/// Where a key falls relative to the ends of the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Edge<E> {
    /// No entries.
    Empty,
    /// Smaller than the first entry.
    Below(E),
    /// Equal to the first entry.
    First(E),
    /// Equal to the last entry, at this row.
    Last(E, usize),
    /// Greater than the last entry.
    Above,
    /// Strictly inside, or the ends could not be inspected.
    Inside,
}

// ============================================================================
//  Descent
// ============================================================================

impl<L: EntryList> SkipList<L> {
    /// Walk the lanes down to the level-0 span covering `key`.
    ///
    /// On return (success or abort) `tv` records every bit taken; the caller
    /// releases them with [`release_all`](Self::release_all).
    pub(crate) fn descend(
        &self,
        lanes: &mut LanesGuard<'_, L::Entry>,
        key: &L::Key,
        mode: LaneMode,
        on_equal: OnEqual,
        tv: &mut TraversalVector,
    ) -> Result<Landing<L::Entry>, Abort> {
        let Some(head) = lanes.head else {
            tv.reset(DirNodeId::new(0), 0);
            return Ok(Landing::Span(Span {
                from: None,
                step: 0,
                until: None,
                exact: None,
            }));
        };

        let depth = lanes.depth();
        tv.reset(head, depth);

        let mut level = depth.checked_sub(1).ok_or(Abort::Fail(IndexError::Invalid))?;
        let mut cur = head;
        let mut step = 0;
        let mut exact = None;

        self.take_span(lanes, tv, level, cur, step, mode)?;

        loop {
            let next = lanes.junction(cur, level).next;

            if next != head {
                let target = &lanes.arena[next];
                if target.junctions[level].lock.is_removing() {
                    return Err(Abort::Again);
                }
                let entry = target.entry().ok_or(Abort::Fail(IndexError::Invalid))?;

                let order = MutexGuard::unlocked(lanes, || self.list.compare(entry, key));

                match (order, on_equal) {
                    (Ordering::Less, _) | (Ordering::Equal, OnEqual::StepPast) => {
                        step += lanes.junction(cur, level).count;
                        self.take_span(lanes, tv, level, next, step, mode)?;
                        cur = next;
                        trace_log!(level, step, "lane step");
                        continue;
                    }

                    (Ordering::Equal, OnEqual::Stop) => {
                        let row = step + lanes.junction(cur, level).count;
                        return Ok(Landing::Exact { entry, row });
                    }

                    (Ordering::Equal, OnEqual::Descend) => exact = Some(next),

                    (Ordering::Greater, _) => {}
                }
            }

            if level == 0 {
                let from = lanes.arena[cur].entry();
                let until = if next == head { None } else { lanes.arena[next].entry() };
                return Ok(Landing::Span(Span {
                    from,
                    step,
                    until,
                    exact,
                }));
            }

            level -= 1;
            trace_log!(level, step, "lane drop");
            self.take_span(lanes, tv, level, cur, step, mode)?;
        }
    }

    /// Take the bit on `node`'s junction at `level` and make it the hop for
    /// that lane, releasing whatever the lane held before.
    fn take_span(
        &self,
        lanes: &mut LanesGuard<'_, L::Entry>,
        tv: &mut TraversalVector,
        level: usize,
        node: DirNodeId,
        step: usize,
        mode: LaneMode,
    ) -> Result<(), Abort> {
        let lock = lanes.junction(node, level).lock;
        if lock.is_removing() || !lock.can_read() {
            return Err(Abort::Again);
        }

        let held = match mode {
            LaneMode::Read => {
                lanes.junction_mut(node, level).lock.add_reader();
                LaneBits::Read
            }

            LaneMode::Write => {
                lanes.junction_mut(node, level).lock.set_write();
                while lanes.junction(node, level).lock.readers() > 0 {
                    self.lane_cond.wait(lanes);
                }
                LaneBits::Write
            }
        };

        let previous = tv.replace(level, Hop { node, step, held });
        if previous.held != LaneBits::None {
            lanes.junction_mut(previous.node, level).lock.release(previous.held);
            self.lane_cond.notify_all();
        }

        Ok(())
    }

    /// Claim `node` for removal: removal bit and write bit on every junction,
    /// then wait until no reader is left in any of its spans.
    pub(crate) fn claim(
        &self,
        lanes: &mut LanesGuard<'_, L::Entry>,
        tv: &mut TraversalVector,
        node: DirNodeId,
    ) -> Result<(), Abort> {
        let junctions = &lanes.arena[node].junctions;
        if junctions
            .iter()
            .any(|j| j.lock.is_removing() || j.lock.is_write_locked())
        {
            return Err(Abort::Again);
        }

        for junction in &mut lanes.arena[node].junctions {
            junction.lock.set_removing();
            junction.lock.set_write();
        }
        tv.claim = Some(Claim { node });

        while lanes.arena[node].junctions.iter().any(|j| j.lock.readers() > 0) {
            self.lane_cond.wait(lanes);
        }

        Ok(())
    }

    /// Release every bit `tv` records and wake waiters.
    pub(crate) fn release_all(&self, lanes: &mut LanesGuard<'_, L::Entry>, tv: &mut TraversalVector) {
        let mut released = false;

        for (level, hop) in tv.hops.iter_mut().enumerate() {
            if hop.held == LaneBits::None {
                continue;
            }
            if let Some(junction) = lanes
                .arena
                .get_mut(hop.node)
                .and_then(|node| node.junction_mut(level))
            {
                junction.lock.release(hop.held);
            }
            hop.held = LaneBits::None;
            released = true;
        }

        if let Some(claim) = tv.claim.take() {
            if let Some(node) = lanes.arena.get_mut(claim.node) {
                for junction in &mut node.junctions {
                    junction.lock.clear_removing();
                    junction.lock.clear_write();
                }
            }
            released = true;
        }

        if released {
            self.lane_cond.notify_all();
        }
    }

    /// Release the bits of lanes at or above `depth` and forget those hops.
    pub(crate) fn truncate_hops(
        &self,
        lanes: &mut LanesGuard<'_, L::Entry>,
        tv: &mut TraversalVector,
        depth: usize,
    ) {
        for level in depth..tv.hops.len() {
            let hop = tv.hops[level];
            if hop.held != LaneBits::None {
                lanes.junction_mut(hop.node, level).lock.release(hop.held);
            }
        }
        tv.hops.truncate(depth);
    }

    // ========================================================================
    //  Base-list helpers (index mutex released)
    // ========================================================================

    /// Walk the base list after `from` (list start when `None`) up to the
    /// bound `until`, looking for `key`.
    pub(crate) fn scan(
        &self,
        key: &L::Key,
        from: Option<L::Entry>,
        until: Option<L::Entry>,
    ) -> Scan<L::Entry> {
        let mut pred = from;
        let mut cursor = match from {
            Some(entry) => self.list.next(entry),
            None => self.list.first(),
        };
        let mut offset = 1;

        while let Some(entry) = cursor {
            if Some(entry) == until {
                break;
            }

            match self.list.compare(entry, key) {
                Ordering::Less => {
                    pred = Some(entry);
                    cursor = self.list.next(entry);
                    offset += 1;
                }
                Ordering::Equal => return Scan::Found { entry, offset },
                Ordering::Greater => break,
            }
        }

        Scan::Gap {
            pred,
            succ: cursor,
            offset,
        }
    }

    /// Compare `key` against the first and last entries.
    ///
    /// Both ends are read under a reader slot on the head's and the last
    /// stop's level-0 spans, which every change at either end must write.
    /// Without lanes, ends are stable for any admission holder since every
    /// writer is exclusive. When a slot cannot be taken the answer is
    /// [`Edge::Inside`] and the caller falls back to a full descent.
    pub(crate) fn probe_edges(&self, key: &L::Key) -> Edge<L::Entry> {
        let mut lanes = self.lanes.lock();

        let guarded = match lanes.head {
            None => None,
            Some(head) => {
                let tail = lanes.junction(head, 0).prev;
                let spans = [head, tail];
                if spans.iter().any(|&id| {
                    let lock = lanes.junction(id, 0).lock;
                    lock.is_removing() || !lock.can_read()
                }) {
                    return Edge::Inside;
                }
                for id in spans {
                    lanes.junction_mut(id, 0).lock.add_reader();
                }
                Some(spans)
            }
        };

        let edge = MutexGuard::unlocked(&mut lanes, || {
            let (Some(first), Some(last)) = (self.list.first(), self.list.last()) else {
                return Edge::Empty;
            };

            match self.list.compare(first, key) {
                Ordering::Greater => Edge::Below(first),
                Ordering::Equal => Edge::First(first),
                Ordering::Less => match self.list.compare(last, key) {
                    Ordering::Less => Edge::Above,
                    Ordering::Equal => Edge::Last(last, self.list.count()),
                    Ordering::Greater => Edge::Inside,
                },
            }
        });

        if let Some(spans) = guarded {
            for id in spans {
                lanes.junction_mut(id, 0).lock.remove_reader();
            }
            drop(lanes);
            self.lane_cond.notify_all();
        }

        edge
    }
}
