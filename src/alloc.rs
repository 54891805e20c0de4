//! DirNode storage for the lane index.
//!
//! [`LaneArena`] stores every DirNode of one index in a slab addressed by
//! [`DirNodeId`]. Lanes link nodes by id, so nodes never need a stable heap
//! address and freed slots are reused without any deferred reclamation:
//! all access to the arena happens under the index mutex, and a node is only
//! freed once no traversal can reach it.
//!
//! Growth goes through `try_reserve`, so running out of memory surfaces as
//! [`IndexError::NoMemory`] instead of aborting. Callers reserve capacity
//! before they make irreversible changes to the base list and then insert
//! into the reservation infallibly.

use std::ops::{Index, IndexMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::dirnode::{DirNode, DirNodeId};
use crate::skiplist::IndexError;

// ============================================================================
//  AllocCounters
// ============================================================================

/// Running totals of DirNode allocations.
///
/// Shared through an `Arc` so the totals outlive the index that produced
/// them; after `destroy`, `allocated() == freed()` for a leak-free run.
#[derive(Debug, Default)]
pub struct AllocCounters {
    allocated: AtomicUsize,
    freed: AtomicUsize,
}

impl AllocCounters {
    /// DirNodes ever allocated (head included).
    #[must_use]
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    /// DirNodes ever freed.
    #[must_use]
    pub fn freed(&self) -> usize {
        self.freed.load(Ordering::Relaxed)
    }

    /// DirNodes currently alive.
    #[must_use]
    pub fn live(&self) -> usize {
        self.allocated().saturating_sub(self.freed())
    }

    fn record_alloc(&self) {
        self.allocated.fetch_add(1, Ordering::Relaxed);
    }

    fn record_free(&self) {
        self.freed.fetch_add(1, Ordering::Relaxed);
    }
}

// ============================================================================
//  LaneArena
// ============================================================================

/// Slab of DirNodes with a free list.
#[derive(Debug)]
pub(crate) struct LaneArena<E> {
    slots: Vec<Option<DirNode<E>>>,
    free: Vec<u32>,
    live: usize,
    counters: Arc<AllocCounters>,
}

impl<E> Default for LaneArena<E> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            counters: Arc::new(AllocCounters::default()),
        }
    }
}

impl<E> LaneArena<E> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn counters(&self) -> &Arc<AllocCounters> {
        &self.counters
    }

    /// Number of DirNodes alive in this arena.
    pub(crate) const fn live(&self) -> usize {
        self.live
    }

    /// Make sure `additional` more nodes fit without reallocating.
    pub(crate) fn reserve(&mut self, additional: usize) -> Result<(), IndexError> {
        let recycled = self.free.len();
        if recycled >= additional {
            return Ok(());
        }

        let needed = additional - recycled;
        if u32::try_from(self.slots.len() + needed).is_err() {
            return Err(IndexError::NoMemory);
        }

        self.slots
            .try_reserve(needed)
            .map_err(|_| IndexError::NoMemory)
    }

    /// Store `node`. Fails only when [`reserve`](Self::reserve) was skipped
    /// and the slab cannot grow.
    pub(crate) fn insert(&mut self, node: DirNode<E>) -> Result<DirNodeId, IndexError> {
        self.reserve(1)?;

        let id = if let Some(index) = self.free.pop() {
            self.slots[index as usize] = Some(node);
            DirNodeId::new(index)
        } else {
            let index = u32::try_from(self.slots.len()).map_err(|_| IndexError::NoMemory)?;
            self.slots.push(Some(node));
            DirNodeId::new(index)
        };

        self.live += 1;
        self.counters.record_alloc();
        Ok(id)
    }

    /// Drop the node behind `id` and recycle its slot.
    pub(crate) fn remove(&mut self, id: DirNodeId) -> Option<DirNode<E>> {
        let node = self.slots.get_mut(id.index())?.take()?;
        self.free.push(id.raw());
        self.live -= 1;
        self.counters.record_free();
        Some(node)
    }

    #[inline]
    pub(crate) fn get(&self, id: DirNodeId) -> Option<&DirNode<E>> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, id: DirNodeId) -> Option<&mut DirNode<E>> {
        self.slots.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Free every node.
    pub(crate) fn clear(&mut self) {
        let freed = self.live;
        self.slots.clear();
        self.free.clear();
        self.live = 0;
        for _ in 0..freed {
            self.counters.record_free();
        }
    }

    /// Ids of every live node, in slot order.
    pub(crate) fn ids(&self) -> impl Iterator<Item = DirNodeId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .filter_map(|(index, _)| u32::try_from(index).ok().map(DirNodeId::new))
    }
}

// Lane links only ever name live nodes; a dangling id is a broken lane.
impl<E> Index<DirNodeId> for LaneArena<E> {
    type Output = DirNode<E>;

    #[inline]
    fn index(&self, id: DirNodeId) -> &DirNode<E> {
        match self.slots.get(id.index()) {
            Some(Some(node)) => node,
            _ => panic!("dangling DirNode id {id:?}"),
        }
    }
}

impl<E> IndexMut<DirNodeId> for LaneArena<E> {
    #[inline]
    fn index_mut(&mut self, id: DirNodeId) -> &mut DirNode<E> {
        match self.slots.get_mut(id.index()) {
            Some(Some(node)) => node,
            _ => panic!("dangling DirNode id {id:?}"),
        }
    }
}

impl<E> Drop for LaneArena<E> {
    fn drop(&mut self) {
        self.clear();
    }
}

// ============================================================================
//  Tests
// ============================================================================
