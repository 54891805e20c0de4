//! The base list the index is built over.
//!
//! The index never owns entries. The directory layer owns a doubly-linked,
//! totally ordered list of entries and hands the index an [`EntryList`]
//! implementation: navigation, comparison, splice hooks, counters, and the
//! [`SimpleLocking`] group used for admission.
//!
//! [`SlabList`] is a ready-made implementation that stores values in a slab
//! and links them by [`EntryId`] handles instead of embedded pointers.

use std::cmp::Ordering;
use std::fmt as StdFmt;

use parking_lot::RwLock;

use crate::simple_lock::{SimpleLock, SimpleLocking};

// ============================================================================
//  EntryList
// ============================================================================

/// Callback table supplied by the owner of the base list.
///
/// Splice hooks are only invoked while the index holds the lane span (or the
/// whole group) covering the affected neighbours, so implementations only
/// need their own internal consistency, not cross-call atomicity.
pub trait EntryList: Send + Sync {
    /// Handle to one caller-owned entry.
    type Entry: Copy + Eq + StdFmt::Debug + Send + Sync;

    /// What lookups are keyed by.
    type Key: ?Sized;

    /// Successor of `entry` in the list, `None` at the tail.
    fn next(&self, entry: Self::Entry) -> Option<Self::Entry>;

    /// Predecessor of `entry` in the list, `None` at the head.
    fn prev(&self, entry: Self::Entry) -> Option<Self::Entry>;

    /// Order of `entry` relative to `key`. Must be a stable total order.
    fn compare(&self, entry: Self::Entry, key: &Self::Key) -> Ordering;

    /// Link the unlinked `entry` directly before `before`.
    fn insert_before(&self, entry: Self::Entry, before: Self::Entry);

    /// Link the unlinked `entry` directly after `after`, or at the front
    /// when `after` is `None`.
    fn insert_after(&self, entry: Self::Entry, after: Option<Self::Entry>);

    /// Unlink `entry`. The caller still owns it afterwards.
    fn delete(&self, entry: Self::Entry);

    /// Number of linked entries.
    fn count(&self) -> usize;

    /// First linked entry.
    fn first(&self) -> Option<Self::Entry>;

    /// Last linked entry.
    fn last(&self) -> Option<Self::Entry>;

    /// Admission lock group for this list.
    fn locking(&self) -> &SimpleLocking;

    /// Shared admission handle.
    fn create_rlock(&self) -> SimpleLock<'_> {
        self.locking().read_lock()
    }

    /// Exclusive admission handle.
    fn create_wlock(&self) -> SimpleLock<'_> {
        self.locking().write_lock()
    }
}

// ============================================================================
//  SlabList
// ============================================================================

/// Handle to a value stored in a [`SlabList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u32);

impl EntryId {
    /// Slab slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug)]
struct Node<T> {
    value: T,
    prev: Option<EntryId>,
    next: Option<EntryId>,
    linked: bool,
}

#[derive(Debug)]
struct Slab<T> {
    slots: Vec<Option<Node<T>>>,
    free: Vec<u32>,
    head: Option<EntryId>,
    tail: Option<EntryId>,
    len: usize,
    allocated: usize,
}

impl<T> Default for Slab<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
            allocated: 0,
        }
    }
}

impl<T> Slab<T> {
    fn node(&self, id: EntryId) -> Option<&Node<T>> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: EntryId) -> Option<&mut Node<T>> {
        self.slots.get_mut(id.index()).and_then(Option::as_mut)
    }

    fn set_next(&mut self, id: Option<EntryId>, next: Option<EntryId>) {
        match id {
            Some(id) => {
                if let Some(node) = self.node_mut(id) {
                    node.next = next;
                }
            }
            None => self.head = next,
        }
    }

    fn set_prev(&mut self, id: Option<EntryId>, prev: Option<EntryId>) {
        match id {
            Some(id) => {
                if let Some(node) = self.node_mut(id) {
                    node.prev = prev;
                }
            }
            None => self.tail = prev,
        }
    }

    /// Link `id` between `prev` and `next` (either may be the list end).
    fn link(&mut self, id: EntryId, prev: Option<EntryId>, next: Option<EntryId>) {
        let Some(node) = self.node_mut(id) else {
            debug_assert!(false, "link of unknown entry {id:?}");
            return;
        };
        debug_assert!(!node.linked, "entry {id:?} linked twice");

        node.prev = prev;
        node.next = next;
        node.linked = true;

        self.set_next(prev, Some(id));
        self.set_prev(next, Some(id));
        self.len += 1;
    }

    fn unlink(&mut self, id: EntryId) {
        let Some(node) = self.node_mut(id) else {
            debug_assert!(false, "unlink of unknown entry {id:?}");
            return;
        };
        if !node.linked {
            return;
        }

        let (prev, next) = (node.prev, node.next);
        node.prev = None;
        node.next = None;
        node.linked = false;

        self.set_next(prev, next);
        self.set_prev(next, prev);
        self.len -= 1;
    }
}

/// Arena-backed doubly-linked list of ordered values.
///
/// Values are allocated unlinked with [`alloc`](Self::alloc), linked and
/// unlinked by the index through the [`EntryList`] hooks, and released with
/// [`free`](Self::free) once unlinked.
///
/// ```rust
/// use dirlanes::{EntryList, SlabList};
///
/// let list = SlabList::new();
/// let a = list.alloc(10);
/// let b = list.alloc(20);
/// list.insert_after(a, None);
/// list.insert_after(b, Some(a));
///
/// assert_eq!(list.values(), vec![10, 20]);
/// assert_eq!(list.count(), 2);
/// ```
#[derive(Debug)]
pub struct SlabList<T> {
    slab: RwLock<Slab<T>>,
    locking: SimpleLocking,
}

impl<T> Default for SlabList<T> {
    fn default() -> Self {
        Self {
            slab: RwLock::new(Slab::default()),
            locking: SimpleLocking::new(),
        }
    }
}

impl<T> SlabList<T> {
    /// An empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` unlinked and return its handle.
    pub fn alloc(&self, value: T) -> EntryId {
        let mut slab = self.slab.write();
        let node = Node {
            value,
            prev: None,
            next: None,
            linked: false,
        };

        slab.allocated += 1;

        if let Some(index) = slab.free.pop() {
            slab.slots[index as usize] = Some(node);
            return EntryId(index);
        }

        let index = u32::try_from(slab.slots.len()).unwrap_or(u32::MAX);
        slab.slots.push(Some(node));
        EntryId(index)
    }

    /// Release an unlinked entry and return its value.
    ///
    /// Returns `None` for unknown handles and for entries still linked.
    pub fn free(&self, id: EntryId) -> Option<T> {
        let mut slab = self.slab.write();

        if slab.node(id).is_none_or(|node| node.linked) {
            return None;
        }

        let node = slab.slots.get_mut(id.index())?.take()?;
        slab.free.push(id.0);
        slab.allocated -= 1;
        Some(node.value)
    }

    /// Run `f` on the value behind `id`.
    pub fn with<R>(&self, id: EntryId, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.slab.read().node(id).map(|node| f(&node.value))
    }

    /// Is `id` currently linked into the list?
    #[must_use]
    pub fn is_linked(&self, id: EntryId) -> bool {
        self.slab.read().node(id).is_some_and(|node| node.linked)
    }

    /// Number of live slots, linked or not.
    #[must_use]
    pub fn allocated(&self) -> usize {
        self.slab.read().allocated
    }

    /// Number of linked entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slab.read().len
    }

    /// No linked entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handles in list order.
    #[must_use]
    pub fn ids(&self) -> Vec<EntryId> {
        let slab = self.slab.read();
        let mut out = Vec::with_capacity(slab.len);
        let mut cursor = slab.head;

        while let Some(id) = cursor {
            out.push(id);
            cursor = slab.node(id).and_then(|node| node.next);
        }

        out
    }
}

impl<T: Clone> SlabList<T> {
    /// Copy of the value behind `id`.
    #[must_use]
    pub fn get(&self, id: EntryId) -> Option<T> {
        self.with(id, T::clone)
    }

    /// Values in list order.
    #[must_use]
    pub fn values(&self) -> Vec<T> {
        let slab = self.slab.read();
        let mut out = Vec::with_capacity(slab.len);
        let mut cursor = slab.head;

        while let Some(id) = cursor {
            let Some(node) = slab.node(id) else { break };
            out.push(node.value.clone());
            cursor = node.next;
        }

        out
    }

    /// Iterator over a snapshot of the values in list order.
    pub fn iter(&self) -> impl Iterator<Item = T> + use<T> {
        self.values().into_iter()
    }
}

impl<T: Ord + Send + Sync> EntryList for SlabList<T> {
    type Entry = EntryId;
    type Key = T;

    fn next(&self, entry: EntryId) -> Option<EntryId> {
        self.slab.read().node(entry).and_then(|node| node.next)
    }

    fn prev(&self, entry: EntryId) -> Option<EntryId> {
        self.slab.read().node(entry).and_then(|node| node.prev)
    }

    fn compare(&self, entry: EntryId, key: &T) -> Ordering {
        self.slab
            .read()
            .node(entry)
            .map_or(Ordering::Greater, |node| node.value.cmp(key))
    }

    fn insert_before(&self, entry: EntryId, before: EntryId) {
        let mut slab = self.slab.write();
        let prev = slab.node(before).and_then(|node| node.prev);
        slab.link(entry, prev, Some(before));
    }

    fn insert_after(&self, entry: EntryId, after: Option<EntryId>) {
        let mut slab = self.slab.write();
        let next = match after {
            Some(after) => slab.node(after).and_then(|node| node.next),
            None => slab.head,
        };
        slab.link(entry, after, next);
    }

    fn delete(&self, entry: EntryId) {
        self.slab.write().unlink(entry);
    }

    fn count(&self) -> usize {
        self.slab.read().len
    }

    fn first(&self) -> Option<EntryId> {
        self.slab.read().head
    }

    fn last(&self) -> Option<EntryId> {
        self.slab.read().tail
    }

    fn locking(&self) -> &SimpleLocking {
        &self.locking
    }
}
