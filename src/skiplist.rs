//! Filepath: src/skiplist.rs
//! `SkipList` - concurrent fast-lane index over a caller-owned entry list.
//!
//! The index threads DirNodes through lanes above the base list. Each lane
//! stop records how many base-list steps lie between it and the next stop,
//! so a descent yields both the entry and its row (1-based position)
//! without walking the whole list.
//!
//! # Locking
//! Two scopes cooperate:
//! - The admission lock ([`SimpleLocking`](crate::SimpleLocking), owned by
//!   the base list): shared for ordinary operations, exclusive for anything
//!   that changes the head DirNode (creating, growing, shrinking, dropping).
//! - Lane bits ([`LaneLock`](crate::lanelock::LaneLock)) on the span each
//!   junction opens, all guarded by one index mutex. Readers never wait on
//!   a bit: they abort with [`IndexError::Again`] and the operation retries.
//!   Writers wait only for readers to drain from a span.
//!
//! The comparator and base-list hooks always run with the index mutex
//! released, protected by the lane bits the operation holds.

use std::fmt as StdFmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::thread;

use parking_lot::{Condvar, Mutex};

use crate::alloc::AllocCounters;
use crate::config::IndexConfig;
use crate::list::EntryList;
use crate::simple_lock::LockError;
use crate::tracing_helpers::{debug_log, trace_log, warn_log};

mod delete;
mod find;
mod insert;
mod lanes;
mod levelup;
mod seek;
mod traverse;
mod validate;


use lanes::Lanes;
use traverse::TraversalVector;

pub use levelup::{do_levelup, lane_capacity};
pub use validate::{LaneReport, LaneViolation};

// ============================================================================
//  IndexError
// ============================================================================

/// Failures surfaced by index operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexError {
    /// No entry matches the key.
    NotFound,

    /// An entry with an equal key is already linked.
    Exists,

    /// Contention persisted through every retry.
    Again,

    /// Bad configuration, lock misuse, or a corrupted lane.
    Invalid,

    /// DirNode storage could not be allocated.
    NoMemory,
}

impl IndexError {
    /// Linux errno equivalent, for the directory layer's replies.
    #[must_use]
    pub const fn errno(self) -> i32 {
        match self {
            Self::NotFound => 2,
            Self::Exists => 17,
            Self::Again => 11,
            Self::Invalid => 22,
            Self::NoMemory => 12,
        }
    }
}

impl StdFmt::Display for IndexError {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        match self {
            Self::NotFound => write!(f, "no entry matches the key"),

            Self::Exists => write!(f, "entry already exists"),

            Self::Again => write!(f, "lane contention persisted, try again"),

            Self::Invalid => write!(f, "invalid argument or lane state"),

            Self::NoMemory => write!(f, "out of memory for lane nodes"),
        }
    }
}

impl std::error::Error for IndexError {}

impl From<LockError> for IndexError {
    fn from(_: LockError) -> Self {
        Self::Invalid
    }
}

// ============================================================================
//  Results
// ============================================================================

/// An entry together with its row (1-based position in the list).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Located<E> {
    /// The entry handle.
    pub entry: E,
    /// 1-based position.
    pub row: usize,
}

/// Outcome of [`SkipList::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome<E> {
    /// The entry was linked at `row`.
    Inserted(Located<E>),
    /// An equal entry was already linked; the new entry was left untouched.
    Existing(Located<E>),
}

impl<E: Copy> InsertOutcome<E> {
    /// Where the key now lives (the new entry, or the one already there).
    #[must_use]
    pub const fn located(&self) -> Located<E> {
        match *self {
            Self::Inserted(located) | Self::Existing(located) => located,
        }
    }

    /// Did this call link the entry?
    #[must_use]
    pub const fn is_inserted(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }

    /// The error a caller reports for this outcome, if any.
    #[must_use]
    pub const fn error(&self) -> Option<IndexError> {
        match self {
            Self::Inserted(_) => None,
            Self::Existing(_) => Some(IndexError::Exists),
        }
    }
}

/// Flags for [`SkipList::insert`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertFlags(u8);

impl InsertFlags {
    /// No flags.
    pub const NONE: Self = Self(0);

    /// The entry never becomes a lane stop (short-lived entries).
    pub const NOLANE: Self = Self(1 << 0);

    /// Does `self` include every flag in `other`?
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for InsertFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Why one attempt of an operation stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Abort {
    /// Final answer; no retry.
    Fail(IndexError),
    /// Contention; retry from scratch.
    Again,
    /// The change needs the exclusive admission lock; retry with it.
    Escalate,
}

impl From<IndexError> for Abort {
    fn from(err: IndexError) -> Self {
        Self::Fail(err)
    }
}

impl From<LockError> for Abort {
    fn from(err: LockError) -> Self {
        Self::Fail(err.into())
    }
}

// ============================================================================
//  Stats
// ============================================================================

#[derive(Debug, Default)]
pub(crate) struct IndexStats {
    finds: AtomicU64,
    inserts: AtomicU64,
    deletes: AtomicU64,
    seeks: AtomicU64,
    retries: AtomicU64,
    escalations: AtomicU64,
    contention: AtomicU64,
    dirnodes_created: AtomicU64,
    dirnodes_removed: AtomicU64,
    head_resizes: AtomicU64,
}

#[inline]
fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, AtomicOrdering::Relaxed);
}

impl IndexStats {
    fn snapshot(&self) -> IndexStatsSnapshot {
        let load = |c: &AtomicU64| c.load(AtomicOrdering::Relaxed);
        IndexStatsSnapshot {
            finds: load(&self.finds),
            inserts: load(&self.inserts),
            deletes: load(&self.deletes),
            seeks: load(&self.seeks),
            retries: load(&self.retries),
            escalations: load(&self.escalations),
            contention: load(&self.contention),
            dirnodes_created: load(&self.dirnodes_created),
            dirnodes_removed: load(&self.dirnodes_removed),
            head_resizes: load(&self.head_resizes),
        }
    }
}

/// Point-in-time copy of the index counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStatsSnapshot {
    /// `find` / `find_batch` calls.
    pub finds: u64,
    /// `insert` / `insert_batch` calls.
    pub inserts: u64,
    /// `delete` / `delete_batch` calls.
    pub deletes: u64,
    /// `seek` / `seek_batch` calls.
    pub seeks: u64,
    /// Attempts abandoned for contention and retried.
    pub retries: u64,
    /// Delete attempts rerun under the exclusive admission lock.
    pub escalations: u64,
    /// Operations that ran out of retries.
    pub contention: u64,
    /// DirNodes threaded into lanes (head excluded).
    pub dirnodes_created: u64,
    /// DirNodes removed from lanes (head excluded).
    pub dirnodes_removed: u64,
    /// Head DirNode grown or shrunk.
    pub head_resizes: u64,
}

// ============================================================================
//  SkipList
// ============================================================================

/// Concurrent fast-lane index over an [`EntryList`].
///
/// All operations take `&self`; share the index across threads with `Arc`.
///
/// ```rust
/// use dirlanes::{InsertFlags, SkipList, SlabList};
///
/// let index = SkipList::create(SlabList::new(), 4).unwrap();
/// for key in [5u32, 1, 3] {
///     let id = index.list().alloc(key);
///     index.insert(&key, id, InsertFlags::NONE).unwrap();
/// }
///
/// assert_eq!(index.find(&3).unwrap().row, 2);
/// assert_eq!(index.list().values(), vec![1, 3, 5]);
/// ```
pub struct SkipList<L: EntryList> {
    list: L,
    config: IndexConfig,

    /// DirNodes, the head, and every junction lock word.
    lanes: Mutex<Lanes<L::Entry>>,

    /// Broadcast whenever a lane bit is released.
    lane_cond: Condvar,

    stats: IndexStats,
}

impl<L: EntryList> StdFmt::Debug for SkipList<L> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("SkipList")
            .field("len", &self.list.count())
            .field("lane_depth", &self.lane_depth())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<L: EntryList> SkipList<L> {
    // ========================================================================
    //  Lifecycle
    // ========================================================================

    /// Build an index over `list` with no lanes yet.
    ///
    /// The list may already hold entries; they are reachable through the
    /// base list and pick up lanes as later inserts arrive.
    ///
    /// # Errors
    /// [`IndexError::Invalid`] if `config` fails [`IndexConfig::validate`].
    pub fn init(list: L, config: IndexConfig) -> Result<Self, IndexError> {
        config.validate()?;

        debug_log!(prob = config.prob, max_levels = config.max_levels, "index init");

        Ok(Self {
            list,
            config,
            lanes: Mutex::new(Lanes::new()),
            lane_cond: Condvar::new(),
            stats: IndexStats::default(),
        })
    }

    /// [`init`](Self::init) with default tunables and lane density `prob`.
    ///
    /// # Errors
    /// [`IndexError::Invalid`] when `prob < 2`.
    pub fn create(list: L, prob: u32) -> Result<Self, IndexError> {
        Self::init(list, IndexConfig::with_prob(prob))
    }

    /// Free every DirNode. Entries stay linked in the base list.
    ///
    /// # Errors
    /// [`IndexError::Invalid`] if the admission lock is misused.
    pub fn clear(&self) -> Result<(), IndexError> {
        let mut admission = self.list.create_wlock();
        admission.lock()?;

        let mut lanes = self.lanes.lock();
        let freed = lanes.arena.live();
        lanes.clear();
        drop(lanes);

        debug_log!(freed, "lanes cleared");
        admission.unlock()?;
        Ok(())
    }

    /// Tear the index down and hand the base list back.
    #[must_use]
    pub fn destroy(self) -> L {
        let Self { list, lanes, .. } = self;
        lanes.into_inner().clear();
        list
    }

    // ========================================================================
    //  Introspection
    // ========================================================================

    /// The base list.
    #[inline]
    pub const fn list(&self) -> &L {
        &self.list
    }

    /// Active tunables.
    #[inline]
    pub const fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Number of linked entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.list.count()
    }

    /// No linked entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of lanes (0 when there is no head DirNode).
    pub fn lane_depth(&self) -> usize {
        self.lanes.lock().depth()
    }

    /// Number of Between DirNodes (head excluded).
    pub fn dirnode_count(&self) -> usize {
        let lanes = self.lanes.lock();
        lanes.population(0)
    }

    /// Junction counts around lane `level`, starting at the head.
    ///
    /// Meaningful while no writer is active; the sum equals [`len`](Self::len).
    /// Empty when `level` is not a lane.
    pub fn lane_counts(&self, level: usize) -> Vec<usize> {
        self.lanes.lock().lane_counts(level)
    }

    /// Operation and restructuring counters.
    pub fn stats(&self) -> IndexStatsSnapshot {
        self.stats.snapshot()
    }

    /// DirNode allocation totals; the handle outlives the index.
    pub fn alloc_counters(&self) -> Arc<AllocCounters> {
        Arc::clone(self.lanes.lock().arena.counters())
    }

    // ========================================================================
    //  Shared helpers
    // ========================================================================

    /// Lane level for an entry about to be inserted.
    fn levelup(&self, flags: InsertFlags) -> Option<usize> {
        if flags.contains(InsertFlags::NOLANE) {
            return None;
        }
        do_levelup(self.list.count(), self.config.prob, self.config.max_levels)
    }

    /// Run `attempt` until it settles, at most `limit` times.
    ///
    /// `attempt` receives whether it must take the exclusive admission lock;
    /// this turns on after the first [`Abort::Escalate`] and stays on.
    fn retry<T>(
        &self,
        op: &'static str,
        limit: u32,
        mut attempt: impl FnMut(bool) -> Result<T, Abort>,
    ) -> Result<T, IndexError> {
        let mut exclusive = false;

        for n in 0..limit {
            match attempt(exclusive) {
                Ok(value) => return Ok(value),

                Err(Abort::Fail(err)) => return Err(err),

                Err(Abort::Again) => {
                    bump(&self.stats.retries);
                    trace_log!(op, attempt = n, "lane contention, retrying");
                    backoff(n);
                }

                Err(Abort::Escalate) => {
                    bump(&self.stats.escalations);
                    trace_log!(op, attempt = n, "escalating to exclusive admission");
                    exclusive = true;
                }
            }
        }

        bump(&self.stats.contention);
        warn_log!(op, attempts = limit, "retries exhausted");
        Err(IndexError::Again)
    }
}

/// Spin briefly on early attempts, then give up the time slice.
fn backoff(attempt: u32) {
    if attempt < 6 {
        for _ in 0..(1u32 << attempt) {
            std::hint::spin_loop();
        }
    }
    thread::yield_now();
}

// ============================================================================
//  Tests
// ============================================================================

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Fail fast in tests")]
mod tests {
    use super::*;
    use crate::list::{EntryId, SlabList};

    fn _assert_send_sync()
    where
        SkipList<SlabList<u64>>: Send + Sync,
    {
    }

    fn index(prob: u32) -> SkipList<SlabList<u32>> {
        SkipList::create(SlabList::new(), prob).unwrap()
    }

    fn add(index: &SkipList<SlabList<u32>>, key: u32) -> InsertOutcome<EntryId> {
        let id = index.list().alloc(key);
        let outcome = index.insert(&key, id, InsertFlags::NONE).unwrap();
        if !outcome.is_inserted() {
            index.list().free(id);
        }
        outcome
    }

    fn lane_sum(index: &SkipList<SlabList<u32>>, level: usize) -> usize {
        index.lane_counts(level).iter().sum()
    }

    // ========================================================================
    //  Errors and flags
    // ========================================================================

    #[test]
    fn test_errno_mapping() {
        assert_eq!(IndexError::NotFound.errno(), 2);
        assert_eq!(IndexError::Exists.errno(), 17);
        assert_eq!(IndexError::Again.errno(), 11);
        assert_eq!(IndexError::Invalid.errno(), 22);
        assert_eq!(IndexError::NoMemory.errno(), 12);
    }

    #[test]
    fn test_lock_error_maps_to_invalid() {
        assert_eq!(IndexError::from(LockError::NotHeld), IndexError::Invalid);
    }

    #[test]
    fn test_insert_flags() {
        assert!(!InsertFlags::NONE.contains(InsertFlags::NOLANE));
        assert!((InsertFlags::NONE | InsertFlags::NOLANE).contains(InsertFlags::NOLANE));
        assert!(InsertFlags::NOLANE.contains(InsertFlags::NONE));
    }

    #[test]
    fn test_create_rejects_low_prob() {
        assert_eq!(
            SkipList::create(SlabList::<u32>::new(), 1).unwrap_err(),
            IndexError::Invalid
        );
    }

    // ========================================================================
    //  Basic behaviour
    // ========================================================================

    #[test]
    fn test_new_index_is_empty() {
        let index = index(4);
        assert!(index.is_empty());
        assert_eq!(index.lane_depth(), 0);
        assert_eq!(index.dirnode_count(), 0);
        assert_eq!(index.find(&1), Err(IndexError::NotFound));
        assert_eq!(index.seek(&1), Err(IndexError::NotFound));
        assert_eq!(index.delete(&1), Err(IndexError::NotFound));
    }

    #[test]
    fn test_small_list_rows() {
        let index = index(4);
        for key in [5, 1, 3] {
            assert!(add(&index, key).is_inserted());
        }

        assert_eq!(index.find(&3).unwrap().row, 2);
        assert_eq!(index.find(&1).unwrap().row, 1);
        assert_eq!(index.find(&5).unwrap().row, 3);
        assert_eq!(index.find(&4), Err(IndexError::NotFound));
        assert_eq!(index.lane_depth(), 0);
    }

    #[test]
    fn test_duplicate_insert_reports_existing() {
        let index = index(4);
        add(&index, 7);

        let outcome = add(&index, 7);
        assert!(!outcome.is_inserted());
        assert_eq!(outcome.error(), Some(IndexError::Exists));
        assert_eq!(outcome.located().row, 1);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_lanes_appear_and_counts_sum() {
        let index = index(4);
        for key in 1..=20 {
            add(&index, key);
        }

        assert!(index.lane_depth() >= 1);
        assert!(index.dirnode_count() >= 1);
        for level in 0..index.lane_depth() {
            assert_eq!(lane_sum(&index, level), 20, "level {level}");
        }

        let located = index.delete(&10).unwrap();
        assert_eq!(located.row, 10);
        assert_eq!(index.len(), 19);
        assert_eq!(lane_sum(&index, 0), 19);
        index.validate().unwrap();
    }

    #[test]
    fn test_rows_match_positions() {
        let index = index(2);
        let keys: Vec<u32> = (0..200).map(|i| (i * 37) % 211).collect();
        for &key in &keys {
            add(&index, key);
        }
        index.validate().unwrap();

        let mut sorted = keys.clone();
        sorted.sort_unstable();
        for (pos, key) in sorted.iter().enumerate() {
            let located = index.find(key).unwrap();
            assert_eq!(located.row, pos + 1, "key {key}");
            assert_eq!(index.list().get(located.entry), Some(*key));
        }
    }

    #[test]
    fn test_seek_semantics() {
        let index = index(4);
        for key in (10..=100).step_by(10) {
            add(&index, key);
        }

        let next = index.seek(&25).unwrap();
        assert_eq!(index.list().get(next.entry), Some(30));
        assert_eq!(next.row, 3);

        let past_exact = index.seek(&30).unwrap();
        assert_eq!(index.list().get(past_exact.entry), Some(40));
        assert_eq!(past_exact.row, 4);

        assert_eq!(index.seek(&100), Err(IndexError::NotFound));
        assert_eq!(index.seek(&1000), Err(IndexError::NotFound));

        let first = index.seek(&1).unwrap();
        assert_eq!(index.list().get(first.entry), Some(10));
        assert_eq!(first.row, 1);
    }

    #[test]
    fn test_nolane_never_creates_dirnodes() {
        let index = index(2);
        for key in 0..64u32 {
            let id = index.list().alloc(key);
            index.insert(&key, id, InsertFlags::NOLANE).unwrap();
        }
        assert_eq!(index.lane_depth(), 0);
        assert_eq!(index.dirnode_count(), 0);
        assert_eq!(index.find(&40).unwrap().row, 41);
    }

    #[test]
    fn test_delete_everything_drops_head() {
        let index = index(2);
        for key in 0..100 {
            add(&index, key);
        }
        assert!(index.lane_depth() > 0);

        for key in 0..100 {
            let located = index.delete(&key).unwrap();
            index.list().free(located.entry);
        }

        assert!(index.is_empty());
        assert_eq!(index.lane_depth(), 0);
        assert_eq!(index.dirnode_count(), 0);
        let counters = index.alloc_counters();
        assert_eq!(counters.live(), 0);
    }

    #[test]
    fn test_clear_keeps_entries() {
        let index = index(2);
        for key in 0..50 {
            add(&index, key);
        }
        index.clear().unwrap();

        assert_eq!(index.lane_depth(), 0);
        assert_eq!(index.len(), 50);
        assert_eq!(index.find(&25).unwrap().row, 26);
    }

    #[test]
    fn test_destroy_returns_list() {
        let index = index(2);
        for key in 0..30 {
            add(&index, key);
        }
        let counters = index.alloc_counters();
        assert!(counters.live() > 0);

        let list = index.destroy();
        assert_eq!(list.len(), 30);
        assert_eq!(counters.live(), 0);
        assert_eq!(counters.allocated(), counters.freed());
    }

    #[test]
    fn test_batch_variants() {
        let index = index(4);
        for key in 0..40u32 {
            let id = index.list().alloc(key);
            index.insert_batch(&key, id, InsertFlags::NONE).unwrap();
        }

        assert_eq!(index.find_batch(&7).unwrap().row, 8);
        let next = index.seek_batch(&7).unwrap();
        assert_eq!(index.list().get(next.entry), Some(8));

        index.delete_batch(&7).unwrap();
        assert_eq!(index.find_batch(&7), Err(IndexError::NotFound));
        assert_eq!(index.len(), 39);
        index.validate().unwrap();
    }

    #[test]
    fn test_stats_count_operations() {
        let index = index(4);
        for key in 0..10 {
            add(&index, key);
        }
        let _ = index.find(&3);
        let _ = index.seek(&3);
        let _ = index.delete(&3);

        let stats = index.stats();
        assert_eq!(stats.inserts, 10);
        assert_eq!(stats.finds, 1);
        assert_eq!(stats.seeks, 1);
        assert_eq!(stats.deletes, 1);
        assert_eq!(stats.contention, 0);
    }

    // ========================================================================
    //  Bounded retries
    // ========================================================================

    /// Hold or drop the write bit on the span the head opens at the top lane.
    fn hold_top_span<L: EntryList>(index: &SkipList<L>, held: bool) {
        let mut lanes = index.lanes.lock();
        let head = lanes.head.unwrap();
        let top = lanes.depth() - 1;
        let lock = &mut lanes.junction_mut(head, top).lock;
        if held {
            lock.set_write();
        } else {
            lock.clear_write();
        }
        drop(lanes);
        index.lane_cond.notify_all();
    }

    #[test]
    fn test_retry_limit_surfaces_again() {
        let index = index(4);
        for key in (0..128).step_by(2) {
            add(&index, key);
        }
        assert_eq!(index.len(), 64);
        assert!(index.lane_depth() >= 2);

        hold_top_span(&index, true);

        let before = index.stats();
        assert_eq!(index.find(&30), Err(IndexError::Again));
        let after_find = index.stats();
        assert_eq!(
            after_find.retries - before.retries,
            u64::from(index.config().find_retries)
        );
        assert_eq!(after_find.contention - before.contention, 1);

        let id = index.list().alloc(31);
        let result = index.insert(&31, id, InsertFlags::NOLANE);
        assert!(matches!(result, Err(IndexError::Again)));
        let after_insert = index.stats();
        assert_eq!(
            after_insert.retries - after_find.retries,
            u64::from(index.config().insert_retries)
        );
        assert_eq!(after_insert.contention - after_find.contention, 1);
        assert_eq!(index.len(), 64);
        assert_eq!(index.find_batch(&32), Err(IndexError::Again));

        hold_top_span(&index, false);

        assert_eq!(index.find(&30).unwrap().row, 16);
        assert!(index.insert(&31, id, InsertFlags::NOLANE).unwrap().is_inserted());
        assert_eq!(index.find(&32).unwrap().row, 18);
        assert_eq!(index.len(), 65);
        index.validate().unwrap();
    }

    /// `SlabList` whose next `count()` reports a pinned length once.
    struct PinnedCount {
        list: SlabList<u32>,
        pinned: std::sync::atomic::AtomicUsize,
    }

    impl PinnedCount {
        fn new() -> Self {
            Self {
                list: SlabList::new(),
                pinned: std::sync::atomic::AtomicUsize::new(usize::MAX),
            }
        }

        fn pin_next_count(&self, count: usize) {
            self.pinned.store(count, AtomicOrdering::SeqCst);
        }
    }

    impl EntryList for PinnedCount {
        type Entry = EntryId;
        type Key = u32;

        fn next(&self, entry: EntryId) -> Option<EntryId> {
            self.list.next(entry)
        }

        fn prev(&self, entry: EntryId) -> Option<EntryId> {
            self.list.prev(entry)
        }

        fn compare(&self, entry: EntryId, key: &u32) -> std::cmp::Ordering {
            self.list.compare(entry, key)
        }

        fn insert_before(&self, entry: EntryId, before: EntryId) {
            self.list.insert_before(entry, before);
        }

        fn insert_after(&self, entry: EntryId, after: Option<EntryId>) {
            self.list.insert_after(entry, after);
        }

        fn delete(&self, entry: EntryId) {
            self.list.delete(entry);
        }

        fn count(&self) -> usize {
            match self.pinned.swap(usize::MAX, AtomicOrdering::SeqCst) {
                usize::MAX => self.list.count(),
                pinned => pinned,
            }
        }

        fn first(&self) -> Option<EntryId> {
            self.list.first()
        }

        fn last(&self) -> Option<EntryId> {
            self.list.last()
        }

        fn locking(&self) -> &crate::simple_lock::SimpleLocking {
            self.list.locking()
        }
    }

    #[test]
    fn test_insert_level_fixed_across_retries() {
        let config = IndexConfig {
            insert_retries: 1_000_000,
            ..IndexConfig::with_prob(4)
        };
        let index = Arc::new(SkipList::init(PinnedCount::new(), config).unwrap());
        for i in 0..20u32 {
            let key = i * 10;
            let id = index.list().list.alloc(key);
            index.insert(&key, id, InsertFlags::NONE).unwrap();
        }
        let depth = index.lane_depth();
        assert!((1..=2).contains(&depth));

        // Two neighbouring entries, neither a lane stop.
        let stops: Vec<usize> = index
            .lane_counts(0)
            .iter()
            .scan(0, |row, count| {
                *row += count;
                Some(*row)
            })
            .collect();
        let row = (1..20)
            .find(|r| !stops.contains(r) && !stops.contains(&(r + 1)))
            .unwrap();
        let key = (u32::try_from(row).unwrap() - 1) * 10 + 5;

        // 64 entries call for a level-2 stop, 21 for none.
        assert_eq!(do_levelup(63, 4, 16), Some(2));
        assert_eq!(do_levelup(20, 4, 16), None);

        hold_top_span(&index, true);
        index.list().pin_next_count(63);
        let before = index.stats();

        let inserter = {
            let index = Arc::clone(&index);
            thread::spawn(move || {
                let id = index.list().list.alloc(key);
                index.insert(&key, id, InsertFlags::NONE)
            })
        };

        while index.stats().retries < before.retries + 3 {
            thread::yield_now();
        }
        hold_top_span(&index, false);

        let outcome = inserter.join().unwrap().unwrap();
        assert!(outcome.is_inserted());
        assert_eq!(index.lane_depth(), 3);
        assert_eq!(
            index.stats().dirnodes_created,
            before.dirnodes_created + 1
        );
        assert_eq!(index.find(&key).unwrap().row, row + 1);
        index.validate().unwrap();
    }
}
