//! # `dirlanes`
//!
//! A concurrent fast-lane index over a caller-owned, ordered, doubly-linked
//! entry list.
//!
//! The list stays the source of truth. The index threads *DirNodes* through
//! a hierarchy of lanes above it, each lane stop recording how many base-list
//! steps separate it from the next stop, so lookups return both the entry and
//! its 1-based row:
//!
//! - find, insert, delete and successor seek in expected logarithmic time,
//! - one admission lock per list ([`SimpleLocking`]) with FIFO writers,
//!   read-to-write upgrade and prelock,
//! - per-span reader/writer/remover bits ([`lanelock::LaneLock`]) so
//!   operations in disjoint parts of the list run in parallel.
//!
//! ## Thread Safety
//!
//! `SkipList<L>` is `Send + Sync` whenever `L: EntryList`. Every operation
//! takes `&self`; contention surfaces as [`IndexError::Again`] only after the
//! configured retries are used up.
//!
//! ```rust
//! use dirlanes::{EntryList, InsertFlags, SkipList, SlabList};
//!
//! let index = SkipList::create(SlabList::new(), 4).unwrap();
//!
//! for key in [30_u32, 10, 20] {
//!     let id = index.list().alloc(key);
//!     index.insert(&key, id, InsertFlags::NONE).unwrap();
//! }
//!
//! let hit = index.find(&20).unwrap();
//! assert_eq!(hit.row, 2);
//! assert_eq!(index.list().get(hit.entry), Some(20));
//!
//! let next = index.seek(&20).unwrap();
//! assert_eq!(index.list().get(next.entry), Some(30));
//!
//! let gone = index.delete(&10).unwrap();
//! assert_eq!(gone.row, 1);
//! assert_eq!(index.list().count(), 2);
//! ```
//!
//! ## Levels
//!
//! Whether an insert gets a DirNode, and how tall, is decided by
//! [`do_levelup`] from the list length alone:
//!
//! ```rust
//! use dirlanes::skiplist::do_levelup;
//!
//! assert_eq!(do_levelup(2, 4, 16), None); // 3 % 4 != 0
//! assert_eq!(do_levelup(3, 4, 16), Some(0)); // 4 = 4^1
//! assert_eq!(do_levelup(15, 4, 16), Some(1)); // 16 = 4^2
//! ```

#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod tracing_helpers;

pub mod alloc;
pub mod config;
mod dirnode;
pub mod lanelock;
pub mod list;
pub mod simple_lock;
pub mod skiplist;

pub use tracing_helpers::init_tracing;

// Re-export main types for convenience
pub use alloc::AllocCounters;
pub use config::{IndexConfig, MAX_LANE_LEVELS};
pub use list::{EntryId, EntryList, SlabList};
pub use simple_lock::{LockError, LockKind, SimpleLock, SimpleLocking};
pub use skiplist::{
    IndexError, IndexStatsSnapshot, InsertFlags, InsertOutcome, LaneReport, LaneViolation,
    Located, SkipList, do_levelup,
};
