//! Filepath: src/dirnode.rs
//!
//! DirNodes: the lane stops of the index.
//!
//! A DirNode either is the head ([`NodeKind::Start`]), standing before the
//! first entry and present in every lane, or marks one base-list entry
//! ([`NodeKind::Between`]) in lanes `0..=level`. Each lane membership is a
//! [`Junction`]: the links to the neighbouring DirNodes in that lane, the
//! number of base-list steps to the next one, and the lane lock word of the
//! span it opens.
//!
//! Lanes are circular through the head. The head's `prev` in a lane is the
//! last DirNode of that lane, and the count of the last junction is the
//! number of entries after it (the wrap span).

use crate::lanelock::LaneLock;
use crate::skiplist::IndexError;

/// Handle to a DirNode in the index arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct DirNodeId(u32);

impl DirNodeId {
    #[inline]
    pub(crate) const fn new(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub(crate) const fn raw(self) -> u32 {
        self.0
    }
}

/// Role of a DirNode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeKind {
    /// The head, before the first entry.
    Start,
    /// A stop at one base-list entry.
    Between,
}

/// Membership of a DirNode in one lane.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Junction {
    pub(crate) next: DirNodeId,
    pub(crate) prev: DirNodeId,

    /// Base-list steps from this node's entry to `next`'s entry; for the
    /// last node of a lane, the number of entries after it.
    pub(crate) count: usize,

    /// Lock word of the span this junction opens.
    pub(crate) lock: LaneLock,
}

impl Junction {
    /// A junction linking `id` to itself: an empty lane on the head.
    pub(crate) const fn looped(id: DirNodeId, count: usize) -> Self {
        Self {
            next: id,
            prev: id,
            count,
            lock: LaneLock::new(),
        }
    }
}

/// One lane stop.
#[derive(Debug)]
pub(crate) struct DirNode<E> {
    kind: NodeKind,
    entry: Option<E>,

    /// One per lane, index = level.
    pub(crate) junctions: Vec<Junction>,

    /// Head only: number of Between nodes present in each lane.
    pub(crate) population: Vec<usize>,
}

impl<E: Copy> DirNode<E> {
    /// A Between node for `entry` occupying lanes `0..=level`. Junctions are
    /// filled in when the node is threaded.
    pub(crate) fn between(entry: E, level: usize) -> Result<Self, IndexError> {
        let mut junctions = Vec::new();
        junctions
            .try_reserve_exact(level + 1)
            .map_err(|_| IndexError::NoMemory)?;

        // Placeholder links, overwritten before the node becomes reachable.
        let placeholder = Junction::looped(DirNodeId::new(u32::MAX), 0);
        junctions.resize(level + 1, placeholder);

        Ok(Self {
            kind: NodeKind::Between,
            entry: Some(entry),
            junctions,
            population: Vec::new(),
        })
    }

    /// A head with no lanes yet.
    pub(crate) fn start(levels: usize) -> Result<Self, IndexError> {
        let mut node = Self {
            kind: NodeKind::Start,
            entry: None,
            junctions: Vec::new(),
            population: Vec::new(),
        };
        node.reserve_levels(levels)?;
        Ok(node)
    }

    /// Make room for `levels` lanes on the head.
    pub(crate) fn reserve_levels(&mut self, levels: usize) -> Result<(), IndexError> {
        let extra = levels.saturating_sub(self.junctions.len());
        self.junctions
            .try_reserve(extra)
            .map_err(|_| IndexError::NoMemory)?;
        self.population
            .try_reserve(extra)
            .map_err(|_| IndexError::NoMemory)
    }

    #[inline]
    pub(crate) const fn kind(&self) -> NodeKind {
        self.kind
    }

    #[inline]
    pub(crate) const fn is_head(&self) -> bool {
        matches!(self.kind, NodeKind::Start)
    }

    /// The marked entry; `None` for the head.
    #[inline]
    pub(crate) fn entry(&self) -> Option<E> {
        self.entry
    }

    /// Number of lanes this node is in.
    #[inline]
    pub(crate) fn depth(&self) -> usize {
        self.junctions.len()
    }

    /// Highest lane this node is in.
    #[inline]
    pub(crate) fn level(&self) -> usize {
        self.junctions.len().saturating_sub(1)
    }

    #[inline]
    pub(crate) fn junction(&self, level: usize) -> Option<&Junction> {
        self.junctions.get(level)
    }

    #[inline]
    pub(crate) fn junction_mut(&mut self, level: usize) -> Option<&mut Junction> {
        self.junctions.get_mut(level)
    }
}
