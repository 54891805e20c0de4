//! Lane storage and the structural edits made under the index mutex.
//!
//! [`Lanes`] owns the DirNode arena and the head. Every method here runs
//! with the index mutex held and assumes the caller already owns the lane
//! bits (or the exclusive admission lock) that make the edit safe.

use crate::alloc::LaneArena;
use crate::dirnode::{DirNode, DirNodeId, Junction};
use crate::skiplist::IndexError;
use crate::skiplist::traverse::Hop;

/// DirNode arena plus the head DirNode, if any.
#[derive(Debug)]
pub(crate) struct Lanes<E> {
    pub(crate) arena: LaneArena<E>,
    pub(crate) head: Option<DirNodeId>,
}

impl<E: Copy> Lanes<E> {
    pub(crate) fn new() -> Self {
        Self {
            arena: LaneArena::new(),
            head: None,
        }
    }

    /// Number of lanes.
    pub(crate) fn depth(&self) -> usize {
        self.head.map_or(0, |head| self.arena[head].depth())
    }

    #[inline]
    pub(crate) fn junction(&self, id: DirNodeId, level: usize) -> Junction {
        self.arena[id].junctions[level]
    }

    #[inline]
    pub(crate) fn junction_mut(&mut self, id: DirNodeId, level: usize) -> &mut Junction {
        &mut self.arena[id].junctions[level]
    }

    /// Between nodes in lane `level`.
    pub(crate) fn population(&self, level: usize) -> usize {
        self.head
            .and_then(|head| self.arena[head].population.get(level).copied())
            .unwrap_or(0)
    }

    fn population_mut(&mut self, level: usize) -> Option<&mut usize> {
        let head = self.head?;
        self.arena[head].population.get_mut(level)
    }

    // ========================================================================
    //  Head resizing
    // ========================================================================

    /// Grow the head to `depth` lanes, creating it if needed.
    ///
    /// New lanes are empty: they loop back to the head with a wrap count of
    /// `entries`, the current length of the base list.
    pub(crate) fn grow_head(&mut self, depth: usize, entries: usize) -> Result<DirNodeId, IndexError> {
        let head = match self.head {
            Some(head) => {
                self.arena[head].reserve_levels(depth)?;
                head
            }
            None => {
                let head = self.arena.insert(DirNode::start(depth)?)?;
                self.head = Some(head);
                head
            }
        };

        let node = &mut self.arena[head];
        while node.depth() < depth {
            node.junctions.push(Junction::looped(head, entries));
            node.population.push(0);
        }

        Ok(head)
    }

    /// Number of lanes left after dropping empty top lanes.
    pub(crate) fn trimmed_depth(&self) -> usize {
        let Some(head) = self.head else { return 0 };
        let population = &self.arena[head].population;
        population.len() - population.iter().rev().take_while(|&&n| n == 0).count()
    }

    /// Drop empty top lanes; free the head when none is left.
    /// Returns the new depth.
    pub(crate) fn shrink_head(&mut self) -> usize {
        let Some(head) = self.head else { return 0 };
        let depth = self.trimmed_depth();

        let node = &mut self.arena[head];
        node.junctions.truncate(depth);
        node.population.truncate(depth);

        if depth == 0 {
            self.arena.remove(head);
            self.head = None;
        }

        depth
    }

    // ========================================================================
    //  Threading
    // ========================================================================

    /// Link `id` into lanes `0..=level` right after the path stops, where
    /// its entry sits at `row`. Spans it divides are split; higher lanes
    /// gain one entry.
    pub(crate) fn thread(&mut self, id: DirNodeId, path: &[Hop], row: usize) {
        let level = self.arena[id].level();

        for (lv, hop) in path.iter().enumerate().take(level + 1) {
            let span = self.junction(hop.node, lv);
            let before = row - hop.step;

            let pred = self.junction_mut(hop.node, lv);
            pred.count = before;
            pred.next = id;

            self.junction_mut(span.next, lv).prev = id;

            let junction = self.junction_mut(id, lv);
            junction.next = span.next;
            junction.prev = hop.node;
            junction.count = span.count + 1 - before;
            junction.lock = Default::default();

            if let Some(population) = self.population_mut(lv) {
                *population += 1;
            }
        }

        self.increment_counts(path, level + 1);
    }

    /// Unlink `id` from every lane it is in and free it. Each predecessor
    /// absorbs the node's span, minus `removed` entries that went away with
    /// it.
    pub(crate) fn unthread(&mut self, id: DirNodeId, path: &[Hop], removed: usize) {
        let level = self.arena[id].level();

        for (lv, hop) in path.iter().enumerate().take(level + 1) {
            let span = self.junction(id, lv);
            debug_assert_eq!(span.prev, hop.node, "unthread off the path at lane {lv}");

            let pred = self.junction_mut(hop.node, lv);
            pred.count = pred.count + span.count - removed;
            pred.next = span.next;

            self.junction_mut(span.next, lv).prev = hop.node;

            if let Some(population) = self.population_mut(lv) {
                *population -= 1;
            }
        }

        self.arena.remove(id);
    }

    /// One more entry in the path spans of lanes `from..`.
    pub(crate) fn increment_counts(&mut self, path: &[Hop], from: usize) {
        for (lv, hop) in path.iter().enumerate().skip(from) {
            self.junction_mut(hop.node, lv).count += 1;
        }
    }

    /// One entry fewer in the path spans of lanes `from..`.
    pub(crate) fn decrement_counts(&mut self, path: &[Hop], from: usize) {
        for (lv, hop) in path.iter().enumerate().skip(from) {
            let junction = self.junction_mut(hop.node, lv);
            debug_assert!(junction.count > 0, "count underflow at lane {lv}");
            junction.count = junction.count.saturating_sub(1);
        }
    }

    // ========================================================================
    //  Walking
    // ========================================================================

    /// Between nodes of lane `level` in order. Stops early on a lane that
    /// does not loop back within the arena's population.
    pub(crate) fn lane(&self, level: usize) -> Vec<DirNodeId> {
        let Some(head) = self.head else { return Vec::new() };
        if level >= self.depth() {
            return Vec::new();
        }

        let mut nodes = Vec::new();
        let mut cur = self.junction(head, level).next;
        while cur != head && nodes.len() <= self.arena.live() {
            nodes.push(cur);
            cur = self.junction(cur, level).next;
        }
        nodes
    }

    /// Counts of every span of lane `level`, head first.
    pub(crate) fn lane_counts(&self, level: usize) -> Vec<usize> {
        let Some(head) = self.head else { return Vec::new() };
        if level >= self.depth() {
            return Vec::new();
        }

        std::iter::once(head)
            .chain(self.lane(level))
            .map(|id| self.junction(id, level).count)
            .collect()
    }

    /// Free every DirNode.
    pub(crate) fn clear(&mut self) {
        self.arena.clear();
        self.head = None;
    }
}
