//! Structural self-check of the lanes against the base list.

use std::collections::HashMap;
use std::fmt as StdFmt;

use crate::dirnode::{DirNodeId, Junction};
use crate::list::EntryList;
use crate::simple_lock::LockError;
use crate::skiplist::SkipList;
use crate::skiplist::lanes::Lanes;
use crate::tracing_helpers::error_log;

/// Shape of a consistent index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneReport {
    /// Linked entries.
    pub entries: usize,
    /// Number of lanes.
    pub depth: usize,
    /// Between DirNodes (head excluded).
    pub dirnodes: usize,
}

/// First inconsistency [`SkipList::validate`] ran into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaneViolation {
    /// The admission lock could not be taken.
    Admission(LockError),

    /// `next`/`prev` links of a lane disagree, or a lane does not loop.
    BrokenLink {
        /// Lane.
        level: usize,
    },

    /// Lane stops are not in base-list order, or mark unlinked entries.
    Unordered {
        /// Lane.
        level: usize,
    },

    /// A lane stop is missing from a lane below it.
    Nesting {
        /// Lane.
        level: usize,
    },

    /// A junction count disagrees with the base list.
    CountMismatch {
        /// Lane.
        level: usize,
        /// Steps counted in the base list.
        expected: usize,
        /// Count stored in the junction.
        found: usize,
    },

    /// The head's population counter disagrees with the lane.
    Population {
        /// Lane.
        level: usize,
        /// Stops found walking the lane.
        expected: usize,
        /// Counter stored on the head.
        found: usize,
    },

    /// A lane bit is still held with no operation running.
    HeldBits {
        /// Lane.
        level: usize,
    },

    /// The head has no lanes, or its top lane is empty.
    StrayHead,

    /// DirNodes alive in the arena but linked into no lane.
    Leak {
        /// Nodes reachable from the head (head included).
        linked: usize,
        /// Nodes alive in the arena.
        live: usize,
    },
}

impl StdFmt::Display for LaneViolation {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        match self {
            Self::Admission(err) => write!(f, "admission lock failed: {err}"),

            Self::BrokenLink { level } => write!(f, "broken links in lane {level}"),

            Self::Unordered { level } => write!(f, "lane {level} out of list order"),

            Self::Nesting { level } => write!(f, "lane {level} stop missing below"),

            Self::CountMismatch {
                level,
                expected,
                found,
            } => write!(
                f,
                "lane {level} count mismatch: list has {expected}, junction says {found}"
            ),

            Self::Population {
                level,
                expected,
                found,
            } => write!(
                f,
                "lane {level} population mismatch: walked {expected}, head says {found}"
            ),

            Self::HeldBits { level } => write!(f, "lane {level} has bits held at rest"),

            Self::StrayHead => write!(f, "head without a populated top lane"),

            Self::Leak { linked, live } => {
                write!(f, "{live} DirNodes alive but only {linked} linked")
            }
        }
    }
}

impl std::error::Error for LaneViolation {}

impl From<LockError> for LaneViolation {
    fn from(err: LockError) -> Self {
        Self::Admission(err)
    }
}

impl<L: EntryList> SkipList<L> {
    /// Check every lane against the base list under the exclusive admission
    /// lock: links, nesting, order, counts, population and idle lane bits.
    ///
    /// # Errors
    /// The first [`LaneViolation`] found.
    pub fn validate(&self) -> Result<LaneReport, LaneViolation> {
        let mut admission = self.list.create_wlock();
        admission.lock()?;

        let lanes = self.lanes.lock();
        let result = self.validate_locked(&lanes);

        if let Err(violation) = &result {
            error_log!(%violation, "lane validation failed");
        }

        result
    }

    fn validate_locked(&self, lanes: &Lanes<L::Entry>) -> Result<LaneReport, LaneViolation> {
        let entries = self.list.count();

        let Some(head) = lanes.head else {
            let live = lanes.arena.live();
            if live != 0 {
                return Err(LaneViolation::Leak { linked: 0, live });
            }
            return Ok(LaneReport {
                entries,
                depth: 0,
                dirnodes: 0,
            });
        };

        let depth = lanes.depth();
        if !lanes.arena[head].is_head() || depth == 0 || lanes.population(depth - 1) == 0 {
            return Err(LaneViolation::StrayHead);
        }

        // Lane 0 against the base list gives every stop its row.
        let lane0 = walk_lane(lanes, head, 0)?;
        let rows = self.rows_of(lanes, &lane0)?;

        let mut junctions = 0;
        for level in 0..depth {
            let lane = if level == 0 {
                lane0.clone()
            } else {
                walk_lane(lanes, head, level)?
            };

            let mut prev = (head, 0);
            for &id in &lane {
                let row = *rows.get(&id).ok_or(LaneViolation::Nesting { level })?;
                if prev.0 != head && row <= prev.1 {
                    return Err(LaneViolation::Unordered { level });
                }
                check_span(lanes, prev.0, level, row - prev.1)?;
                prev = (id, row);
            }
            check_span(lanes, prev.0, level, entries.saturating_sub(prev.1))?;

            let population = lanes.population(level);
            if population != lane.len() {
                return Err(LaneViolation::Population {
                    level,
                    expected: lane.len(),
                    found: population,
                });
            }
            junctions += lane.len();
        }

        // Every junction of every stop must be linked into its lane.
        let stops: usize = lane0.iter().map(|&id| lanes.arena[id].depth()).sum();
        if stops != junctions {
            return Err(LaneViolation::Nesting { level: 0 });
        }

        let live = lanes.arena.ids().count();
        if live != lane0.len() + 1 {
            return Err(LaneViolation::Leak {
                linked: lane0.len() + 1,
                live,
            });
        }

        Ok(LaneReport {
            entries,
            depth,
            dirnodes: lane0.len(),
        })
    }

    /// Walk the base list alongside lane 0 and record each stop's row.
    fn rows_of(
        &self,
        lanes: &Lanes<L::Entry>,
        lane0: &[DirNodeId],
    ) -> Result<HashMap<DirNodeId, usize>, LaneViolation> {
        let mut rows = HashMap::with_capacity(lane0.len());
        let mut cursor = self.list.first();
        let mut row = 0;

        for &id in lane0 {
            let target = lanes.arena[id]
                .entry()
                .ok_or(LaneViolation::Unordered { level: 0 })?;

            loop {
                let entry = cursor.ok_or(LaneViolation::Unordered { level: 0 })?;
                row += 1;
                cursor = self.list.next(entry);
                if entry == target {
                    break;
                }
            }
            rows.insert(id, row);
        }

        Ok(rows)
    }
}

fn junction_at<E: Copy>(
    lanes: &Lanes<E>,
    id: DirNodeId,
    level: usize,
) -> Result<Junction, LaneViolation> {
    lanes
        .arena
        .get(id)
        .and_then(|node| node.junction(level))
        .copied()
        .ok_or(LaneViolation::BrokenLink { level })
}

/// Stops of lane `level` in order, checking links in both directions.
fn walk_lane<E: Copy>(
    lanes: &Lanes<E>,
    head: DirNodeId,
    level: usize,
) -> Result<Vec<DirNodeId>, LaneViolation> {
    let mut nodes = Vec::new();
    let mut prev = head;
    let mut cur = junction_at(lanes, head, level)?.next;

    while cur != head {
        if nodes.len() >= lanes.arena.live() {
            return Err(LaneViolation::BrokenLink { level });
        }
        let junction = junction_at(lanes, cur, level)?;
        if junction.prev != prev {
            return Err(LaneViolation::BrokenLink { level });
        }
        nodes.push(cur);
        prev = cur;
        cur = junction.next;
    }

    if junction_at(lanes, head, level)?.prev != prev {
        return Err(LaneViolation::BrokenLink { level });
    }

    Ok(nodes)
}

fn check_span<E: Copy>(
    lanes: &Lanes<E>,
    id: DirNodeId,
    level: usize,
    expected: usize,
) -> Result<(), LaneViolation> {
    let junction = junction_at(lanes, id, level)?;
    if !junction.lock.is_free() {
        return Err(LaneViolation::HeldBits { level });
    }
    if junction.count != expected {
        return Err(LaneViolation::CountMismatch {
            level,
            expected,
            found: junction.count,
        });
    }
    Ok(())
}
