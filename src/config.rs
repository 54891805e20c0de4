//! Index configuration.
//!
//! [`IndexConfig`] carries the lane density and the per-operation retry
//! bounds. Defaults match the directory layer's expectations; every field
//! can be overridden from the environment with [`IndexConfig::from_env`]:
//!
//! | Variable | Field | Default |
//! |----------|-------|---------|
//! | `DIRLANES_PROB` | `prob` | 4 |
//! | `DIRLANES_MAX_LEVELS` | `max_levels` | 16 |
//! | `DIRLANES_FIND_RETRIES` | `find_retries` | 10 |
//! | `DIRLANES_INSERT_RETRIES` | `insert_retries` | 20 |
//! | `DIRLANES_DELETE_RETRIES` | `delete_retries` | 10 |
//! | `DIRLANES_SEEK_RETRIES` | `seek_retries` | 10 |
//!
//! Unparseable values are ignored and the default kept.

use std::env;
use std::str::FromStr;

use crate::skiplist::IndexError;

/// Upper bound on lane depth. Thirty-two lanes at `prob = 2` already cover
/// four billion entries.
pub const MAX_LANE_LEVELS: usize = 32;

/// Tunables for one [`SkipList`](crate::SkipList).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexConfig {
    /// Lane density: roughly one DirNode per `prob` entries in lane 0, one
    /// per `prob^2` in lane 1, and so on. Must be at least 2.
    pub prob: u32,

    /// Maximum number of lanes, `1..=MAX_LANE_LEVELS`.
    pub max_levels: usize,

    /// Attempts for `find` before contention is surfaced.
    pub find_retries: u32,

    /// Attempts for `insert` before contention is surfaced.
    pub insert_retries: u32,

    /// Attempts for `delete` before contention is surfaced.
    pub delete_retries: u32,

    /// Attempts for `seek` before contention is surfaced.
    pub seek_retries: u32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            prob: 4,
            max_levels: 16,
            find_retries: 10,
            insert_retries: 20,
            delete_retries: 10,
            seek_retries: 10,
        }
    }
}

impl IndexConfig {
    /// Defaults with a different lane density.
    #[must_use]
    pub fn with_prob(prob: u32) -> Self {
        Self {
            prob,
            ..Self::default()
        }
    }

    /// Defaults overridden by `DIRLANES_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        override_from_env("DIRLANES_PROB", &mut config.prob);
        override_from_env("DIRLANES_MAX_LEVELS", &mut config.max_levels);
        override_from_env("DIRLANES_FIND_RETRIES", &mut config.find_retries);
        override_from_env("DIRLANES_INSERT_RETRIES", &mut config.insert_retries);
        override_from_env("DIRLANES_DELETE_RETRIES", &mut config.delete_retries);
        override_from_env("DIRLANES_SEEK_RETRIES", &mut config.seek_retries);

        config
    }

    /// Reject configurations the index cannot run with.
    ///
    /// # Errors
    /// [`IndexError::Invalid`] when `prob < 2`, `max_levels` is outside
    /// `1..=MAX_LANE_LEVELS`, or any retry bound is zero.
    pub fn validate(&self) -> Result<(), IndexError> {
        if self.prob < 2 {
            return Err(IndexError::Invalid);
        }

        if self.max_levels == 0 || self.max_levels > MAX_LANE_LEVELS {
            return Err(IndexError::Invalid);
        }

        let retries = [
            self.find_retries,
            self.insert_retries,
            self.delete_retries,
            self.seek_retries,
        ];
        if retries.contains(&0) {
            return Err(IndexError::Invalid);
        }

        Ok(())
    }
}

fn override_from_env<T: FromStr>(name: &str, slot: &mut T) {
    if let Some(value) = env::var(name).ok().and_then(|raw| raw.trim().parse().ok()) {
        *slot = value;
    }
}
