//! Lane level selection for new entries.
//!
//! Levels are a deterministic function of the list length, which keeps
//! lane density close to the ideal without a random source: the `n`-th
//! entry inserted becomes a lane stop when `prob` divides `n`, and climbs
//! one lane higher for every further power of `prob` dividing `n`.

/// `floor(log_prob(n))`: how many lanes a list of `n` entries supports.
#[must_use]
pub fn lane_capacity(n: usize, prob: u32) -> usize {
    let prob = prob as usize;
    if prob < 2 {
        return 0;
    }

    let mut capacity = 0;
    let mut rest = n;
    while rest >= prob {
        rest /= prob;
        capacity += 1;
    }
    capacity
}

/// Lane level for the entry inserted into a list of `count` entries, or
/// `None` when it should not become a lane stop.
///
/// ```rust
/// use dirlanes::skiplist::do_levelup;
///
/// assert_eq!(do_levelup(2, 4, 16), None);    // third entry
/// assert_eq!(do_levelup(3, 4, 16), Some(0)); // fourth entry
/// assert_eq!(do_levelup(15, 4, 16), Some(1));
/// ```
#[must_use]
pub fn do_levelup(count: usize, prob: u32, max_levels: usize) -> Option<usize> {
    let n = count + 1;
    let p = prob as usize;

    if p < 2 || max_levels == 0 || n % p != 0 {
        return None;
    }

    let mut level = 0;
    let mut rest = n / p;
    while rest % p == 0 {
        rest /= p;
        level += 1;
    }

    let cap = lane_capacity(n, prob)
        .saturating_sub(1)
        .min(max_levels - 1);

    Some(level.min(cap))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lane_capacity() {
        assert_eq!(lane_capacity(0, 4), 0);
        assert_eq!(lane_capacity(3, 4), 0);
        assert_eq!(lane_capacity(4, 4), 1);
        assert_eq!(lane_capacity(15, 4), 1);
        assert_eq!(lane_capacity(16, 4), 2);
        assert_eq!(lane_capacity(1024, 2), 10);
        assert_eq!(lane_capacity(10, 1), 0);
    }

    #[test]
    fn test_levelup_only_on_multiples() {
        for count in 0..64 {
            let expected = (count + 1) % 4 == 0;
            assert_eq!(do_levelup(count, 4, 16).is_some(), expected, "count {count}");
        }
    }

    #[test]
    fn test_levelup_climbs_with_powers() {
        assert_eq!(do_levelup(3, 4, 16), Some(0));
        assert_eq!(do_levelup(7, 4, 16), Some(0));
        assert_eq!(do_levelup(15, 4, 16), Some(1));
        assert_eq!(do_levelup(63, 4, 16), Some(2));
        assert_eq!(do_levelup(255, 4, 16), Some(3));
    }

    #[test]
    fn test_levelup_capped_by_max_levels() {
        assert_eq!(do_levelup(255, 4, 2), Some(1));
        assert_eq!(do_levelup(1023, 2, 1), Some(0));
        assert_eq!(do_levelup(1023, 2, 0), None);
    }

    #[test]
    fn test_levelup_density() {
        // Roughly count / prob stops in lane 0.
        let stops = (0..4096).filter(|&c| do_levelup(c, 4, 16).is_some()).count();
        assert_eq!(stops, 1024);
        let high = (0..4096).filter(|&c| do_levelup(c, 4, 16) >= Some(1)).count();
        assert_eq!(high, 256);
    }
}
