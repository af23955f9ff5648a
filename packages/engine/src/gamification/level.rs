//! The XP-to-level curve.
//!
//! A stored level is display cache; anything that changes XP recomputes the
//! level from these functions.

/// `level = floor(sqrt(xp / 100)) + 1`.
///
/// Level 1 starts at 0 XP, level 2 at 100, level 3 at 400, level 11 at
/// 10,000. The curve widens quadratically, so each level costs more than
/// the last.
pub fn level_for_xp(xp: u64) -> u32 {
    ((xp as f64 / 100.0).sqrt().floor() as u32) + 1
}

/// Minimum XP at which `level` begins. Inverse of [`level_for_xp`].
pub fn xp_for_level(level: u32) -> u64 {
    let steps = level.saturating_sub(1) as u64;
    steps * steps * 100
}

/// XP still missing until the next level.
pub fn xp_to_next_level(xp: u64) -> u64 {
    xp_for_level(level_for_xp(xp) + 1).saturating_sub(xp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_curve_anchors() {
        assert_eq!(level_for_xp(0), 1);
        assert_eq!(level_for_xp(99), 1);
        assert_eq!(level_for_xp(100), 2);
        assert_eq!(level_for_xp(399), 2);
        assert_eq!(level_for_xp(400), 3);
        assert_eq!(level_for_xp(10_000), 11);
    }

    #[test]
    fn test_level_is_non_decreasing() {
        let mut last = 0;
        for xp in (0..50_000).step_by(7) {
            let level = level_for_xp(xp);
            assert!(level >= last, "level dropped at xp={xp}");
            last = level;
        }
    }

    #[test]
    fn test_xp_for_level_is_the_boundary() {
        for level in 2..=40 {
            let floor = xp_for_level(level);
            assert_eq!(level_for_xp(floor), level);
            assert_eq!(level_for_xp(floor - 1), level - 1);
        }
    }

    #[test]
    fn test_xp_to_next_level() {
        assert_eq!(xp_to_next_level(0), 100);
        assert_eq!(xp_to_next_level(100), 300);
        assert_eq!(xp_to_next_level(399), 1);
    }
}
