//! XP reward computation.
//!
//! Base amounts come from a flat per-action table; content flags and
//! first-time consumption add flat bonuses; the streak and experiment
//! multipliers scale the sum. The breakdown is kept so award notifications
//! and the activity log can show where the number came from.

use std::collections::HashMap;

use crate::models::{ActionKind, ContentFlags};

/// Reward table plus bonus and multiplier knobs.
#[derive(Debug, Clone)]
pub struct RewardConfig {
    pub base: HashMap<ActionKind, u64>,
    pub trending_bonus: u64,
    pub seasonal_bonus: u64,
    pub popular_bonus: u64,
    pub first_time_bonus: u64,
    /// Applied when the streak stored before the action is above zero.
    pub streak_multiplier: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        let mut base = HashMap::new();
        base.insert(ActionKind::WatchEpisode, 20);
        base.insert(ActionKind::ReadChapter, 15);
        base.insert(ActionKind::QuoteClaim, 10);
        base.insert(ActionKind::WatchPartyJoin, 30);
        base.insert(ActionKind::WatchPartyHost, 50);
        base.insert(ActionKind::AccountLink, 100);
        base.insert(ActionKind::DailyLogin, 10);
        Self {
            base,
            trending_bonus: 10,
            seasonal_bonus: 15,
            popular_bonus: 5,
            first_time_bonus: 25,
            streak_multiplier: 1.5,
        }
    }
}

/// How one award's XP total was computed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct XpBreakdown {
    pub base: u64,
    pub bonus: u64,
    pub multiplier: f64,
    pub total: u64,
}

impl RewardConfig {
    pub fn base_for(&self, kind: ActionKind) -> u64 {
        self.base.get(&kind).copied().unwrap_or(0)
    }

    /// Compute the XP for one verified action.
    ///
    /// `streak` is the value stored before this action's streak update.
    /// `total = floor((base + bonus) * streak_multiplier * experiment)`.
    pub fn breakdown(
        &self,
        kind: ActionKind,
        flags: ContentFlags,
        first_time: bool,
        streak: u32,
        experiment: Option<f64>,
    ) -> XpBreakdown {
        let base = self.base_for(kind);
        let mut bonus = 0;
        if flags.is_trending {
            bonus += self.trending_bonus;
        }
        if flags.is_seasonal {
            bonus += self.seasonal_bonus;
        }
        if flags.is_popular {
            bonus += self.popular_bonus;
        }
        if first_time {
            bonus += self.first_time_bonus;
        }

        let mut multiplier = if streak > 0 { self.streak_multiplier } else { 1.0 };
        multiplier *= experiment.unwrap_or(1.0).max(0.0);

        XpBreakdown {
            base,
            bonus,
            multiplier,
            total: ((base + bonus) as f64 * multiplier).floor() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_table_defaults() {
        let config = RewardConfig::default();
        assert_eq!(config.base_for(ActionKind::WatchEpisode), 20);
        assert_eq!(config.base_for(ActionKind::ReadChapter), 15);
        assert_eq!(config.base_for(ActionKind::AccountLink), 100);
        assert_eq!(config.base_for(ActionKind::DailyLogin), 10);
    }

    #[test]
    fn test_first_trending_watch_is_55() {
        let config = RewardConfig::default();
        let flags = ContentFlags {
            is_trending: true,
            ..Default::default()
        };
        let breakdown = config.breakdown(ActionKind::WatchEpisode, flags, true, 0, None);
        assert_eq!(breakdown.base, 20);
        assert_eq!(breakdown.bonus, 35);
        assert_eq!(breakdown.total, 55);
    }

    #[test]
    fn test_streak_multiplier_rounds_down() {
        let config = RewardConfig::default();
        let flags = ContentFlags {
            is_trending: true,
            ..Default::default()
        };
        let breakdown = config.breakdown(ActionKind::WatchEpisode, flags, true, 7, None);
        assert_eq!(breakdown.total, 82); // floor(55 * 1.5)
    }

    #[test]
    fn test_experiment_multiplier_stacks() {
        let config = RewardConfig::default();
        let breakdown = config.breakdown(
            ActionKind::WatchEpisode,
            ContentFlags::default(),
            false,
            3,
            Some(2.0),
        );
        assert_eq!(breakdown.total, 60); // 20 * 1.5 * 2.0
    }

    #[test]
    fn test_all_flags_stack_additively() {
        let config = RewardConfig::default();
        let flags = ContentFlags {
            is_trending: true,
            is_seasonal: true,
            is_popular: true,
        };
        let breakdown = config.breakdown(ActionKind::ReadChapter, flags, true, 0, None);
        assert_eq!(breakdown.bonus, 55); // 10 + 15 + 5 + 25
        assert_eq!(breakdown.total, 70);
    }
}
