//! The badge catalog.
//!
//! Definitions live in code: adding a badge is a catalog entry plus,
//! when needed, a new [`BadgeCondition`] variant. Unlock state lives on
//! the profile and is permanent.

use crate::models::{ActionKind, Badge, BadgeCondition, UserProfile};

#[derive(Debug, Clone)]
pub struct BadgeCatalog {
    badges: Vec<Badge>,
}

impl BadgeCatalog {
    pub fn new(badges: Vec<Badge>) -> Self {
        Self { badges }
    }

    /// The stock catalog shared by both surfaces.
    pub fn standard() -> Self {
        Self::new(vec![
            Badge::new(
                "first-steps",
                "First Steps",
                "Complete your first action",
                BadgeCondition::TotalActionsAtLeast { count: 1 },
            ),
            Badge::new(
                "binge-watcher",
                "Binge Watcher",
                "Watch 10 episodes",
                BadgeCondition::ActionCountAtLeast {
                    kind: ActionKind::WatchEpisode,
                    count: 10,
                },
            ),
            Badge::new(
                "anime-devotee",
                "Anime Devotee",
                "Watch 100 episodes",
                BadgeCondition::ActionCountAtLeast {
                    kind: ActionKind::WatchEpisode,
                    count: 100,
                },
            ),
            Badge::new(
                "bookworm",
                "Bookworm",
                "Read 10 chapters",
                BadgeCondition::ActionCountAtLeast {
                    kind: ActionKind::ReadChapter,
                    count: 10,
                },
            ),
            Badge::new(
                "manga-master",
                "Manga Master",
                "Read 100 chapters",
                BadgeCondition::ActionCountAtLeast {
                    kind: ActionKind::ReadChapter,
                    count: 100,
                },
            ),
            Badge::new(
                "quote-collector",
                "Quote Collector",
                "Claim 25 quotes",
                BadgeCondition::ActionCountAtLeast {
                    kind: ActionKind::QuoteClaim,
                    count: 25,
                },
            ),
            Badge::new(
                "party-goer",
                "Party Goer",
                "Join 10 watch parties",
                BadgeCondition::ActionCountAtLeast {
                    kind: ActionKind::WatchPartyJoin,
                    count: 10,
                },
            ),
            Badge::new(
                "gracious-host",
                "Gracious Host",
                "Host 5 watch parties",
                BadgeCondition::ActionCountAtLeast {
                    kind: ActionKind::WatchPartyHost,
                    count: 5,
                },
            ),
            Badge::new(
                "week-streak",
                "One Week Wonder",
                "Keep a 7-day streak",
                BadgeCondition::MaxStreakAtLeast { days: 7 },
            ),
            Badge::new(
                "month-streak",
                "Monthly Devotion",
                "Keep a 30-day streak",
                BadgeCondition::MaxStreakAtLeast { days: 30 },
            ),
            Badge::new(
                "rising-star",
                "Rising Star",
                "Reach level 10",
                BadgeCondition::LevelAtLeast { level: 10 },
            ),
            Badge::new(
                "seasoned-veteran",
                "Seasoned Veteran",
                "Reach level 25",
                BadgeCondition::LevelAtLeast { level: 25 },
            ),
            Badge::new(
                "xp-hoarder",
                "XP Hoarder",
                "Accumulate 10,000 XP",
                BadgeCondition::XpAtLeast { amount: 10_000 },
            ),
            Badge::new(
                "marathon-day",
                "Marathon Day",
                "Complete 10 actions in one day",
                BadgeCondition::DailyActionsAtLeast { count: 10 },
            ),
            Badge::new(
                "fully-synced",
                "Fully Synced",
                "Link your Discord and website accounts",
                BadgeCondition::ActionCountAtLeast {
                    kind: ActionKind::AccountLink,
                    count: 1,
                },
            ),
        ])
    }

    pub fn get(&self, id: &str) -> Option<&Badge> {
        self.badges.iter().find(|b| b.id == id)
    }

    pub fn all(&self) -> &[Badge] {
        &self.badges
    }

    /// Grant every not-yet-owned badge whose condition the profile now
    /// meets. Returns the newly unlocked badges in catalog order.
    pub fn unlock_earned(&self, profile: &mut UserProfile) -> Vec<Badge> {
        let mut unlocked = Vec::new();
        for badge in &self.badges {
            if !profile.has_badge(&badge.id) && badge.condition.is_met(profile) {
                profile.grant_badge(&badge.id);
                unlocked.push(badge.clone());
            }
        }
        unlocked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_catalog_ids_are_unique() {
        let catalog = BadgeCatalog::standard();
        for badge in catalog.all() {
            let count = catalog.all().iter().filter(|b| b.id == badge.id).count();
            assert_eq!(count, 1, "duplicate badge id {}", badge.id);
        }
    }

    #[test]
    fn test_unlock_earned_grants_and_is_idempotent() {
        let catalog = BadgeCatalog::standard();
        let mut profile = UserProfile::new("u1", Utc::now());
        profile.bump_action(ActionKind::WatchEpisode);

        let unlocked = catalog.unlock_earned(&mut profile);
        assert_eq!(unlocked.len(), 1);
        assert_eq!(unlocked[0].id, "first-steps");
        assert!(profile.has_badge("first-steps"));

        // Nothing new on re-evaluation.
        assert!(catalog.unlock_earned(&mut profile).is_empty());
        assert_eq!(profile.badges.len(), 1);
    }

    #[test]
    fn test_unlocks_can_cascade_in_one_pass() {
        let catalog = BadgeCatalog::standard();
        let mut profile = UserProfile::new("u1", Utc::now());
        profile.xp = 10_500;
        profile.level = 11;
        for _ in 0..10 {
            profile.bump_action(ActionKind::WatchEpisode);
        }

        let unlocked = catalog.unlock_earned(&mut profile);
        let ids: Vec<&str> = unlocked.iter().map(|b| b.id.as_str()).collect();
        assert!(ids.contains(&"first-steps"));
        assert!(ids.contains(&"binge-watcher"));
        assert!(ids.contains(&"rising-star"));
        assert!(ids.contains(&"xp-hoarder"));
    }
}
