//! The quest catalog.
//!
//! Definitions live in code, like badges. Progress is persisted per
//! `(user, quest, period key)` by the quest store; a new period simply
//! starts a fresh row, which is the reset.

use crate::models::{ActionKind, Quest, QuestCondition, QuestPeriod};

#[derive(Debug, Clone)]
pub struct QuestCatalog {
    quests: Vec<Quest>,
}

impl QuestCatalog {
    pub fn new(quests: Vec<Quest>) -> Self {
        Self { quests }
    }

    /// The stock quest rotation.
    pub fn standard() -> Self {
        Self::new(vec![
            Quest {
                id: "daily-watcher".into(),
                name: "Daily Watcher".into(),
                description: "Watch 3 episodes today".into(),
                period: QuestPeriod::Daily,
                condition: QuestCondition::Action {
                    kind: ActionKind::WatchEpisode,
                },
                target: 3,
                reward_xp: 30,
            },
            Quest {
                id: "daily-reader".into(),
                name: "Daily Reader".into(),
                description: "Read 5 chapters today".into(),
                period: QuestPeriod::Daily,
                condition: QuestCondition::Action {
                    kind: ActionKind::ReadChapter,
                },
                target: 5,
                reward_xp: 25,
            },
            Quest {
                id: "daily-checkin".into(),
                name: "Daily Check-in".into(),
                description: "Log in today".into(),
                period: QuestPeriod::Daily,
                condition: QuestCondition::Action {
                    kind: ActionKind::DailyLogin,
                },
                target: 1,
                reward_xp: 5,
            },
            Quest {
                id: "weekly-marathon".into(),
                name: "Weekly Marathon".into(),
                description: "Consume 25 pieces of content this week".into(),
                period: QuestPeriod::Weekly,
                condition: QuestCondition::AnyConsumption,
                target: 25,
                reward_xp: 150,
            },
            Quest {
                id: "trend-spotter".into(),
                name: "Trend Spotter".into(),
                description: "Watch 5 trending episodes this week".into(),
                period: QuestPeriod::Weekly,
                condition: QuestCondition::TrendingAction {
                    kind: ActionKind::WatchEpisode,
                },
                target: 5,
                reward_xp: 75,
            },
        ])
    }

    pub fn get(&self, id: &str) -> Option<&Quest> {
        self.quests.iter().find(|q| q.id == id)
    }

    pub fn all(&self) -> &[Quest] {
        &self.quests
    }

    /// Quests advanced by one action of `kind` on content with the given
    /// trending flag.
    pub fn matching(&self, kind: ActionKind, trending: bool) -> Vec<&Quest> {
        self.quests
            .iter()
            .filter(|q| q.condition.matches(kind, trending))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_ids_are_unique() {
        let catalog = QuestCatalog::standard();
        for quest in catalog.all() {
            let count = catalog.all().iter().filter(|q| q.id == quest.id).count();
            assert_eq!(count, 1, "duplicate quest id {}", quest.id);
        }
    }

    #[test]
    fn test_matching_by_action_kind() {
        let catalog = QuestCatalog::standard();

        let watched: Vec<&str> = catalog
            .matching(ActionKind::WatchEpisode, false)
            .iter()
            .map(|q| q.id.as_str())
            .collect();
        assert!(watched.contains(&"daily-watcher"));
        assert!(watched.contains(&"weekly-marathon"));
        assert!(!watched.contains(&"trend-spotter"));

        let trending: Vec<&str> = catalog
            .matching(ActionKind::WatchEpisode, true)
            .iter()
            .map(|q| q.id.as_str())
            .collect();
        assert!(trending.contains(&"trend-spotter"));

        let login: Vec<&str> = catalog
            .matching(ActionKind::DailyLogin, false)
            .iter()
            .map(|q| q.id.as_str())
            .collect();
        assert_eq!(login, vec!["daily-checkin"]);
    }
}
