use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::action::ActionKind;

/// How often a quest's progress resets. The reset is implicit: a new period
/// gets a fresh progress row keyed by the new period key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestPeriod {
    Daily,
    Weekly,
}

impl QuestPeriod {
    /// Key that scopes a progress row to one period. Daily quests use the UTC
    /// date, weekly quests the ISO week.
    pub fn period_key(&self, day: NaiveDate) -> String {
        match self {
            QuestPeriod::Daily => day.format("%Y-%m-%d").to_string(),
            QuestPeriod::Weekly => {
                let week = day.iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            }
        }
    }
}

/// What counts toward a quest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestCondition {
    /// Any verified action of this kind.
    Action { kind: ActionKind },
    /// Actions of this kind on trending content only.
    TrendingAction { kind: ActionKind },
    /// Any content-consumption action.
    AnyConsumption,
}

impl QuestCondition {
    pub fn matches(&self, kind: ActionKind, trending: bool) -> bool {
        match self {
            QuestCondition::Action { kind: wanted } => kind == *wanted,
            QuestCondition::TrendingAction { kind: wanted } => kind == *wanted && trending,
            QuestCondition::AnyConsumption => kind.is_consumption(),
        }
    }
}

/// Static quest definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quest {
    pub id: String,
    pub name: String,
    pub description: String,
    pub period: QuestPeriod,
    pub condition: QuestCondition,
    pub target: u64,
    pub reward_xp: u64,
}

/// Per-user progress for one quest in one period. `completed` is sticky;
/// the row is never decremented or reused across periods.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestProgress {
    pub user_id: String,
    pub quest_id: String,
    pub period_key: String,
    pub progress: u64,
    pub completed: bool,
    pub updated_at: DateTime<Utc>,
}

impl QuestProgress {
    pub fn new(
        user_id: impl Into<String>,
        quest_id: impl Into<String>,
        period_key: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            quest_id: quest_id.into(),
            period_key: period_key.into(),
            progress: 0,
            completed: false,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_daily_period_key_is_the_date() {
        assert_eq!(
            QuestPeriod::Daily.period_key(date(2026, 8, 22)),
            "2026-08-22"
        );
    }

    #[test]
    fn test_weekly_period_key_is_iso_week() {
        assert_eq!(
            QuestPeriod::Weekly.period_key(date(2026, 8, 22)),
            "2026-W34"
        );
        // ISO week years differ from calendar years at the boundary.
        assert_eq!(QuestPeriod::Weekly.period_key(date(2027, 1, 1)), "2026-W53");
    }

    #[test]
    fn test_condition_matching() {
        let watch = QuestCondition::Action {
            kind: ActionKind::WatchEpisode,
        };
        assert!(watch.matches(ActionKind::WatchEpisode, false));
        assert!(!watch.matches(ActionKind::ReadChapter, false));

        let trending = QuestCondition::TrendingAction {
            kind: ActionKind::WatchEpisode,
        };
        assert!(trending.matches(ActionKind::WatchEpisode, true));
        assert!(!trending.matches(ActionKind::WatchEpisode, false));

        let any = QuestCondition::AnyConsumption;
        assert!(any.matches(ActionKind::ReadChapter, false));
        assert!(!any.matches(ActionKind::DailyLogin, false));
    }
}
