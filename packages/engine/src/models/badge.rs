use serde::{Deserialize, Serialize};

use super::action::ActionKind;
use super::profile::UserProfile;

/// Unlock condition for a badge, evaluated against the updated profile after
/// every award. A new condition kind is a new variant; every evaluation site
/// matches exhaustively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BadgeCondition {
    XpAtLeast { amount: u64 },
    LevelAtLeast { level: u32 },
    ActionCountAtLeast { kind: ActionKind, count: u64 },
    MaxStreakAtLeast { days: u32 },
    DailyActionsAtLeast { count: u32 },
    TotalActionsAtLeast { count: u64 },
}

impl BadgeCondition {
    pub fn is_met(&self, profile: &UserProfile) -> bool {
        match self {
            BadgeCondition::XpAtLeast { amount } => profile.xp >= *amount,
            BadgeCondition::LevelAtLeast { level } => profile.level >= *level,
            BadgeCondition::ActionCountAtLeast { kind, count } => {
                profile.action_count(*kind) >= *count
            }
            BadgeCondition::MaxStreakAtLeast { days } => profile.max_streak >= *days,
            BadgeCondition::DailyActionsAtLeast { count } => profile.daily_actions >= *count,
            BadgeCondition::TotalActionsAtLeast { count } => profile.total_actions() >= *count,
        }
    }
}

/// Static catalog entry. Per-user unlocks live on the profile's badge list;
/// unlocks are permanent and never revoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Badge {
    pub id: String,
    pub name: String,
    pub description: String,
    pub condition: BadgeCondition,
}

impl Badge {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        condition: BadgeCondition,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            condition,
        }
    }
}
