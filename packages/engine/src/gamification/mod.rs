//! XP economy: reward pricing, levels, streaks, badges, quests, and the
//! award pipeline that ties them to profile persistence.

pub mod badges;
pub mod level;
pub mod quests;
pub mod rewards;
pub mod service;
pub mod streak;
pub mod verify;

pub use badges::BadgeCatalog;
pub use level::{level_for_xp, xp_for_level, xp_to_next_level};
pub use quests::QuestCatalog;
pub use rewards::{RewardConfig, XpBreakdown};
pub use service::{AwardOutcome, GamificationService, QuestTouch, XpDelta};
