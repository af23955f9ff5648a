use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::action::ActionKind;

/// The canonical per-user record shared by both surfaces.
///
/// Mutated only by the gamification engine under the rate-limit and security
/// gates, through a compare-and-swap on `sync_version`. `level` is always
/// derived from `xp`; a stored level is display cache, never authority.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discord_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website_id: Option<String>,
    pub xp: u64,
    pub level: u32,
    pub streak: u32,
    pub max_streak: u32,
    #[serde(default)]
    pub badges: Vec<String>,
    #[serde(default)]
    pub actions: HashMap<ActionKind, u64>,
    #[serde(default)]
    pub watch_history: HashMap<String, DateTime<Utc>>,
    #[serde(default)]
    pub read_history: HashMap<String, DateTime<Utc>>,
    #[serde(default)]
    pub preferences: serde_json::Value,
    /// Monotonic counter bumped on every persisted write; the CAS token.
    pub sync_version: u64,
    pub last_sync_at: DateTime<Utc>,
    /// Most recent UTC day with at least one verified action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity_date: Option<NaiveDate>,
    /// Verified actions so far today; resets at the UTC day boundary.
    #[serde(default)]
    pub daily_actions: u32,
    /// Most recent UTC day a daily-login award was granted. Gates the
    /// once-per-day login XP.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login_date: Option<NaiveDate>,
}

impl UserProfile {
    pub fn new(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            discord_id: None,
            website_id: None,
            xp: 0,
            level: 1,
            streak: 0,
            max_streak: 0,
            badges: Vec::new(),
            actions: HashMap::new(),
            watch_history: HashMap::new(),
            read_history: HashMap::new(),
            preferences: serde_json::Value::Object(Default::default()),
            sync_version: 0,
            last_sync_at: now,
            last_activity_date: None,
            daily_actions: 0,
            last_login_date: None,
        }
    }

    pub fn has_badge(&self, badge_id: &str) -> bool {
        self.badges.iter().any(|b| b == badge_id)
    }

    /// Append a badge id, refusing duplicates. Returns whether it was new.
    pub fn grant_badge(&mut self, badge_id: &str) -> bool {
        if self.has_badge(badge_id) {
            return false;
        }
        self.badges.push(badge_id.to_string());
        true
    }

    pub fn action_count(&self, kind: ActionKind) -> u64 {
        self.actions.get(&kind).copied().unwrap_or(0)
    }

    pub fn bump_action(&mut self, kind: ActionKind) {
        *self.actions.entry(kind).or_insert(0) += 1;
    }

    pub fn total_actions(&self) -> u64 {
        self.actions.values().sum()
    }

    /// Whether this content item already appears in the relevant history map.
    pub fn seen_content(&self, kind: ActionKind, content_key: &str) -> bool {
        match kind {
            ActionKind::WatchEpisode => self.watch_history.contains_key(content_key),
            ActionKind::ReadChapter => self.read_history.contains_key(content_key),
            _ => false,
        }
    }

    pub fn record_content(&mut self, kind: ActionKind, content_key: &str, at: DateTime<Utc>) {
        match kind {
            ActionKind::WatchEpisode => {
                self.watch_history.insert(content_key.to_string(), at);
            }
            ActionKind::ReadChapter => {
                self.read_history.insert(content_key.to_string(), at);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_profile_defaults() {
        let profile = UserProfile::new("user-1", Utc::now());
        assert_eq!(profile.xp, 0);
        assert_eq!(profile.level, 1);
        assert_eq!(profile.streak, 0);
        assert!(profile.badges.is_empty());
        assert_eq!(profile.sync_version, 0);
        assert_eq!(profile.last_activity_date, None);
    }

    #[test]
    fn test_grant_badge_refuses_duplicates() {
        let mut profile = UserProfile::new("user-1", Utc::now());
        assert!(profile.grant_badge("first-steps"));
        assert!(!profile.grant_badge("first-steps"));
        assert_eq!(profile.badges, vec!["first-steps".to_string()]);
    }

    #[test]
    fn test_action_counters() {
        let mut profile = UserProfile::new("user-1", Utc::now());
        profile.bump_action(ActionKind::WatchEpisode);
        profile.bump_action(ActionKind::WatchEpisode);
        profile.bump_action(ActionKind::QuoteClaim);
        assert_eq!(profile.action_count(ActionKind::WatchEpisode), 2);
        assert_eq!(profile.action_count(ActionKind::ReadChapter), 0);
        assert_eq!(profile.total_actions(), 3);
    }

    #[test]
    fn test_content_history_split_by_kind() {
        let now = Utc::now();
        let mut profile = UserProfile::new("user-1", now);
        profile.record_content(ActionKind::WatchEpisode, "anime:aot", now);
        assert!(profile.seen_content(ActionKind::WatchEpisode, "anime:aot"));
        assert!(!profile.seen_content(ActionKind::ReadChapter, "anime:aot"));
        profile.record_content(ActionKind::QuoteClaim, "anime:aot", now);
        assert_eq!(profile.watch_history.len(), 1);
        assert!(profile.read_history.is_empty());
    }

    #[test]
    fn test_profile_serializes_camel_case() {
        let profile = UserProfile::new("user-1", Utc::now());
        let value = serde_json::to_value(&profile).unwrap();
        assert!(value.get("userId").is_some());
        assert!(value.get("syncVersion").is_some());
        assert!(value.get("maxStreak").is_some());
        assert!(value.get("discord_id").is_none());
    }
}
