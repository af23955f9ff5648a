use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::profile::UserProfile;

/// The two client surfaces sharing one canonical profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Discord,
    Website,
}

impl Platform {
    pub fn other(self) -> Platform {
        match self {
            Platform::Discord => Platform::Website,
            Platform::Website => Platform::Discord,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Discord => "discord",
            Platform::Website => "website",
        }
    }

    pub fn from_name(name: &str) -> Option<Platform> {
        match name {
            "discord" => Some(Platform::Discord),
            "website" => Some(Platform::Website),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a sync event. `Success` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Success,
    Failed,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Success => "success",
            SyncStatus::Failed => "failed",
        }
    }

    pub fn from_name(name: &str) -> Option<SyncStatus> {
        match name {
            "pending" => Some(SyncStatus::Pending),
            "success" => Some(SyncStatus::Success),
            "failed" => Some(SyncStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SyncStatus::Success | SyncStatus::Failed)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of cross-platform event types.
///
/// `WEBSITE_*` events carry website-side actions toward the Discord consumer,
/// which owns the award pipeline; everything else flows toward the website as
/// a notification or identity change. Adding a variant is a compile-time
/// change: the router, direction table, and rate keys all match exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncEventType {
    XpUpdate,
    WebsiteXpGain,
    BadgeUnlock,
    WebsiteBadgeUnlock,
    LevelUp,
    StreakUpdate,
    QuestProgress,
    WebsiteQuestComplete,
    WebsiteAnimeWatch,
    WebsiteMangaRead,
    WebsiteUserLogin,
    ForceSyncRequest,
    DiscordForceSyncResponse,
    DiscordLinkSuccess,
    DiscordUnlink,
}

impl SyncEventType {
    pub const ALL: [SyncEventType; 15] = [
        SyncEventType::XpUpdate,
        SyncEventType::WebsiteXpGain,
        SyncEventType::BadgeUnlock,
        SyncEventType::WebsiteBadgeUnlock,
        SyncEventType::LevelUp,
        SyncEventType::StreakUpdate,
        SyncEventType::QuestProgress,
        SyncEventType::WebsiteQuestComplete,
        SyncEventType::WebsiteAnimeWatch,
        SyncEventType::WebsiteMangaRead,
        SyncEventType::WebsiteUserLogin,
        SyncEventType::ForceSyncRequest,
        SyncEventType::DiscordForceSyncResponse,
        SyncEventType::DiscordLinkSuccess,
        SyncEventType::DiscordUnlink,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SyncEventType::XpUpdate => "XP_UPDATE",
            SyncEventType::WebsiteXpGain => "WEBSITE_XP_GAIN",
            SyncEventType::BadgeUnlock => "BADGE_UNLOCK",
            SyncEventType::WebsiteBadgeUnlock => "WEBSITE_BADGE_UNLOCK",
            SyncEventType::LevelUp => "LEVEL_UP",
            SyncEventType::StreakUpdate => "STREAK_UPDATE",
            SyncEventType::QuestProgress => "QUEST_PROGRESS",
            SyncEventType::WebsiteQuestComplete => "WEBSITE_QUEST_COMPLETE",
            SyncEventType::WebsiteAnimeWatch => "WEBSITE_ANIME_WATCH",
            SyncEventType::WebsiteMangaRead => "WEBSITE_MANGA_READ",
            SyncEventType::WebsiteUserLogin => "WEBSITE_USER_LOGIN",
            SyncEventType::ForceSyncRequest => "FORCE_SYNC_REQUEST",
            SyncEventType::DiscordForceSyncResponse => "DISCORD_FORCE_SYNC_RESPONSE",
            SyncEventType::DiscordLinkSuccess => "DISCORD_LINK_SUCCESS",
            SyncEventType::DiscordUnlink => "DISCORD_UNLINK",
        }
    }

    pub fn from_name(name: &str) -> Option<SyncEventType> {
        SyncEventType::ALL.into_iter().find(|t| t.as_str() == name)
    }

    /// Which platform's consumer processes this event.
    pub fn target_platform(self) -> Platform {
        match self {
            SyncEventType::WebsiteXpGain
            | SyncEventType::WebsiteBadgeUnlock
            | SyncEventType::WebsiteQuestComplete
            | SyncEventType::WebsiteAnimeWatch
            | SyncEventType::WebsiteMangaRead
            | SyncEventType::WebsiteUserLogin
            | SyncEventType::ForceSyncRequest => Platform::Discord,
            SyncEventType::XpUpdate
            | SyncEventType::BadgeUnlock
            | SyncEventType::LevelUp
            | SyncEventType::StreakUpdate
            | SyncEventType::QuestProgress
            | SyncEventType::DiscordForceSyncResponse
            | SyncEventType::DiscordLinkSuccess
            | SyncEventType::DiscordUnlink => Platform::Website,
        }
    }

    /// Rate-limiter action key charged when the consumer picks this event up.
    pub fn rate_key(self) -> &'static str {
        match self {
            SyncEventType::WebsiteXpGain
            | SyncEventType::WebsiteAnimeWatch
            | SyncEventType::WebsiteMangaRead => "xp_award",
            SyncEventType::WebsiteBadgeUnlock => "badge_unlock",
            SyncEventType::WebsiteQuestComplete => "quest_progress",
            SyncEventType::WebsiteUserLogin => "login",
            SyncEventType::ForceSyncRequest | SyncEventType::DiscordForceSyncResponse => {
                "force_sync"
            }
            SyncEventType::DiscordLinkSuccess | SyncEventType::DiscordUnlink => "account_link",
            SyncEventType::XpUpdate
            | SyncEventType::BadgeUnlock
            | SyncEventType::LevelUp
            | SyncEventType::StreakUpdate
            | SyncEventType::QuestProgress => "sync_notify",
        }
    }

    /// Events that represent consuming a content item, for anomaly scoring.
    pub fn is_consumption(self) -> bool {
        matches!(
            self,
            SyncEventType::WebsiteAnimeWatch | SyncEventType::WebsiteMangaRead
        )
    }
}

impl fmt::Display for SyncEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry in the cross-platform event log.
///
/// Appended as `pending` by the originating surface, claimed by the target
/// platform's consumer, and moved to exactly one terminal status. The row is
/// never deleted; the log doubles as the recent-history source for the
/// security validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEvent {
    pub id: Uuid,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_user_id: Option<String>,
    pub event_type: SyncEventType,
    pub source_platform: Platform,
    pub target_platform: Platform,
    pub data: serde_json::Value,
    pub status: SyncStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_by: Option<String>,
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncEvent {
    /// Build a fresh pending event. Source and target platforms follow the
    /// event type's direction table.
    pub fn new(
        event_type: SyncEventType,
        user_id: impl Into<String>,
        data: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        let target = event_type.target_platform();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            target_user_id: None,
            event_type,
            source_platform: target.other(),
            target_platform: target,
            data,
            status: SyncStatus::Pending,
            created_at: now,
            processed_at: None,
            processed_by: None,
            retry_count: 0,
            error: None,
        }
    }

    /// Content hash of the payload, used to spot byte-identical resubmissions.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.event_type.as_str().as_bytes());
        hasher.update(self.data.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// XP amount this event claims, when its payload carries one.
    pub fn claimed_xp(&self) -> Option<i64> {
        match self.event_type {
            SyncEventType::WebsiteXpGain | SyncEventType::XpUpdate => {
                self.data.get("xpGained").and_then(|v| v.as_i64())
            }
            _ => None,
        }
    }

    /// Content item referenced by a consumption event, if any.
    pub fn content_key(&self) -> Option<String> {
        match self.event_type {
            SyncEventType::WebsiteAnimeWatch => self
                .data
                .get("animeId")
                .and_then(|v| v.as_str())
                .map(|id| format!("anime:{id}")),
            SyncEventType::WebsiteMangaRead => self
                .data
                .get("mangaId")
                .and_then(|v| v.as_str())
                .map(|id| format!("manga:{id}")),
            _ => None,
        }
    }
}

// ============================================================================
// Wire payloads, one per event type that carries structured data
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimeWatchPayload {
    pub anime_id: String,
    #[serde(default)]
    pub anime_title: Option<String>,
    pub episode: u32,
    #[serde(default)]
    pub streaming_sources: Vec<String>,
    #[serde(default)]
    pub is_trending: bool,
    #[serde(default)]
    pub is_seasonal: bool,
    #[serde(default)]
    pub is_popular: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MangaReadPayload {
    pub manga_id: String,
    #[serde(default)]
    pub manga_title: Option<String>,
    pub chapter: u32,
    pub pages: u32,
    #[serde(default)]
    pub is_trending: bool,
    #[serde(default)]
    pub is_seasonal: bool,
    #[serde(default)]
    pub is_popular: bool,
}

/// Website-claimed XP (minigames, site events). Signed so the validator can
/// reject negative claims outright.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XpGainPayload {
    pub xp_gained: i64,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XpUpdatePayload {
    pub xp_gained: u64,
    pub total_xp: u64,
    pub level: u32,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeUnlockPayload {
    pub badge_id: String,
    #[serde(default)]
    pub badge_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelUpPayload {
    pub level: u32,
    pub previous_level: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakUpdatePayload {
    pub streak: u32,
    pub max_streak: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestProgressPayload {
    pub quest_id: String,
    pub progress: u64,
    pub target: u64,
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestCompletePayload {
    pub quest_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkPayload {
    pub discord_id: String,
    pub website_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlinkPayload {
    pub discord_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceSyncResponsePayload {
    pub profile: UserProfile,
}
