use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::event::Platform;

/// Gamified user actions that can earn XP.
///
/// Every mutation of a profile's XP flows through one of these kinds; the
/// reward table, quest conditions, and badge conditions are all keyed on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    WatchEpisode,
    ReadChapter,
    QuoteClaim,
    WatchPartyJoin,
    WatchPartyHost,
    AccountLink,
    DailyLogin,
}

impl ActionKind {
    pub const ALL: [ActionKind; 7] = [
        ActionKind::WatchEpisode,
        ActionKind::ReadChapter,
        ActionKind::QuoteClaim,
        ActionKind::WatchPartyJoin,
        ActionKind::WatchPartyHost,
        ActionKind::AccountLink,
        ActionKind::DailyLogin,
    ];

    /// Stable string form, used as the key in the profile's action counters.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::WatchEpisode => "WATCH_EPISODE",
            ActionKind::ReadChapter => "READ_CHAPTER",
            ActionKind::QuoteClaim => "QUOTE_CLAIM",
            ActionKind::WatchPartyJoin => "WATCH_PARTY_JOIN",
            ActionKind::WatchPartyHost => "WATCH_PARTY_HOST",
            ActionKind::AccountLink => "ACCOUNT_LINK",
            ActionKind::DailyLogin => "DAILY_LOGIN",
        }
    }

    /// Content-consumption actions reference a content item; they drive
    /// first-time bonuses and consumption quests.
    pub fn is_consumption(&self) -> bool {
        matches!(self, ActionKind::WatchEpisode | ActionKind::ReadChapter)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Proof that an action actually happened, supplied by the surface that
/// observed it. Each variant carries what its verification predicate needs;
/// a bare client-side claim is never enough to earn XP.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionEvidence {
    WatchEpisode {
        anime_id: String,
        #[serde(default)]
        anime_title: Option<String>,
        episode: u32,
        streaming_sources: Vec<String>,
    },
    ReadChapter {
        manga_id: String,
        #[serde(default)]
        manga_title: Option<String>,
        chapter: u32,
        pages: u32,
    },
    QuoteClaim {
        quote_id: String,
        #[serde(default)]
        character: Option<String>,
    },
    WatchPartyJoin {
        party_id: String,
    },
    WatchPartyHost {
        party_id: String,
        participant_count: u32,
    },
    AccountLink {
        discord_id: String,
        website_id: String,
    },
    DailyLogin,
}

impl ActionEvidence {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionEvidence::WatchEpisode { .. } => ActionKind::WatchEpisode,
            ActionEvidence::ReadChapter { .. } => ActionKind::ReadChapter,
            ActionEvidence::QuoteClaim { .. } => ActionKind::QuoteClaim,
            ActionEvidence::WatchPartyJoin { .. } => ActionKind::WatchPartyJoin,
            ActionEvidence::WatchPartyHost { .. } => ActionKind::WatchPartyHost,
            ActionEvidence::AccountLink { .. } => ActionKind::AccountLink,
            ActionEvidence::DailyLogin => ActionKind::DailyLogin,
        }
    }

    /// Key under which this content appears in the watch/read history maps.
    ///
    /// `None` for actions that do not reference a content item.
    pub fn content_key(&self) -> Option<String> {
        match self {
            ActionEvidence::WatchEpisode { anime_id, .. } => Some(format!("anime:{anime_id}")),
            ActionEvidence::ReadChapter { manga_id, .. } => Some(format!("manga:{manga_id}")),
            _ => None,
        }
    }
}

/// Bonus-relevant attributes of the content an action touched, resolved by
/// the surface from its content metadata provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentFlags {
    #[serde(default)]
    pub is_trending: bool,
    #[serde(default)]
    pub is_seasonal: bool,
    #[serde(default)]
    pub is_popular: bool,
}

/// A fully described request to award an action to a user.
#[derive(Debug, Clone)]
pub struct AwardRequest {
    pub user_id: String,
    /// Surface the action originated on.
    pub platform: Platform,
    pub evidence: ActionEvidence,
    pub flags: ContentFlags,
    /// Opaque multiplier supplied by the experiment framework, if any.
    pub experiment_multiplier: Option<f64>,
    /// Sync event that carried this action, when it arrived over the log.
    pub source_event: Option<Uuid>,
}

impl AwardRequest {
    pub fn new(user_id: impl Into<String>, platform: Platform, evidence: ActionEvidence) -> Self {
        Self {
            user_id: user_id.into(),
            platform,
            evidence,
            flags: ContentFlags::default(),
            experiment_multiplier: None,
            source_event: None,
        }
    }

    pub fn with_flags(mut self, flags: ContentFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_experiment_multiplier(mut self, multiplier: f64) -> Self {
        self.experiment_multiplier = Some(multiplier);
        self
    }

    pub fn with_source_event(mut self, event_id: Uuid) -> Self {
        self.source_event = Some(event_id);
        self
    }
}
