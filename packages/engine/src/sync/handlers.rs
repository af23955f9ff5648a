//! Handler implementations behind the router.
//!
//! Award-carrying events from the website run the gamification pipeline and
//! push reciprocal notification events back toward the website. Website-bound
//! events are receipts: the profile was already mutated by whatever produced
//! them, so their handler only acknowledges delivery.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use crate::activity::ActivityLogger;
use crate::clock::Clock;
use crate::error::EngineError;
use crate::gamification::{AwardOutcome, GamificationService, QuestTouch, XpDelta};
use crate::models::event::{
    AnimeWatchPayload, BadgeUnlockPayload, ForceSyncResponsePayload, LevelUpPayload,
    LinkPayload, MangaReadPayload, QuestCompletePayload, QuestProgressPayload,
    StreakUpdatePayload, UnlinkPayload, XpGainPayload, XpUpdatePayload,
};
use crate::models::{
    ActionEvidence, AwardRequest, ContentFlags, Platform, SyncEvent, SyncEventType,
};
use crate::store::{StoreError, Stores};

use super::router::{EventHandler, EventRouter};

/// Failed action events older than this are not worth replaying.
const REQUEUE_WINDOW_HOURS: i64 = 24;
/// A copy is re-enqueued at most this many times.
const MAX_REQUEUE_RETRIES: u32 = 3;

fn parse<T: DeserializeOwned>(event: &SyncEvent) -> Result<T, EngineError> {
    serde_json::from_value(event.data.clone())
        .map_err(|err| EngineError::invalid_payload(event.event_type.as_str(), err.to_string()))
}

// =============================================================================
// Notifier
// =============================================================================

/// Appends website-bound notification events after a profile change.
#[derive(Clone)]
struct Notifier {
    stores: Stores,
    clock: Arc<dyn Clock>,
}

impl Notifier {
    async fn append<T: Serialize>(
        &self,
        event_type: SyncEventType,
        user_id: &str,
        payload: &T,
    ) -> Result<(), EngineError> {
        let data = serde_json::to_value(payload).map_err(StoreError::from)?;
        let event = SyncEvent::new(event_type, user_id, data, self.clock.now());
        self.stores.events.append(&event).await?;
        Ok(())
    }

    /// Everything an applied award changed: XP always, then level, badges,
    /// streak, and quest progress as they moved.
    async fn award(&self, user_id: &str, outcome: &AwardOutcome) -> Result<(), EngineError> {
        if !outcome.applied {
            return Ok(());
        }
        let quest_reward: u64 = outcome.quests.iter().map(|t| t.reward_xp).sum();
        self.append(
            SyncEventType::XpUpdate,
            user_id,
            &XpUpdatePayload {
                xp_gained: outcome.xp_awarded + quest_reward,
                total_xp: outcome.profile.xp,
                level: outcome.profile.level,
                reason: Some(outcome.kind.as_str().to_string()),
            },
        )
        .await?;
        if outcome.leveled_up {
            self.append(
                SyncEventType::LevelUp,
                user_id,
                &LevelUpPayload {
                    level: outcome.profile.level,
                    previous_level: outcome.previous_level,
                },
            )
            .await?;
        }
        for badge in &outcome.new_badges {
            self.append(
                SyncEventType::BadgeUnlock,
                user_id,
                &BadgeUnlockPayload {
                    badge_id: badge.id.clone(),
                    badge_name: Some(badge.name.clone()),
                },
            )
            .await?;
        }
        if outcome.streak_changed {
            self.append(
                SyncEventType::StreakUpdate,
                user_id,
                &StreakUpdatePayload {
                    streak: outcome.profile.streak,
                    max_streak: outcome.profile.max_streak,
                },
            )
            .await?;
        }
        for touch in &outcome.quests {
            self.quest_progress(user_id, touch).await?;
        }
        Ok(())
    }

    async fn xp_delta(
        &self,
        user_id: &str,
        gained: u64,
        reason: Option<&str>,
        delta: &XpDelta,
    ) -> Result<(), EngineError> {
        self.append(
            SyncEventType::XpUpdate,
            user_id,
            &XpUpdatePayload {
                xp_gained: gained,
                total_xp: delta.profile.xp,
                level: delta.profile.level,
                reason: reason.map(String::from),
            },
        )
        .await?;
        if delta.leveled_up() {
            self.append(
                SyncEventType::LevelUp,
                user_id,
                &LevelUpPayload {
                    level: delta.profile.level,
                    previous_level: delta.previous_level,
                },
            )
            .await?;
        }
        for badge in &delta.new_badges {
            self.append(
                SyncEventType::BadgeUnlock,
                user_id,
                &BadgeUnlockPayload {
                    badge_id: badge.id.clone(),
                    badge_name: Some(badge.name.clone()),
                },
            )
            .await?;
        }
        Ok(())
    }

    async fn quest_progress(&self, user_id: &str, touch: &QuestTouch) -> Result<(), EngineError> {
        self.append(
            SyncEventType::QuestProgress,
            user_id,
            &QuestProgressPayload {
                quest_id: touch.quest.id.clone(),
                progress: touch.progress,
                target: touch.quest.target,
                completed: touch.completed,
            },
        )
        .await
    }
}

// =============================================================================
// Discord-side handlers (the award pipeline)
// =============================================================================

/// Anime watches, manga reads, and daily logins from the website.
struct AwardHandler {
    service: Arc<GamificationService>,
    notifier: Notifier,
}

#[async_trait]
impl EventHandler for AwardHandler {
    async fn handle(&self, event: &SyncEvent) -> Result<(), EngineError> {
        let request = award_request_for(event)?;
        let outcome = self.service.award(&request).await?;
        if event.event_type == SyncEventType::WebsiteUserLogin && outcome.applied {
            self.service
                .activity()
                .record(
                    &event.user_id,
                    "daily_login",
                    event.source_platform,
                    json!({"xp": outcome.xp_awarded}),
                )
                .await;
        }
        self.notifier.award(&event.user_id, &outcome).await
    }
}

fn award_request_for(event: &SyncEvent) -> Result<AwardRequest, EngineError> {
    let request = match event.event_type {
        SyncEventType::WebsiteAnimeWatch => {
            let payload: AnimeWatchPayload = parse(event)?;
            AwardRequest::new(
                &event.user_id,
                event.source_platform,
                ActionEvidence::WatchEpisode {
                    anime_id: payload.anime_id,
                    anime_title: payload.anime_title,
                    episode: payload.episode,
                    streaming_sources: payload.streaming_sources,
                },
            )
            .with_flags(ContentFlags {
                is_trending: payload.is_trending,
                is_seasonal: payload.is_seasonal,
                is_popular: payload.is_popular,
            })
        }
        SyncEventType::WebsiteMangaRead => {
            let payload: MangaReadPayload = parse(event)?;
            AwardRequest::new(
                &event.user_id,
                event.source_platform,
                ActionEvidence::ReadChapter {
                    manga_id: payload.manga_id,
                    manga_title: payload.manga_title,
                    chapter: payload.chapter,
                    pages: payload.pages,
                },
            )
            .with_flags(ContentFlags {
                is_trending: payload.is_trending,
                is_seasonal: payload.is_seasonal,
                is_popular: payload.is_popular,
            })
        }
        SyncEventType::WebsiteUserLogin => AwardRequest::new(
            &event.user_id,
            event.source_platform,
            ActionEvidence::DailyLogin,
        ),
        other => {
            return Err(EngineError::invalid_payload(
                other.as_str(),
                "event type does not carry an action award",
            ))
        }
    };
    Ok(request.with_source_event(event.id))
}

/// Website-claimed XP with no action counter behind it.
struct XpGainHandler {
    service: Arc<GamificationService>,
    notifier: Notifier,
}

#[async_trait]
impl EventHandler for XpGainHandler {
    async fn handle(&self, event: &SyncEvent) -> Result<(), EngineError> {
        let payload: XpGainPayload = parse(event)?;
        let amount = u64::try_from(payload.xp_gained).map_err(|_| {
            EngineError::invalid_payload(event.event_type.as_str(), "xpGained must be non-negative")
        })?;
        let delta = self
            .service
            .apply_xp_delta(
                &event.user_id,
                amount,
                payload.reason.as_deref(),
                event.source_platform,
            )
            .await?;
        self.notifier
            .xp_delta(&event.user_id, amount, payload.reason.as_deref(), &delta)
            .await
    }
}

struct QuestCompleteHandler {
    service: Arc<GamificationService>,
    notifier: Notifier,
}

#[async_trait]
impl EventHandler for QuestCompleteHandler {
    async fn handle(&self, event: &SyncEvent) -> Result<(), EngineError> {
        let payload: QuestCompletePayload = parse(event)?;
        let (touch, delta) = self
            .service
            .complete_quest(&event.user_id, &payload.quest_id, event.source_platform)
            .await?;
        self.notifier.quest_progress(&event.user_id, &touch).await?;
        if let Some(delta) = delta {
            self.notifier
                .xp_delta(
                    &event.user_id,
                    touch.reward_xp,
                    Some(&format!("quest:{}", touch.quest.id)),
                    &delta,
                )
                .await?;
        }
        Ok(())
    }
}

struct BadgeGrantHandler {
    service: Arc<GamificationService>,
    notifier: Notifier,
}

#[async_trait]
impl EventHandler for BadgeGrantHandler {
    async fn handle(&self, event: &SyncEvent) -> Result<(), EngineError> {
        let payload: BadgeUnlockPayload = parse(event)?;
        let granted = self
            .service
            .grant_badge(&event.user_id, &payload.badge_id, event.source_platform)
            .await?;
        if let Some(badge) = granted {
            self.notifier
                .append(
                    SyncEventType::BadgeUnlock,
                    &event.user_id,
                    &BadgeUnlockPayload {
                        badge_id: badge.id,
                        badge_name: Some(badge.name),
                    },
                )
                .await?;
        }
        Ok(())
    }
}

/// The repair path. Responds with a full profile snapshot and gives this
/// user's recently failed action events another chance.
struct ForceSyncHandler {
    service: Arc<GamificationService>,
    stores: Stores,
    clock: Arc<dyn Clock>,
}

#[async_trait]
impl EventHandler for ForceSyncHandler {
    async fn handle(&self, event: &SyncEvent) -> Result<(), EngineError> {
        let now = self.clock.now();
        let profile = self.service.profile(&event.user_id).await?;
        let data = serde_json::to_value(&ForceSyncResponsePayload { profile })
            .map_err(StoreError::from)?;
        let response = SyncEvent::new(
            SyncEventType::DiscordForceSyncResponse,
            &event.user_id,
            data,
            now,
        );
        self.stores.events.append(&response).await?;

        let cutoff = now - Duration::hours(REQUEUE_WINDOW_HOURS);
        let failed = self
            .stores
            .events
            .failed_for_user(&event.user_id, Platform::Discord, cutoff)
            .await?;
        let mut requeued = 0u32;
        for old in failed {
            if old.retry_count >= MAX_REQUEUE_RETRIES {
                debug!(event_id = %old.id, "retry budget exhausted, not re-enqueueing");
                continue;
            }
            let mut copy = SyncEvent::new(old.event_type, &old.user_id, old.data.clone(), now);
            copy.target_user_id = old.target_user_id.clone();
            copy.retry_count = old.retry_count + 1;
            self.stores.events.append(&copy).await?;
            requeued += 1;
        }

        info!(user_id = %event.user_id, requeued, "force sync completed");
        self.service
            .activity()
            .record(
                &event.user_id,
                "force_sync",
                event.source_platform,
                json!({"responseEventId": response.id, "requeued": requeued}),
            )
            .await;
        Ok(())
    }
}

// =============================================================================
// Website-side handlers
// =============================================================================

/// Acknowledges notification events. The canonical profile was already
/// mutated by the award that produced them; applying them again would
/// double-count.
struct NotificationHandler {
    activity: ActivityLogger,
}

#[async_trait]
impl EventHandler for NotificationHandler {
    async fn handle(&self, event: &SyncEvent) -> Result<(), EngineError> {
        debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            user_id = %event.user_id,
            "notification delivered"
        );
        self.activity
            .record(
                &event.user_id,
                "sync_event_processed",
                event.target_platform,
                json!({"eventId": event.id, "eventType": event.event_type.as_str()}),
            )
            .await;
        Ok(())
    }
}

struct LinkHandler {
    service: Arc<GamificationService>,
    notifier: Notifier,
}

#[async_trait]
impl EventHandler for LinkHandler {
    async fn handle(&self, event: &SyncEvent) -> Result<(), EngineError> {
        let payload: LinkPayload = parse(event)?;
        let outcome = self
            .service
            .link_accounts(
                &event.user_id,
                &payload.discord_id,
                &payload.website_id,
                event.source_platform,
            )
            .await?;
        self.notifier.award(&event.user_id, &outcome).await
    }
}

struct UnlinkHandler {
    service: Arc<GamificationService>,
}

#[async_trait]
impl EventHandler for UnlinkHandler {
    async fn handle(&self, event: &SyncEvent) -> Result<(), EngineError> {
        let _payload: UnlinkPayload = parse(event)?;
        self.service
            .unlink_accounts(&event.user_id, event.source_platform)
            .await?;
        Ok(())
    }
}

// =============================================================================
// Wiring
// =============================================================================

/// Build the full routing table over one gamification service.
pub fn default_router(
    service: Arc<GamificationService>,
    stores: Stores,
    clock: Arc<dyn Clock>,
) -> EventRouter {
    let notifier = Notifier {
        stores: stores.clone(),
        clock: clock.clone(),
    };

    let award = Arc::new(AwardHandler {
        service: service.clone(),
        notifier: notifier.clone(),
    });
    let notification = Arc::new(NotificationHandler {
        activity: service.activity().clone(),
    });

    let mut router = EventRouter::new();
    router
        .register(SyncEventType::WebsiteAnimeWatch, award.clone())
        .register(SyncEventType::WebsiteMangaRead, award.clone())
        .register(SyncEventType::WebsiteUserLogin, award)
        .register(
            SyncEventType::WebsiteXpGain,
            Arc::new(XpGainHandler {
                service: service.clone(),
                notifier: notifier.clone(),
            }),
        )
        .register(
            SyncEventType::WebsiteQuestComplete,
            Arc::new(QuestCompleteHandler {
                service: service.clone(),
                notifier: notifier.clone(),
            }),
        )
        .register(
            SyncEventType::WebsiteBadgeUnlock,
            Arc::new(BadgeGrantHandler {
                service: service.clone(),
                notifier: notifier.clone(),
            }),
        )
        .register(
            SyncEventType::ForceSyncRequest,
            Arc::new(ForceSyncHandler {
                service: service.clone(),
                stores,
                clock,
            }),
        )
        .register(SyncEventType::XpUpdate, notification.clone())
        .register(SyncEventType::BadgeUnlock, notification.clone())
        .register(SyncEventType::LevelUp, notification.clone())
        .register(SyncEventType::StreakUpdate, notification.clone())
        .register(SyncEventType::QuestProgress, notification.clone())
        .register(SyncEventType::DiscordForceSyncResponse, notification)
        .register(
            SyncEventType::DiscordLinkSuccess,
            Arc::new(LinkHandler {
                service: service.clone(),
                notifier,
            }),
        )
        .register(
            SyncEventType::DiscordUnlink,
            Arc::new(UnlinkHandler { service }),
        );
    router
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::{SyncStatus, UserProfile};
    use chrono::{TimeZone, Utc};

    struct Fixture {
        clock: Arc<ManualClock>,
        stores: Stores,
        service: Arc<GamificationService>,
        router: EventRouter,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        ));
        let stores = Stores::in_memory();
        let service = Arc::new(GamificationService::new(stores.clone(), clock.clone()));
        let router = default_router(service.clone(), stores.clone(), clock.clone());
        Fixture {
            clock,
            stores,
            service,
            router,
        }
    }

    async fn website_pending(stores: &Stores) -> Vec<SyncEvent> {
        stores
            .events
            .pending_for_target(Platform::Website, 100)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_every_event_type_has_a_handler() {
        let fx = fixture();
        for event_type in SyncEventType::ALL {
            assert!(fx.router.handles(event_type), "{event_type} unrouted");
        }
    }

    #[tokio::test]
    async fn test_anime_watch_awards_and_notifies() {
        let fx = fixture();
        let event = SyncEvent::new(
            SyncEventType::WebsiteAnimeWatch,
            "u1",
            json!({
                "animeId": "frieren",
                "episode": 4,
                "streamingSources": ["https://example.com/4"],
                "isTrending": true,
            }),
            fx.clock.now(),
        );
        fx.router.dispatch(&event).await.unwrap();

        let profile = fx.service.profile("u1").await.unwrap();
        assert_eq!(profile.xp, 55);

        let pending = website_pending(&fx.stores).await;
        assert!(pending
            .iter()
            .any(|e| e.event_type == SyncEventType::XpUpdate
                && e.data["xpGained"] == 55
                && e.data["totalXp"] == 55));
        assert!(pending
            .iter()
            .any(|e| e.event_type == SyncEventType::BadgeUnlock
                && e.data["badgeId"] == "first-steps"));
        assert!(pending
            .iter()
            .any(|e| e.event_type == SyncEventType::StreakUpdate && e.data["streak"] == 1));
        assert!(pending
            .iter()
            .filter(|e| e.event_type == SyncEventType::QuestProgress)
            .count() >= 2);
    }

    #[tokio::test]
    async fn test_xp_gain_applies_delta_and_reports_level() {
        let fx = fixture();
        let event = SyncEvent::new(
            SyncEventType::WebsiteXpGain,
            "u1",
            json!({"xpGained": 450, "reason": "minigame"}),
            fx.clock.now(),
        );
        fx.router.dispatch(&event).await.unwrap();

        let profile = fx.service.profile("u1").await.unwrap();
        assert_eq!(profile.xp, 450);
        assert_eq!(profile.level, 3);
        assert_eq!(profile.total_actions(), 0);

        let pending = website_pending(&fx.stores).await;
        assert!(pending
            .iter()
            .any(|e| e.event_type == SyncEventType::XpUpdate && e.data["reason"] == "minigame"));
        assert!(pending
            .iter()
            .any(|e| e.event_type == SyncEventType::LevelUp && e.data["level"] == 3));
    }

    #[tokio::test]
    async fn test_link_and_unlink_round_trip() {
        let fx = fixture();
        let link = SyncEvent::new(
            SyncEventType::DiscordLinkSuccess,
            "u1",
            json!({"discordId": "d-9", "websiteId": "w-3"}),
            fx.clock.now(),
        );
        fx.router.dispatch(&link).await.unwrap();

        let profile = fx.service.profile("u1").await.unwrap();
        assert_eq!(profile.discord_id.as_deref(), Some("d-9"));
        assert_eq!(profile.website_id.as_deref(), Some("w-3"));
        assert_eq!(profile.xp, 100);

        let unlink = SyncEvent::new(
            SyncEventType::DiscordUnlink,
            "u1",
            json!({"discordId": "d-9"}),
            fx.clock.now(),
        );
        fx.router.dispatch(&unlink).await.unwrap();
        let profile = fx.service.profile("u1").await.unwrap();
        assert_eq!(profile.website_id, None);
    }

    #[tokio::test]
    async fn test_force_sync_snapshots_and_requeues_failed_actions() {
        let fx = fixture();
        let now = fx.clock.now();

        // A profile worth snapshotting and one failed action to replay.
        fx.service
            .apply_xp_delta("u1", 120, None, Platform::Website)
            .await
            .unwrap();
        let failed = SyncEvent::new(
            SyncEventType::WebsiteAnimeWatch,
            "u1",
            json!({"animeId": "frieren", "episode": 1, "streamingSources": ["https://example.com/1"]}),
            now,
        );
        fx.stores.events.append(&failed).await.unwrap();
        fx.stores
            .events
            .mark_failed(failed.id, "handler error", now)
            .await
            .unwrap();

        // And one that already burned its retry budget.
        let mut exhausted = SyncEvent::new(
            SyncEventType::WebsiteMangaRead,
            "u1",
            json!({"mangaId": "berserk", "chapter": 2, "pages": 20}),
            now,
        );
        exhausted.retry_count = MAX_REQUEUE_RETRIES;
        fx.stores.events.append(&exhausted).await.unwrap();
        fx.stores
            .events
            .mark_failed(exhausted.id, "handler error", now)
            .await
            .unwrap();

        let request = SyncEvent::new(SyncEventType::ForceSyncRequest, "u1", json!({}), now);
        fx.router.dispatch(&request).await.unwrap();

        let response = website_pending(&fx.stores)
            .await
            .into_iter()
            .find(|e| e.event_type == SyncEventType::DiscordForceSyncResponse)
            .expect("snapshot response");
        assert_eq!(response.data["profile"]["xp"], 120);

        let discord_pending = fx
            .stores
            .events
            .pending_for_target(Platform::Discord, 100)
            .await
            .unwrap();
        let copies: Vec<_> = discord_pending
            .iter()
            .filter(|e| e.event_type == SyncEventType::WebsiteAnimeWatch)
            .collect();
        assert_eq!(copies.len(), 1);
        assert_eq!(copies[0].retry_count, 1);
        assert_ne!(copies[0].id, failed.id);
        assert!(!discord_pending
            .iter()
            .any(|e| e.event_type == SyncEventType::WebsiteMangaRead));
    }

    #[tokio::test]
    async fn test_notification_ack_does_not_touch_the_profile() {
        let fx = fixture();
        let event = SyncEvent::new(
            SyncEventType::XpUpdate,
            "u1",
            json!({"xpGained": 50, "totalXp": 50, "level": 1}),
            fx.clock.now(),
        );
        fx.router.dispatch(&event).await.unwrap();

        assert!(fx.stores.profiles.load("u1").await.unwrap().is_none());
        let rows = fx.service.activity().recent("u1", 10).await.unwrap();
        assert!(rows.iter().any(|r| r.action == "sync_event_processed"));
    }

    #[tokio::test]
    async fn test_badge_grant_notifies_once() {
        let fx = fixture();
        let event = SyncEvent::new(
            SyncEventType::WebsiteBadgeUnlock,
            "u1",
            json!({"badgeId": "week-streak"}),
            fx.clock.now(),
        );
        fx.router.dispatch(&event).await.unwrap();
        fx.router.dispatch(&event).await.unwrap();

        let pending = website_pending(&fx.stores).await;
        let unlocks: Vec<_> = pending
            .iter()
            .filter(|e| e.event_type == SyncEventType::BadgeUnlock)
            .collect();
        assert_eq!(unlocks.len(), 1);
        assert_eq!(unlocks[0].data["badgeName"], "One Week Wonder");
    }

    #[tokio::test]
    async fn test_quest_complete_pays_reward_through_delta() {
        let fx = fixture();
        let event = SyncEvent::new(
            SyncEventType::WebsiteQuestComplete,
            "u1",
            json!({"questId": "daily-watcher"}),
            fx.clock.now(),
        );
        fx.router.dispatch(&event).await.unwrap();

        let profile = fx.service.profile("u1").await.unwrap();
        assert_eq!(profile.xp, 30);

        let pending = website_pending(&fx.stores).await;
        assert!(pending
            .iter()
            .any(|e| e.event_type == SyncEventType::QuestProgress
                && e.data["questId"] == "daily-watcher"
                && e.data["completed"] == true));
        assert!(pending
            .iter()
            .any(|e| e.event_type == SyncEventType::XpUpdate
                && e.data["reason"] == "quest:daily-watcher"));
    }

    #[tokio::test]
    async fn test_malformed_payload_is_rejected() {
        let fx = fixture();
        let event = SyncEvent::new(
            SyncEventType::WebsiteXpGain,
            "u1",
            json!({"xp": "lots"}),
            fx.clock.now(),
        );
        let err = fx.router.dispatch(&event).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidPayload { .. }));

        let negative = SyncEvent::new(
            SyncEventType::WebsiteXpGain,
            "u1",
            json!({"xpGained": -5}),
            fx.clock.now(),
        );
        let err = fx.router.dispatch(&negative).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidPayload { .. }));
    }

    #[tokio::test]
    async fn test_snapshot_response_restores_nothing_but_acks() {
        // The response handler is the plain notification ack; a crashed
        // website consumer can safely replay it.
        let fx = fixture();
        let profile = UserProfile::new("u1", fx.clock.now());
        let data = serde_json::to_value(ForceSyncResponsePayload { profile }).unwrap();
        let event = SyncEvent::new(
            SyncEventType::DiscordForceSyncResponse,
            "u1",
            data,
            fx.clock.now(),
        );
        fx.stores.events.append(&event).await.unwrap();
        fx.router.dispatch(&event).await.unwrap();
        fx.router.dispatch(&event).await.unwrap();
        assert!(fx.stores.profiles.load("u1").await.unwrap().is_none());
        assert_eq!(
            fx.stores.events.get(event.id).await.unwrap().unwrap().status,
            SyncStatus::Pending
        );
    }
}
