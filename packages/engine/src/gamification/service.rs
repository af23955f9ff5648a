//! The award pipeline.
//!
//! Every profile mutation funnels through [`GamificationService`]: verified
//! action awards, direct XP deltas, explicit badge grants, and identity
//! link changes. Each one is a read-compute-write under the profile
//! store's version CAS; a conflicting save retries the whole computation
//! from a fresh read with jittered backoff, so two concurrent awards to
//! one user always sum.
//!
//! Quest progress lives in its own per-period rows and is advanced after
//! the profile commit. A CAS retry therefore never double-counts a quest,
//! and quest completion rewards land through the same delta path as any
//! other XP so level and badge recomputation stay in one place.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::activity::ActivityLogger;
use crate::clock::Clock;
use crate::error::EngineError;
use crate::models::{
    ActionEvidence, ActionKind, AwardRequest, Badge, Platform, Quest, UserProfile,
};
use crate::store::{StoreError, Stores, SyncVersion};

use super::badges::BadgeCatalog;
use super::level::level_for_xp;
use super::quests::QuestCatalog;
use super::rewards::{RewardConfig, XpBreakdown};
use super::{streak, verify};

/// Attempts per profile mutation before giving up on version conflicts.
const SAVE_ATTEMPTS: u32 = 5;

// =============================================================================
// Outcomes
// =============================================================================

/// One quest advanced by an award.
#[derive(Debug, Clone)]
pub struct QuestTouch {
    pub quest: Quest,
    pub progress: u64,
    pub completed: bool,
    /// Reward granted by this award; zero unless this award completed it.
    pub reward_xp: u64,
}

/// Result of a raw XP change.
#[derive(Debug, Clone)]
pub struct XpDelta {
    pub profile: UserProfile,
    pub previous_level: u32,
    pub new_badges: Vec<Badge>,
}

impl XpDelta {
    pub fn leveled_up(&self) -> bool {
        self.profile.level > self.previous_level
    }
}

/// Everything a caller needs to broadcast after an award.
#[derive(Debug, Clone)]
pub struct AwardOutcome {
    pub kind: ActionKind,
    pub xp_awarded: u64,
    pub breakdown: XpBreakdown,
    pub previous_level: u32,
    pub leveled_up: bool,
    pub streak_changed: bool,
    pub new_badges: Vec<Badge>,
    pub quests: Vec<QuestTouch>,
    /// False when the award was a recognized no-op (repeat daily login,
    /// re-link of an already linked pair). Nothing was persisted.
    pub applied: bool,
    pub profile: UserProfile,
}

impl AwardOutcome {
    fn unapplied(kind: ActionKind, profile: UserProfile) -> Self {
        Self {
            kind,
            xp_awarded: 0,
            breakdown: XpBreakdown {
                base: 0,
                bonus: 0,
                multiplier: 1.0,
                total: 0,
            },
            previous_level: profile.level,
            leveled_up: false,
            streak_changed: false,
            new_badges: Vec::new(),
            quests: Vec::new(),
            applied: false,
            profile,
        }
    }
}

// =============================================================================
// Service
// =============================================================================

pub struct GamificationService {
    stores: Stores,
    rewards: RewardConfig,
    badges: BadgeCatalog,
    quests: QuestCatalog,
    activity: ActivityLogger,
    clock: Arc<dyn Clock>,
}

impl GamificationService {
    pub fn new(stores: Stores, clock: Arc<dyn Clock>) -> Self {
        Self {
            activity: ActivityLogger::new(stores.activity.clone(), clock.clone()),
            rewards: RewardConfig::default(),
            badges: BadgeCatalog::standard(),
            quests: QuestCatalog::standard(),
            stores,
            clock,
        }
    }

    pub fn with_rewards(mut self, rewards: RewardConfig) -> Self {
        self.rewards = rewards;
        self
    }

    pub fn with_badges(mut self, badges: BadgeCatalog) -> Self {
        self.badges = badges;
        self
    }

    pub fn with_quests(mut self, quests: QuestCatalog) -> Self {
        self.quests = quests;
        self
    }

    pub fn badges(&self) -> &BadgeCatalog {
        &self.badges
    }

    pub fn quests(&self) -> &QuestCatalog {
        &self.quests
    }

    pub fn activity(&self) -> &ActivityLogger {
        &self.activity
    }

    /// Current profile, or a fresh default for a user never saved.
    pub async fn profile(&self, user_id: &str) -> Result<UserProfile, EngineError> {
        Ok(self.load_or_new(user_id).await?.0)
    }

    // =========================================================================
    // Award pipeline
    // =========================================================================

    /// Verify, price, and apply one action.
    ///
    /// The profile commit carries the XP, level, streak, action counters,
    /// content history, and badge unlocks in one CAS write. Quest rows
    /// advance afterwards, with completion rewards applied as a follow-up
    /// delta. Verification failures reject with no partial effect.
    pub async fn award(&self, request: &AwardRequest) -> Result<AwardOutcome, EngineError> {
        let kind = request.evidence.kind();
        let today = self.clock.today();
        let now = self.clock.now();

        let mut attempt = 0;
        let mut outcome = loop {
            attempt += 1;
            let (mut profile, version) = self.load_or_new(&request.user_id).await?;
            verify::verify(&request.evidence, &profile)?;

            if kind == ActionKind::DailyLogin && profile.last_login_date == Some(today) {
                debug!(user_id = %request.user_id, "repeat daily login, nothing to award");
                return Ok(AwardOutcome::unapplied(kind, profile));
            }

            let previous_level = profile.level;
            let first_time = request
                .evidence
                .content_key()
                .map(|key| !profile.seen_content(kind, &key))
                .unwrap_or(false);
            // The multiplier reads the streak as stored before this action.
            let breakdown = self.rewards.breakdown(
                kind,
                request.flags,
                first_time,
                profile.streak,
                request.experiment_multiplier,
            );

            let streak_changed = streak::touch(&mut profile, today);
            profile.daily_actions += 1;
            profile.bump_action(kind);
            if let Some(key) = request.evidence.content_key() {
                profile.record_content(kind, &key, now);
            }
            if kind == ActionKind::DailyLogin {
                profile.last_login_date = Some(today);
            }
            if let ActionEvidence::AccountLink {
                discord_id,
                website_id,
            } = &request.evidence
            {
                profile.discord_id = Some(discord_id.clone());
                profile.website_id = Some(website_id.clone());
            }

            profile.xp += breakdown.total;
            profile.level = level_for_xp(profile.xp);
            let new_badges = self.badges.unlock_earned(&mut profile);
            profile.last_sync_at = now;

            match self.stores.profiles.save(&profile, version).await {
                Ok(next) => {
                    profile.sync_version = next.value();
                    let leveled_up = profile.level > previous_level;
                    break AwardOutcome {
                        kind,
                        xp_awarded: breakdown.total,
                        breakdown,
                        previous_level,
                        leveled_up,
                        streak_changed,
                        new_badges,
                        quests: Vec::new(),
                        applied: true,
                        profile,
                    };
                }
                Err(StoreError::Conflict { .. }) if attempt < SAVE_ATTEMPTS => {
                    debug!(
                        user_id = %request.user_id,
                        attempt,
                        "profile version conflict, retrying award"
                    );
                    self.backoff(attempt).await;
                }
                Err(err) => return Err(err.into()),
            }
        };

        outcome.quests = self
            .advance_quests(&request.user_id, kind, request.flags.is_trending, today)
            .await?;
        let quest_reward: u64 = outcome.quests.iter().map(|t| t.reward_xp).sum();
        if quest_reward > 0 {
            let delta = self.apply_xp(&request.user_id, quest_reward).await?;
            outcome.new_badges.extend(delta.new_badges);
            outcome.leveled_up = delta.profile.level > outcome.previous_level;
            outcome.profile = delta.profile;
        }

        info!(
            user_id = %request.user_id,
            action = %kind,
            xp = outcome.xp_awarded,
            level = outcome.profile.level,
            "action awarded"
        );
        self.record_award_activity(request, &outcome).await;
        Ok(outcome)
    }

    /// Add a raw XP amount (website-claimed XP, admin corrections).
    ///
    /// Recomputes the level and badge unlocks; streaks, action counters,
    /// and quests are untouched.
    pub async fn apply_xp_delta(
        &self,
        user_id: &str,
        amount: u64,
        reason: Option<&str>,
        platform: Platform,
    ) -> Result<XpDelta, EngineError> {
        let delta = self.apply_xp(user_id, amount).await?;
        self.activity
            .record(
                user_id,
                "xp_awarded",
                platform,
                json!({"xp": amount, "reason": reason}),
            )
            .await;
        if delta.leveled_up() {
            self.activity
                .record(
                    user_id,
                    "level_up",
                    platform,
                    json!({"level": delta.profile.level, "previousLevel": delta.previous_level}),
                )
                .await;
        }
        for badge in &delta.new_badges {
            self.activity
                .record(
                    user_id,
                    "badge_unlocked",
                    platform,
                    json!({"badgeId": badge.id, "badgeName": badge.name}),
                )
                .await;
        }
        Ok(delta)
    }

    /// Grant one catalog badge directly. `None` when already owned.
    pub async fn grant_badge(
        &self,
        user_id: &str,
        badge_id: &str,
        platform: Platform,
    ) -> Result<Option<Badge>, EngineError> {
        let badge = self
            .badges
            .get(badge_id)
            .ok_or_else(|| {
                EngineError::invalid_payload(
                    "WEBSITE_BADGE_UNLOCK",
                    format!("unknown badge id {badge_id}"),
                )
            })?
            .clone();

        let now = self.clock.now();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let (mut profile, version) = self.load_or_new(user_id).await?;
            if !profile.grant_badge(&badge.id) {
                return Ok(None);
            }
            profile.last_sync_at = now;
            match self.stores.profiles.save(&profile, version).await {
                Ok(_) => {
                    self.activity
                        .record(
                            user_id,
                            "badge_unlocked",
                            platform,
                            json!({"badgeId": badge.id, "badgeName": badge.name}),
                        )
                        .await;
                    return Ok(Some(badge));
                }
                Err(StoreError::Conflict { .. }) if attempt < SAVE_ATTEMPTS => {
                    self.backoff(attempt).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Complete a quest's current period on the website's word, granting
    /// the reward at most once per period. The returned delta is `Some`
    /// only when this call granted the reward.
    pub async fn complete_quest(
        &self,
        user_id: &str,
        quest_id: &str,
        platform: Platform,
    ) -> Result<(QuestTouch, Option<XpDelta>), EngineError> {
        let quest = self
            .quests
            .get(quest_id)
            .ok_or_else(|| {
                EngineError::invalid_payload(
                    "WEBSITE_QUEST_COMPLETE",
                    format!("unknown quest id {quest_id}"),
                )
            })?
            .clone();
        let period_key = quest.period.period_key(self.clock.today());
        let now = self.clock.now();

        let row = self
            .stores
            .quests
            .increment(user_id, &quest.id, &period_key, 0, now)
            .await?;
        let mut progress = row.progress;
        let mut completed_now = false;
        if !row.completed {
            let shortfall = quest.target.saturating_sub(row.progress);
            if shortfall > 0 {
                progress = self
                    .stores
                    .quests
                    .increment(user_id, &quest.id, &period_key, shortfall, now)
                    .await?
                    .progress;
            }
            completed_now = self
                .stores
                .quests
                .mark_completed(user_id, &quest.id, &period_key, now)
                .await?;
        }

        let mut reward_xp = 0;
        let mut delta = None;
        if completed_now {
            reward_xp = quest.reward_xp;
            delta = Some(self.apply_xp(user_id, reward_xp).await?);
            self.activity
                .record(
                    user_id,
                    "quest_completed",
                    platform,
                    json!({"questId": quest.id, "periodKey": period_key, "rewardXp": reward_xp}),
                )
                .await;
        }

        Ok((
            QuestTouch {
                quest,
                progress,
                completed: true,
                reward_xp,
            },
            delta,
        ))
    }

    /// Link both identities and award `ACCOUNT_LINK` once. Re-linking the
    /// same pair is a no-op.
    pub async fn link_accounts(
        &self,
        user_id: &str,
        discord_id: &str,
        website_id: &str,
        platform: Platform,
    ) -> Result<AwardOutcome, EngineError> {
        let (profile, _) = self.load_or_new(user_id).await?;
        if profile.discord_id.as_deref() == Some(discord_id)
            && profile.website_id.as_deref() == Some(website_id)
        {
            debug!(user_id, "accounts already linked");
            return Ok(AwardOutcome::unapplied(ActionKind::AccountLink, profile));
        }

        let request = AwardRequest::new(
            user_id,
            platform,
            ActionEvidence::AccountLink {
                discord_id: discord_id.to_string(),
                website_id: website_id.to_string(),
            },
        );
        let outcome = self.award(&request).await?;
        self.activity
            .record(
                user_id,
                "account_linked",
                platform,
                json!({"discordId": discord_id, "websiteId": website_id}),
            )
            .await;
        Ok(outcome)
    }

    /// Drop the website identity from the profile. No XP either way.
    pub async fn unlink_accounts(
        &self,
        user_id: &str,
        platform: Platform,
    ) -> Result<UserProfile, EngineError> {
        let now = self.clock.now();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let (mut profile, version) = self.load_or_new(user_id).await?;
            if profile.website_id.is_none() {
                return Ok(profile);
            }
            profile.website_id = None;
            profile.last_sync_at = now;
            match self.stores.profiles.save(&profile, version).await {
                Ok(next) => {
                    profile.sync_version = next.value();
                    self.activity
                        .record(user_id, "account_unlinked", platform, json!({}))
                        .await;
                    return Ok(profile);
                }
                Err(StoreError::Conflict { .. }) if attempt < SAVE_ATTEMPTS => {
                    self.backoff(attempt).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn load_or_new(&self, user_id: &str) -> Result<(UserProfile, SyncVersion), EngineError> {
        match self.stores.profiles.load(user_id).await? {
            Some(loaded) => Ok(loaded),
            None => Ok((
                UserProfile::new(user_id, self.clock.now()),
                SyncVersion::NONE,
            )),
        }
    }

    async fn apply_xp(&self, user_id: &str, amount: u64) -> Result<XpDelta, EngineError> {
        let now = self.clock.now();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let (mut profile, version) = self.load_or_new(user_id).await?;
            let previous_level = profile.level;
            profile.xp += amount;
            profile.level = level_for_xp(profile.xp);
            let new_badges = self.badges.unlock_earned(&mut profile);
            profile.last_sync_at = now;
            match self.stores.profiles.save(&profile, version).await {
                Ok(next) => {
                    profile.sync_version = next.value();
                    return Ok(XpDelta {
                        profile,
                        previous_level,
                        new_badges,
                    });
                }
                Err(StoreError::Conflict { .. }) if attempt < SAVE_ATTEMPTS => {
                    debug!(user_id, attempt, "profile version conflict, retrying delta");
                    self.backoff(attempt).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn advance_quests(
        &self,
        user_id: &str,
        kind: ActionKind,
        trending: bool,
        today: NaiveDate,
    ) -> Result<Vec<QuestTouch>, EngineError> {
        let now = self.clock.now();
        let mut touches = Vec::new();
        for quest in self.quests.matching(kind, trending) {
            let period_key = quest.period.period_key(today);
            let row = self
                .stores
                .quests
                .increment(user_id, &quest.id, &period_key, 1, now)
                .await?;
            let mut completed_now = false;
            if !row.completed && row.progress >= quest.target {
                completed_now = self
                    .stores
                    .quests
                    .mark_completed(user_id, &quest.id, &period_key, now)
                    .await?;
            }
            touches.push(QuestTouch {
                quest: quest.clone(),
                progress: row.progress,
                completed: row.completed || completed_now,
                reward_xp: if completed_now { quest.reward_xp } else { 0 },
            });
        }
        Ok(touches)
    }

    async fn record_award_activity(&self, request: &AwardRequest, outcome: &AwardOutcome) {
        let user_id = &request.user_id;
        let platform = request.platform;
        self.activity
            .record(
                user_id,
                "xp_awarded",
                platform,
                json!({
                    "action": outcome.kind.as_str(),
                    "xp": outcome.xp_awarded,
                    "base": outcome.breakdown.base,
                    "bonus": outcome.breakdown.bonus,
                    "multiplier": outcome.breakdown.multiplier,
                }),
            )
            .await;
        if outcome.leveled_up {
            self.activity
                .record(
                    user_id,
                    "level_up",
                    platform,
                    json!({"level": outcome.profile.level, "previousLevel": outcome.previous_level}),
                )
                .await;
        }
        if outcome.streak_changed {
            self.activity
                .record(
                    user_id,
                    "streak_updated",
                    platform,
                    json!({"streak": outcome.profile.streak, "maxStreak": outcome.profile.max_streak}),
                )
                .await;
        }
        for badge in &outcome.new_badges {
            self.activity
                .record(
                    user_id,
                    "badge_unlocked",
                    platform,
                    json!({"badgeId": badge.id, "badgeName": badge.name}),
                )
                .await;
        }
        for touch in &outcome.quests {
            self.activity
                .record(
                    user_id,
                    "quest_progress",
                    platform,
                    json!({
                        "questId": touch.quest.id,
                        "progress": touch.progress,
                        "target": touch.quest.target,
                        "completed": touch.completed,
                    }),
                )
                .await;
            if touch.reward_xp > 0 {
                self.activity
                    .record(
                        user_id,
                        "quest_completed",
                        platform,
                        json!({"questId": touch.quest.id, "rewardXp": touch.reward_xp}),
                    )
                    .await;
            }
        }
    }

    async fn backoff(&self, attempt: u32) {
        let base_ms = 10u64 << attempt.min(6);
        let jitter = fastrand::u64(0..base_ms);
        tokio::time::sleep(Duration::from_millis(base_ms + jitter)).await;
    }
}
