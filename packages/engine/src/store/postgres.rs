//! Postgres store backend.
//!
//! Durable, multi-instance backend. Concurrency control happens in SQL:
//! profile saves compare `sync_version` in the UPDATE predicate, event
//! status transitions only match `pending` rows, quest increments ride on
//! `ON CONFLICT DO UPDATE`, and reputation merges hold a row lock.
//!
//! Enum-ish columns (`status`, platforms, levels) store the serde string
//! form, so decoding reuses the same serde definitions as the JSON payloads.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{
    ActivityRecord, Platform, QuestProgress, ReputationRecord, SyncEvent, UserProfile, Violation,
};
use crate::store::{
    ActivityStore, EventStore, ProfileStore, QuestStore, ReputationStore, StoreError, SyncVersion,
};

fn decode_name<T: serde::de::DeserializeOwned>(name: String) -> Result<T, StoreError> {
    serde_json::from_value(Value::String(name)).map_err(Into::into)
}

// =============================================================================
// Profiles
// =============================================================================

pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    profile: Json<UserProfile>,
    sync_version: i64,
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn load(&self, user_id: &str) -> Result<Option<(UserProfile, SyncVersion)>, StoreError> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT profile, sync_version FROM user_profiles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| (row.profile.0, SyncVersion::new(row.sync_version as u64))))
    }

    async fn save(
        &self,
        profile: &UserProfile,
        expected: SyncVersion,
    ) -> Result<SyncVersion, StoreError> {
        let next = expected.next();
        let mut stored = profile.clone();
        stored.sync_version = next.value();

        let result = if expected.is_none() {
            sqlx::query(
                "INSERT INTO user_profiles (user_id, profile, xp, sync_version, updated_at) \
                 VALUES ($1, $2, $3, $4, now()) \
                 ON CONFLICT (user_id) DO NOTHING",
            )
            .bind(&stored.user_id)
            .bind(Json(&stored))
            .bind(stored.xp as i64)
            .bind(next.value() as i64)
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query(
                "UPDATE user_profiles \
                 SET profile = $2, xp = $3, sync_version = $4, updated_at = now() \
                 WHERE user_id = $1 AND sync_version = $5",
            )
            .bind(&stored.user_id)
            .bind(Json(&stored))
            .bind(stored.xp as i64)
            .bind(next.value() as i64)
            .bind(expected.value() as i64)
            .execute(&self.pool)
            .await?
        };

        if result.rows_affected() == 0 {
            return Err(StoreError::conflict("profile", &profile.user_id));
        }
        Ok(next)
    }

    async fn top_by_xp(&self, limit: usize) -> Result<Vec<UserProfile>, StoreError> {
        let rows = sqlx::query_as::<_, (Json<UserProfile>,)>(
            "SELECT profile FROM user_profiles ORDER BY xp DESC, user_id ASC LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(profile,)| profile.0).collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// =============================================================================
// Events
// =============================================================================

pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const EVENT_COLUMNS: &str = "id, user_id, target_user_id, event_type, source_platform, \
     target_platform, data, status, created_at, processed_at, processed_by, retry_count, error";

#[derive(sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    user_id: String,
    target_user_id: Option<String>,
    event_type: String,
    source_platform: String,
    target_platform: String,
    data: Value,
    status: String,
    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
    processed_by: Option<String>,
    retry_count: i32,
    error: Option<String>,
}

impl EventRow {
    fn into_event(self) -> Result<SyncEvent, StoreError> {
        Ok(SyncEvent {
            id: self.id,
            user_id: self.user_id,
            target_user_id: self.target_user_id,
            event_type: decode_name(self.event_type)?,
            source_platform: decode_name(self.source_platform)?,
            target_platform: decode_name(self.target_platform)?,
            data: self.data,
            status: decode_name(self.status)?,
            created_at: self.created_at,
            processed_at: self.processed_at,
            processed_by: self.processed_by,
            retry_count: self.retry_count.max(0) as u32,
            error: self.error,
        })
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn append(&self, event: &SyncEvent) -> Result<(), StoreError> {
        let result = sqlx::query(
            "INSERT INTO sync_events \
             (id, user_id, target_user_id, event_type, source_platform, target_platform, \
              data, status, created_at, processed_at, processed_by, retry_count, error) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(event.id)
        .bind(&event.user_id)
        .bind(&event.target_user_id)
        .bind(event.event_type.as_str())
        .bind(event.source_platform.as_str())
        .bind(event.target_platform.as_str())
        .bind(&event.data)
        .bind(event.status.as_str())
        .bind(event.created_at)
        .bind(event.processed_at)
        .bind(&event.processed_by)
        .bind(event.retry_count as i32)
        .bind(&event.error)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::conflict("event", event.id.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<SyncEvent>, StoreError> {
        let row = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM sync_events WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(EventRow::into_event).transpose()
    }

    async fn pending_for_target(
        &self,
        target: Platform,
        limit: usize,
    ) -> Result<Vec<SyncEvent>, StoreError> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM sync_events \
             WHERE status = 'pending' AND target_platform = $1 \
             ORDER BY created_at ASC, id ASC LIMIT $2"
        ))
        .bind(target.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EventRow::into_event).collect()
    }

    async fn mark_success(
        &self,
        id: Uuid,
        processed_by: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE sync_events \
             SET status = 'success', processed_at = $2, processed_by = $3, error = NULL \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(at)
        .bind(processed_by)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        self.require_exists(id).await?;
        Ok(false)
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE sync_events \
             SET status = 'failed', processed_at = $2, error = $3 \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(at)
        .bind(error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        self.require_exists(id).await?;
        Ok(false)
    }

    async fn recent_for_user(
        &self,
        user_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<SyncEvent>, StoreError> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM sync_events \
             WHERE user_id = $1 AND created_at >= $2 \
             ORDER BY created_at DESC, id ASC"
        ))
        .bind(user_id)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EventRow::into_event).collect()
    }

    async fn failed_for_user(
        &self,
        user_id: &str,
        target: Platform,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<SyncEvent>, StoreError> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM sync_events \
             WHERE user_id = $1 AND status = 'failed' AND target_platform = $2 \
               AND created_at >= $3 \
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(user_id)
        .bind(target.as_str())
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EventRow::into_event).collect()
    }
}

impl PgEventStore {
    async fn require_exists(&self, id: Uuid) -> Result<(), StoreError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM sync_events WHERE id = $1)",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        if exists {
            Ok(())
        } else {
            Err(StoreError::not_found("event", id.to_string()))
        }
    }
}

// =============================================================================
// Quests
// =============================================================================

pub struct PgQuestStore {
    pool: PgPool,
}

impl PgQuestStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct QuestRow {
    user_id: String,
    quest_id: String,
    period_key: String,
    progress: i64,
    completed: bool,
    updated_at: DateTime<Utc>,
}

impl From<QuestRow> for QuestProgress {
    fn from(row: QuestRow) -> Self {
        QuestProgress {
            user_id: row.user_id,
            quest_id: row.quest_id,
            period_key: row.period_key,
            progress: row.progress.max(0) as u64,
            completed: row.completed,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl QuestStore for PgQuestStore {
    async fn increment(
        &self,
        user_id: &str,
        quest_id: &str,
        period_key: &str,
        by: u64,
        now: DateTime<Utc>,
    ) -> Result<QuestProgress, StoreError> {
        let row = sqlx::query_as::<_, QuestRow>(
            "INSERT INTO quest_progress \
             (user_id, quest_id, period_key, progress, completed, updated_at) \
             VALUES ($1, $2, $3, $4, false, $5) \
             ON CONFLICT (user_id, quest_id, period_key) DO UPDATE \
             SET progress = quest_progress.progress + EXCLUDED.progress, \
                 updated_at = EXCLUDED.updated_at \
             RETURNING user_id, quest_id, period_key, progress, completed, updated_at",
        )
        .bind(user_id)
        .bind(quest_id)
        .bind(period_key)
        .bind(by as i64)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn get(
        &self,
        user_id: &str,
        quest_id: &str,
        period_key: &str,
    ) -> Result<Option<QuestProgress>, StoreError> {
        let row = sqlx::query_as::<_, QuestRow>(
            "SELECT user_id, quest_id, period_key, progress, completed, updated_at \
             FROM quest_progress \
             WHERE user_id = $1 AND quest_id = $2 AND period_key = $3",
        )
        .bind(user_id)
        .bind(quest_id)
        .bind(period_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn mark_completed(
        &self,
        user_id: &str,
        quest_id: &str,
        period_key: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE quest_progress SET completed = true, updated_at = $4 \
             WHERE user_id = $1 AND quest_id = $2 AND period_key = $3 AND completed = false",
        )
        .bind(user_id)
        .bind(quest_id)
        .bind(period_key)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

// =============================================================================
// Reputation
// =============================================================================

pub struct PgReputationStore {
    pool: PgPool,
}

impl PgReputationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ReputationRow {
    subject: String,
    level: String,
    violations: Json<Vec<Violation>>,
    updated_at: DateTime<Utc>,
}

impl ReputationRow {
    fn into_record(self) -> Result<ReputationRecord, StoreError> {
        Ok(ReputationRecord {
            subject: self.subject,
            level: decode_name(self.level)?,
            violations: self.violations.0,
            updated_at: self.updated_at,
        })
    }
}

#[async_trait]
impl ReputationStore for PgReputationStore {
    async fn get(&self, subject: &str) -> Result<Option<ReputationRecord>, StoreError> {
        let row = sqlx::query_as::<_, ReputationRow>(
            "SELECT subject, level, violations, updated_at \
             FROM reputation_records WHERE subject = $1",
        )
        .bind(subject)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ReputationRow::into_record).transpose()
    }

    async fn record(
        &self,
        subject: &str,
        violation: Violation,
        hard_block: bool,
    ) -> Result<ReputationRecord, StoreError> {
        // Seed the row first so the row lock below always has something to
        // grab, then merge under the lock.
        sqlx::query(
            "INSERT INTO reputation_records (subject, level, violations, updated_at) \
             VALUES ($1, 'clean', '[]'::jsonb, $2) \
             ON CONFLICT (subject) DO NOTHING",
        )
        .bind(subject)
        .bind(violation.at)
        .execute(&self.pool)
        .await?;

        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, ReputationRow>(
            "SELECT subject, level, violations, updated_at \
             FROM reputation_records WHERE subject = $1 FOR UPDATE",
        )
        .bind(subject)
        .fetch_one(&mut *tx)
        .await?;

        let mut record = row.into_record()?;
        record.register(violation, hard_block);

        sqlx::query(
            "UPDATE reputation_records \
             SET level = $2, violations = $3, updated_at = $4 \
             WHERE subject = $1",
        )
        .bind(&record.subject)
        .bind(record.level.as_str())
        .bind(Json(&record.violations))
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(record)
    }
}

// =============================================================================
// Activity
// =============================================================================

pub struct PgActivityStore {
    pool: PgPool,
}

impl PgActivityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ActivityRow {
    id: Uuid,
    user_id: String,
    action: String,
    platform: String,
    metadata: Value,
    created_at: DateTime<Utc>,
}

impl ActivityRow {
    fn into_record(self) -> Result<ActivityRecord, StoreError> {
        Ok(ActivityRecord {
            id: self.id,
            user_id: self.user_id,
            action: self.action,
            platform: decode_name(self.platform)?,
            metadata: self.metadata,
            created_at: self.created_at,
        })
    }
}

#[async_trait]
impl ActivityStore for PgActivityStore {
    async fn append(&self, record: &ActivityRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO activity_log (id, user_id, action, platform, metadata, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(record.id)
        .bind(&record.user_id)
        .bind(&record.action)
        .bind(record.platform.as_str())
        .bind(&record.metadata)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ActivityRecord>, StoreError> {
        let rows = sqlx::query_as::<_, ActivityRow>(
            "SELECT id, user_id, action, platform, metadata, created_at \
             FROM activity_log WHERE user_id = $1 \
             ORDER BY created_at DESC, id ASC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ActivityRow::into_record).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ReputationLevel, SyncEventType, SyncStatus};
    use serde_json::json;

    #[test]
    fn test_event_row_round_trip() {
        let row = EventRow {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            target_user_id: None,
            event_type: "WEBSITE_ANIME_WATCH".into(),
            source_platform: "website".into(),
            target_platform: "discord".into(),
            data: json!({"animeId": "aot"}),
            status: "pending".into(),
            created_at: Utc::now(),
            processed_at: None,
            processed_by: None,
            retry_count: 0,
            error: None,
        };

        let event = row.into_event().unwrap();
        assert_eq!(event.event_type, SyncEventType::WebsiteAnimeWatch);
        assert_eq!(event.source_platform, Platform::Website);
        assert_eq!(event.status, SyncStatus::Pending);
    }

    #[test]
    fn test_event_row_rejects_unknown_status() {
        let row = EventRow {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            target_user_id: None,
            event_type: "WEBSITE_ANIME_WATCH".into(),
            source_platform: "website".into(),
            target_platform: "discord".into(),
            data: json!({}),
            status: "exploded".into(),
            created_at: Utc::now(),
            processed_at: None,
            processed_by: None,
            retry_count: 0,
            error: None,
        };

        assert!(matches!(
            row.into_event(),
            Err(StoreError::Serialization(_))
        ));
    }

    #[test]
    fn test_reputation_row_decodes_level() {
        let row = ReputationRow {
            subject: "user:u1".into(),
            level: "monitored".into(),
            violations: Json(Vec::new()),
            updated_at: Utc::now(),
        };

        let record = row.into_record().unwrap();
        assert_eq!(record.level, ReputationLevel::Monitored);
    }
}
