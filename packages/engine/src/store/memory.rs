//! In-process store backend.
//!
//! Default when no database is configured, and the backend every unit test
//! runs against. Same trait contracts as the Postgres backend, including
//! version conflicts and one-shot status transitions. State is lost on
//! restart.

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::{
    ActivityRecord, Platform, QuestProgress, ReputationRecord, SyncEvent, SyncStatus, UserProfile,
    Violation,
};
use crate::store::{
    ActivityStore, EventStore, ProfileStore, QuestStore, ReputationStore, StoreError, SyncVersion,
};

// =============================================================================
// Profiles
// =============================================================================

#[derive(Default)]
pub struct MemoryProfileStore {
    data: DashMap<String, (UserProfile, SyncVersion)>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn load(&self, user_id: &str) -> Result<Option<(UserProfile, SyncVersion)>, StoreError> {
        Ok(self.data.get(user_id).map(|entry| entry.value().clone()))
    }

    async fn save(
        &self,
        profile: &UserProfile,
        expected: SyncVersion,
    ) -> Result<SyncVersion, StoreError> {
        let mut stored = profile.clone();
        match self.data.entry(profile.user_id.clone()) {
            Entry::Occupied(mut slot) => {
                if slot.get().1 != expected {
                    return Err(StoreError::conflict("profile", &profile.user_id));
                }
                let next = expected.next();
                stored.sync_version = next.value();
                slot.insert((stored, next));
                Ok(next)
            }
            Entry::Vacant(slot) => {
                if !expected.is_none() {
                    return Err(StoreError::conflict("profile", &profile.user_id));
                }
                let next = expected.next();
                stored.sync_version = next.value();
                slot.insert((stored, next));
                Ok(next)
            }
        }
    }

    async fn top_by_xp(&self, limit: usize) -> Result<Vec<UserProfile>, StoreError> {
        let mut profiles: Vec<UserProfile> = self
            .data
            .iter()
            .map(|entry| entry.value().0.clone())
            .collect();
        profiles.sort_by(|a, b| b.xp.cmp(&a.xp).then_with(|| a.user_id.cmp(&b.user_id)));
        profiles.truncate(limit);
        Ok(profiles)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// =============================================================================
// Events
// =============================================================================

#[derive(Default)]
pub struct MemoryEventStore {
    data: DashMap<Uuid, SyncEvent>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(&self, event: &SyncEvent) -> Result<(), StoreError> {
        match self.data.entry(event.id) {
            Entry::Occupied(_) => Err(StoreError::conflict("event", event.id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(event.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<SyncEvent>, StoreError> {
        Ok(self.data.get(&id).map(|entry| entry.value().clone()))
    }

    async fn pending_for_target(
        &self,
        target: Platform,
        limit: usize,
    ) -> Result<Vec<SyncEvent>, StoreError> {
        let mut pending: Vec<SyncEvent> = self
            .data
            .iter()
            .filter(|entry| {
                let event = entry.value();
                event.status == SyncStatus::Pending && event.target_platform == target
            })
            .map(|entry| entry.value().clone())
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        pending.truncate(limit);
        Ok(pending)
    }

    async fn mark_success(
        &self,
        id: Uuid,
        processed_by: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut entry = self
            .data
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("event", id.to_string()))?;
        if entry.status != SyncStatus::Pending {
            return Ok(false);
        }
        entry.status = SyncStatus::Success;
        entry.processed_at = Some(at);
        entry.processed_by = Some(processed_by.to_string());
        entry.error = None;
        Ok(true)
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut entry = self
            .data
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("event", id.to_string()))?;
        if entry.status != SyncStatus::Pending {
            return Ok(false);
        }
        entry.status = SyncStatus::Failed;
        entry.processed_at = Some(at);
        entry.error = Some(error.to_string());
        Ok(true)
    }

    async fn recent_for_user(
        &self,
        user_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<SyncEvent>, StoreError> {
        let mut events: Vec<SyncEvent> = self
            .data
            .iter()
            .filter(|entry| {
                let event = entry.value();
                event.user_id == user_id && event.created_at >= cutoff
            })
            .map(|entry| entry.value().clone())
            .collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(events)
    }

    async fn failed_for_user(
        &self,
        user_id: &str,
        target: Platform,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<SyncEvent>, StoreError> {
        let mut events: Vec<SyncEvent> = self
            .data
            .iter()
            .filter(|entry| {
                let event = entry.value();
                event.user_id == user_id
                    && event.status == SyncStatus::Failed
                    && event.target_platform == target
                    && event.created_at >= cutoff
            })
            .map(|entry| entry.value().clone())
            .collect();
        events.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(events)
    }
}

// =============================================================================
// Quests
// =============================================================================

type QuestKey = (String, String, String);

#[derive(Default)]
pub struct MemoryQuestStore {
    data: DashMap<QuestKey, QuestProgress>,
}

impl MemoryQuestStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(user_id: &str, quest_id: &str, period_key: &str) -> QuestKey {
        (
            user_id.to_string(),
            quest_id.to_string(),
            period_key.to_string(),
        )
    }
}

#[async_trait]
impl QuestStore for MemoryQuestStore {
    async fn increment(
        &self,
        user_id: &str,
        quest_id: &str,
        period_key: &str,
        by: u64,
        now: DateTime<Utc>,
    ) -> Result<QuestProgress, StoreError> {
        let mut row = self
            .data
            .entry(Self::key(user_id, quest_id, period_key))
            .or_insert_with(|| QuestProgress::new(user_id, quest_id, period_key, now));
        row.progress = row.progress.saturating_add(by);
        row.updated_at = now;
        Ok(row.clone())
    }

    async fn get(
        &self,
        user_id: &str,
        quest_id: &str,
        period_key: &str,
    ) -> Result<Option<QuestProgress>, StoreError> {
        Ok(self
            .data
            .get(&Self::key(user_id, quest_id, period_key))
            .map(|entry| entry.value().clone()))
    }

    async fn mark_completed(
        &self,
        user_id: &str,
        quest_id: &str,
        period_key: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        match self.data.get_mut(&Self::key(user_id, quest_id, period_key)) {
            Some(mut row) => {
                if row.completed {
                    return Ok(false);
                }
                row.completed = true;
                row.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// =============================================================================
// Reputation
// =============================================================================

#[derive(Default)]
pub struct MemoryReputationStore {
    data: DashMap<String, ReputationRecord>,
}

impl MemoryReputationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReputationStore for MemoryReputationStore {
    async fn get(&self, subject: &str) -> Result<Option<ReputationRecord>, StoreError> {
        Ok(self.data.get(subject).map(|entry| entry.value().clone()))
    }

    async fn record(
        &self,
        subject: &str,
        violation: Violation,
        hard_block: bool,
    ) -> Result<ReputationRecord, StoreError> {
        let mut record = self
            .data
            .entry(subject.to_string())
            .or_insert_with(|| ReputationRecord::new(subject, violation.at));
        record.register(violation, hard_block);
        Ok(record.clone())
    }
}

// =============================================================================
// Activity
// =============================================================================

#[derive(Default)]
pub struct MemoryActivityStore {
    data: RwLock<Vec<ActivityRecord>>,
}

impl MemoryActivityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ActivityStore for MemoryActivityStore {
    async fn append(&self, record: &ActivityRecord) -> Result<(), StoreError> {
        self.data
            .write()
            .expect("activity store lock poisoned")
            .push(record.clone());
        Ok(())
    }

    async fn recent_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ActivityRecord>, StoreError> {
        let data = self.data.read().expect("activity store lock poisoned");
        let mut records: Vec<ActivityRecord> = data
            .iter()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SyncEventType, ViolationKind};
    use serde_json::json;

    #[tokio::test]
    async fn test_profile_save_and_load() {
        let store = MemoryProfileStore::new();
        let profile = UserProfile::new("u1", Utc::now());

        let v1 = store.save(&profile, SyncVersion::NONE).await.unwrap();
        assert_eq!(v1, SyncVersion::new(1));

        let (loaded, version) = store.load("u1").await.unwrap().unwrap();
        assert_eq!(loaded.user_id, "u1");
        assert_eq!(loaded.sync_version, 1);
        assert_eq!(version, v1);
    }

    #[tokio::test]
    async fn test_profile_conflict_detection() {
        let store = MemoryProfileStore::new();
        let profile = UserProfile::new("u1", Utc::now());

        store.save(&profile, SyncVersion::NONE).await.unwrap();

        // Stale version loses.
        let result = store.save(&profile, SyncVersion::NONE).await;
        assert!(matches!(result, Err(StoreError::Conflict { .. })));

        // Fresh version wins.
        let result = store.save(&profile, SyncVersion::new(1)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_top_by_xp_orders_and_truncates() {
        let store = MemoryProfileStore::new();
        for (user, xp) in [("a", 300u64), ("b", 100), ("c", 500)] {
            let mut profile = UserProfile::new(user, Utc::now());
            profile.xp = xp;
            store.save(&profile, SyncVersion::NONE).await.unwrap();
        }

        let top = store.top_by_xp(2).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].user_id, "c");
        assert_eq!(top[1].user_id, "a");
    }

    #[tokio::test]
    async fn test_event_mark_success_is_one_shot() {
        let store = MemoryEventStore::new();
        let event = SyncEvent::new(
            SyncEventType::WebsiteAnimeWatch,
            "u1",
            json!({"animeId": "aot"}),
            Utc::now(),
        );
        store.append(&event).await.unwrap();

        assert!(store.mark_success(event.id, "worker-1", Utc::now()).await.unwrap());
        assert!(!store.mark_success(event.id, "worker-2", Utc::now()).await.unwrap());

        let stored = store.get(event.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SyncStatus::Success);
        assert_eq!(stored.processed_by.as_deref(), Some("worker-1"));
    }

    #[tokio::test]
    async fn test_pending_for_target_is_oldest_first() {
        let store = MemoryEventStore::new();
        let base = Utc::now();
        let older = SyncEvent::new(
            SyncEventType::WebsiteAnimeWatch,
            "u1",
            json!({}),
            base - chrono::Duration::seconds(10),
        );
        let newer = SyncEvent::new(SyncEventType::WebsiteMangaRead, "u1", json!({}), base);
        store.append(&newer).await.unwrap();
        store.append(&older).await.unwrap();

        let pending = store.pending_for_target(Platform::Discord, 10).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, older.id);
    }

    #[tokio::test]
    async fn test_quest_increment_accumulates() {
        let store = MemoryQuestStore::new();
        let now = Utc::now();

        let row = store.increment("u1", "daily-watch", "2024-03-01", 1, now).await.unwrap();
        assert_eq!(row.progress, 1);

        let row = store.increment("u1", "daily-watch", "2024-03-01", 2, now).await.unwrap();
        assert_eq!(row.progress, 3);

        // Different period is a separate row.
        let row = store.increment("u1", "daily-watch", "2024-03-02", 1, now).await.unwrap();
        assert_eq!(row.progress, 1);
    }

    #[tokio::test]
    async fn test_quest_mark_completed_fires_once() {
        let store = MemoryQuestStore::new();
        let now = Utc::now();
        store.increment("u1", "daily-watch", "2024-03-01", 3, now).await.unwrap();

        assert!(store.mark_completed("u1", "daily-watch", "2024-03-01", now).await.unwrap());
        assert!(!store.mark_completed("u1", "daily-watch", "2024-03-01", now).await.unwrap());
    }

    #[tokio::test]
    async fn test_reputation_record_escalates() {
        let store = MemoryReputationStore::new();
        let subject = ReputationRecord::user_subject("u1");

        for _ in 0..2 {
            store
                .record(
                    &subject,
                    Violation {
                        event_id: None,
                        kind: ViolationKind::RapidEvents,
                        detail: "burst".into(),
                        at: Utc::now(),
                    },
                    false,
                )
                .await
                .unwrap();
        }

        let record = store.get(&subject).await.unwrap().unwrap();
        assert_eq!(record.violation_count(), 2);
        assert_eq!(record.level, crate::models::ReputationLevel::Suspicious);
    }

    #[tokio::test]
    async fn test_activity_recent_is_newest_first() {
        let store = MemoryActivityStore::new();
        let base = Utc::now();
        for i in 0..3 {
            let record = ActivityRecord::new(
                "u1",
                "xp_awarded",
                Platform::Discord,
                json!({"i": i}),
                base + chrono::Duration::seconds(i),
            );
            store.append(&record).await.unwrap();
        }

        let records = store.recent_for_user("u1", 2).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].metadata["i"], 2);
    }
}
