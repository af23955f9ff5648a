//! Persistence for profiles, events, quests, reputation, and activity.
//!
//! # The Contract
//!
//! 1. **Load before mutate.** Callers load the current profile snapshot (or
//!    create a fresh one) together with its version.
//!
//! 2. **Save with the expected version.** If another writer saved first, the
//!    save fails with [`StoreError::Conflict`] and the caller retries with
//!    fresh state. Lost updates cannot happen silently.
//!
//! 3. **Terminal transitions are one-shot.** `mark_success` and `mark_failed`
//!    only move an event out of `pending`; a second delivery of the same
//!    event observes `false` and skips its side effects.
//!
//! Two backends implement the same traits: [`memory`] keeps everything in
//! process (default when no database is configured) and [`postgres`] is the
//! durable, multi-instance backend.

pub mod memory;
pub mod postgres;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    ActivityRecord, Platform, QuestProgress, ReputationRecord, SyncEvent, UserProfile, Violation,
};

// =============================================================================
// Store Error
// =============================================================================

/// Errors from the persistence layer.
///
/// The distinction matters for correct behavior:
/// - [`StoreError::Conflict`] means another writer saved first. Expected
///   under concurrency; retry with fresh state.
/// - [`StoreError::Backend`] means storage failed (timeout, connection).
///   That is a system-level failure and usually transient.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another writer modified the entity since we loaded it.
    #[error("version conflict for {entity} {id}: state was modified concurrently")]
    Conflict { entity: &'static str, id: String },

    /// The entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// A payload could not be encoded or decoded.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Storage backend failed (timeout, connection, constraint).
    #[error("storage backend error: {0}")]
    Backend(#[from] sqlx::Error),
}

impl StoreError {
    pub fn conflict(entity: &'static str, id: impl Into<String>) -> Self {
        StoreError::Conflict {
            entity,
            id: id.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Whether a later retry of the same operation could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Backend(_))
    }
}

// =============================================================================
// Sync Version
// =============================================================================

/// Profile version for optimistic concurrency control.
///
/// Each save must provide the expected version. If the stored version does
/// not match, the save fails with [`StoreError::Conflict`].
///
/// [`SyncVersion::NONE`] marks a profile that has never been saved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SyncVersion(pub u64);

impl SyncVersion {
    /// Sentinel for a profile that has never been saved.
    pub const NONE: SyncVersion = SyncVersion(0);

    pub fn new(value: u64) -> Self {
        SyncVersion(value)
    }

    /// The version a successful save would advance to.
    pub fn next(self) -> Self {
        SyncVersion(self.0.saturating_add(1))
    }

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SyncVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "NONE")
        } else {
            write!(f, "v{}", self.0)
        }
    }
}

// =============================================================================
// Profile Store
// =============================================================================

/// Persists user profiles with optimistic concurrency control.
///
/// If two workers try to save the same profile, one succeeds and one gets
/// [`StoreError::Conflict`]. Implementations stamp the new version into the
/// persisted profile's `sync_version` field on every successful save.
#[async_trait]
pub trait ProfileStore: Send + Sync + 'static {
    /// Load a profile and its current version.
    ///
    /// Returns `None` if the profile has never been saved.
    async fn load(&self, user_id: &str) -> Result<Option<(UserProfile, SyncVersion)>, StoreError>;

    /// Save a profile, expecting `expected` to still be the stored version.
    /// For brand-new profiles, pass [`SyncVersion::NONE`].
    ///
    /// Returns the new version on success.
    async fn save(
        &self,
        profile: &UserProfile,
        expected: SyncVersion,
    ) -> Result<SyncVersion, StoreError>;

    /// Top profiles by XP, descending. Ties break by user id for a stable
    /// order.
    async fn top_by_xp(&self, limit: usize) -> Result<Vec<UserProfile>, StoreError>;

    /// Cheap connectivity probe for health checks.
    async fn ping(&self) -> Result<(), StoreError>;
}

// =============================================================================
// Event Store
// =============================================================================

/// Persists sync events and their status transitions.
#[async_trait]
pub trait EventStore: Send + Sync + 'static {
    /// Append a new event. Fails on duplicate id.
    async fn append(&self, event: &SyncEvent) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<SyncEvent>, StoreError>;

    /// Pending events for one platform, oldest first. Read-only: the status
    /// stays `pending` until a `mark_*` call wins the transition.
    async fn pending_for_target(
        &self,
        target: Platform,
        limit: usize,
    ) -> Result<Vec<SyncEvent>, StoreError>;

    /// Transition `pending -> success`. Returns `false` when the event was
    /// already terminal (duplicate delivery).
    async fn mark_success(
        &self,
        id: Uuid,
        processed_by: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Transition `pending -> failed`, recording the error. Returns `false`
    /// when the event was already terminal.
    async fn mark_failed(&self, id: Uuid, error: &str, at: DateTime<Utc>)
        -> Result<bool, StoreError>;

    /// Events created by a user since `cutoff`, newest first, any status.
    async fn recent_for_user(
        &self,
        user_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<SyncEvent>, StoreError>;

    /// Failed events for a user aimed at one platform since `cutoff`,
    /// oldest first. Feeds force-sync repair.
    async fn failed_for_user(
        &self,
        user_id: &str,
        target: Platform,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<SyncEvent>, StoreError>;
}

// =============================================================================
// Quest Store
// =============================================================================

/// Persists per-period quest progress.
///
/// `increment` is atomic per `(user, quest, period)` row so concurrent
/// workers cannot lose counts, and `mark_completed` fires at most once per
/// row so rewards cannot double-grant.
#[async_trait]
pub trait QuestStore: Send + Sync + 'static {
    /// Add `by` to the progress row, creating it at zero first if needed.
    /// Returns the row after the increment.
    async fn increment(
        &self,
        user_id: &str,
        quest_id: &str,
        period_key: &str,
        by: u64,
        now: DateTime<Utc>,
    ) -> Result<QuestProgress, StoreError>;

    async fn get(
        &self,
        user_id: &str,
        quest_id: &str,
        period_key: &str,
    ) -> Result<Option<QuestProgress>, StoreError>;

    /// Flip `completed` from false to true. Returns `true` only for the
    /// caller that performed the flip.
    async fn mark_completed(
        &self,
        user_id: &str,
        quest_id: &str,
        period_key: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
}

// =============================================================================
// Reputation Store
// =============================================================================

/// Persists reputation records keyed by subject (`user:<id>` or `ip:<addr>`).
#[async_trait]
pub trait ReputationStore: Send + Sync + 'static {
    async fn get(&self, subject: &str) -> Result<Option<ReputationRecord>, StoreError>;

    /// Append a violation to the subject's record (creating it if new) and
    /// return the updated record. Implementations apply
    /// [`ReputationRecord::register`] under a write lock or row lock so
    /// concurrent violations cannot lose each other.
    async fn record(
        &self,
        subject: &str,
        violation: Violation,
        hard_block: bool,
    ) -> Result<ReputationRecord, StoreError>;
}

// =============================================================================
// Activity Store
// =============================================================================

/// Append-only audit log.
#[async_trait]
pub trait ActivityStore: Send + Sync + 'static {
    async fn append(&self, record: &ActivityRecord) -> Result<(), StoreError>;

    /// Most recent records for a user, newest first.
    async fn recent_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ActivityRecord>, StoreError>;
}

// =============================================================================
// Store Bundle
// =============================================================================

/// Every store the engine needs, behind trait objects so the backend is a
/// startup decision.
#[derive(Clone)]
pub struct Stores {
    pub profiles: Arc<dyn ProfileStore>,
    pub events: Arc<dyn EventStore>,
    pub quests: Arc<dyn QuestStore>,
    pub reputation: Arc<dyn ReputationStore>,
    pub activity: Arc<dyn ActivityStore>,
}

impl Stores {
    /// In-process backend. State is lost on restart.
    pub fn in_memory() -> Self {
        Self {
            profiles: Arc::new(memory::MemoryProfileStore::new()),
            events: Arc::new(memory::MemoryEventStore::new()),
            quests: Arc::new(memory::MemoryQuestStore::new()),
            reputation: Arc::new(memory::MemoryReputationStore::new()),
            activity: Arc::new(memory::MemoryActivityStore::new()),
        }
    }

    /// Durable backend sharing one connection pool.
    pub fn postgres(pool: sqlx::PgPool) -> Self {
        Self {
            profiles: Arc::new(postgres::PgProfileStore::new(pool.clone())),
            events: Arc::new(postgres::PgEventStore::new(pool.clone())),
            quests: Arc::new(postgres::PgQuestStore::new(pool.clone())),
            reputation: Arc::new(postgres::PgReputationStore::new(pool.clone())),
            activity: Arc::new(postgres::PgActivityStore::new(pool)),
        }
    }
}
