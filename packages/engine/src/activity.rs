//! Append-only activity logging.
//!
//! One row per externally visible state change, with the same fact mirrored
//! to structured tracing. Current action names: `xp_awarded`, `level_up`,
//! `badge_unlocked`, `streak_updated`, `quest_progress`, `quest_completed`,
//! `daily_login`, `account_linked`, `account_unlinked`, `force_sync`,
//! `sync_event_created`, `sync_event_processed`, `sync_event_failed`,
//! `security_rejected`, `rate_limited`.
//!
//! Reporting pipelines consume these rows downstream; the engine itself
//! never reads them back except for the per-user activity feed.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::models::{ActivityRecord, Platform};
use crate::store::{ActivityStore, StoreError};

#[derive(Clone)]
pub struct ActivityLogger {
    store: Arc<dyn ActivityStore>,
    clock: Arc<dyn Clock>,
}

impl ActivityLogger {
    pub fn new(store: Arc<dyn ActivityStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Append one activity row.
    ///
    /// Write failures are logged and swallowed: the log must never fail the
    /// mutation it records.
    pub async fn record(&self, user_id: &str, action: &str, platform: Platform, metadata: Value) {
        let record = ActivityRecord::new(user_id, action, platform, metadata, self.clock.now());
        debug!(user_id, action, platform = %platform, "activity");
        if let Err(err) = self.store.append(&record).await {
            warn!(user_id, action, error = %err, "failed to append activity record");
        }
    }

    /// The per-user feed, newest first.
    pub async fn recent(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ActivityRecord>, StoreError> {
        self.store.recent_for_user(user_id, limit).await
    }
}
