use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::Platform;

/// One append-only audit row describing a profile mutation or a processing
/// outcome worth keeping (rejections, rate limits, sync lifecycle).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    pub id: Uuid,
    pub user_id: String,
    pub action: String,
    pub platform: Platform,
    #[serde(default)]
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl ActivityRecord {
    pub fn new(
        user_id: impl Into<String>,
        action: impl Into<String>,
        platform: Platform,
        metadata: Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            action: action.into(),
            platform,
            metadata,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_activity_record_serializes_camel_case() {
        let record = ActivityRecord::new(
            "u1",
            "xp_awarded",
            Platform::Discord,
            json!({"amount": 55}),
            Utc::now(),
        );
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["userId"], "u1");
        assert_eq!(value["action"], "xp_awarded");
        assert_eq!(value["metadata"]["amount"], 55);
        assert!(value["createdAt"].is_string());
    }
}
