use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Trust tier for a user or IP. Escalates with recorded violations and never
/// de-escalates on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReputationLevel {
    Clean,
    Suspicious,
    Monitored,
    Blocked,
}

impl ReputationLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            ReputationLevel::Clean => "clean",
            ReputationLevel::Suspicious => "suspicious",
            ReputationLevel::Monitored => "monitored",
            ReputationLevel::Blocked => "blocked",
        }
    }

    pub fn from_name(name: &str) -> Option<ReputationLevel> {
        match name {
            "clean" => Some(ReputationLevel::Clean),
            "suspicious" => Some(ReputationLevel::Suspicious),
            "monitored" => Some(ReputationLevel::Monitored),
            "blocked" => Some(ReputationLevel::Blocked),
            _ => None,
        }
    }

    /// Tier implied by a total violation count.
    pub fn for_violation_count(count: usize) -> ReputationLevel {
        match count {
            0..=1 => ReputationLevel::Clean,
            2..=4 => ReputationLevel::Suspicious,
            5..=9 => ReputationLevel::Monitored,
            _ => ReputationLevel::Blocked,
        }
    }
}

impl fmt::Display for ReputationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified cause of a recorded violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    RateLimit,
    RapidEvents,
    DuplicateEvent,
    ExcessiveXp,
    NegativeXp,
    HourlyXpCeiling,
    ImpossibleProgress,
    DuplicateContent,
    InvalidApiKey,
}

impl ViolationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ViolationKind::RateLimit => "rate_limit",
            ViolationKind::RapidEvents => "rapid_events",
            ViolationKind::DuplicateEvent => "duplicate_event",
            ViolationKind::ExcessiveXp => "excessive_xp",
            ViolationKind::NegativeXp => "negative_xp",
            ViolationKind::HourlyXpCeiling => "hourly_xp_ceiling",
            ViolationKind::ImpossibleProgress => "impossible_progress",
            ViolationKind::DuplicateContent => "duplicate_content",
            ViolationKind::InvalidApiKey => "invalid_api_key",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded violation. `event_id` makes the append idempotent under
/// at-least-once delivery: re-validating the same event cannot double-count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<Uuid>,
    pub kind: ViolationKind,
    pub detail: String,
    pub at: DateTime<Utc>,
}

/// Persisted reputation for one subject (user id or IP). Survives restarts
/// and is shared across instances; violations only ever append.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReputationRecord {
    pub subject: String,
    pub level: ReputationLevel,
    #[serde(default)]
    pub violations: Vec<Violation>,
    pub updated_at: DateTime<Utc>,
}

impl ReputationRecord {
    pub fn new(subject: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            subject: subject.into(),
            level: ReputationLevel::Clean,
            violations: Vec::new(),
            updated_at: now,
        }
    }

    /// Subject key for a user id.
    pub fn user_subject(user_id: &str) -> String {
        format!("user:{user_id}")
    }

    /// Subject key for a caller IP.
    pub fn ip_subject(ip: IpAddr) -> String {
        format!("ip:{ip}")
    }

    pub fn violation_count(&self) -> usize {
        self.violations.len()
    }

    pub fn last_violation(&self) -> Option<DateTime<Utc>> {
        self.violations.iter().map(|v| v.at).max()
    }

    pub fn violations_since(&self, cutoff: DateTime<Utc>) -> usize {
        self.violations.iter().filter(|v| v.at >= cutoff).count()
    }

    pub fn is_blocked(&self) -> bool {
        self.level == ReputationLevel::Blocked
    }

    /// Append a violation and re-derive the level. Returns `false` when the
    /// same `(event_id, kind)` pair was already recorded (duplicate
    /// delivery), in which case nothing changes.
    ///
    /// `hard_block` forces the level straight to `Blocked` regardless of
    /// count; the level otherwise ratchets along the count ladder and never
    /// moves down.
    pub fn register(&mut self, violation: Violation, hard_block: bool) -> bool {
        if violation.event_id.is_some()
            && self
                .violations
                .iter()
                .any(|v| v.event_id == violation.event_id && v.kind == violation.kind)
        {
            return false;
        }

        self.updated_at = violation.at;
        self.violations.push(violation);

        let from_count = ReputationLevel::for_violation_count(self.violation_count());
        self.level = self.level.max(from_count);
        if hard_block {
            self.level = ReputationLevel::Blocked;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violation(kind: ViolationKind, event_id: Option<Uuid>) -> Violation {
        Violation {
            event_id,
            kind,
            detail: "test".into(),
            at: Utc::now(),
        }
    }

    #[test]
    fn test_escalation_ladder() {
        let mut record = ReputationRecord::new("user:u1", Utc::now());
        assert_eq!(record.level, ReputationLevel::Clean);

        record.register(violation(ViolationKind::RapidEvents, None), false);
        assert_eq!(record.level, ReputationLevel::Clean);

        record.register(violation(ViolationKind::RapidEvents, None), false);
        assert_eq!(record.level, ReputationLevel::Suspicious);

        for _ in 0..3 {
            record.register(violation(ViolationKind::DuplicateEvent, None), false);
        }
        assert_eq!(record.level, ReputationLevel::Monitored);

        for _ in 0..5 {
            record.register(violation(ViolationKind::ExcessiveXp, None), false);
        }
        assert_eq!(record.level, ReputationLevel::Blocked);
    }

    #[test]
    fn test_hard_block_skips_the_ladder() {
        let mut record = ReputationRecord::new("ip:10.0.0.1", Utc::now());
        record.register(violation(ViolationKind::InvalidApiKey, None), true);
        assert_eq!(record.level, ReputationLevel::Blocked);
        assert_eq!(record.violation_count(), 1);
    }

    #[test]
    fn test_register_is_idempotent_per_event() {
        let mut record = ReputationRecord::new("user:u1", Utc::now());
        let event_id = Some(Uuid::new_v4());

        assert!(record.register(violation(ViolationKind::NegativeXp, event_id), false));
        assert!(!record.register(violation(ViolationKind::NegativeXp, event_id), false));
        assert_eq!(record.violation_count(), 1);

        // Same event, different kind still counts.
        assert!(record.register(violation(ViolationKind::ExcessiveXp, event_id), false));
        assert_eq!(record.violation_count(), 2);
    }

    #[test]
    fn test_level_never_de_escalates() {
        let mut record = ReputationRecord::new("user:u1", Utc::now());
        record.level = ReputationLevel::Monitored;
        record.register(violation(ViolationKind::RateLimit, None), false);
        assert_eq!(record.level, ReputationLevel::Monitored);
    }

    #[test]
    fn test_subject_keys() {
        assert_eq!(ReputationRecord::user_subject("u1"), "user:u1");
        let ip: IpAddr = "192.168.1.9".parse().unwrap();
        assert_eq!(ReputationRecord::ip_subject(ip), "ip:192.168.1.9");
    }
}
