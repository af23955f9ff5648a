//! Abuse detection for incoming sync events.
//!
//! Every action event passes through [`SecurityValidator::validate`] before
//! any profile mutation. The validator reads one window of the user's
//! recent events and checks burst rate, duplicate payloads, claimed XP
//! bounds, consumption velocity, and content replays. Findings map to
//! [`ViolationKind`]s that feed the persistent reputation ladder.
//!
//! Only critical risk (or an already-blocked subject) rejects the event.
//! Lower-risk findings let the event through but still record violations,
//! so repeat offenders escalate toward `blocked` instead of being bounced
//! one event at a time. The validator never mutates profiles; it only
//! reads history and appends violations.

use std::net::IpAddr;
use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::EngineError;
use crate::models::{ReputationLevel, ReputationRecord, SyncEvent, Violation, ViolationKind};
use crate::store::{EventStore, ReputationStore};

/// Severity of a single finding. The report's overall risk is the maximum
/// across findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thresholds for the history checks.
#[derive(Debug, Clone, Copy)]
pub struct SecurityConfig {
    /// Events beyond this many inside the burst window flag `RapidEvents`.
    pub max_events_per_burst: u32,
    pub burst_window_secs: u64,
    /// This many byte-identical payloads inside the window flag
    /// `DuplicateEvent`. The current event counts.
    pub max_identical_events: u32,
    pub identical_window_secs: u64,
    /// Claimed XP above this on a single event flags `ExcessiveXp`.
    pub max_xp_per_event: i64,
    /// Claimed XP beyond this across the trailing hour flags
    /// `HourlyXpCeiling`.
    pub max_xp_per_hour: i64,
    /// Consumption events beyond this many per minute flag
    /// `ImpossibleProgress`.
    pub max_consumption_per_minute: u32,
    /// A repeat of the same content key inside this gap flags
    /// `DuplicateContent`.
    pub min_content_gap_secs: u64,
    /// Subjects with this many violations in the trailing week have every
    /// new finding escalated to high risk.
    pub weekly_violation_threshold: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_events_per_burst: 10,
            burst_window_secs: 5,
            max_identical_events: 3,
            identical_window_secs: 60,
            max_xp_per_event: 500,
            max_xp_per_hour: 2000,
            max_consumption_per_minute: 5,
            min_content_gap_secs: 30,
            weekly_violation_threshold: 5,
        }
    }
}

/// Request-level context the event itself does not carry.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationContext {
    pub client_ip: Option<IpAddr>,
}

/// One tripped check.
#[derive(Debug, Clone)]
pub struct Finding {
    pub kind: ViolationKind,
    pub risk: RiskLevel,
    pub detail: String,
}

/// Outcome of validating one event.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    /// Highest risk across findings and reputation floors.
    pub risk: RiskLevel,
    pub findings: Vec<Finding>,
    /// Remediation hints for the operator log (`xp_rate_limit`,
    /// `enhanced_monitoring`).
    pub actions: Vec<&'static str>,
    /// The subject was already blocked; no findings are recorded for the
    /// rejection itself.
    pub blocked: bool,
}

impl ValidationReport {
    /// Whether the event may proceed to its handler. Only critical risk or
    /// an already-blocked subject rejects.
    pub fn is_valid(&self) -> bool {
        !self.blocked && self.risk < RiskLevel::Critical
    }

    /// Whether any check tripped. Flagged-but-valid events proceed, with
    /// their violations recorded.
    pub fn is_flagged(&self) -> bool {
        !self.findings.is_empty()
    }

    pub fn issues(&self) -> Vec<String> {
        if self.blocked {
            return vec!["subject is blocked".to_string()];
        }
        self.findings.iter().map(|f| f.detail.clone()).collect()
    }
}

/// Whether a violation kind blocks immediately, skipping the count ladder.
pub fn is_hard_block(kind: ViolationKind) -> bool {
    matches!(kind, ViolationKind::InvalidApiKey)
}

pub struct SecurityValidator {
    config: SecurityConfig,
    events: Arc<dyn EventStore>,
    reputation: Arc<dyn ReputationStore>,
    clock: Arc<dyn Clock>,
}

impl SecurityValidator {
    pub fn new(
        config: SecurityConfig,
        events: Arc<dyn EventStore>,
        reputation: Arc<dyn ReputationStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            events,
            reputation,
            clock,
        }
    }

    /// Run every check against one event.
    ///
    /// The event is expected to already be appended, so the history window
    /// includes it. Store failures propagate; findings do not.
    pub async fn validate(
        &self,
        event: &SyncEvent,
        ctx: &ValidationContext,
    ) -> Result<ValidationReport, EngineError> {
        let now = self.clock.now();

        let user_record = self
            .reputation
            .get(&ReputationRecord::user_subject(&event.user_id))
            .await?;
        let ip_record = match ctx.client_ip {
            Some(ip) => self.reputation.get(&ReputationRecord::ip_subject(ip)).await?,
            None => None,
        };

        if user_record.as_ref().is_some_and(|r| r.is_blocked())
            || ip_record.as_ref().is_some_and(|r| r.is_blocked())
        {
            debug!(user_id = %event.user_id, "rejecting event from blocked subject");
            return Ok(ValidationReport {
                risk: RiskLevel::Critical,
                findings: Vec::new(),
                actions: Vec::new(),
                blocked: true,
            });
        }

        let recent = self
            .events
            .recent_for_user(&event.user_id, now - Duration::hours(1))
            .await?;
        let mut findings = Vec::new();
        let mut actions = Vec::new();

        let burst_cutoff = now - Duration::seconds(self.config.burst_window_secs as i64);
        let burst_count = recent.iter().filter(|e| e.created_at >= burst_cutoff).count() as u32;
        if burst_count > self.config.max_events_per_burst {
            findings.push(Finding {
                kind: ViolationKind::RapidEvents,
                risk: RiskLevel::High,
                detail: format!(
                    "{burst_count} events within {}s",
                    self.config.burst_window_secs
                ),
            });
        }

        let identical_cutoff = now - Duration::seconds(self.config.identical_window_secs as i64);
        let fingerprint = event.fingerprint();
        let identical_count = recent
            .iter()
            .filter(|e| e.created_at >= identical_cutoff && e.fingerprint() == fingerprint)
            .count() as u32;
        if identical_count >= self.config.max_identical_events {
            findings.push(Finding {
                kind: ViolationKind::DuplicateEvent,
                risk: RiskLevel::Medium,
                detail: format!(
                    "{identical_count} identical events within {}s",
                    self.config.identical_window_secs
                ),
            });
        }

        if let Some(claimed) = event.claimed_xp() {
            if claimed < 0 {
                findings.push(Finding {
                    kind: ViolationKind::NegativeXp,
                    risk: RiskLevel::Critical,
                    detail: format!("negative XP value {claimed}"),
                });
            } else if claimed > self.config.max_xp_per_event {
                findings.push(Finding {
                    kind: ViolationKind::ExcessiveXp,
                    risk: RiskLevel::High,
                    detail: format!(
                        "claimed {claimed} XP, per-event ceiling is {}",
                        self.config.max_xp_per_event
                    ),
                });
            }

            let hourly: i64 = recent.iter().filter_map(|e| e.claimed_xp()).filter(|xp| *xp > 0).sum();
            if hourly > self.config.max_xp_per_hour {
                findings.push(Finding {
                    kind: ViolationKind::HourlyXpCeiling,
                    risk: RiskLevel::High,
                    detail: format!(
                        "claimed {hourly} XP within an hour, ceiling is {}",
                        self.config.max_xp_per_hour
                    ),
                });
                actions.push("xp_rate_limit");
            }
        }

        if event.event_type.is_consumption() {
            let minute_cutoff = now - Duration::seconds(60);
            let consumption_count = recent
                .iter()
                .filter(|e| e.created_at >= minute_cutoff && e.event_type.is_consumption())
                .count() as u32;
            if consumption_count > self.config.max_consumption_per_minute {
                findings.push(Finding {
                    kind: ViolationKind::ImpossibleProgress,
                    risk: RiskLevel::High,
                    detail: format!("{consumption_count} consumption events within a minute"),
                });
            }

            if let Some(content_key) = event.content_key() {
                let gap_cutoff = now - Duration::seconds(self.config.min_content_gap_secs as i64);
                let replayed = recent.iter().any(|e| {
                    e.id != event.id
                        && e.created_at >= gap_cutoff
                        && e.content_key().as_deref() == Some(content_key.as_str())
                });
                if replayed {
                    findings.push(Finding {
                        kind: ViolationKind::DuplicateContent,
                        risk: RiskLevel::Medium,
                        detail: format!(
                            "{content_key} repeated within {}s",
                            self.config.min_content_gap_secs
                        ),
                    });
                }
            }
        }

        let mut risk = findings.iter().map(|f| f.risk).max().unwrap_or(RiskLevel::Low);

        // Reputation adjustments: monitored subjects never score below
        // medium, and repeat offenders get no benefit of the doubt.
        if let Some(record) = user_record {
            if record.level >= ReputationLevel::Monitored {
                risk = risk.max(RiskLevel::Medium);
            }
            if !findings.is_empty()
                && record.violations_since(now - Duration::days(7)) as u32
                    >= self.config.weekly_violation_threshold
            {
                risk = risk.max(RiskLevel::High);
                actions.push("enhanced_monitoring");
            }
        }

        Ok(ValidationReport {
            risk,
            findings,
            actions,
            blocked: false,
        })
    }

    /// Record every finding against the user's reputation. Idempotent per
    /// `(event, kind)` pair, so redelivered events cannot double-count.
    /// Returns the reputation level after recording.
    pub async fn record_findings(
        &self,
        event: &SyncEvent,
        report: &ValidationReport,
    ) -> Result<ReputationLevel, EngineError> {
        let subject = ReputationRecord::user_subject(&event.user_id);
        let mut level = ReputationLevel::Clean;
        for finding in &report.findings {
            let record = self
                .record_violation(&subject, finding.kind, &finding.detail, Some(event.id))
                .await?;
            level = record.level;
        }
        Ok(level)
    }

    /// Append one violation to a subject. Hard-block kinds jump straight to
    /// `Blocked`.
    pub async fn record_violation(
        &self,
        subject: &str,
        kind: ViolationKind,
        detail: &str,
        event_id: Option<Uuid>,
    ) -> Result<ReputationRecord, EngineError> {
        let violation = Violation {
            event_id,
            kind,
            detail: detail.to_string(),
            at: self.clock.now(),
        };
        let record = self
            .reputation
            .record(subject, violation, is_hard_block(kind))
            .await?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::SyncEventType;
    use crate::store::memory::{MemoryEventStore, MemoryReputationStore};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    struct Fixture {
        clock: Arc<ManualClock>,
        events: Arc<MemoryEventStore>,
        reputation: Arc<MemoryReputationStore>,
        validator: SecurityValidator,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        ));
        let events = Arc::new(MemoryEventStore::new());
        let reputation = Arc::new(MemoryReputationStore::new());
        let validator = SecurityValidator::new(
            SecurityConfig::default(),
            events.clone(),
            reputation.clone(),
            clock.clone(),
        );
        Fixture {
            clock,
            events,
            reputation,
            validator,
        }
    }

    async fn appended(fx: &Fixture, event_type: SyncEventType, data: serde_json::Value) -> SyncEvent {
        let event = SyncEvent::new(event_type, "u1", data, fx.clock.now());
        fx.events.append(&event).await.unwrap();
        event
    }

    #[tokio::test]
    async fn test_clean_event_passes() {
        let fx = fixture();
        let event = appended(&fx, SyncEventType::WebsiteAnimeWatch, json!({"animeId": "aot"})).await;

        let report = fx.validator.validate(&event, &ValidationContext::default()).await.unwrap();
        assert!(report.is_valid());
        assert!(!report.is_flagged());
        assert_eq!(report.risk, RiskLevel::Low);
    }

    #[tokio::test]
    async fn test_negative_xp_is_critical_and_invalid() {
        let fx = fixture();
        let event = appended(&fx, SyncEventType::WebsiteXpGain, json!({"xpGained": -50})).await;

        let report = fx.validator.validate(&event, &ValidationContext::default()).await.unwrap();
        assert!(!report.is_valid());
        assert_eq!(report.risk, RiskLevel::Critical);
        assert_eq!(report.findings[0].kind, ViolationKind::NegativeXp);
    }

    #[tokio::test]
    async fn test_excessive_xp_flags_but_processes() {
        let fx = fixture();
        let event = appended(&fx, SyncEventType::WebsiteXpGain, json!({"xpGained": 501})).await;

        let report = fx.validator.validate(&event, &ValidationContext::default()).await.unwrap();
        assert!(report.is_valid());
        assert!(report.is_flagged());
        assert_eq!(report.risk, RiskLevel::High);
        assert_eq!(report.findings[0].kind, ViolationKind::ExcessiveXp);
    }

    #[tokio::test]
    async fn test_hourly_ceiling_names_remediation() {
        let fx = fixture();
        for i in 0..4 {
            appended(&fx, SyncEventType::WebsiteXpGain, json!({"xpGained": 450, "i": i})).await;
            fx.clock.advance(Duration::seconds(120));
        }
        let event = appended(&fx, SyncEventType::WebsiteXpGain, json!({"xpGained": 450, "i": 4})).await;

        let report = fx.validator.validate(&event, &ValidationContext::default()).await.unwrap();
        assert!(report.findings.iter().any(|f| f.kind == ViolationKind::HourlyXpCeiling));
        assert!(report.actions.contains(&"xp_rate_limit"));
    }

    #[tokio::test]
    async fn test_burst_flags_rapid_events() {
        let fx = fixture();
        for i in 0..10 {
            appended(&fx, SyncEventType::WebsiteXpGain, json!({"xpGained": 10, "i": i})).await;
        }
        let event = appended(&fx, SyncEventType::WebsiteXpGain, json!({"xpGained": 10, "i": 10})).await;

        let report = fx.validator.validate(&event, &ValidationContext::default()).await.unwrap();
        assert!(report.findings.iter().any(|f| f.kind == ViolationKind::RapidEvents));
        assert_eq!(report.risk, RiskLevel::High);
        assert!(report.is_valid());
    }

    #[tokio::test]
    async fn test_third_identical_event_flags_duplicate() {
        let fx = fixture();
        let data = json!({"xpGained": 10});
        appended(&fx, SyncEventType::WebsiteXpGain, data.clone()).await;
        fx.clock.advance(Duration::seconds(10));
        appended(&fx, SyncEventType::WebsiteXpGain, data.clone()).await;
        fx.clock.advance(Duration::seconds(10));
        let event = appended(&fx, SyncEventType::WebsiteXpGain, data).await;

        let report = fx.validator.validate(&event, &ValidationContext::default()).await.unwrap();
        assert!(report.findings.iter().any(|f| f.kind == ViolationKind::DuplicateEvent));
        assert_eq!(report.risk, RiskLevel::Medium);
    }

    #[tokio::test]
    async fn test_content_replay_within_gap_flags() {
        let fx = fixture();
        appended(&fx, SyncEventType::WebsiteAnimeWatch, json!({"animeId": "aot", "episode": 1})).await;
        fx.clock.advance(Duration::seconds(10));
        let event =
            appended(&fx, SyncEventType::WebsiteAnimeWatch, json!({"animeId": "aot", "episode": 2})).await;

        let report = fx.validator.validate(&event, &ValidationContext::default()).await.unwrap();
        assert!(report.findings.iter().any(|f| f.kind == ViolationKind::DuplicateContent));
        assert!(report.is_valid());
    }

    #[tokio::test]
    async fn test_content_replay_after_gap_passes() {
        let fx = fixture();
        appended(&fx, SyncEventType::WebsiteAnimeWatch, json!({"animeId": "aot", "episode": 1})).await;
        fx.clock.advance(Duration::seconds(31));
        let event =
            appended(&fx, SyncEventType::WebsiteAnimeWatch, json!({"animeId": "aot", "episode": 2})).await;

        let report = fx.validator.validate(&event, &ValidationContext::default()).await.unwrap();
        assert!(report.is_valid());
        assert!(!report.is_flagged());
    }

    #[tokio::test]
    async fn test_blocked_subject_short_circuits() {
        let fx = fixture();
        fx.reputation
            .record(
                &ReputationRecord::user_subject("u1"),
                Violation {
                    event_id: None,
                    kind: ViolationKind::InvalidApiKey,
                    detail: "forged key".into(),
                    at: fx.clock.now(),
                },
                true,
            )
            .await
            .unwrap();

        let event = appended(&fx, SyncEventType::WebsiteAnimeWatch, json!({"animeId": "aot"})).await;
        let report = fx.validator.validate(&event, &ValidationContext::default()).await.unwrap();
        assert!(report.blocked);
        assert!(!report.is_valid());
        assert_eq!(report.risk, RiskLevel::Critical);
        assert_eq!(report.issues(), vec!["subject is blocked".to_string()]);
    }

    #[tokio::test]
    async fn test_monitored_subject_floors_risk_at_medium() {
        let fx = fixture();
        let subject = ReputationRecord::user_subject("u1");
        for i in 0..5 {
            fx.validator
                .record_violation(&subject, ViolationKind::RateLimit, &format!("hit {i}"), None)
                .await
                .unwrap();
        }

        let event = appended(&fx, SyncEventType::WebsiteAnimeWatch, json!({"animeId": "aot"})).await;
        let report = fx.validator.validate(&event, &ValidationContext::default()).await.unwrap();
        assert!(report.is_valid());
        assert!(!report.is_flagged());
        assert_eq!(report.risk, RiskLevel::Medium);
    }

    #[tokio::test]
    async fn test_record_findings_is_idempotent_per_event() {
        let fx = fixture();
        let event = appended(&fx, SyncEventType::WebsiteXpGain, json!({"xpGained": -50})).await;
        let report = fx.validator.validate(&event, &ValidationContext::default()).await.unwrap();

        fx.validator.record_findings(&event, &report).await.unwrap();
        fx.validator.record_findings(&event, &report).await.unwrap();

        let record = fx
            .reputation
            .get(&ReputationRecord::user_subject("u1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.violation_count(), 1);
    }

    #[tokio::test]
    async fn test_weekly_repeat_offender_escalates_risk() {
        let fx = fixture();
        let subject = ReputationRecord::user_subject("u1");
        for i in 0..5 {
            fx.validator
                .record_violation(&subject, ViolationKind::RateLimit, &format!("hit {i}"), None)
                .await
                .unwrap();
        }

        // A finding that would score medium on its own.
        let data = json!({"xpGained": 10});
        appended(&fx, SyncEventType::WebsiteXpGain, data.clone()).await;
        appended(&fx, SyncEventType::WebsiteXpGain, data.clone()).await;
        let event = appended(&fx, SyncEventType::WebsiteXpGain, data).await;

        let report = fx.validator.validate(&event, &ValidationContext::default()).await.unwrap();
        assert!(report.is_valid());
        assert!(report.is_flagged());
        assert_eq!(report.risk, RiskLevel::High);
        assert!(report.actions.contains(&"enhanced_monitoring"));
    }
}
