//! Keyed rate limiting for sync traffic.
//!
//! Sliding windows per `(rate key, subject)` pair: each entry keeps the
//! timestamps still inside the trailing window, so the cap holds over any
//! rolling interval, not just aligned buckets. Unlike a throttle that waits
//! for capacity, this limiter answers immediately: the caller either
//! proceeds or records the rejection. High-severity rules feed the
//! reputation ladder when exceeded.
//!
//! Windows live in process. Each instance enforces its own budget, so with
//! N instances the effective ceiling is N times the configured rule. The
//! persistent reputation layer backstops anything that slips through.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::clock::Clock;

/// How strongly an exceeded rule counts against the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateSeverity {
    Low,
    Medium,
    High,
}

/// One rule: at most `max_events` per `window_secs`, per subject.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateRule {
    pub max_events: u32,
    pub window_secs: u64,
    pub severity: RateSeverity,
}

impl RateRule {
    pub const fn new(max_events: u32, window_secs: u64, severity: RateSeverity) -> Self {
        Self {
            max_events,
            window_secs,
            severity,
        }
    }

    fn window(&self) -> Duration {
        Duration::seconds(self.window_secs as i64)
    }
}

/// Rate rules keyed by action, with a fallback for anything unlisted.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub rules: HashMap<String, RateRule>,
    pub default_rule: RateRule,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let mut rules = HashMap::new();
        rules.insert("webhook_ingest".into(), RateRule::new(60, 60, RateSeverity::High));
        rules.insert("account_link".into(), RateRule::new(5, 3600, RateSeverity::High));
        rules.insert("xp_award".into(), RateRule::new(30, 60, RateSeverity::Medium));
        rules.insert("badge_unlock".into(), RateRule::new(20, 60, RateSeverity::Medium));
        rules.insert("quest_progress".into(), RateRule::new(60, 60, RateSeverity::Low));
        rules.insert("force_sync".into(), RateRule::new(2, 600, RateSeverity::Low));
        rules.insert("login".into(), RateRule::new(10, 3600, RateSeverity::Low));
        rules.insert("sync_notify".into(), RateRule::new(120, 60, RateSeverity::Low));
        Self {
            rules,
            default_rule: RateRule::new(60, 60, RateSeverity::Low),
        }
    }
}

impl RateLimitConfig {
    pub fn rule_for(&self, rate_key: &str) -> RateRule {
        self.rules.get(rate_key).copied().unwrap_or(self.default_rule)
    }

    /// Replace or add a rule. Used by tests and deployment overrides.
    pub fn set_rule(&mut self, rate_key: impl Into<String>, rule: RateRule) {
        self.rules.insert(rate_key.into(), rule);
    }
}

/// Outcome of a rate check.
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Slots left in the window after this request.
    pub remaining: u32,
    /// When the oldest counted request ages out and a slot frees.
    pub reset_at: DateTime<Utc>,
    /// Seconds until a retry could pass. Zero when allowed.
    pub retry_after_secs: u64,
    pub severity: RateSeverity,
}

/// Sliding-window limiter over every configured rate key.
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: DashMap<String, VecDeque<DateTime<Utc>>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            windows: DashMap::new(),
            clock,
        }
    }

    /// Consume one slot for `subject` under `rate_key`.
    ///
    /// Rejections do not consume: a caller hammering an exhausted window
    /// stays rejected exactly until the oldest counted request ages out,
    /// no longer.
    pub fn check(&self, rate_key: &str, subject: &str) -> RateLimitDecision {
        let rule = self.config.rule_for(rate_key);
        let now = self.clock.now();

        let mut window = self
            .windows
            .entry(format!("{rate_key}:{subject}"))
            .or_default();
        while window.front().is_some_and(|ts| *ts + rule.window() <= now) {
            window.pop_front();
        }

        if (window.len() as u32) < rule.max_events {
            window.push_back(now);
            let oldest = *window.front().unwrap_or(&now);
            RateLimitDecision {
                allowed: true,
                remaining: rule.max_events - window.len() as u32,
                reset_at: oldest + rule.window(),
                retry_after_secs: 0,
                severity: rule.severity,
            }
        } else {
            debug!(rate_key, subject, "rate limit exceeded");
            let oldest = *window.front().unwrap_or(&now);
            let reset_at = oldest + rule.window();
            RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_at,
                retry_after_secs: (reset_at - now).num_seconds().max(1) as u64,
                severity: rule.severity,
            }
        }
    }

    pub fn rule_for(&self, rate_key: &str) -> RateRule {
        self.config.rule_for(rate_key)
    }

    /// Drop entries whose newest timestamp has aged out of its window.
    pub fn sweep(&self) {
        let now = self.clock.now();
        let before = self.windows.len();
        self.windows.retain(|key, window| {
            let rate_key = key.split(':').next().unwrap_or_default();
            let window_len = self.config.rule_for(rate_key).window();
            window.back().is_some_and(|newest| *newest + window_len > now)
        });
        let removed = before - self.windows.len();
        if removed > 0 {
            debug!(removed, "swept expired rate windows");
        }
    }

    /// Number of live windows. Exposed for tests and diagnostics.
    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    /// Periodically sweep expired windows until `shutdown` flips to true.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        every: std::time::Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => self.sweep(),
                    result = shutdown.changed() => {
                        if result.is_err() || *shutdown.borrow() {
                            info!("rate limit sweeper stopping");
                            break;
                        }
                    }
                }
            }
        })
    }
}
