//! Per-platform polling consumer.
//!
//! One consumer task drains the events aimed at its platform, oldest first.
//! Each event passes the rate limiter and security validator before its
//! handler runs, and ends in exactly one terminal status. A transient store
//! failure is the one exception: the event stays pending for the next poll,
//! and the circuit breaker decides when polling itself should back off.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

use crate::activity::ActivityLogger;
use crate::breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::clock::Clock;
use crate::error::EngineError;
use crate::limiter::{RateLimitDecision, RateLimiter};
use crate::models::{Platform, ReputationRecord, SyncEvent, ViolationKind};
use crate::security::{SecurityValidator, ValidationContext, ValidationReport};
use crate::store::Stores;

use super::router::EventRouter;

pub struct PlatformConsumer {
    platform: Platform,
    stores: Stores,
    router: Arc<EventRouter>,
    limiter: Arc<RateLimiter>,
    validator: Arc<SecurityValidator>,
    breaker: CircuitBreaker,
    activity: ActivityLogger,
    clock: Arc<dyn Clock>,
    poll_interval: std::time::Duration,
    batch_size: usize,
    wake: Arc<Notify>,
    instance: String,
}

impl PlatformConsumer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        platform: Platform,
        stores: Stores,
        router: Arc<EventRouter>,
        limiter: Arc<RateLimiter>,
        validator: Arc<SecurityValidator>,
        clock: Arc<dyn Clock>,
        poll_interval: std::time::Duration,
        batch_size: usize,
        wake: Arc<Notify>,
    ) -> Self {
        Self {
            platform,
            breaker: CircuitBreaker::new(CircuitBreakerConfig::default(), clock.clone()),
            activity: ActivityLogger::new(stores.activity.clone(), clock.clone()),
            stores,
            router,
            limiter,
            validator,
            clock,
            poll_interval,
            batch_size,
            wake,
            instance: format!("consumer:{platform}"),
        }
    }

    /// Poll until `shutdown` flips to true. Webhook ingress nudges the wake
    /// handle so fresh events do not wait out the interval.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(platform = %self.platform, "sync consumer started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.wake.notified() => {}
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }
            self.poll_once().await;
        }
        info!(platform = %self.platform, "sync consumer stopped");
    }

    /// Drain one batch now.
    ///
    /// A full batch nudges the wake handle so the backlog keeps draining
    /// without waiting for the next tick, while shutdown stays responsive
    /// between batches.
    pub async fn poll_once(&self) {
        if !self.breaker.check() {
            debug!(platform = %self.platform, "circuit open, skipping poll");
            return;
        }
        let batch = match self
            .stores
            .events
            .pending_for_target(self.platform, self.batch_size)
            .await
        {
            Ok(batch) => {
                self.breaker.record_success();
                batch
            }
            Err(err) => {
                warn!(platform = %self.platform, error = %err, "pending poll failed");
                self.breaker.record_failure();
                return;
            }
        };
        let full = batch.len() >= self.batch_size;
        for event in &batch {
            self.process(event).await;
        }
        if full {
            self.wake.notify_one();
        }
    }

    async fn process(&self, event: &SyncEvent) {
        let decision = self
            .limiter
            .check(event.event_type.rate_key(), &event.user_id);
        if !decision.allowed {
            self.reject_rate_limited(event, &decision).await;
            return;
        }

        let report = match self
            .validator
            .validate(event, &ValidationContext::default())
            .await
        {
            Ok(report) => report,
            Err(err) => {
                self.handle_error(event, err).await;
                return;
            }
        };
        if !report.is_valid() {
            self.reject_invalid(event, &report).await;
            return;
        }
        if report.is_flagged() {
            if let Err(err) = self.validator.record_findings(event, &report).await {
                warn!(event_id = %event.id, error = %err, "failed to record findings");
            }
            warn!(
                event_id = %event.id,
                user_id = %event.user_id,
                risk = %report.risk,
                issues = ?report.issues(),
                "processing flagged event"
            );
        }

        match self.router.dispatch(event).await {
            Ok(()) => self.mark_success(event).await,
            Err(err) => self.handle_error(event, err).await,
        }
    }

    async fn reject_rate_limited(&self, event: &SyncEvent, decision: &RateLimitDecision) {
        warn!(
            event_id = %event.id,
            user_id = %event.user_id,
            rate_key = event.event_type.rate_key(),
            retry_after = decision.retry_after_secs,
            "event rate limited"
        );
        let subject = ReputationRecord::user_subject(&event.user_id);
        let detail = format!(
            "{} exceeded, retry after {}s",
            event.event_type.rate_key(),
            decision.retry_after_secs
        );
        if let Err(err) = self
            .validator
            .record_violation(&subject, ViolationKind::RateLimit, &detail, Some(event.id))
            .await
        {
            warn!(event_id = %event.id, error = %err, "failed to record rate limit violation");
        }
        self.activity
            .record(
                &event.user_id,
                "rate_limited",
                event.source_platform,
                json!({
                    "eventType": event.event_type.as_str(),
                    "retryAfter": decision.retry_after_secs,
                }),
            )
            .await;
        let message = format!("rate limited: retry after {}s", decision.retry_after_secs);
        self.mark_failed(event, &message).await;
    }

    async fn reject_invalid(&self, event: &SyncEvent, report: &ValidationReport) {
        warn!(
            event_id = %event.id,
            user_id = %event.user_id,
            risk = %report.risk,
            issues = ?report.issues(),
            "event rejected by security validation"
        );
        if let Err(err) = self.validator.record_findings(event, report).await {
            warn!(event_id = %event.id, error = %err, "failed to record findings");
        }
        self.activity
            .record(
                &event.user_id,
                "security_rejected",
                event.source_platform,
                json!({
                    "eventType": event.event_type.as_str(),
                    "risk": report.risk.as_str(),
                    "issues": report.issues(),
                }),
            )
            .await;
        let message = if report.blocked {
            "security rejected: subject blocked".to_string()
        } else {
            format!("security rejected: {}", report.issues().join("; "))
        };
        self.mark_failed(event, &message).await;
    }

    /// Terminal errors fail the event; a transient store error leaves it
    /// pending so the next poll retries it.
    async fn handle_error(&self, event: &SyncEvent, err: EngineError) {
        match &err {
            EngineError::Store(store_err) if store_err.is_transient() => {
                warn!(
                    event_id = %event.id,
                    error = %err,
                    "transient store failure, leaving event pending"
                );
                self.breaker.record_failure();
            }
            _ => {
                warn!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    error = %err,
                    "event processing failed"
                );
                self.activity
                    .record(
                        &event.user_id,
                        "sync_event_failed",
                        event.source_platform,
                        json!({
                            "eventType": event.event_type.as_str(),
                            "error": err.safe_message(),
                        }),
                    )
                    .await;
                self.mark_failed(event, &err.safe_message()).await;
            }
        }
    }

    async fn mark_success(&self, event: &SyncEvent) {
        match self
            .stores
            .events
            .mark_success(event.id, &self.instance, self.clock.now())
            .await
        {
            Ok(true) => {
                self.breaker.record_success();
                debug!(event_id = %event.id, event_type = %event.event_type, "event processed");
            }
            Ok(false) => {
                debug!(event_id = %event.id, "event already terminal, duplicate delivery")
            }
            Err(err) => {
                warn!(event_id = %event.id, error = %err, "failed to mark event success");
                self.breaker.record_failure();
            }
        }
    }

    async fn mark_failed(&self, event: &SyncEvent, message: &str) {
        match self
            .stores
            .events
            .mark_failed(event.id, message, self.clock.now())
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                debug!(event_id = %event.id, "event already terminal, duplicate delivery")
            }
            Err(err) => {
                warn!(event_id = %event.id, error = %err, "failed to mark event failed");
                self.breaker.record_failure();
            }
        }
    }
}
