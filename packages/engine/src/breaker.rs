//! Circuit breaker guarding the store-facing consumer loop.
//!
//! After `failure_threshold` consecutive store failures the circuit opens
//! and the consumer skips polling until the cooldown elapses. One trial
//! request then probes the backend; its outcome decides between closing
//! the circuit and another full cooldown.
//!
//! Time comes from an injected [`Clock`], so state transitions are exact
//! in tests instead of sleep-based.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::clock::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Healthy. Requests flow through normally.
    Closed { failures: u32 },
    /// Tripped. All requests are rejected until the cooldown elapses.
    Open { opened_at: DateTime<Utc> },
    /// Probing. A limited number of trial requests are allowed.
    HalfOpen { trial_permits: u32 },
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// How long an open circuit rejects before probing.
    pub cooldown_secs: u64,
    /// Trial requests allowed in half-open state.
    pub half_open_trial: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_secs: 10,
            half_open_trial: 1,
        }
    }
}

pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Mutex<CircuitState>,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            state: Mutex::new(CircuitState::Closed { failures: 0 }),
            clock,
        }
    }

    /// Whether a request may proceed right now.
    ///
    /// An open circuit whose cooldown has elapsed transitions to half-open
    /// and hands out trial permits in place.
    pub fn check(&self) -> bool {
        let mut state = self.state.lock().expect("breaker lock poisoned");
        match *state {
            CircuitState::Closed { .. } => true,
            CircuitState::Open { opened_at } => {
                let cooldown = Duration::seconds(self.config.cooldown_secs as i64);
                if self.clock.now() >= opened_at + cooldown {
                    debug!("circuit cooldown elapsed, entering half-open");
                    *state = CircuitState::HalfOpen {
                        trial_permits: self.config.half_open_trial.saturating_sub(1),
                    };
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen { trial_permits } => {
                if trial_permits > 0 {
                    *state = CircuitState::HalfOpen {
                        trial_permits: trial_permits - 1,
                    };
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock().expect("breaker lock poisoned");
        if !matches!(*state, CircuitState::Closed { failures: 0 }) {
            debug!("circuit reset to closed");
        }
        *state = CircuitState::Closed { failures: 0 };
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock().expect("breaker lock poisoned");
        *state = match *state {
            CircuitState::Closed { failures } => {
                let failures = failures + 1;
                if failures >= self.config.failure_threshold {
                    warn!(failures, "circuit opened");
                    CircuitState::Open {
                        opened_at: self.clock.now(),
                    }
                } else {
                    CircuitState::Closed { failures }
                }
            }
            CircuitState::HalfOpen { .. } => {
                warn!("circuit re-opened after half-open failure");
                CircuitState::Open {
                    opened_at: self.clock.now(),
                }
            }
            open @ CircuitState::Open { .. } => open,
        };
    }

    pub fn state(&self) -> CircuitState {
        *self.state.lock().expect("breaker lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn breaker(threshold: u32, cooldown_secs: u64) -> (Arc<ManualClock>, CircuitBreaker) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        ));
        let config = CircuitBreakerConfig {
            failure_threshold: threshold,
            cooldown_secs,
            half_open_trial: 1,
        };
        let breaker = CircuitBreaker::new(config, clock.clone());
        (clock, breaker)
    }

    #[test]
    fn test_opens_after_threshold() {
        let (_clock, breaker) = breaker(3, 10);

        breaker.record_failure();
        breaker.record_failure();
        assert!(breaker.check());

        breaker.record_failure();
        assert!(!breaker.check());
    }

    #[test]
    fn test_cooldown_grants_one_trial() {
        let (clock, breaker) = breaker(1, 10);

        breaker.record_failure();
        assert!(!breaker.check());

        clock.advance(Duration::seconds(10));
        assert!(breaker.check()); // trial permit
        assert!(!breaker.check()); // no more permits

        // Trial succeeded: closed again.
        breaker.record_success();
        assert!(breaker.check());
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let (clock, breaker) = breaker(1, 10);

        breaker.record_failure();
        clock.advance(Duration::seconds(10));
        assert!(breaker.check());

        breaker.record_failure();
        assert!(!breaker.check());

        // Full cooldown again before the next probe.
        clock.advance(Duration::seconds(9));
        assert!(!breaker.check());
        clock.advance(Duration::seconds(1));
        assert!(breaker.check());
    }

    #[test]
    fn test_success_resets_failure_count() {
        let (_clock, breaker) = breaker(3, 10);

        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();

        breaker.record_failure();
        breaker.record_failure();
        assert!(breaker.check());
        breaker.record_failure();
        assert!(!breaker.check());
    }
}
