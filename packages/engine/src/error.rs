//! Structured error types for the sync engine.
//!
//! `EngineError` provides pattern-matchable errors instead of generic
//! `anyhow::Error`. Every variant carries enough context to store on the
//! failed event and to decide whether a retry could ever succeed.
//!
//! Raw error details never leave the process. Handlers log the full error
//! and expose only `category()` plus `safe_message()` to callers.

use std::borrow::Cow;
use std::fmt;

use thiserror::Error;

use crate::security::RiskLevel;
use crate::store::StoreError;

/// Error category for sanitized external exposure.
///
/// - `Validation`: safe to expose details (bad payloads, failed checks)
/// - `NotFound`: safe to expose (resource not found)
/// - `Unauthorized`: NEVER expose details (auth or security rejection)
/// - `RateLimited`: safe to expose (limit hit, retry hint)
/// - `Internal`: NEVER expose details (store or config failure)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    NotFound,
    Unauthorized,
    RateLimited,
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Validation => write!(f, "validation_error"),
            ErrorCategory::NotFound => write!(f, "not_found"),
            ErrorCategory::Unauthorized => write!(f, "unauthorized"),
            ErrorCategory::RateLimited => write!(f, "rate_limited"),
            ErrorCategory::Internal => write!(f, "internal_error"),
        }
    }
}

/// Structured error type for engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Action evidence did not support the claimed action.
    #[error("Action verification failed: {reason}")]
    VerificationFailed {
        /// What the evidence was missing.
        reason: String,
    },

    /// A rate rule rejected the event.
    #[error("rate limit exceeded for {action}, retry after {retry_after_secs}s")]
    RateLimited {
        /// The rate key that was exhausted.
        action: String,
        /// Seconds until the window resets.
        retry_after_secs: u64,
    },

    /// The security validator rejected the event.
    #[error("security rejected ({risk}): {}", .issues.join("; "))]
    SecurityRejected {
        /// Highest risk level among the findings.
        risk: RiskLevel,
        /// Human-readable findings, worst first.
        issues: Vec<String>,
    },

    /// The event type string did not match any known type.
    #[error("unknown sync event type {0:?}")]
    UnknownEventType(String),

    /// The event payload was missing or malformed for its type.
    #[error("invalid payload for {event_type}: {reason}")]
    InvalidPayload {
        event_type: String,
        reason: String,
    },

    /// A persistence operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The engine was configured inconsistently.
    #[error("configuration error: {0}")]
    Config(String),
}

impl EngineError {
    pub fn verification(reason: impl Into<String>) -> Self {
        EngineError::VerificationFailed {
            reason: reason.into(),
        }
    }

    pub fn invalid_payload(event_type: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::InvalidPayload {
            event_type: event_type.into(),
            reason: reason.into(),
        }
    }

    /// Return the safe category for this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            EngineError::VerificationFailed { .. } => ErrorCategory::Validation,
            EngineError::RateLimited { .. } => ErrorCategory::RateLimited,
            EngineError::SecurityRejected { .. } => ErrorCategory::Unauthorized,
            EngineError::UnknownEventType(_) => ErrorCategory::Validation,
            EngineError::InvalidPayload { .. } => ErrorCategory::Validation,
            EngineError::Store(StoreError::NotFound { .. }) => ErrorCategory::NotFound,
            EngineError::Store(_) => ErrorCategory::Internal,
            EngineError::Config(_) => ErrorCategory::Internal,
        }
    }

    /// Return a sanitized, caller-safe message.
    ///
    /// Only `Validation`, `NotFound`, and `RateLimited` errors expose
    /// specific details. Everything else gets a generic message.
    pub fn safe_message(&self) -> Cow<'static, str> {
        match self.category() {
            ErrorCategory::Validation | ErrorCategory::NotFound | ErrorCategory::RateLimited => {
                self.to_string().into()
            }
            ErrorCategory::Unauthorized => "Request rejected".into(),
            ErrorCategory::Internal => "An internal error occurred".into(),
        }
    }

    /// Whether retrying the same event later could succeed.
    ///
    /// Rate limits reset and store failures are usually transient; the
    /// rest are terminal for the event that triggered them.
    pub fn is_recoverable(&self) -> bool {
        match self {
            EngineError::RateLimited { .. } => true,
            EngineError::Store(err) => err.is_transient(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_display() {
        let err = EngineError::RateLimited {
            action: "xp_award".into(),
            retry_after_secs: 42,
        };
        assert!(err.to_string().contains("xp_award"));
        assert!(err.to_string().contains("42"));
        assert!(err.is_recoverable());
        assert_eq!(err.category(), ErrorCategory::RateLimited);
    }

    #[test]
    fn test_security_rejected_hides_details() {
        let err = EngineError::SecurityRejected {
            risk: RiskLevel::Critical,
            issues: vec!["Negative XP value detected".into()],
        };
        assert_eq!(err.category(), ErrorCategory::Unauthorized);
        // Findings stay internal.
        assert_eq!(err.safe_message(), "Request rejected");
        assert!(err.to_string().contains("Negative XP"));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_verification_failure_is_pattern_matchable() {
        let err = EngineError::verification("no watch evidence");
        match &err {
            EngineError::VerificationFailed { reason } => {
                assert_eq!(reason, "no watch evidence");
            }
            _ => panic!("Expected VerificationFailed"),
        }
        assert!(err.safe_message().contains("no watch evidence"));
    }
}
