//! # AniQuest Sync Engine
//!
//! Cross-platform gamification sync between the Discord bot and the web
//! app. Both surfaces observe user actions; this engine owns the canonical
//! [`UserProfile`] and keeps the two sides convergent through a durable
//! event log.
//!
//! ## Architecture
//!
//! ```text
//! Website webhook ──► POST /api/sync/events
//!                          │ append (pending) + nudge
//!                          ▼
//!                     EventStore ◄────────────────────────┐
//!                          │                              │
//!            ┌─────────────┴─────────────┐                │
//!            ▼                           ▼                │
//!     Discord consumer            Website consumer        │
//!            │                           │                │
//!     RateLimiter gate            RateLimiter gate        │
//!            │                           │                │
//!     SecurityValidator           SecurityValidator       │
//!            │                           │                │
//!            ▼                           ▼                │
//!     Award pipeline              Notification acks       │
//!     (verify → price →                  │                │
//!      CAS profile save)                 ▼                │
//!            │                    mark success/failed     │
//!            └── notification events ────────────────────►┘
//! ```
//!
//! ## Key Invariants
//!
//! 1. **One canonical profile** - every XP, badge, streak, and quest
//!    mutation goes through the award pipeline's version-checked save
//! 2. **Events are terminal-once** - `pending → {success | failed}`,
//!    and a terminal event is never modified again
//! 3. **At-least-once delivery** - handlers tolerate replay; duplicate
//!    marks are observed and skipped
//! 4. **Notifications never re-apply** - website-bound events are
//!    receipts of a mutation that already happened
//! 5. **Abuse is scored, not assumed** - suspicious events still process
//!    while reputation escalates; only critical findings and blocked
//!    subjects reject
//!
//! ## Entry Points
//!
//! - [`gamification::GamificationService`] - verify, price, and apply
//!   one action
//! - [`sync::SyncService`] - submit events and run the consumers
//! - [`store::Stores`] - backend selection (in-memory or Postgres)

pub mod activity;
pub mod breaker;
pub mod clock;
pub mod error;
pub mod gamification;
pub mod limiter;
pub mod models;
pub mod security;
pub mod store;
pub mod sync;

pub use activity::ActivityLogger;
pub use breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use clock::{Clock, SystemClock};
pub use error::{EngineError, ErrorCategory};
pub use gamification::{AwardOutcome, GamificationService, RewardConfig, XpBreakdown};
pub use limiter::{RateLimitConfig, RateLimitDecision, RateLimiter};
pub use models::{
    ActionEvidence, ActionKind, AwardRequest, Badge, ContentFlags, Platform, Quest, SyncEvent,
    SyncEventType, SyncStatus, UserProfile,
};
pub use security::{RiskLevel, SecurityConfig, SecurityValidator, ValidationReport};
pub use store::{StoreError, Stores, SyncVersion};
pub use sync::{default_router, EventRouter, SyncConfig, SyncService};
