//! Domain types shared across the engine: actions and their evidence, sync
//! events, user profiles, badges, quests, reputation, and activity rows.

pub mod action;
pub mod activity;
pub mod badge;
pub mod event;
pub mod profile;
pub mod quest;
pub mod reputation;

pub use action::{ActionEvidence, ActionKind, AwardRequest, ContentFlags};
pub use activity::ActivityRecord;
pub use badge::{Badge, BadgeCondition};
pub use event::{Platform, SyncEvent, SyncEventType, SyncStatus};
pub use profile::UserProfile;
pub use quest::{Quest, QuestCondition, QuestPeriod, QuestProgress};
pub use reputation::{ReputationLevel, ReputationRecord, Violation, ViolationKind};
