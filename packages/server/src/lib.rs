// AniQuest Sync API
//
// This crate provides the HTTP surface for the cross-platform gamification
// engine: webhook ingestion from the Discord bot and the website, read APIs
// for profiles, activity, and the leaderboard, and the consumer lifecycle.
//
// All game semantics live in aniquest-engine; this crate only wires stores,
// consumers, and routes together.

pub mod config;
pub mod kernel;
pub mod server;

pub use config::*;
