//! Server dependencies shared by all request handlers.
//!
//! Everything is built once at startup from a [`Stores`] bundle and the
//! loaded [`Config`]; handlers receive this container through an axum
//! extension. Stores are trait objects, so tests run the identical wiring
//! on in-memory backends.

use std::sync::Arc;

use aniquest_engine::{
    default_router, ActivityLogger, Clock, GamificationService, RateLimitConfig, RateLimiter,
    SecurityConfig, SecurityValidator, Stores, SyncService, SystemClock,
};

use crate::config::Config;

/// Dependency container handed to every HTTP handler.
pub struct ServerDeps {
    pub stores: Stores,
    pub game: Arc<GamificationService>,
    pub sync: Arc<SyncService>,
    pub activity: ActivityLogger,
    pub clock: Arc<dyn Clock>,
    pub webhook_api_key: String,
}

impl ServerDeps {
    pub fn new(stores: Stores, config: &Config) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let game = Arc::new(GamificationService::new(stores.clone(), clock.clone()));
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig::default(), clock.clone()));
        let validator = Arc::new(SecurityValidator::new(
            SecurityConfig::default(),
            stores.events.clone(),
            stores.reputation.clone(),
            clock.clone(),
        ));
        let router = Arc::new(default_router(game.clone(), stores.clone(), clock.clone()));
        let sync = Arc::new(SyncService::new(
            stores.clone(),
            router,
            limiter,
            validator,
            clock.clone(),
            config.sync_config(),
        ));
        let activity = ActivityLogger::new(stores.activity.clone(), clock.clone());

        Self {
            stores,
            game,
            sync,
            activity,
            clock,
            webhook_api_key: config.webhook_api_key.clone(),
        }
    }
}
