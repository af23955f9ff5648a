//! Lifecycle for the platform consumers.
//!
//! `SyncService` owns one consumer task per platform plus the rate-limit
//! sweeper. Ingress appends through [`SyncService::submit`], which nudges
//! the target consumer so a fresh event is picked up without waiting for
//! the next poll tick.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::EngineError;
use crate::limiter::RateLimiter;
use crate::models::{Platform, SyncEvent};
use crate::security::SecurityValidator;
use crate::store::Stores;

use super::consumer::PlatformConsumer;
use super::router::EventRouter;

#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
    /// How often each consumer polls for pending events.
    pub poll_interval_ms: u64,
    /// Events drained per poll.
    pub batch_size: usize,
    /// Interval of the rate-limit window sweeper.
    pub sweep_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            batch_size: 25,
            sweep_secs: 60,
        }
    }
}

struct Running {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

pub struct SyncService {
    stores: Stores,
    router: Arc<EventRouter>,
    limiter: Arc<RateLimiter>,
    validator: Arc<SecurityValidator>,
    clock: Arc<dyn Clock>,
    config: SyncConfig,
    discord_wake: Arc<Notify>,
    website_wake: Arc<Notify>,
    running: Mutex<Option<Running>>,
}

impl SyncService {
    pub fn new(
        stores: Stores,
        router: Arc<EventRouter>,
        limiter: Arc<RateLimiter>,
        validator: Arc<SecurityValidator>,
        clock: Arc<dyn Clock>,
        config: SyncConfig,
    ) -> Self {
        Self {
            stores,
            router,
            limiter,
            validator,
            clock,
            config,
            discord_wake: Arc::new(Notify::new()),
            website_wake: Arc::new(Notify::new()),
            running: Mutex::new(None),
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn validator(&self) -> &Arc<SecurityValidator> {
        &self.validator
    }

    /// Append a new event and wake the consumer it targets.
    pub async fn submit(&self, event: &SyncEvent) -> Result<(), EngineError> {
        self.stores.events.append(event).await?;
        debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            target = %event.target_platform,
            "event submitted"
        );
        self.nudge(event.target_platform);
        Ok(())
    }

    pub fn nudge(&self, platform: Platform) {
        self.wake(platform).notify_one();
    }

    fn wake(&self, platform: Platform) -> &Arc<Notify> {
        match platform {
            Platform::Discord => &self.discord_wake,
            Platform::Website => &self.website_wake,
        }
    }

    /// Spawn both consumers and the limiter sweeper. Idempotent while
    /// running.
    pub fn start(&self) {
        let mut running = self.running.lock().expect("sync service lock poisoned");
        if running.is_some() {
            debug!("sync service already running");
            return;
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let mut tasks = Vec::new();
        for (platform, wake) in [
            (Platform::Discord, self.discord_wake.clone()),
            (Platform::Website, self.website_wake.clone()),
        ] {
            let consumer = Arc::new(PlatformConsumer::new(
                platform,
                self.stores.clone(),
                self.router.clone(),
                self.limiter.clone(),
                self.validator.clone(),
                self.clock.clone(),
                poll_interval,
                self.config.batch_size,
                wake,
            ));
            tasks.push(tokio::spawn(consumer.run(shutdown_rx.clone())));
        }
        tasks.push(
            self.limiter
                .clone()
                .spawn_sweeper(Duration::from_secs(self.config.sweep_secs), shutdown_rx),
        );
        *running = Some(Running {
            shutdown: shutdown_tx,
            tasks,
        });
        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            batch_size = self.config.batch_size,
            "sync service started"
        );
    }

    /// Signal shutdown and wait for in-flight work to finish.
    pub async fn stop(&self) {
        let running = self
            .running
            .lock()
            .expect("sync service lock poisoned")
            .take();
        let Some(running) = running else {
            debug!("sync service not running");
            return;
        };
        let _ = running.shutdown.send(true);
        for result in futures::future::join_all(running.tasks).await {
            if let Err(err) = result {
                warn!(error = %err, "sync task join failed");
            }
        }
        info!("sync service stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .expect("sync service lock poisoned")
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::gamification::GamificationService;
    use crate::limiter::RateLimitConfig;
    use crate::security::SecurityConfig;
    use crate::sync::handlers::default_router;
    use crate::models::{SyncEventType, SyncStatus};
    use chrono::Utc;
    use serde_json::json;

    fn build() -> (Stores, Arc<GamificationService>, SyncService) {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let stores = Stores::in_memory();
        let service = Arc::new(GamificationService::new(stores.clone(), clock.clone()));
        let router = Arc::new(default_router(
            service.clone(),
            stores.clone(),
            clock.clone(),
        ));
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig::default(), clock.clone()));
        let validator = Arc::new(SecurityValidator::new(
            SecurityConfig::default(),
            stores.events.clone(),
            stores.reputation.clone(),
            clock.clone(),
        ));
        let sync = SyncService::new(
            stores.clone(),
            router,
            limiter,
            validator,
            clock,
            SyncConfig {
                poll_interval_ms: 50,
                ..SyncConfig::default()
            },
        );
        (stores, service, sync)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_start_stop_lifecycle() {
        let (_stores, _service, sync) = build();
        assert!(!sync.is_running());
        sync.start();
        assert!(sync.is_running());
        sync.start(); // second start is a no-op
        sync.stop().await;
        assert!(!sync.is_running());
        sync.stop().await; // second stop is a no-op
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_submitted_event_is_processed_end_to_end() {
        let (stores, service, sync) = build();
        sync.start();

        let event = SyncEvent::new(
            SyncEventType::WebsiteXpGain,
            "u1",
            json!({"xpGained": 40}),
            Utc::now(),
        );
        sync.submit(&event).await.unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(3);
        loop {
            let stored = stores.events.get(event.id).await.unwrap().unwrap();
            if stored.status.is_terminal() {
                assert_eq!(stored.status, SyncStatus::Success);
                break;
            }
            assert!(
                std::time::Instant::now() < deadline,
                "event still pending after 3s"
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(service.profile("u1").await.unwrap().xp, 40);
        sync.stop().await;
    }
}
