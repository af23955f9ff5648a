use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::EngineError;
use crate::models::{SyncEvent, SyncEventType};

/// Processes one claimed event.
///
/// Delivery is at-least-once: a handler can see the same event twice when a
/// consumer dies between handling and marking, so effects must tolerate
/// replay (the profile CAS and the one-shot status transition absorb most
/// of it).
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &SyncEvent) -> Result<(), EngineError>;
}

/// Static `event_type -> handler` table, assembled once at startup.
#[derive(Default)]
pub struct EventRouter {
    handlers: HashMap<SyncEventType, Arc<dyn EventHandler>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        event_type: SyncEventType,
        handler: Arc<dyn EventHandler>,
    ) -> &mut Self {
        self.handlers.insert(event_type, handler);
        self
    }

    pub fn handles(&self, event_type: SyncEventType) -> bool {
        self.handlers.contains_key(&event_type)
    }

    pub async fn dispatch(&self, event: &SyncEvent) -> Result<(), EngineError> {
        match self.handlers.get(&event.event_type) {
            Some(handler) => handler.handle(event).await,
            None => Err(EngineError::UnknownEventType(
                event.event_type.as_str().to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingHandler {
        calls: AtomicU32,
    }

    #[async_trait]
    impl EventHandler for CountingHandler {
        async fn handle(&self, _event: &SyncEvent) -> Result<(), EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_dispatch_routes_by_event_type() {
        let handler = Arc::new(CountingHandler {
            calls: AtomicU32::new(0),
        });
        let mut router = EventRouter::new();
        router.register(SyncEventType::WebsiteXpGain, handler.clone());

        let event = SyncEvent::new(
            SyncEventType::WebsiteXpGain,
            "u1",
            json!({"xpGained": 10}),
            Utc::now(),
        );
        router.dispatch(&event).await.unwrap();
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert!(router.handles(SyncEventType::WebsiteXpGain));
        assert!(!router.handles(SyncEventType::XpUpdate));
    }

    #[tokio::test]
    async fn test_dispatch_without_handler_is_an_error() {
        let router = EventRouter::new();
        let event = SyncEvent::new(SyncEventType::XpUpdate, "u1", json!({}), Utc::now());
        let err = router.dispatch(&event).await.unwrap_err();
        assert!(matches!(err, EngineError::UnknownEventType(name) if name == "XP_UPDATE"));
    }
}
