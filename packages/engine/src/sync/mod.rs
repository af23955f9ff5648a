//! Cross-platform event propagation: routing, per-platform consumers, and
//! the service that runs them.

pub mod consumer;
pub mod handlers;
pub mod manager;
pub mod router;

pub use consumer::PlatformConsumer;
pub use handlers::default_router;
pub use manager::{SyncConfig, SyncService};
pub use router::{EventHandler, EventRouter};
