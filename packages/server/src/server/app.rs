//! Application setup and server configuration.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{header::CONTENT_TYPE, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::kernel::ServerDeps;
use crate::server::middleware::extract_client_ip;
use crate::server::routes::{
    activity_handler, event_status_handler, health_handler, leaderboard_handler, profile_handler,
    submit_event_handler,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub deps: Arc<ServerDeps>,
}

/// Build the Axum application router
///
/// The same router serves both platforms: the webhook endpoint ingests
/// events from either side, the read endpoints back the website's profile
/// and leaderboard pages, and /health backs deployment probes.
pub fn build_app(deps: Arc<ServerDeps>) -> Router {
    let app_state = AppState { deps };

    // CORS configuration - the website calls this API from the browser
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route("/api/sync/events", post(submit_event_handler))
        .route("/api/sync/events/:id", get(event_status_handler))
        .route("/api/profiles/:user_id", get(profile_handler))
        .route("/api/profiles/:user_id/activity", get(activity_handler))
        .route("/api/leaderboard", get(leaderboard_handler))
        .route("/health", get(health_handler))
        // Middleware layers (applied in reverse order - last added runs first)
        .layer(middleware::from_fn(extract_client_ip))
        .layer(Extension(app_state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
