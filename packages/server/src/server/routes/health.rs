//! Deployment probe.

use std::time::Duration;

use axum::{extract::Extension, http::StatusCode, Json};
use serde::Serialize;

use crate::server::app::AppState;

const PING_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    database: StoreProbe,
    consumers: &'static str,
}

#[derive(Serialize)]
pub struct StoreProbe {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Report whether storage is reachable and the consumers are running.
///
/// The store probe is bounded so a wedged pool cannot hang the endpoint
/// load balancers poll. Consumer state is informational; only storage
/// failures turn the response 503.
pub async fn health_handler(
    Extension(state): Extension<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let probe = tokio::time::timeout(PING_TIMEOUT, state.deps.stores.profiles.ping()).await;
    let database = match probe {
        Ok(Ok(())) => StoreProbe {
            status: "ok",
            error: None,
        },
        Ok(Err(err)) => StoreProbe {
            status: "error",
            error: Some(err.to_string()),
        },
        Err(_) => StoreProbe {
            status: "error",
            error: Some(format!("ping timed out after {}s", PING_TIMEOUT.as_secs())),
        },
    };

    let healthy = database.error.is_none();
    let response = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" },
        database,
        consumers: if state.deps.sync.is_running() {
            "running"
        } else {
            "stopped"
        },
    };
    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(response))
}
