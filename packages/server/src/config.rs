use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

use aniquest_engine::SyncConfig;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string. When unset the server runs on in-memory
    /// stores, which is only useful for local development.
    pub database_url: Option<String>,
    pub host: String,
    pub port: u16,
    /// Shared secret both platforms present on the webhook endpoint.
    pub webhook_api_key: String,
    pub poll_interval_ms: u64,
    pub batch_size: usize,
    pub sweep_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").ok(),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            webhook_api_key: env::var("WEBHOOK_API_KEY")
                .context("WEBHOOK_API_KEY must be set")?,
            poll_interval_ms: env::var("SYNC_POLL_INTERVAL_MS")
                .unwrap_or_else(|_| "500".to_string())
                .parse()
                .context("SYNC_POLL_INTERVAL_MS must be a valid number")?,
            batch_size: env::var("SYNC_BATCH_SIZE")
                .unwrap_or_else(|_| "25".to_string())
                .parse()
                .context("SYNC_BATCH_SIZE must be a valid number")?,
            sweep_secs: env::var("RATE_LIMIT_SWEEP_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("RATE_LIMIT_SWEEP_SECS must be a valid number")?,
        })
    }

    /// Consumer tuning knobs in the engine's shape.
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            poll_interval_ms: self.poll_interval_ms,
            batch_size: self.batch_size,
            sweep_secs: self.sweep_secs,
        }
    }
}
