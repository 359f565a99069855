//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing.
//! The Redis URL is wrapped in secrecy::SecretString to prevent log leaks.

pub mod secrets;

use std::time::Duration;

use secrecy::SecretString;

use crate::engine::DispatchConfig;
use crate::error::{Error, Result};

const DEFAULT_IDEMPOTENCY_TTL_SECS: u64 = 300;
const DEFAULT_LOCK_TTL_SECS: u64 = 600;

#[derive(Debug)]
pub struct Config {
    pub redis_url: SecretString,
    pub idempotency_ttl: Duration,
    pub lock_ttl: Duration,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            redis_url: SecretString::from(required_var("REDIS_URL")?),
            idempotency_ttl: secs_var("IDEMPOTENCY_TTL_SECS", DEFAULT_IDEMPOTENCY_TTL_SECS)?,
            lock_ttl: secs_var("LOCK_TTL_SECS", DEFAULT_LOCK_TTL_SECS)?,
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            idempotency_ttl: self.idempotency_ttl,
            lock_ttl: self.lock_ttl,
        }
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn secs_var(name: &str, default: u64) -> Result<Duration> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| Error::Config(format!("{name} must be a whole number of seconds"))),
        Err(_) => Ok(Duration::from_secs(default)),
    }
}
