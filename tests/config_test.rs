//! Configuration loading tests.
//!
//! All phases live in one test because they mutate shared process
//! environment variables.

use std::time::Duration;

use secrecy::ExposeSecret;

use dispatchq::config::Config;
use dispatchq::error::Error;

#[test]
fn config_from_env_round_trip() {
    // Missing REDIS_URL is a hard error.
    unsafe {
        std::env::remove_var("REDIS_URL");
        std::env::remove_var("IDEMPOTENCY_TTL_SECS");
        std::env::remove_var("LOCK_TTL_SECS");
    }
    assert!(matches!(Config::from_env(), Err(Error::Config(_))));

    // With only the URL set, TTLs fall back to their defaults.
    unsafe {
        std::env::set_var("REDIS_URL", "redis://localhost:6379/0");
    }
    let config = Config::from_env().expect("config should load");
    assert_eq!(config.redis_url.expose_secret(), "redis://localhost:6379/0");
    assert_eq!(config.idempotency_ttl, Duration::from_secs(300));
    assert_eq!(config.lock_ttl, Duration::from_secs(600));
    assert_eq!(config.log_level, "info");

    // Explicit TTLs override the defaults.
    unsafe {
        std::env::set_var("IDEMPOTENCY_TTL_SECS", "42");
        std::env::set_var("LOCK_TTL_SECS", "99");
    }
    let config = Config::from_env().expect("config should load");
    assert_eq!(config.idempotency_ttl, Duration::from_secs(42));
    assert_eq!(config.lock_ttl, Duration::from_secs(99));

    let dispatch = config.dispatch_config();
    assert_eq!(dispatch.idempotency_ttl, Duration::from_secs(42));
    assert_eq!(dispatch.lock_ttl, Duration::from_secs(99));

    // Non-numeric TTLs are rejected rather than silently defaulted.
    unsafe {
        std::env::set_var("IDEMPOTENCY_TTL_SECS", "soon");
    }
    assert!(matches!(Config::from_env(), Err(Error::Config(_))));

    unsafe {
        std::env::remove_var("REDIS_URL");
        std::env::remove_var("IDEMPOTENCY_TTL_SECS");
        std::env::remove_var("LOCK_TTL_SECS");
    }
}
