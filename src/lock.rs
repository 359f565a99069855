//! Exclusion lock: at most one live holder per resource key.
//!
//! Acquisition is a single SET NX EX against the shared store, so the TTL
//! lands in the same atomic step as the lock itself. The TTL is a safety
//! net bounding the cost of a crashed holder, not the primary correctness
//! mechanism — every healthy exit path releases explicitly.

use std::sync::Arc;
use std::time::Duration;

use opentelemetry::KeyValue;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::kv::KvStore;
use crate::telemetry::metrics;

const LOCK_PREFIX: &str = "lock:";

/// Outcome of a lock attempt. A failed acquisition is reported
/// immediately — no queueing, no internal retry.
pub enum Acquire {
    Acquired(LockGuard),
    AlreadyHeld,
}

/// Grants mutually-exclusive execution per logical resource.
#[derive(Clone)]
pub struct ResourceLock {
    kv: Arc<dyn KvStore>,
    ttl: Duration,
}

impl ResourceLock {
    pub fn new(kv: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    fn lock_key(resource_key: &str) -> String {
        format!("{LOCK_PREFIX}{resource_key}")
    }

    /// Try to acquire the lock for `resource_key`.
    ///
    /// The holder token written as the lock value proves ownership on
    /// release: after the TTL expires and someone else re-acquires, the
    /// original holder's release becomes a no-op instead of stealing the
    /// new holder's lock.
    pub async fn try_acquire(&self, resource_key: &str) -> Result<Acquire> {
        let token = Uuid::new_v4().to_string();
        let key = Self::lock_key(resource_key);

        let acquired = self.kv.set_if_absent(&key, &token, self.ttl).await?;
        metrics::lock_operations().add(
            1,
            &[KeyValue::new(
                "operation",
                if acquired { "acquired" } else { "contended" },
            )],
        );

        if acquired {
            debug!(resource_key, "lock acquired");
            Ok(Acquire::Acquired(LockGuard {
                kv: Arc::clone(&self.kv),
                key,
                token,
            }))
        } else {
            debug!(resource_key, "lock already held");
            Ok(Acquire::AlreadyHeld)
        }
    }

    /// Read path for the status translator. Never mutates the lock table.
    pub async fn is_held(&self, resource_key: &str) -> Result<bool> {
        self.kv.exists(&Self::lock_key(resource_key)).await
    }
}

/// Scoped proof of lock ownership.
///
/// Consumed by [`release`](LockGuard::release); the runner calls it on
/// every transition into a terminal state. If the process dies first, the
/// TTL clears the lock.
pub struct LockGuard {
    kv: Arc<dyn KvStore>,
    key: String,
    token: String,
}

impl LockGuard {
    /// Release the lock if this guard still owns it.
    pub async fn release(self) -> Result<()> {
        let released = self.kv.delete_if_value(&self.key, &self.token).await?;
        if !released {
            // Expired and re-acquired by someone else. Releasing nothing
            // is the correct behavior here.
            warn!(key = %self.key, "lock no longer owned at release");
        }
        metrics::lock_operations().add(
            1,
            &[KeyValue::new(
                "operation",
                if released { "released" } else { "release_lost" },
            )],
        );
        Ok(())
    }

    /// Heartbeat: push the expiry out for a long-running holder.
    pub async fn refresh_ttl(&self, ttl: Duration) -> Result<()> {
        self.kv.expire(&self.key, ttl).await
    }
}
