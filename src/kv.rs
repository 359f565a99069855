//! Shared key-value store: the atomic boundary under the idempotency
//! ledger and the lock table.
//!
//! Everything the guard and the lock need reduces to one conditional-write
//! primitive (`set_if_absent`) plus TTL bookkeeping. Both backends uphold
//! the same atomicity contract, so correctness holds across processes with
//! Redis and within one process for tests.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::Result;

/// Atomic check-and-delete: release a key only while it still holds the
/// expected value. Runs server-side so GET and DEL cannot interleave with
/// a competing writer.
const DELETE_IF_VALUE_SCRIPT: &str =
    "if redis.call('GET', KEYS[1]) == ARGV[1] then return redis.call('DEL', KEYS[1]) else return 0 end";

/// Shared store interface required from the cache/lock backend.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Atomically create `key` with `value` and `ttl` if absent.
    /// Returns true if the write happened, false if the key already exists.
    ///
    /// This is the only admission/acquisition primitive — an existence
    /// check followed by a separate set is a race, never do that.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn exists(&self, key: &str) -> Result<bool>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Atomically delete `key` only if it currently holds `value`.
    /// Returns true if the key was deleted.
    async fn delete_if_value(&self, key: &str, value: &str) -> Result<bool>;

    /// Re-key the TTL of an existing key.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<()>;
}

// EX rejects 0, so a sub-second TTL rounds up to one second.
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

// ---------------------------------------------------------------------------
// Redis backend
// ---------------------------------------------------------------------------

/// Redis-backed store. Constructed explicitly at process start and injected
/// into the guard/lock/runner — no ambient module-level connection.
#[derive(Clone)]
pub struct RedisKv {
    conn: redis::aio::ConnectionManager,
}

impl RedisKv {
    /// Connect to Redis. The connection manager reconnects on failure and
    /// is cheap to clone across tasks.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl KvStore for RedisKv {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        // NX and EX in one SET — no window between "set" and "expire" in
        // which a crash could leave a non-expiring key.
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let n: i64 = redis::cmd("EXISTS").arg(key).query_async(&mut conn).await?;
        Ok(n > 0)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(())
    }

    async fn delete_if_value(&self, key: &str, value: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let deleted: i64 = redis::Script::new(DELETE_IF_VALUE_SCRIPT)
            .key(key)
            .arg(value)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted > 0)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-memory store for tests and single-process demos. One mutex serializes
/// all operations, which is exactly the atomicity the trait demands.
#[derive(Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        if entries.get(key).is_some_and(|e| !e.is_expired()) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(e) if e.is_expired() => {
                entries.remove(key);
                Ok(None)
            }
            Some(e) => Ok(Some(e.value.clone())),
            None => Ok(None),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn delete_if_value(&self, key: &str, value: &str) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(e) if !e.is_expired() && e.value == value => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock().await;
        if entries.get(key).is_some_and(|e| e.is_expired()) {
            entries.remove(key);
            return Ok(());
        }
        if let Some(e) = entries.get_mut(key) {
            e.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_if_absent_is_first_writer_wins() {
        let kv = MemoryKv::new();
        assert!(kv.set_if_absent("k", "a", Duration::from_secs(60)).await.unwrap());
        assert!(!kv.set_if_absent("k", "b", Duration::from_secs(60)).await.unwrap());
        assert_eq!(kv.get("k").await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn expired_entries_behave_as_absent() {
        let kv = MemoryKv::new();
        kv.set_if_absent("k", "a", Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!kv.exists("k").await.unwrap());
        assert!(kv.set_if_absent("k", "b", Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn delete_if_value_requires_match() {
        let kv = MemoryKv::new();
        kv.set_if_absent("k", "token-1", Duration::from_secs(60)).await.unwrap();
        assert!(!kv.delete_if_value("k", "token-2").await.unwrap());
        assert!(kv.exists("k").await.unwrap());
        assert!(kv.delete_if_value("k", "token-1").await.unwrap());
        assert!(!kv.exists("k").await.unwrap());
    }
}
