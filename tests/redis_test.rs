//! Redis backend tests. Ignored by default; run with a live Redis:
//!
//! ```sh
//! REDIS_URL=redis://localhost:6379/0 cargo test -- --ignored
//! ```

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use dispatchq::guard::{Admission, IdempotencyGuard};
use dispatchq::kv::{KvStore, RedisKv};
use dispatchq::lock::{Acquire, ResourceLock};
use dispatchq::model::JobId;

/// Helper: connect to the test Redis.
/// Requires REDIS_URL env var or defaults to local dev.
async fn test_kv() -> RedisKv {
    let url = std::env::var("REDIS_URL")
        .unwrap_or_else(|_| "redis://localhost:6379/0".to_string());
    RedisKv::connect(&url).await.unwrap()
}

/// Unique key per test run so parallel runs never collide.
fn unique(prefix: &str) -> String {
    format!("test:{prefix}:{}", Uuid::new_v4())
}

#[tokio::test]
#[ignore] // Requires running Redis
async fn set_if_absent_is_first_writer_wins() {
    let kv = test_kv().await;
    let key = unique("nx");

    assert!(kv.set_if_absent(&key, "a", Duration::from_secs(30)).await.unwrap());
    assert!(!kv.set_if_absent(&key, "b", Duration::from_secs(30)).await.unwrap());
    assert_eq!(kv.get(&key).await.unwrap().as_deref(), Some("a"));

    kv.delete(&key).await.unwrap();
    assert!(!kv.exists(&key).await.unwrap());
}

#[tokio::test]
#[ignore] // Requires running Redis
async fn delete_if_value_requires_token_match() {
    let kv = test_kv().await;
    let key = unique("cas");

    kv.set_if_absent(&key, "token-1", Duration::from_secs(30)).await.unwrap();
    assert!(!kv.delete_if_value(&key, "token-2").await.unwrap());
    assert!(kv.exists(&key).await.unwrap());
    assert!(kv.delete_if_value(&key, "token-1").await.unwrap());
    assert!(!kv.exists(&key).await.unwrap());
}

#[tokio::test]
#[ignore] // Requires running Redis
async fn sub_second_ttl_rounds_up_and_expires() {
    let kv = test_kv().await;
    let key = unique("ttl");

    // EX floors at one second, so the key survives a short sleep and is
    // gone after the rounded-up window.
    kv.set_if_absent(&key, "v", Duration::from_millis(100)).await.unwrap();
    assert!(kv.exists(&key).await.unwrap());
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert!(!kv.exists(&key).await.unwrap());
}

#[tokio::test]
#[ignore] // Requires running Redis
async fn guard_deduplicates_across_connections() {
    let kv = Arc::new(test_kv().await);
    let guard_a = IdempotencyGuard::new(Arc::clone(&kv) as Arc<dyn KvStore>, Duration::from_secs(30));
    let guard_b = IdempotencyGuard::new(kv as Arc<dyn KvStore>, Duration::from_secs(30));

    let fingerprint = unique("fp");
    let owner = JobId::new();

    assert_eq!(guard_a.admit(&fingerprint, owner).await.unwrap(), Admission::Admitted);
    assert_eq!(
        guard_b.admit(&fingerprint, JobId::new()).await.unwrap(),
        Admission::Duplicate
    );
    assert!(guard_b.confirm(&fingerprint, owner).await.unwrap());

    guard_a.forget(&fingerprint, owner).await.unwrap();
    let successor = JobId::new();
    assert_eq!(
        guard_b.admit(&fingerprint, successor).await.unwrap(),
        Admission::Admitted
    );
    guard_b.forget(&fingerprint, successor).await.unwrap();
}

#[tokio::test]
#[ignore] // Requires running Redis
async fn lock_excludes_competing_holders() {
    let kv = Arc::new(test_kv().await);
    let lock = ResourceLock::new(kv as Arc<dyn KvStore>, Duration::from_secs(30));

    let resource = unique("res");
    let guard = match lock.try_acquire(&resource).await.unwrap() {
        Acquire::Acquired(g) => g,
        Acquire::AlreadyHeld => panic!("first acquire should succeed"),
    };

    assert!(matches!(
        lock.try_acquire(&resource).await.unwrap(),
        Acquire::AlreadyHeld
    ));
    assert!(lock.is_held(&resource).await.unwrap());

    guard.release().await.unwrap();
    assert!(!lock.is_held(&resource).await.unwrap());
}
