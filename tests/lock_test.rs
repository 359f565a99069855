//! Integration tests for the exclusion lock.

use std::sync::Arc;
use std::time::Duration;

use dispatchq::kv::{KvStore, MemoryKv};
use dispatchq::lock::{Acquire, ResourceLock};

fn test_lock(ttl: Duration) -> ResourceLock {
    ResourceLock::new(Arc::new(MemoryKv::new()), ttl)
}

#[tokio::test]
async fn second_acquire_while_held_is_rejected() {
    let lock = test_lock(Duration::from_secs(60));

    let guard = match lock.try_acquire("u1").await.unwrap() {
        Acquire::Acquired(g) => g,
        Acquire::AlreadyHeld => panic!("first acquire should succeed"),
    };

    assert!(matches!(
        lock.try_acquire("u1").await.unwrap(),
        Acquire::AlreadyHeld
    ));
    assert!(lock.is_held("u1").await.unwrap());

    // After release, a third attempt succeeds.
    guard.release().await.unwrap();
    assert!(!lock.is_held("u1").await.unwrap());
    assert!(matches!(
        lock.try_acquire("u1").await.unwrap(),
        Acquire::Acquired(_)
    ));
}

#[tokio::test]
async fn different_resources_do_not_contend() {
    let lock = test_lock(Duration::from_secs(60));

    assert!(matches!(
        lock.try_acquire("u1").await.unwrap(),
        Acquire::Acquired(_)
    ));
    assert!(matches!(
        lock.try_acquire("u2").await.unwrap(),
        Acquire::Acquired(_)
    ));
}

#[tokio::test]
async fn unreleased_lock_expires_after_ttl_and_not_before() {
    let lock = test_lock(Duration::from_millis(50));

    let _guard = match lock.try_acquire("u1").await.unwrap() {
        Acquire::Acquired(g) => g,
        Acquire::AlreadyHeld => panic!("first acquire should succeed"),
    };

    // Within the TTL window every competing acquire fails.
    assert!(matches!(
        lock.try_acquire("u1").await.unwrap(),
        Acquire::AlreadyHeld
    ));

    tokio::time::sleep(Duration::from_millis(100)).await;

    // Never released, but the TTL has cleared it.
    assert!(matches!(
        lock.try_acquire("u1").await.unwrap(),
        Acquire::Acquired(_)
    ));
}

#[tokio::test]
async fn stale_holder_release_does_not_steal_new_lock() {
    let kv = Arc::new(MemoryKv::new());
    let lock = ResourceLock::new(Arc::clone(&kv) as Arc<dyn KvStore>, Duration::from_millis(40));

    let stale = match lock.try_acquire("u1").await.unwrap() {
        Acquire::Acquired(g) => g,
        Acquire::AlreadyHeld => panic!("first acquire should succeed"),
    };

    // Let the first lock expire and a second holder take over.
    tokio::time::sleep(Duration::from_millis(80)).await;
    let _current = match lock.try_acquire("u1").await.unwrap() {
        Acquire::Acquired(g) => g,
        Acquire::AlreadyHeld => panic!("expired lock should be acquirable"),
    };

    // The stale holder's release must not delete the new holder's lock.
    stale.release().await.unwrap();
    assert!(lock.is_held("u1").await.unwrap());
}

#[tokio::test]
async fn refresh_ttl_keeps_lock_alive() {
    let lock = test_lock(Duration::from_millis(50));

    let guard = match lock.try_acquire("u1").await.unwrap() {
        Acquire::Acquired(g) => g,
        Acquire::AlreadyHeld => panic!("first acquire should succeed"),
    };

    tokio::time::sleep(Duration::from_millis(30)).await;
    guard.refresh_ttl(Duration::from_secs(60)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;

    // Original TTL has long passed; the refresh kept it held.
    assert!(lock.is_held("u1").await.unwrap());
}
