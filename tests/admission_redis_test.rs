//! Admission store integration tests.
//!
//! These exercise the atomic admit script and queue bookkeeping against a
//! real Redis. They share the store's fixed keys, so run them serially:
//!
//! ```bash
//! docker run -d -p 6379:6379 redis:7-alpine
//! cargo test --test admission_redis_test -- --ignored --test-threads=1
//! ```

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;
use workshop_gateway::admission::AdmissionController;
use workshop_gateway::bus::QueueEventPublisher;
use workshop_gateway::hub::NotificationHub;
use workshop_gateway::store::{self, AdmissionStore};
use workshop_gateway::types::UserId;

const REDIS_URL: &str = "redis://127.0.0.1:6379";

async fn fresh_store(session_ttl: u64, default_limit: i64) -> AdmissionStore {
    let conn = store::connect(REDIS_URL).await.unwrap();

    // Clear the fixed admission keys so tests start from empty state.
    let mut raw = conn.clone();
    let _: () = redis::pipe()
        .del("active_slots")
        .ignore()
        .del("waiting_queue")
        .ignore()
        .del("queue_limit")
        .ignore()
        .del("promotion_lock")
        .ignore()
        .query_async(&mut raw)
        .await
        .unwrap();

    AdmissionStore::new(conn, session_ttl, default_limit, 5)
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn admit_never_exceeds_limit_under_concurrency() {
    let store = fresh_store(300, 50).await;
    store.set_limit(2).await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            store.try_admit(UserId::new()).await.unwrap()
        }));
    }

    let mut admitted = 0;
    for task in tasks {
        if task.await.unwrap() {
            admitted += 1;
        }
    }

    assert_eq!(admitted, 2, "exactly the limit must be admitted");
    assert_eq!(store.active_count().await.unwrap(), 2);
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn admit_writes_marker_with_session_ttl() {
    let store = fresh_store(300, 50).await;
    let user = UserId::new();

    assert!(store.try_admit(user).await.unwrap());
    assert!(store.is_active(user).await.unwrap());
    assert!(store.marker_exists(user).await.unwrap());

    let ttl = store.marker_ttl(user).await.unwrap().unwrap();
    assert!(ttl > 290 && ttl <= 300, "marker TTL should be ~300s, got {ttl}");
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn capacity_one_second_joiner_waits_for_leave() {
    let store = fresh_store(300, 50).await;
    store.set_limit(1).await.unwrap();

    let u1 = UserId::new();
    let u2 = UserId::new();

    assert!(store.try_admit(u1).await.unwrap());
    assert!(!store.try_admit(u2).await.unwrap(), "slot is taken");

    store
        .enqueue_waiting(u2, chrono::Utc::now().timestamp_nanos_opt().unwrap())
        .await
        .unwrap();
    assert_eq!(store.waiting_position(u2).await.unwrap(), Some(1));
    assert_eq!(store.waiting_count().await.unwrap(), 1);

    // U1 leaves; the freed slot admits U2.
    store.leave(u1).await.unwrap();
    assert!(store.try_admit(u2).await.unwrap());
    store.remove_waiting(u2).await.unwrap();

    assert_eq!(store.active_count().await.unwrap(), 1);
    assert!(store.is_active(u2).await.unwrap());
    assert_eq!(store.waiting_count().await.unwrap(), 0);
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn waiting_queue_is_fifo_by_score() {
    let store = fresh_store(300, 50).await;

    let users: Vec<UserId> = (0..3).map(|_| UserId::new()).collect();
    for (i, user) in users.iter().enumerate() {
        store.enqueue_waiting(*user, 1_000 + i as i64).await.unwrap();
    }

    assert_eq!(store.waiting_head(2).await.unwrap(), &users[..2]);
    assert_eq!(store.waiting_position(users[2]).await.unwrap(), Some(3));
    assert_eq!(store.waiting_members().await.unwrap(), users);
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn expired_marker_leaves_stale_membership_for_cleaner() {
    // Short TTL so the marker lapses while set membership remains; the
    // cleaner reconciles exactly this state.
    let store = fresh_store(1, 50).await;
    let user = UserId::new();

    assert!(store.try_admit(user).await.unwrap());
    tokio::time::sleep(std::time::Duration::from_millis(1500)).await;

    assert!(store.is_active(user).await.unwrap());
    assert!(!store.marker_exists(user).await.unwrap());
    assert!(store.marker_ttl(user).await.unwrap().is_none());

    store.remove_active(user).await.unwrap();
    assert!(!store.is_active(user).await.unwrap());
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn promotion_lock_is_exclusive() {
    let store = fresh_store(300, 50).await;

    assert!(store.try_promotion_lock().await.unwrap());
    assert!(!store.try_promotion_lock().await.unwrap());
    store.release_promotion_lock().await.unwrap();
    assert!(store.try_promotion_lock().await.unwrap());
    store.release_promotion_lock().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn cleanup_promotes_waiter_after_marker_expiry() {
    // Marker TTL of 1s so U1's session lapses quickly. The publisher points
    // at the configured broker but admission must not depend on it, so a
    // short send timeout keeps the test fast when Kafka is absent.
    let store = fresh_store(1, 50).await;
    store.set_limit(1).await.unwrap();

    let publisher = Arc::new(
        QueueEventPublisher::new("localhost:9092", Duration::from_millis(200)).unwrap(),
    );
    let hub = Arc::new(NotificationHub::new());
    let controller = AdmissionController::new(store.clone(), publisher, hub.clone(), 2);

    let u1 = UserId::new();
    let u2 = UserId::new();

    let direct = controller.join(u1).await.unwrap();
    assert_eq!(direct.queue_position, 0);

    let queued = controller.join(u2).await.unwrap();
    assert_eq!(queued.queue_position, 1);

    // U2 listens for the promotion push.
    let mut registration = hub.register(u2);

    // Let U1's marker lapse, then run the cleaner's pass.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let removed = controller.cleanup().await.unwrap();
    assert_eq!(removed, 1);

    assert!(!store.is_active(u1).await.unwrap());
    assert!(store.is_active(u2).await.unwrap());
    assert_eq!(store.waiting_count().await.unwrap(), 0);

    let frame = registration.receiver.recv().await.unwrap();
    let json: serde_json::Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(json["type"], "ACCESS_GRANTED");
    assert_eq!(json["payload"]["status"], "ACTIVE");
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn limit_defaults_when_unset() {
    let store = fresh_store(300, 50).await;
    assert_eq!(store.limit().await.unwrap(), 50);

    store.set_limit(3).await.unwrap();
    assert_eq!(store.limit().await.unwrap(), 3);

    // setLimit is idempotent on state.
    store.set_limit(3).await.unwrap();
    assert_eq!(store.limit().await.unwrap(), 3);
}
