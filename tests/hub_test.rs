//! Notification hub behavior tests.
//!
//! The hub is pure in-process state, so these run without any external
//! services.

#![allow(clippy::unwrap_used)]

use workshop_gateway::hub::{NotificationHub, WsEvent, OUTBOUND_BUFFER};
use workshop_gateway::types::{QueueState, SeatId, SeatStatus, UserId};

fn connected() -> WsEvent {
    WsEvent::WsConnected {
        message: "hello".to_string(),
    }
}

#[tokio::test]
async fn unicast_reaches_registered_client() {
    let hub = NotificationHub::new();
    let user = UserId::new();
    let mut registration = hub.register(user);

    hub.unicast(user, &connected());

    let frame = registration.receiver.recv().await.unwrap();
    let json: serde_json::Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(json["type"], "WS_CONNECTED");
    assert_eq!(json["payload"]["message"], "hello");
}

#[tokio::test]
async fn unicast_to_other_user_is_not_delivered() {
    let hub = NotificationHub::new();
    let user = UserId::new();
    let other = UserId::new();
    let mut registration = hub.register(user);

    hub.unicast(other, &connected());

    assert!(registration.receiver.try_recv().is_err());
}

#[tokio::test]
async fn broadcast_reaches_every_client() {
    let hub = NotificationHub::new();
    let mut receivers = Vec::new();
    for _ in 0..5 {
        receivers.push(hub.register(UserId::new()).receiver);
    }

    hub.broadcast(&WsEvent::QueuePosition {
        position: 4,
        active_count: Some(2),
        limit: Some(2),
        estimated_wait_minutes: 8,
    });

    for receiver in &mut receivers {
        let frame = receiver.recv().await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(json["type"], "QUEUE_POSITION");
        assert_eq!(json["payload"]["position"], 4);
        assert_eq!(json["payload"]["activeCount"], 2);
    }
}

#[tokio::test]
async fn second_registration_replaces_first() {
    let hub = NotificationHub::new();
    let user = UserId::new();

    let mut first = hub.register(user);
    let mut second = hub.register(user);
    assert_eq!(hub.client_count(), 1);

    // The first connection's channel is closed by the replacement.
    assert!(first.receiver.recv().await.is_none());

    // Frames flow to the new connection only.
    hub.unicast(user, &connected());
    assert!(second.receiver.recv().await.is_some());
}

#[tokio::test]
async fn stale_unregister_keeps_newer_connection() {
    let hub = NotificationHub::new();
    let user = UserId::new();

    let first = hub.register(user);
    let mut second = hub.register(user);

    // The old socket tears down after the replacement; its unregister must
    // not evict the live connection.
    hub.unregister(user, first.connection_id);
    assert_eq!(hub.client_count(), 1);

    hub.unicast(user, &connected());
    assert!(second.receiver.recv().await.is_some());

    hub.unregister(user, second.connection_id);
    assert_eq!(hub.client_count(), 0);
}

#[tokio::test]
async fn full_buffer_disconnects_client() {
    let hub = NotificationHub::new();
    let user = UserId::new();
    // Keep the receiver alive but never drain it.
    let _registration = hub.register(user);

    let event = WsEvent::SeatStatusUpdate {
        seat_id: SeatId::new(),
        status: SeatStatus::Reserved,
        reserved_by: Some(user),
    };
    for _ in 0..OUTBOUND_BUFFER {
        hub.unicast(user, &event);
    }
    assert_eq!(hub.client_count(), 1);

    // One past capacity: backpressure policy is disconnect, not stall.
    hub.unicast(user, &event);
    assert_eq!(hub.client_count(), 0);
}

#[tokio::test]
async fn slow_client_dropped_from_broadcast_without_stalling_others() {
    let hub = NotificationHub::new();
    let slow = UserId::new();
    let fast = UserId::new();
    let _slow_registration = hub.register(slow);
    let mut fast_registration = hub.register(fast);

    let event = WsEvent::AccessGranted {
        message: "go".to_string(),
        status: QueueState::Active,
    };
    // Saturate the slow client's buffer while draining the fast one.
    for _ in 0..=OUTBOUND_BUFFER {
        hub.broadcast(&event);
        while fast_registration.receiver.try_recv().is_ok() {}
    }

    assert_eq!(hub.client_count(), 1);
    hub.broadcast(&event);
    assert!(fast_registration.receiver.recv().await.is_some());
}
