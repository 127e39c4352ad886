//! Queue event bus (Kafka).
//!
//! A single-partition FIFO topic `queue.join` carries queue-lifecycle
//! events, consumed serially by one consumer group. The publisher and
//! consumer live in their own submodules; this module defines the wire
//! format and topic contract.
//!
//! FIFO contract: ordering is guaranteed only among users that contended
//! (whose `REQUEST_JOIN` entered the topic while the active set was full).
//! The opportunistic admit paths in the admission controller may admit a
//! user ahead of un-consumed bus entries when capacity is free.

mod consumer;
mod publisher;

pub use consumer::QueueJoinConsumer;
pub use publisher::{ensure_queue_topic, QueueEventPublisher};

use crate::types::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The single queue-lifecycle topic.
pub const QUEUE_TOPIC: &str = "queue.join";

/// The one consumer group processing the topic serially.
pub const CONSUMER_GROUP: &str = "queue-processor";

/// Errors from the event bus.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// Could not create or connect a Kafka client.
    #[error("event bus connection failed: {0}")]
    ConnectionFailed(String),
    /// A publish did not reach the broker.
    #[error("failed to publish to {topic}: {reason}")]
    PublishFailed { topic: String, reason: String },
    /// Subscription setup failed.
    #[error("failed to subscribe to {topic}: {reason}")]
    SubscriptionFailed { topic: String, reason: String },
}

/// Lifecycle event kinds on `queue.join`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueEventKind {
    /// User arrived while full; the consumer owns their eventual admission.
    RequestJoin,
    /// User was admitted directly by the join path (observational).
    Activated,
    /// User was appended to the waiting queue (observational).
    Queued,
    /// User was moved from waiting to active by a promotion pass.
    Promoted,
}

/// A queue-lifecycle event. Keyed by `userId` on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEvent {
    #[serde(rename = "userId")]
    pub user_id: UserId,
    pub event: QueueEventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

impl QueueEvent {
    /// Build an event stamped with the current time.
    #[must_use]
    pub fn now(user_id: UserId, event: QueueEventKind) -> Self {
        Self {
            user_id,
            event,
            position: None,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_wire_spelling() {
        assert_eq!(
            serde_json::to_string(&QueueEventKind::RequestJoin).unwrap(),
            "\"REQUEST_JOIN\""
        );
        assert_eq!(
            serde_json::to_string(&QueueEventKind::Promoted).unwrap(),
            "\"PROMOTED\""
        );
    }

    #[test]
    fn event_json_shape() {
        let event = QueueEvent::now(UserId::new(), QueueEventKind::Activated);
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("userId").is_some());
        assert_eq!(json["event"], "ACTIVATED");
        assert!(json.get("position").is_none());
        assert!(json.get("timestamp").is_some());
    }

    #[test]
    fn event_round_trip() {
        let raw = r#"{"userId":"00000000-0000-0000-0000-000000000001","event":"REQUEST_JOIN","timestamp":"2026-02-13T08:00:00Z"}"#;
        let event: QueueEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.event, QueueEventKind::RequestJoin);
        assert!(event.position.is_none());
    }
}
