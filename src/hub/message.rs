//! Server → client WebSocket message vocabulary.

use crate::types::{QueueState, SeatId, SeatStatus, SessionId, UserId};
use serde::Serialize;

/// A server-to-client frame, serialized as `{"type": ..., "payload": {...}}`.
#[derive(Debug, Clone, Serialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum WsEvent {
    /// Sent once right after a connection registers.
    WsConnected { message: String },
    /// The user may enter selection now.
    AccessGranted { message: String, status: QueueState },
    /// Companion to `AccessGranted` for clients listening on the promote
    /// channel.
    AutoPromote { message: String, status: QueueState },
    /// Broadcast queue telemetry; waiting users refine their position from
    /// the status endpoint.
    QueuePosition {
        position: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        active_count: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        limit: Option<i64>,
        estimated_wait_minutes: i64,
    },
    /// A seat changed state. `reservedBy` is null for AVAILABLE/OCCUPIED.
    SeatStatusUpdate {
        seat_id: SeatId,
        status: SeatStatus,
        reserved_by: Option<UserId>,
    },
    /// The seat map of a session was regrown or shrunk after a quota change.
    SeatsRegenerated {
        session_id: SessionId,
        new_quota: i32,
        message: String,
    },
}

impl WsEvent {
    /// The standard access-granted pair used by every admission path.
    #[must_use]
    pub fn access_granted(message: impl Into<String>) -> (Self, Self) {
        let message = message.into();
        (
            Self::AccessGranted {
                message: message.clone(),
                status: QueueState::Active,
            },
            Self::AutoPromote {
                message,
                status: QueueState::Active,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn frames_carry_type_and_payload() {
        let frame = WsEvent::WsConnected {
            message: "Connected to real-time update hub".to_string(),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "WS_CONNECTED");
        assert_eq!(json["payload"]["message"], "Connected to real-time update hub");
    }

    #[test]
    fn seat_update_serializes_null_reserver() {
        let frame = WsEvent::SeatStatusUpdate {
            seat_id: SeatId::from_uuid(Uuid::nil()),
            status: SeatStatus::Available,
            reserved_by: None,
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "SEAT_STATUS_UPDATE");
        assert_eq!(json["payload"]["status"], "AVAILABLE");
        assert!(json["payload"]["reservedBy"].is_null());
    }

    #[test]
    fn queue_position_omits_unknown_counts() {
        let frame = WsEvent::QueuePosition {
            position: 3,
            active_count: None,
            limit: None,
            estimated_wait_minutes: 6,
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["payload"]["position"], 3);
        assert_eq!(json["payload"]["estimatedWaitMinutes"], 6);
        assert!(json["payload"].get("activeCount").is_none());
        assert!(json["payload"].get("limit").is_none());
    }

    #[test]
    fn access_granted_pair_shares_message() {
        let (granted, promote) = WsEvent::access_granted("Your turn!");
        let granted = serde_json::to_value(&granted).unwrap();
        let promote = serde_json::to_value(&promote).unwrap();
        assert_eq!(granted["type"], "ACCESS_GRANTED");
        assert_eq!(promote["type"], "AUTO_PROMOTE");
        assert_eq!(granted["payload"]["status"], "ACTIVE");
        assert_eq!(granted["payload"]["message"], promote["payload"]["message"]);
    }
}
