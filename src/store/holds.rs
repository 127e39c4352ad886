//! Transient seat holds and per-seat locks.
//!
//! A hold (`seat_reservation:{userId}`, HASH with 5-minute TTL) is the
//! shared-state shadow of a durable RESERVED seat row. The durable row is
//! authoritative; when the hold lapses the cleaner's sweep reverts the row.
//! Per-seat locks (`seat_lock:{seatId}`, 10 s) serialize reservation
//! attempts on a single seat across instances.

use super::StoreError;
use crate::types::{SeatId, UserId};
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;

/// A user's live seat hold.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatHold {
    pub seat_id: SeatId,
    pub seat_number: String,
    pub reserved_at: DateTime<Utc>,
    /// Remaining seconds until the hold lapses.
    pub expires_in: i64,
}

/// Redis-backed store for seat holds and seat locks.
#[derive(Clone)]
pub struct SeatHoldStore {
    conn: ConnectionManager,
    hold_ttl: u64,
    seat_lock_ttl: u64,
}

impl SeatHoldStore {
    /// Create a store over an existing connection manager.
    #[must_use]
    pub const fn new(conn: ConnectionManager, hold_ttl: u64, seat_lock_ttl: u64) -> Self {
        Self {
            conn,
            hold_ttl,
            seat_lock_ttl,
        }
    }

    fn hold_key(user_id: UserId) -> String {
        format!("seat_reservation:{user_id}")
    }

    fn lock_key(seat_id: SeatId) -> String {
        format!("seat_lock:{seat_id}")
    }

    /// Hold TTL in seconds (also the `expiresIn` reported on reservation).
    #[must_use]
    pub const fn hold_ttl(&self) -> u64 {
        self.hold_ttl
    }

    /// Write the user's hold with a fresh TTL, atomically with its expiry.
    pub async fn write_hold(
        &self,
        user_id: UserId,
        seat_id: SeatId,
        seat_number: &str,
        reserved_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let key = Self::hold_key(user_id);
        let _: () = redis::pipe()
            .atomic()
            .hset_multiple(
                &key,
                &[
                    ("seatId", seat_id.to_string()),
                    ("seatNumber", seat_number.to_string()),
                    ("reservedAt", reserved_at.to_rfc3339()),
                ],
            )
            .ignore()
            .expire(&key, self.hold_ttl as i64)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    /// Read the user's live hold, if any.
    pub async fn read_hold(&self, user_id: UserId) -> Result<Option<SeatHold>, StoreError> {
        let mut conn = self.conn.clone();
        let key = Self::hold_key(user_id);
        let fields: HashMap<String, String> = conn.hgetall(&key).await?;
        if fields.is_empty() {
            return Ok(None);
        }

        let Some(seat_id) = fields.get("seatId").and_then(|s| SeatId::from_str(s).ok()) else {
            return Ok(None);
        };
        let reserved_at = fields
            .get("reservedAt")
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map_or_else(Utc::now, |t| t.with_timezone(&Utc));
        let ttl: i64 = conn.ttl(&key).await?;

        Ok(Some(SeatHold {
            seat_id,
            seat_number: fields.get("seatNumber").cloned().unwrap_or_default(),
            reserved_at,
            expires_in: ttl.max(0),
        }))
    }

    /// Delete the user's hold.
    pub async fn clear_hold(&self, user_id: UserId) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(Self::hold_key(user_id)).await?;
        Ok(())
    }

    /// Try to take the short exclusive lock on one seat. The value records
    /// the holder for debugging; expiry guards against crashed holders.
    pub async fn try_seat_lock(&self, seat_id: SeatId, user_id: UserId) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let acquired: Option<String> = redis::cmd("SET")
            .arg(Self::lock_key(seat_id))
            .arg(user_id.to_string())
            .arg("NX")
            .arg("EX")
            .arg(self.seat_lock_ttl)
            .query_async(&mut conn)
            .await?;
        Ok(acquired.is_some())
    }

    /// Release the seat lock.
    pub async fn release_seat_lock(&self, seat_id: SeatId) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(Self::lock_key(seat_id)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced() {
        let user = UserId::new();
        let seat = SeatId::new();
        assert_eq!(
            SeatHoldStore::hold_key(user),
            format!("seat_reservation:{user}")
        );
        assert_eq!(SeatHoldStore::lock_key(seat), format!("seat_lock:{seat}"));
    }
}
