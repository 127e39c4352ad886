//! Seat reservation: short-lived exclusive holds bridged to durable rows.
//!
//! Reservation is linearizable per seat (Postgres row lock inside a
//! Redis per-seat lock) and per user-session pair (the single-hold
//! invariant releases any prior RESERVED seat inside the same
//! transaction). Broadcasts are deferred until after commit so no client
//! ever observes a state the transaction could still roll back.

use crate::hub::{NotificationHub, WsEvent};
use crate::store::{SeatHold, SeatHoldStore, StoreError};
use crate::types::{Seat, SeatId, SeatStatus, SessionId, UserId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Errors from seat operations.
#[derive(Debug, thiserror::Error)]
pub enum SeatError {
    #[error("seat not found")]
    SeatNotFound,
    #[error("seat is not available")]
    SeatNotAvailable,
    #[error("seat is being reserved by another user")]
    SeatLockedByAnotherUser,
    #[error("already enrolled in this session")]
    AlreadyEnrolledInSession,
    #[error("seat is not reserved by this user")]
    NotYourReservation,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A confirmed reservation returned to the reserving client.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatReservation {
    pub seat_id: SeatId,
    pub seat_number: String,
    pub reserved_at: DateTime<Utc>,
    /// Seconds until the hold lapses.
    pub expires_in: i64,
}

/// Acquire/release seat holds and keep durable rows in step.
pub struct SeatManager {
    pool: PgPool,
    holds: SeatHoldStore,
    hub: Arc<NotificationHub>,
}

impl SeatManager {
    /// Create a seat manager.
    #[must_use]
    pub fn new(pool: PgPool, holds: SeatHoldStore, hub: Arc<NotificationHub>) -> Self {
        Self { pool, holds, hub }
    }

    /// Reserve a seat for the user.
    ///
    /// The per-seat Redis lock serializes racing reservers of the same
    /// seat; losers get [`SeatError::SeatLockedByAnotherUser`] immediately
    /// instead of piling up on the row lock.
    pub async fn reserve(
        &self,
        user_id: UserId,
        seat_id: SeatId,
    ) -> Result<SeatReservation, SeatError> {
        if !self.holds.try_seat_lock(seat_id, user_id).await? {
            return Err(SeatError::SeatLockedByAnotherUser);
        }

        let result = self.reserve_locked(user_id, seat_id).await;

        if let Err(e) = self.holds.release_seat_lock(seat_id).await {
            warn!(error = %e, seat_id = %seat_id, "failed to release seat lock (will expire)");
        }

        result
    }

    async fn reserve_locked(
        &self,
        user_id: UserId,
        seat_id: SeatId,
    ) -> Result<SeatReservation, SeatError> {
        let mut tx = self.pool.begin().await?;

        let seat: Option<(String, String, Uuid)> = sqlx::query_as(
            "SELECT status, seat_number, workshop_session_id
             FROM seats
             WHERE id = $1
             FOR UPDATE",
        )
        .bind(seat_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;

        let Some((status, seat_number, session_id)) = seat else {
            return Err(SeatError::SeatNotFound);
        };

        // A user with an ACTIVE enrollment already occupies a seat (or chose
        // not to); they pick seats through enrollment changes, not holds.
        let enrolled: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM enrollments
             WHERE student_id = $1 AND class_id = $2 AND status = 'ACTIVE'",
        )
        .bind(user_id.as_uuid())
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await?;

        if enrolled.is_some() {
            return Err(SeatError::AlreadyEnrolledInSession);
        }

        // One hold per user per session: release any other RESERVED seat of
        // this user inside the same transaction, and broadcast its release
        // only after commit.
        let existing: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM seats
             WHERE workshop_session_id = $1 AND reserved_by = $2 AND status = 'RESERVED'",
        )
        .bind(session_id)
        .bind(user_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;

        let mut released_seat = None;
        let re_reserving_own = existing.as_ref().is_some_and(|(id,)| id == seat_id.as_uuid());
        if let Some((existing_id,)) = existing {
            if existing_id != *seat_id.as_uuid() {
                sqlx::query(
                    "UPDATE seats
                     SET status = 'AVAILABLE', reserved_by = NULL, reserved_at = NULL
                     WHERE id = $1",
                )
                .bind(existing_id)
                .execute(&mut *tx)
                .await?;
                released_seat = Some(SeatId::from_uuid(existing_id));
            }
        }

        if status != SeatStatus::Available.as_str() && !re_reserving_own {
            return Err(SeatError::SeatNotAvailable);
        }

        let reserved_at = Utc::now();
        sqlx::query(
            "UPDATE seats
             SET status = 'RESERVED', reserved_by = $1, reserved_at = $2
             WHERE id = $3",
        )
        .bind(user_id.as_uuid())
        .bind(reserved_at)
        .bind(seat_id.as_uuid())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if let Some(released) = released_seat {
            self.hub.broadcast(&WsEvent::SeatStatusUpdate {
                seat_id: released,
                status: SeatStatus::Available,
                reserved_by: None,
            });
            info!(user_id = %user_id, released = %released, "released prior hold in session");
        }

        // The durable row is authoritative; if the hold write fails the
        // sweep reverts the row when the reservation window lapses.
        if let Err(e) = self
            .holds
            .write_hold(user_id, seat_id, &seat_number, reserved_at)
            .await
        {
            warn!(error = %e, user_id = %user_id, seat_id = %seat_id, "failed to write seat hold");
        }

        self.hub.broadcast(&WsEvent::SeatStatusUpdate {
            seat_id,
            status: SeatStatus::Reserved,
            reserved_by: Some(user_id),
        });

        info!(user_id = %user_id, seat_id = %seat_id, seat_number = %seat_number, "seat reserved");

        Ok(SeatReservation {
            seat_id,
            seat_number,
            reserved_at,
            expires_in: self.holds.hold_ttl() as i64,
        })
    }

    /// Release the user's reservation on a seat.
    pub async fn release(&self, user_id: UserId, seat_id: SeatId) -> Result<(), SeatError> {
        let row: Option<(Option<Uuid>,)> =
            sqlx::query_as("SELECT reserved_by FROM seats WHERE id = $1")
                .bind(seat_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        let Some((reserved_by,)) = row else {
            return Err(SeatError::SeatNotFound);
        };
        if reserved_by != Some(*user_id.as_uuid()) {
            return Err(SeatError::NotYourReservation);
        }

        sqlx::query(
            "UPDATE seats
             SET status = 'AVAILABLE', reserved_by = NULL, reserved_at = NULL
             WHERE id = $1",
        )
        .bind(seat_id.as_uuid())
        .execute(&self.pool)
        .await?;

        if let Err(e) = self.holds.clear_hold(user_id).await {
            warn!(error = %e, user_id = %user_id, "failed to clear seat hold");
        }

        self.hub.broadcast(&WsEvent::SeatStatusUpdate {
            seat_id,
            status: SeatStatus::Available,
            reserved_by: None,
        });

        info!(user_id = %user_id, seat_id = %seat_id, "seat released");
        Ok(())
    }

    /// Revert durable seats whose reservation window lapsed. No broadcasts:
    /// clients refresh the map on reconnect. Returns the number reverted.
    pub async fn expire_sweep(&self) -> Result<u64, SeatError> {
        let result = sqlx::query(
            "UPDATE seats
             SET status = 'AVAILABLE', reserved_by = NULL, reserved_at = NULL
             WHERE status = 'RESERVED'
               AND reserved_at < now() - INTERVAL '5 minutes'",
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Full seat map of a session in row-major order.
    pub async fn list_session_seats(&self, session_id: SessionId) -> Result<Vec<Seat>, SeatError> {
        let rows: Vec<(
            Uuid,
            String,
            String,
            i32,
            String,
            Option<Uuid>,
            Option<DateTime<Utc>>,
        )> = sqlx::query_as(
            "SELECT id, seat_number, row_letter, column_number, status, reserved_by, reserved_at
             FROM seats
             WHERE workshop_session_id = $1
             ORDER BY length(row_letter), row_letter, column_number",
        )
        .bind(session_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(
                |(id, seat_number, row_letter, column_number, status, reserved_by, reserved_at)| {
                    let status = SeatStatus::from_str(&status).ok()?;
                    Some(Seat {
                        id: SeatId::from_uuid(id),
                        workshop_session_id: session_id,
                        seat_number,
                        row_letter,
                        column_number,
                        status,
                        reserved_by: reserved_by.map(UserId::from_uuid),
                        reserved_at,
                    })
                },
            )
            .collect())
    }

    /// The user's live hold, if any.
    pub async fn current_hold(&self, user_id: UserId) -> Result<Option<SeatHold>, SeatError> {
        Ok(self.holds.read_hold(user_id).await?)
    }
}
