//! Seat endpoints: reserve, release, seat map and the caller's live hold.

use super::seat_error;
use crate::auth::ActiveUser;
use crate::error::AppError;
use crate::seats::SeatReservation;
use crate::server::AppState;
use crate::store::SeatHold;
use crate::types::{Seat, SeatId, SessionId};
use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct ReserveResponse {
    pub success: bool,
    pub reservation: SeatReservation,
}

/// POST `/api/workshops/seats/:id/reserve`
pub async fn reserve(
    State(state): State<AppState>,
    ActiveUser(user): ActiveUser,
    Path(seat_id): Path<Uuid>,
) -> Result<Json<ReserveResponse>, AppError> {
    let reservation = state
        .seats
        .reserve(user.user_id, SeatId::from_uuid(seat_id))
        .await
        .map_err(seat_error)?;

    Ok(Json(ReserveResponse {
        success: true,
        reservation,
    }))
}

#[derive(Debug, Serialize)]
pub struct ReleaseResponse {
    pub success: bool,
    pub message: String,
}

/// DELETE `/api/workshops/seats/:id/reserve`
pub async fn release(
    State(state): State<AppState>,
    ActiveUser(user): ActiveUser,
    Path(seat_id): Path<Uuid>,
) -> Result<Json<ReleaseResponse>, AppError> {
    state
        .seats
        .release(user.user_id, SeatId::from_uuid(seat_id))
        .await
        .map_err(seat_error)?;

    Ok(Json(ReleaseResponse {
        success: true,
        message: "Reservation released".to_string(),
    }))
}

#[derive(Debug, Serialize)]
pub struct SessionSeatsResponse {
    pub success: bool,
    pub seats: Vec<Seat>,
}

/// GET `/api/workshops/sessions/:id/seats`
pub async fn session_seats(
    State(state): State<AppState>,
    ActiveUser(_user): ActiveUser,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionSeatsResponse>, AppError> {
    let seats = state
        .seats
        .list_session_seats(SessionId::from_uuid(session_id))
        .await
        .map_err(seat_error)?;

    Ok(Json(SessionSeatsResponse {
        success: true,
        seats,
    }))
}

#[derive(Debug, Serialize)]
pub struct MyReservationResponse {
    pub success: bool,
    pub reservation: Option<SeatHold>,
}

/// GET `/api/workshops/my-seat-reservation`
pub async fn my_reservation(
    State(state): State<AppState>,
    ActiveUser(user): ActiveUser,
) -> Result<Json<MyReservationResponse>, AppError> {
    let reservation = state
        .seats
        .current_hold(user.user_id)
        .await
        .map_err(seat_error)?;

    Ok(Json(MyReservationResponse {
        success: true,
        reservation,
    }))
}
