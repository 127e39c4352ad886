//! Enrollment endpoints.

use super::enrollment_error;
use crate::auth::{ActiveUser, AuthUser};
use crate::enrollment::{EnrollmentOutcome, StudentEnrollments};
use crate::error::AppError;
use crate::server::AppState;
use crate::types::{EnrollmentId, SeatId, SessionId};
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollRequest {
    pub class_id: SessionId,
    pub seat_id: Option<SeatId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollResponse {
    pub success: bool,
    pub enrollment: EnrollmentOutcome,
    pub total_credits: i64,
}

/// POST `/api/enrollment/add`. Requires a live admission session.
pub async fn enroll(
    State(state): State<AppState>,
    ActiveUser(user): ActiveUser,
    Json(req): Json<EnrollRequest>,
) -> Result<Json<EnrollResponse>, AppError> {
    let outcome = state
        .enrollment
        .enroll(user.user_id, req.class_id, req.seat_id)
        .await
        .map_err(enrollment_error)?;

    let total_credits = outcome.total_credits;
    Ok(Json(EnrollResponse {
        success: true,
        enrollment: outcome,
        total_credits,
    }))
}

#[derive(Debug, Serialize)]
pub struct DropResponse {
    pub success: bool,
    pub message: String,
}

/// DELETE `/api/enrollment/:id`. Requires a live admission session.
pub async fn drop(
    State(state): State<AppState>,
    ActiveUser(user): ActiveUser,
    Path(enrollment_id): Path<Uuid>,
) -> Result<Json<DropResponse>, AppError> {
    state
        .enrollment
        .drop_enrollment(user.user_id, EnrollmentId::from_uuid(enrollment_id))
        .await
        .map_err(enrollment_error)?;

    Ok(Json(DropResponse {
        success: true,
        message: "Workshop dropped successfully".to_string(),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MyWorkshopsResponse {
    pub success: bool,
    #[serde(flatten)]
    pub enrollments: StudentEnrollments,
}

/// GET `/api/enrollment/my-workshops`
pub async fn my_workshops(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<MyWorkshopsResponse>, AppError> {
    let enrollments = state
        .enrollment
        .list_student_enrollments(user.user_id)
        .await
        .map_err(enrollment_error)?;

    Ok(Json(MyWorkshopsResponse {
        success: true,
        enrollments,
    }))
}
