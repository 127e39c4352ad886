//! Mentor endpoints: quota management and per-student credit limits.

use super::enrollment_error;
use crate::auth::MentorUser;
use crate::error::AppError;
use crate::server::AppState;
use crate::types::{SessionId, UserId};
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateQuotaRequest {
    pub class_id: SessionId,
    pub new_quota: i32,
}

#[derive(Debug, Serialize)]
pub struct UpdateQuotaResponse {
    pub success: bool,
    pub message: String,
}

/// POST `/api/mentor/workshops/quota`
///
/// Updates the quota and conforms the seat map in the same transaction, so
/// a failed shrink (occupied seats in the tail) leaves both untouched.
pub async fn update_quota(
    State(state): State<AppState>,
    MentorUser(mentor): MentorUser,
    Json(req): Json<UpdateQuotaRequest>,
) -> Result<Json<UpdateQuotaResponse>, AppError> {
    if req.new_quota < 0 {
        return Err(AppError::bad_request(
            "INVALID_REQUEST",
            "Quota must be non-negative",
        ));
    }

    state
        .enrollment
        .update_quota(mentor.user_id, req.class_id, req.new_quota)
        .await
        .map_err(enrollment_error)?;

    Ok(Json(UpdateQuotaResponse {
        success: true,
        message: "Quota updated and seats synced".to_string(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditLimitRequest {
    pub max_credits: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditLimitResponse {
    pub success: bool,
    pub message: String,
    pub max_credits: i32,
}

/// PUT `/api/mentor/students/:id/credit-limit`
pub async fn update_credit_limit(
    State(state): State<AppState>,
    MentorUser(_mentor): MentorUser,
    Path(student_user_id): Path<Uuid>,
    Json(req): Json<CreditLimitRequest>,
) -> Result<Json<CreditLimitResponse>, AppError> {
    state
        .enrollment
        .update_student_credit_limit(UserId::from_uuid(student_user_id), req.max_credits)
        .await
        .map_err(enrollment_error)?;

    Ok(Json(CreditLimitResponse {
        success: true,
        message: "Credit limit updated".to_string(),
        max_credits: req.max_credits,
    }))
}
