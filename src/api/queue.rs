//! Queue endpoints: join, status, heartbeat, leave, limit, metrics and the
//! mentor views of the active/waiting sets.

use super::admission_error;
use crate::admission::QueueStatus;
use crate::auth::{AuthUser, MentorUser};
use crate::error::AppError;
use crate::server::AppState;
use crate::types::QueueState;
use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub success: bool,
    pub queue_position: i64,
    pub estimated_wait_minutes: i64,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// POST `/api/queue/join`
pub async fn join(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<JoinResponse>, AppError> {
    // Mentors bypass the queue; scrub any stale queue state they may have.
    if user.is_mentor() {
        state
            .admission
            .leave(user.user_id)
            .await
            .map_err(admission_error)?;
        return Ok(Json(JoinResponse {
            success: true,
            queue_position: 0,
            estimated_wait_minutes: 0,
            timestamp: Utc::now(),
            message: Some("Mentors skip the queue".to_string()),
        }));
    }

    let outcome = state
        .admission
        .join(user.user_id)
        .await
        .map_err(admission_error)?;

    Ok(Json(JoinResponse {
        success: true,
        queue_position: outcome.queue_position,
        estimated_wait_minutes: outcome.estimated_wait_minutes,
        timestamp: Utc::now(),
        message: None,
    }))
}

/// GET `/api/queue/status`
pub async fn status(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<QueueStatus>, AppError> {
    if user.is_mentor() {
        state
            .admission
            .leave(user.user_id)
            .await
            .map_err(admission_error)?;
        return Ok(Json(QueueStatus {
            in_queue: true,
            position: Some(0),
            status: Some(QueueState::Active),
            limit: None,
            active_count: None,
            remaining_seconds: None,
            estimated_wait_minutes: Some(0),
            estimated_wait_seconds: None,
            message: None,
            timestamp: Utc::now(),
        }));
    }

    let status = state
        .admission
        .status(user.user_id)
        .await
        .map_err(admission_error)?;
    Ok(Json(status))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    pub success: bool,
    pub message: String,
    pub remaining_seconds: i64,
    pub timestamp: DateTime<Utc>,
}

/// POST `/api/queue/heartbeat`
pub async fn heartbeat(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<HeartbeatResponse>, AppError> {
    let remaining = state
        .admission
        .heartbeat(user.user_id)
        .await
        .map_err(admission_error)?;

    Ok(Json(HeartbeatResponse {
        success: true,
        message: "Session active".to_string(),
        remaining_seconds: remaining,
        timestamp: Utc::now(),
    }))
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub success: bool,
    pub message: String,
}

/// POST `/api/queue/leave`
pub async fn leave(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<OkResponse>, AppError> {
    state
        .admission
        .leave(user.user_id)
        .await
        .map_err(admission_error)?;

    Ok(Json(OkResponse {
        success: true,
        message: "Left the queue".to_string(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct SetLimitRequest {
    pub limit: i64,
}

#[derive(Debug, Serialize)]
pub struct SetLimitResponse {
    pub success: bool,
    pub message: String,
    pub limit: i64,
}

/// POST `/api/queue/limit` (mentor)
pub async fn set_limit(
    State(state): State<AppState>,
    _mentor: MentorUser,
    Json(req): Json<SetLimitRequest>,
) -> Result<Json<SetLimitResponse>, AppError> {
    if req.limit < 0 {
        return Err(AppError::bad_request(
            "INVALID_REQUEST",
            "Limit must be non-negative",
        ));
    }

    state.admission.set_limit(req.limit).await.map_err(|e| {
        AppError::internal("UPDATE_FAILED", "Failed to update queue limit")
            .with_source(anyhow::anyhow!(e))
    })?;

    Ok(Json(SetLimitResponse {
        success: true,
        message: "Queue limit updated successfully".to_string(),
        limit: req.limit,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsResponse {
    pub success: bool,
    pub active_users: i64,
    pub waiting_users: i64,
    pub total_users: i64,
    pub limit: i64,
    pub timestamp: DateTime<Utc>,
}

/// GET `/api/queue/metrics`
pub async fn metrics(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Result<Json<MetricsResponse>, AppError> {
    let metrics = state.admission.metrics().await.map_err(admission_error)?;

    Ok(Json(MetricsResponse {
        success: true,
        active_users: metrics.active_users,
        waiting_users: metrics.waiting_users,
        total_users: metrics.active_users + metrics.waiting_users,
        limit: metrics.limit,
        timestamp: Utc::now(),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct QueueUsersResponse {
    pub success: bool,
    pub users: Vec<QueueUser>,
    pub count: usize,
}

/// GET `/api/queue/active-users` (mentor)
pub async fn active_users(
    State(state): State<AppState>,
    _mentor: MentorUser,
) -> Result<Json<QueueUsersResponse>, AppError> {
    let ids = state
        .admission
        .active_users()
        .await
        .map_err(admission_error)?;

    let mut users = Vec::with_capacity(ids.len());
    for user_id in ids {
        if let Some(user) = lookup_user(&state, *user_id.as_uuid()).await? {
            users.push(user);
        }
    }

    let count = users.len();
    Ok(Json(QueueUsersResponse {
        success: true,
        users,
        count,
    }))
}

/// GET `/api/queue/waiting-users` (mentor)
pub async fn waiting_users(
    State(state): State<AppState>,
    _mentor: MentorUser,
) -> Result<Json<QueueUsersResponse>, AppError> {
    let ids = state
        .admission
        .waiting_users()
        .await
        .map_err(admission_error)?;

    let mut users = Vec::with_capacity(ids.len());
    for (index, user_id) in ids.into_iter().enumerate() {
        if let Some(mut user) = lookup_user(&state, *user_id.as_uuid()).await? {
            user.position = Some(index + 1);
            users.push(user);
        }
    }

    let count = users.len();
    Ok(Json(QueueUsersResponse {
        success: true,
        users,
        count,
    }))
}

/// Resolve a queue member to their profile; `None` for stale entries whose
/// user row is gone.
async fn lookup_user(state: &AppState, id: Uuid) -> Result<Option<QueueUser>, AppError> {
    let row: Option<(String, String)> =
        sqlx::query_as("SELECT name, email FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&state.pool)
            .await
            .map_err(|e| {
                AppError::internal("FETCH_FAILED", "Failed to load user details")
                    .with_source(anyhow::anyhow!(e))
            })?;

    Ok(row.map(|(name, email)| QueueUser {
        id,
        name,
        email,
        position: None,
    }))
}
