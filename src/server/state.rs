//! Application state shared across HTTP handlers.

use crate::admission::AdmissionController;
use crate::auth::TokenVerifier;
use crate::config::Config;
use crate::enrollment::EnrollmentEngine;
use crate::hub::NotificationHub;
use crate::seats::SeatManager;
use axum::extract::FromRef;
use sqlx::PgPool;
use std::sync::Arc;

/// Shared dependencies, cloned cheaply (via `Arc`) per request.
#[derive(Clone)]
pub struct AppState {
    /// Configuration (for accessing settings in handlers)
    pub config: Arc<Config>,
    /// Durable store pool, for the few direct lookups handlers make
    pub pool: PgPool,
    /// Admission controller (queue operations)
    pub admission: Arc<AdmissionController>,
    /// Notification hub (the only notification sink)
    pub hub: Arc<NotificationHub>,
    /// Enrollment engine
    pub enrollment: Arc<EnrollmentEngine>,
    /// Seat manager
    pub seats: Arc<SeatManager>,
    /// Bearer-token verifier
    pub verifier: Arc<TokenVerifier>,
}

impl FromRef<AppState> for Arc<Config> {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
