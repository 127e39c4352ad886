//! Router configuration.

use super::health::health_check;
use super::state::AppState;
use crate::api::{enrollment, mentor, queue, seats, websocket};
use axum::{
    http::{header, HeaderValue, Method},
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the complete router: queue, enrollment, seat and mentor routes
/// under `/api`, the WebSocket upgrade at `/ws`, and an unauthenticated
/// liveness check at `/health`.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Admission queue
        .route("/queue/join", post(queue::join))
        .route("/queue/status", get(queue::status))
        .route("/queue/heartbeat", post(queue::heartbeat))
        .route("/queue/leave", post(queue::leave))
        .route("/queue/limit", post(queue::set_limit))
        .route("/queue/metrics", get(queue::metrics))
        .route("/queue/active-users", get(queue::active_users))
        .route("/queue/waiting-users", get(queue::waiting_users))
        // Enrollment
        .route("/enrollment/add", post(enrollment::enroll))
        .route("/enrollment/my-workshops", get(enrollment::my_workshops))
        .route("/enrollment/:id", delete(enrollment::drop))
        // Seats
        .route("/workshops/sessions/:id/seats", get(seats::session_seats))
        .route("/workshops/seats/:id/reserve", post(seats::reserve))
        .route("/workshops/seats/:id/reserve", delete(seats::release))
        .route("/workshops/my-seat-reservation", get(seats::my_reservation))
        // Mentor operations
        .route("/mentor/workshops/quota", post(mentor::update_quota))
        .route(
            "/mentor/students/:id/credit-limit",
            put(mentor::update_credit_limit),
        );

    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(websocket::ws_handler))
        .nest("/api", api_routes)
        .layer(cors_layer(&state.config.server.cors_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origin: &str) -> CorsLayer {
    let allow_origin = if origin == "*" {
        AllowOrigin::any()
    } else {
        match origin.parse::<HeaderValue>() {
            Ok(value) => AllowOrigin::exact(value),
            Err(_) => {
                tracing::warn!(origin, "invalid CORS_ORIGIN, allowing any origin");
                AllowOrigin::any()
            }
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
}
