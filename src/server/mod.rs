//! HTTP server: application state, router and health checks.

mod health;
mod routes;
mod state;

pub use health::health_check;
pub use routes::build_router;
pub use state::AppState;
