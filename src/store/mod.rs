//! Shared-state store (Redis) access.
//!
//! All admission state lives here: the active-user set, the timestamp-scored
//! waiting queue, per-user session markers, the mutable concurrency limit,
//! distributed locks and transient seat holds. Every multi-key mutation goes
//! through a pipelined atomic block or a server-side script so no partial
//! state is ever visible.

mod admission;
mod holds;

pub use admission::AdmissionStore;
pub use holds::{SeatHold, SeatHoldStore};

use redis::aio::ConnectionManager;
use redis::Client;

/// Errors from the shared-state store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying Redis operation failed.
    #[error("redis operation failed: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Connect to Redis and return a pooled connection manager.
///
/// # Errors
///
/// Returns [`StoreError::Redis`] if the client cannot be created or the
/// initial connection fails.
pub async fn connect(redis_url: &str) -> Result<ConnectionManager, StoreError> {
    let client = Client::open(redis_url)?;
    let manager = ConnectionManager::new(client).await?;
    Ok(manager)
}
