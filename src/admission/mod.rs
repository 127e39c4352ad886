//! Admission control: the global cap on concurrent selection sessions.
//!
//! State machine per user: `OUT → WAITING` (join when full) → `ACTIVE`
//! (consumer admit or promotion) → `OUT` (leave / TTL expiry / cleanup).
//! `OUT → ACTIVE` directly when a slot is free. There is no
//! `ACTIVE → WAITING` transition.

mod cleaner;
mod controller;

pub use cleaner::SlotCleaner;
pub use controller::{AdmissionController, JoinOutcome, QueueMetrics, QueueStatus};

use crate::store::StoreError;

/// Errors from admission operations.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    /// The user has no live admission session.
    #[error("user is not in an active session")]
    NotActive,
    /// The shared-state store failed; retryable.
    #[error(transparent)]
    Store(#[from] StoreError),
}
