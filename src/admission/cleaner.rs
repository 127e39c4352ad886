//! Periodic cleanup worker.
//!
//! Every tick: drop active members whose session marker lapsed (vacating
//! their slots and promoting waiters), then revert durable seats whose
//! reservation hold expired. Both passes are idempotent and best-effort;
//! errors are logged and the next tick retries.

use super::AdmissionController;
use crate::seats::SeatManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Background cleaner for expired admission sessions and seat holds.
pub struct SlotCleaner {
    controller: Arc<AdmissionController>,
    seats: Arc<SeatManager>,
    interval: Duration,
    shutdown: broadcast::Receiver<()>,
}

impl SlotCleaner {
    /// Create a cleaner ticking at `interval`.
    #[must_use]
    pub fn new(
        controller: Arc<AdmissionController>,
        seats: Arc<SeatManager>,
        interval: Duration,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            controller,
            seats,
            interval,
            shutdown,
        }
    }

    /// Spawn the cleaner as a background task.
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(mut self) {
        info!(interval = ?self.interval, "slot cleaner started");
        let mut ticker = tokio::time::interval(self.interval);
        // The immediate first tick would race startup; skip it.
        ticker.tick().await;

        loop {
            let stop = tokio::select! {
                _ = self.shutdown.recv() => true,
                _ = ticker.tick() => false,
            };
            if stop {
                info!("slot cleaner received shutdown signal");
                break;
            }
            self.sweep().await;
        }

        info!("slot cleaner stopped");
    }

    async fn sweep(&self) {
        match self.controller.cleanup().await {
            Ok(0) => debug!("no expired slots"),
            Ok(removed) => info!(removed, "cleaned up expired slots"),
            Err(e) => warn!(error = %e, "slot cleanup failed"),
        }

        match self.seats.expire_sweep().await {
            Ok(0) => {}
            Ok(reverted) => info!(reverted, "reverted expired seat reservations"),
            Err(e) => warn!(error = %e, "seat hold sweep failed"),
        }
    }
}
