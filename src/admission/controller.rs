//! Join, status, heartbeat, leave, limit and promotion operations.

use super::AdmissionError;
use crate::bus::{QueueEvent, QueueEventKind, QueueEventPublisher};
use crate::hub::{NotificationHub, WsEvent};
use crate::store::AdmissionStore;
use crate::types::{QueueState, UserId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Fallback estimated wait when no active marker TTL is readable, seconds.
const DEFAULT_WAIT_SECONDS: i64 = 120;

/// Result of a join request.
///
/// `queue_position` 0 means direct access. For queued users the position is
/// the coarse placeholder 1; the authoritative position comes from the
/// status endpoint, which clients poll (or receive pushes) after joining.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinOutcome {
    pub queue_position: i64,
    pub estimated_wait_minutes: i64,
}

/// Queue status as reported to one user.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub in_queue: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<QueueState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_wait_minutes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_wait_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl QueueStatus {
    fn active(limit: i64, remaining_seconds: i64) -> Self {
        Self {
            in_queue: true,
            position: Some(0),
            status: Some(QueueState::Active),
            limit: Some(limit),
            active_count: None,
            remaining_seconds: Some(remaining_seconds),
            estimated_wait_minutes: None,
            estimated_wait_seconds: None,
            message: None,
            timestamp: Utc::now(),
        }
    }

    fn expired() -> Self {
        Self {
            in_queue: false,
            position: None,
            status: None,
            limit: None,
            active_count: None,
            remaining_seconds: None,
            estimated_wait_minutes: None,
            estimated_wait_seconds: None,
            message: Some("Session expired".to_string()),
            timestamp: Utc::now(),
        }
    }

    /// Whether this status grants entry to the selection surface.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.in_queue && self.status == Some(QueueState::Active)
    }
}

/// Queue telemetry for the metrics endpoint.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueMetrics {
    pub active_users: i64,
    pub waiting_users: i64,
    pub limit: i64,
}

/// The admission controller.
///
/// All writes to the active set funnel through the store's atomic admit
/// script, so the concurrent paths (join, opportunistic status promotion,
/// the bus consumer, the cleaner's promotion pass) can race freely without
/// ever exceeding the limit.
pub struct AdmissionController {
    store: AdmissionStore,
    publisher: Arc<QueueEventPublisher>,
    hub: Arc<NotificationHub>,
    eta_minutes_per_position: i64,
}

impl AdmissionController {
    /// Create a controller.
    #[must_use]
    pub fn new(
        store: AdmissionStore,
        publisher: Arc<QueueEventPublisher>,
        hub: Arc<NotificationHub>,
        eta_minutes_per_position: i64,
    ) -> Self {
        Self {
            store,
            publisher,
            hub,
            eta_minutes_per_position,
        }
    }

    /// Access the underlying store (used by the bus consumer and tests).
    #[must_use]
    pub const fn store(&self) -> &AdmissionStore {
        &self.store
    }

    /// Handle a join request: direct access when a slot is free, otherwise
    /// enqueue and hand the user to the bus consumer.
    pub async fn join(&self, user_id: UserId) -> Result<JoinOutcome, AdmissionError> {
        // Already admitted with a live marker: idempotent direct access.
        if self.store.is_active(user_id).await? {
            if self.store.marker_exists(user_id).await? {
                return Ok(JoinOutcome {
                    queue_position: 0,
                    estimated_wait_minutes: 0,
                });
            }
            // Marker lapsed but the cleaner has not run yet; vacate the
            // stale membership and fall through to a fresh admit.
            self.store.remove_active(user_id).await?;
        }

        if self.store.try_admit(user_id).await? {
            info!(user_id = %user_id, "direct access granted");
            self.publish_best_effort(QueueEvent::now(user_id, QueueEventKind::Activated))
                .await;
            return Ok(JoinOutcome {
                queue_position: 0,
                estimated_wait_minutes: 0,
            });
        }

        // Full: enqueue with a monotonic arrival score, then let the
        // consumer own the admission.
        let score = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        self.store.enqueue_waiting(user_id, score).await?;
        self.publish_best_effort(QueueEvent::now(user_id, QueueEventKind::RequestJoin))
            .await;

        info!(user_id = %user_id, "queued for admission");
        Ok(JoinOutcome {
            queue_position: 1,
            estimated_wait_minutes: self.eta_minutes_per_position,
        })
    }

    /// Report the user's queue status. For waiting users this is also an
    /// opportunistic promotion point: when their position is within the
    /// limit and a slot is free they are admitted on the spot.
    pub async fn status(&self, user_id: UserId) -> Result<QueueStatus, AdmissionError> {
        let limit = self.store.limit().await?;

        if self.store.is_active(user_id).await? {
            match self.store.marker_ttl(user_id).await? {
                Some(ttl) => return Ok(QueueStatus::active(limit, ttl)),
                None => {
                    self.store.remove_active(user_id).await?;
                    return Ok(QueueStatus::expired());
                }
            }
        }

        let position = self.store.waiting_position(user_id).await?.unwrap_or(0);
        let active_count = self.store.active_count().await?;
        debug!(user_id = %user_id, position, active_count, limit, "queue status");

        if position <= limit && active_count < limit && self.store.try_admit(user_id).await? {
            self.store.remove_waiting(user_id).await?;
            info!(user_id = %user_id, "opportunistically promoted on status check");

            self.publish_best_effort(QueueEvent::now(user_id, QueueEventKind::Promoted))
                .await;
            let (granted, promote) = WsEvent::access_granted("You have been automatically promoted!");
            self.hub.unicast(user_id, &granted);
            self.hub.unicast(user_id, &promote);

            let ttl = self.store.marker_ttl(user_id).await?.unwrap_or_default();
            let mut status = QueueStatus::active(limit, ttl);
            status.active_count = Some(active_count + 1);
            status.message = Some("You have been automatically promoted!".to_string());
            return Ok(status);
        }

        let wait_seconds = self.estimated_wait_seconds(active_count, limit).await?;
        Ok(QueueStatus {
            in_queue: true,
            position: Some(position),
            status: Some(QueueState::Waiting),
            limit: Some(limit),
            active_count: Some(active_count),
            remaining_seconds: None,
            estimated_wait_minutes: Some(wait_seconds / 60),
            estimated_wait_seconds: Some(wait_seconds),
            message: Some("Waiting for next slot to open...".to_string()),
            timestamp: Utc::now(),
        })
    }

    /// Report the remaining session time. Deliberately does NOT extend the
    /// marker TTL: admission time is fixed to force turnover.
    pub async fn heartbeat(&self, user_id: UserId) -> Result<i64, AdmissionError> {
        if !self.store.is_active(user_id).await? {
            return Err(AdmissionError::NotActive);
        }
        self.store
            .marker_ttl(user_id)
            .await?
            .ok_or(AdmissionError::NotActive)
    }

    /// Remove the user from the active set, marker and waiting queue. Does
    /// not promote directly: the consumer loop and the cleaner observe the
    /// freed slot within a second.
    pub async fn leave(&self, user_id: UserId) -> Result<(), AdmissionError> {
        self.store.leave(user_id).await?;
        info!(user_id = %user_id, "left queue");
        Ok(())
    }

    /// Whether the user currently holds a live admission session.
    pub async fn is_active_session(&self, user_id: UserId) -> Result<bool, AdmissionError> {
        Ok(self.store.is_active(user_id).await? && self.store.marker_exists(user_id).await?)
    }

    /// Store a new concurrency limit and immediately run a promotion pass
    /// to fill any newly opened slots.
    pub async fn set_limit(&self, limit: i64) -> Result<(), AdmissionError> {
        self.store.set_limit(limit).await?;
        info!(limit, "queue limit updated");
        self.promote().await?;
        Ok(())
    }

    /// Queue telemetry.
    pub async fn metrics(&self) -> Result<QueueMetrics, AdmissionError> {
        Ok(QueueMetrics {
            active_users: self.store.active_count().await?,
            waiting_users: self.store.waiting_count().await?,
            limit: self.store.limit().await?,
        })
    }

    /// Users currently in the active set.
    pub async fn active_users(&self) -> Result<Vec<UserId>, AdmissionError> {
        Ok(self.store.active_members().await?)
    }

    /// Waiting users in FIFO order.
    pub async fn waiting_users(&self) -> Result<Vec<UserId>, AdmissionError> {
        Ok(self.store.waiting_members().await?)
    }

    /// Promotion pass: fill free slots from the head of the waiting queue.
    /// Serialized by the promotion lock; a concurrent pass is simply
    /// skipped. Stops at the first failed admit (slots refilled under us).
    pub async fn promote(&self) -> Result<Vec<UserId>, AdmissionError> {
        if !self.store.try_promotion_lock().await? {
            return Ok(Vec::new());
        }
        let result = self.promote_locked().await;
        if let Err(e) = self.store.release_promotion_lock().await {
            warn!(error = %e, "failed to release promotion lock (will expire)");
        }
        result
    }

    async fn promote_locked(&self) -> Result<Vec<UserId>, AdmissionError> {
        let limit = self.store.limit().await?;
        let active_count = self.store.active_count().await?;
        let free = limit - active_count;
        if free <= 0 {
            return Ok(Vec::new());
        }

        let candidates = self.store.waiting_head(free).await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let mut promoted = Vec::new();
        for user_id in candidates {
            match self.store.try_admit(user_id).await {
                Ok(true) => {
                    self.store.remove_waiting(user_id).await?;
                    promoted.push(user_id);
                    info!(user_id = %user_id, "promoted to active");

                    self.publish_best_effort(QueueEvent::now(user_id, QueueEventKind::Promoted))
                        .await;
                    let (granted, promote) =
                        WsEvent::access_granted("You have been promoted! Redirecting to workshop selection...");
                    self.hub.unicast(user_id, &granted);
                    self.hub.unicast(user_id, &promote);
                }
                Ok(false) => {
                    debug!(user_id = %user_id, "slots refilled, stopping promotion pass");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, user_id = %user_id, "promotion admit failed, stopping pass");
                    break;
                }
            }
        }

        let waiting = self.store.waiting_count().await?;
        self.hub.broadcast(&WsEvent::QueuePosition {
            position: waiting,
            active_count: None,
            limit: None,
            estimated_wait_minutes: waiting * self.eta_minutes_per_position,
        });

        Ok(promoted)
    }

    /// Remove active members whose session marker expired, then promote to
    /// fill the vacated slots. Idempotent; invoked by the periodic cleaner.
    pub async fn cleanup(&self) -> Result<usize, AdmissionError> {
        let members = self.store.active_members().await?;
        let mut removed = 0;
        for user_id in members {
            if !self.store.marker_exists(user_id).await? {
                self.store.remove_active(user_id).await?;
                removed += 1;
                info!(user_id = %user_id, "cleaned up expired slot");
            }
        }

        if removed > 0 {
            self.promote().await?;
        }
        Ok(removed)
    }

    /// Estimated wait: the minimum remaining TTL across active sessions
    /// (the next slot to turn over), zero when slots are already free.
    async fn estimated_wait_seconds(
        &self,
        active_count: i64,
        limit: i64,
    ) -> Result<i64, AdmissionError> {
        if active_count < limit {
            return Ok(0);
        }
        let mut min_ttl: Option<i64> = None;
        for user_id in self.store.active_members().await? {
            if let Some(ttl) = self.store.marker_ttl(user_id).await? {
                min_ttl = Some(min_ttl.map_or(ttl, |m| m.min(ttl)));
            }
        }
        Ok(min_ttl.unwrap_or(DEFAULT_WAIT_SECONDS))
    }

    /// Publish, logging on failure. Shared-state mutations have already
    /// landed; the consumer loop reconciles on the next tick, so a bus
    /// fault never fails the request.
    async fn publish_best_effort(&self, event: QueueEvent) {
        if let Err(e) = self.publisher.publish(&event).await {
            warn!(error = %e, event = ?event.event, user_id = %event.user_id, "bus publish failed, continuing");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_status_shape() {
        let status = QueueStatus::active(50, 240);
        assert!(status.is_active());
        assert_eq!(status.position, Some(0));
        assert_eq!(status.remaining_seconds, Some(240));
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "ACTIVE");
        assert_eq!(json["inQueue"], true);
        assert!(json.get("estimatedWaitSeconds").is_none());
    }

    #[test]
    fn expired_status_is_not_active() {
        let status = QueueStatus::expired();
        assert!(!status.is_active());
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["inQueue"], false);
        assert_eq!(json["message"], "Session expired");
        assert!(json.get("status").is_none());
    }

    #[test]
    fn metrics_serialize_camel_case() {
        let metrics = QueueMetrics {
            active_users: 3,
            waiting_users: 7,
            limit: 50,
        };
        let json = serde_json::to_value(metrics).unwrap();
        assert_eq!(json["activeUsers"], 3);
        assert_eq!(json["waitingUsers"], 7);
        assert_eq!(json["limit"], 50);
    }
}
