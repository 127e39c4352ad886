//! Serial consumer for the `queue.join` topic.
//!
//! One consumer group, one partition: events are processed strictly in
//! arrival order, and the `REQUEST_JOIN` handler deliberately blocks the
//! partition (1-second retry around the atomic admit) until a slot frees.
//! That blocking is the FIFO guarantee for contended joiners; do not
//! parallelize it.
//!
//! The loop follows the subscribe-process-reconnect pattern: failures are
//! logged and retried after a fixed delay, and the shutdown broadcast ends
//! the task cleanly from any await point.

use super::{QueueEvent, QueueEventKind, CONSUMER_GROUP, QUEUE_TOPIC};
use crate::hub::{NotificationHub, WsEvent};
use crate::store::AdmissionStore;
use futures::StreamExt;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::error::KafkaError;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Delay between admit attempts while a contended user waits for a slot.
const ADMIT_RETRY: Duration = Duration::from_secs(1);

/// Consumer task for queue-lifecycle events.
pub struct QueueJoinConsumer {
    brokers: String,
    store: AdmissionStore,
    hub: Arc<NotificationHub>,
    shutdown: broadcast::Receiver<()>,
    retry_delay: Duration,
    eta_minutes_per_position: i64,
}

impl QueueJoinConsumer {
    /// Create a consumer. It does not connect until [`spawn`](Self::spawn)
    /// or [`run`](Self::run).
    #[must_use]
    pub fn new(
        brokers: impl Into<String>,
        store: AdmissionStore,
        hub: Arc<NotificationHub>,
        shutdown: broadcast::Receiver<()>,
        retry_delay: Duration,
        eta_minutes_per_position: i64,
    ) -> Self {
        Self {
            brokers: brokers.into(),
            store,
            hub,
            shutdown,
            retry_delay,
            eta_minutes_per_position,
        }
    }

    /// Spawn the consumer as a background task.
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Run until the shutdown signal fires.
    pub async fn run(mut self) {
        info!(topic = QUEUE_TOPIC, group = CONSUMER_GROUP, "queue consumer started");

        loop {
            match self.subscribe() {
                Ok(consumer) => {
                    info!(topic = QUEUE_TOPIC, "subscribed to queue topic");
                    if self.process(&consumer).await.is_break() {
                        break;
                    }
                    warn!(
                        "queue event stream ended, resubscribing in {:?}",
                        self.retry_delay
                    );
                }
                Err(e) => {
                    error!(error = %e, "failed to subscribe, retrying in {:?}", self.retry_delay);
                }
            }
            if self.sleep_or_shutdown(self.retry_delay).await.is_break() {
                break;
            }
        }

        info!("queue consumer stopped");
    }

    fn subscribe(&self) -> Result<StreamConsumer, KafkaError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", CONSUMER_GROUP)
            .set("enable.auto.commit", "true")
            .set("auto.commit.interval.ms", "1000")
            .set("auto.offset.reset", "latest")
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()?;
        consumer.subscribe(&[QUEUE_TOPIC])?;
        Ok(consumer)
    }

    async fn process(&mut self, consumer: &StreamConsumer) -> ControlFlow<()> {
        let mut stream = consumer.stream();
        loop {
            let next = tokio::select! {
                _ = self.shutdown.recv() => {
                    info!("queue consumer received shutdown signal");
                    return ControlFlow::Break(());
                }
                next = stream.next() => next,
            };

            match next {
                Some(Ok(message)) => {
                    let Some(payload) = message.payload() else {
                        warn!("queue message without payload, skipping");
                        continue;
                    };
                    match serde_json::from_slice::<QueueEvent>(payload) {
                        Ok(event) => {
                            debug!(event = ?event.event, user_id = %event.user_id, "queue event received");
                            if self.handle(event).await.is_break() {
                                return ControlFlow::Break(());
                            }
                        }
                        Err(e) => warn!(error = %e, "failed to parse queue event, skipping"),
                    }
                }
                Some(Err(e)) => error!(error = %e, "error receiving queue event"),
                None => return ControlFlow::Continue(()),
            }
        }
    }

    async fn handle(&mut self, event: QueueEvent) -> ControlFlow<()> {
        match event.event {
            QueueEventKind::RequestJoin => self.handle_request_join(event).await,
            QueueEventKind::Activated => {
                // Already admitted by the join path; observational.
                self.notify_granted(event.user_id, "Access granted! Redirecting...");
                ControlFlow::Continue(())
            }
            QueueEventKind::Queued => {
                // Observational: surface the new waiting size.
                self.broadcast_queue_update(false).await;
                ControlFlow::Continue(())
            }
            QueueEventKind::Promoted => {
                self.notify_granted(event.user_id, "You have been promoted! Redirecting...");
                self.broadcast_queue_update(false).await;
                ControlFlow::Continue(())
            }
        }
    }

    /// Block the partition until this user is admitted. Every path into the
    /// active set goes through the same atomic admit script, so competing
    /// with the opportunistic paths can never over-admit.
    async fn handle_request_join(&mut self, event: QueueEvent) -> ControlFlow<()> {
        let user_id = event.user_id;
        loop {
            match self.store.is_active(user_id).await {
                Ok(true) => {
                    // Promoted by another path while the event sat in the
                    // topic; reconcile the waiting queue and notify anyway.
                    if let Err(e) = self.store.remove_waiting(user_id).await {
                        warn!(error = %e, user_id = %user_id, "failed to clear waiting entry");
                    }
                    self.notify_granted(user_id, "Access granted! Redirecting...");
                    return ControlFlow::Continue(());
                }
                Ok(false) => {}
                Err(e) => {
                    error!(error = %e, user_id = %user_id, "admission check failed");
                    if self.sleep_or_shutdown(ADMIT_RETRY).await.is_break() {
                        return ControlFlow::Break(());
                    }
                    continue;
                }
            }

            match self.store.try_admit(user_id).await {
                Ok(true) => {
                    if let Err(e) = self.store.remove_waiting(user_id).await {
                        warn!(error = %e, user_id = %user_id, "failed to clear waiting entry");
                    }
                    info!(user_id = %user_id, "user admitted from queue");
                    self.notify_granted(user_id, "Your turn! Redirecting to workshop selection...");
                    self.broadcast_queue_update(true).await;
                    return ControlFlow::Continue(());
                }
                Ok(false) => {
                    // Slots still full; wait and retry. Blocking here is the
                    // single-flight FIFO guarantee for contended joiners.
                    if self.sleep_or_shutdown(ADMIT_RETRY).await.is_break() {
                        return ControlFlow::Break(());
                    }
                }
                Err(e) => {
                    error!(error = %e, user_id = %user_id, "atomic admit failed");
                    if self.sleep_or_shutdown(ADMIT_RETRY).await.is_break() {
                        return ControlFlow::Break(());
                    }
                }
            }
        }
    }

    fn notify_granted(&self, user_id: crate::types::UserId, message: &str) {
        let (granted, promote) = WsEvent::access_granted(message);
        self.hub.unicast(user_id, &granted);
        self.hub.unicast(user_id, &promote);
    }

    /// Broadcast the new waiting size so queued clients see their position
    /// move. `with_counts` includes the active count and limit (used after
    /// an admission changed them).
    async fn broadcast_queue_update(&self, with_counts: bool) {
        let waiting = match self.store.waiting_count().await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "failed to read waiting count for broadcast");
                return;
            }
        };

        let (active_count, limit) = if with_counts {
            let active = self.store.active_count().await.ok();
            let limit = self.store.limit().await.ok();
            (active, limit)
        } else {
            (None, None)
        };

        self.hub.broadcast(&WsEvent::QueuePosition {
            position: waiting,
            active_count,
            limit,
            estimated_wait_minutes: waiting * self.eta_minutes_per_position,
        });
    }

    async fn sleep_or_shutdown(&mut self, delay: Duration) -> ControlFlow<()> {
        tokio::select! {
            _ = self.shutdown.recv() => {
                info!("queue consumer received shutdown signal");
                ControlFlow::Break(())
            }
            () = tokio::time::sleep(delay) => ControlFlow::Continue(()),
        }
    }
}
