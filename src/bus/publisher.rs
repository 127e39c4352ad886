//! Kafka producer for queue-lifecycle events.

use super::{BusError, QueueEvent, QUEUE_TOPIC};
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use uuid::Uuid;

/// Ensure the single-partition `queue.join` topic exists. One partition is
/// load-bearing: it is what serializes REQUEST_JOIN processing. An
/// already-existing topic is not an error.
pub async fn ensure_queue_topic(brokers: &str) -> Result<(), BusError> {
    let admin: AdminClient<DefaultClientContext> = ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .create()
        .map_err(|e| BusError::ConnectionFailed(format!("failed to create admin client: {e}")))?;

    let topic = NewTopic::new(QUEUE_TOPIC, 1, TopicReplication::Fixed(1));
    let results = admin
        .create_topics([&topic], &AdminOptions::new())
        .await
        .map_err(|e| BusError::ConnectionFailed(format!("topic creation failed: {e}")))?;

    for result in results {
        match result {
            Ok(name) => tracing::info!(topic = %name, "created queue topic"),
            Err((name, rdkafka::types::RDKafkaErrorCode::TopicAlreadyExists)) => {
                tracing::debug!(topic = %name, "queue topic already exists");
            }
            Err((name, code)) => {
                return Err(BusError::ConnectionFailed(format!(
                    "failed to create topic {name}: {code}"
                )));
            }
        }
    }

    Ok(())
}

/// Publisher for the `queue.join` topic.
///
/// Events are JSON-encoded and keyed by user id so a given user's events
/// stay on the single partition in arrival order. A correlation id rides in
/// the headers so consumers can tie bus work back to the originating
/// request's trace.
pub struct QueueEventPublisher {
    producer: FutureProducer,
    timeout: Duration,
}

impl QueueEventPublisher {
    /// Create a publisher against the given brokers.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::ConnectionFailed`] when the producer cannot be
    /// created (bad broker list, authentication failure).
    pub fn new(brokers: &str, timeout: Duration) -> Result<Self, BusError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("acks", "1")
            .create()
            .map_err(|e| BusError::ConnectionFailed(format!("failed to create producer: {e}")))?;

        tracing::info!(brokers = %brokers, topic = QUEUE_TOPIC, "queue event publisher created");

        Ok(Self { producer, timeout })
    }

    /// Publish one event to `queue.join`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::PublishFailed`] if serialization or the broker
    /// send fails. Callers on the join path log and continue: state already
    /// landed in the shared store and the consumer loop reconciles.
    pub async fn publish(&self, event: &QueueEvent) -> Result<(), BusError> {
        let payload = serde_json::to_vec(event).map_err(|e| BusError::PublishFailed {
            topic: QUEUE_TOPIC.to_string(),
            reason: format!("failed to serialize event: {e}"),
        })?;

        let key = event.user_id.to_string();
        let correlation_id = Uuid::new_v4().to_string();
        let headers = OwnedHeaders::new().insert(Header {
            key: "correlation-id",
            value: Some(correlation_id.as_bytes()),
        });

        let record = FutureRecord::to(QUEUE_TOPIC)
            .payload(&payload)
            .key(&key)
            .headers(headers);

        match self.producer.send(record, Timeout::After(self.timeout)).await {
            Ok((partition, offset)) => {
                tracing::debug!(
                    topic = QUEUE_TOPIC,
                    partition,
                    offset,
                    event = ?event.event,
                    user_id = %event.user_id,
                    correlation_id = %correlation_id,
                    "queue event published"
                );
                Ok(())
            }
            Err((kafka_error, _)) => {
                tracing::error!(
                    topic = QUEUE_TOPIC,
                    error = %kafka_error,
                    event = ?event.event,
                    user_id = %event.user_id,
                    "failed to publish queue event"
                );
                Err(BusError::PublishFailed {
                    topic: QUEUE_TOPIC.to_string(),
                    reason: kafka_error.to_string(),
                })
            }
        }
    }
}
