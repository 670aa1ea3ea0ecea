use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use uuid::Uuid;

use crate::envelope::EventEnvelope;
use crate::error::{OutboxError, Result};

/// Trait for the message-bus transport.
///
/// The transport is assumed to provide at-least-once delivery and
/// per-partition-key ordering; `publish` returns only after the bus has
/// acknowledged the send.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publishes an envelope to a topic under a partition key.
    async fn publish(&self, topic: &str, key: Uuid, envelope: &EventEnvelope) -> Result<()>;
}

/// A message recorded by the in-memory bus.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    /// The topic the message was published to.
    pub topic: String,
    /// The partition key (aggregate ID).
    pub key: Uuid,
    /// The published envelope.
    pub envelope: EventEnvelope,
}

#[derive(Debug, Default)]
struct InMemoryBusState {
    messages: Vec<PublishedMessage>,
    undelivered: Vec<PublishedMessage>,
    fail_on_publish: bool,
}

/// In-memory message bus for testing and single-process deployments.
///
/// Records every acknowledged publish in order and keeps a separate
/// undelivered queue that a consumer loop drains.
#[derive(Clone, Default)]
pub struct InMemoryMessageBus {
    state: Arc<RwLock<InMemoryBusState>>,
}

impl InMemoryMessageBus {
    /// Creates a new in-memory bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the bus to reject publishes, simulating an outage.
    pub fn set_fail_on_publish(&self, fail: bool) {
        self.state.write().unwrap().fail_on_publish = fail;
    }

    /// Returns the total number of acknowledged publishes.
    pub fn published_count(&self) -> usize {
        self.state.read().unwrap().messages.len()
    }

    /// Returns all acknowledged messages for a topic, in publish order.
    pub fn messages_for_topic(&self, topic: &str) -> Vec<PublishedMessage> {
        self.state
            .read()
            .unwrap()
            .messages
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Takes all messages published since the last drain, in publish order.
    ///
    /// This is the consumption side of the bus: the caller plays the role
    /// of a consumer group receiving each message once per drain.
    pub fn drain(&self) -> Vec<PublishedMessage> {
        std::mem::take(&mut self.state.write().unwrap().undelivered)
    }
}

#[async_trait]
impl MessageBus for InMemoryMessageBus {
    async fn publish(&self, topic: &str, key: Uuid, envelope: &EventEnvelope) -> Result<()> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_publish {
            return Err(OutboxError::PublishFailed {
                topic: topic.to_string(),
                reason: "simulated bus outage".to_string(),
            });
        }

        let message = PublishedMessage {
            topic: topic.to_string(),
            key,
            envelope: envelope.clone(),
        };
        state.messages.push(message.clone());
        state.undelivered.push(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_read_back() {
        let bus = InMemoryMessageBus::new();
        let key = Uuid::new_v4();
        let envelope = EventEnvelope::new("OrderPlaced", serde_json::json!({}));

        bus.publish("orders.events", key, &envelope).await.unwrap();

        assert_eq!(bus.published_count(), 1);
        let messages = bus.messages_for_topic("orders.events");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].key, key);
        assert!(bus.messages_for_topic("other.topic").is_empty());
    }

    #[tokio::test]
    async fn fail_on_publish() {
        let bus = InMemoryMessageBus::new();
        bus.set_fail_on_publish(true);

        let envelope = EventEnvelope::new("OrderPlaced", serde_json::json!({}));
        let result = bus.publish("orders.events", Uuid::new_v4(), &envelope).await;

        assert!(matches!(result, Err(OutboxError::PublishFailed { .. })));
        assert_eq!(bus.published_count(), 0);
    }

    #[tokio::test]
    async fn drain_returns_each_message_once() {
        let bus = InMemoryMessageBus::new();
        let envelope = EventEnvelope::new("OrderPlaced", serde_json::json!({}));
        bus.publish("orders.events", Uuid::new_v4(), &envelope)
            .await
            .unwrap();

        assert_eq!(bus.drain().len(), 1);
        assert!(bus.drain().is_empty());
        // the permanent record is untouched
        assert_eq!(bus.published_count(), 1);
    }
}
