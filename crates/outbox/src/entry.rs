use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Unique identifier for an outbox entry and the event it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an event ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EventId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<EventId> for Uuid {
    fn from(id: EventId) -> Self {
        id.0
    }
}

/// A domain event that can be written to the outbox.
///
/// Implementors describe where the event goes (`destination_topic`), how it
/// is labelled on the wire (`event_type`), and which aggregate it belongs to
/// (`aggregate_id`, used as the partition key so all events for one
/// aggregate keep their relative order downstream).
pub trait PublishableEvent: Serialize {
    /// The wire label for this event (e.g. `"OrderPlaced"`).
    fn event_type(&self) -> &'static str;

    /// The bus topic this event is published to.
    fn destination_topic(&self) -> &'static str;

    /// The aggregate the event belongs to, used as the partition key.
    fn aggregate_id(&self) -> Uuid;
}

/// A durable record of a not-yet-published domain event.
///
/// Entries are written in the same transaction as the business-state change
/// that produced them and are immutable afterwards, except for
/// `published_at`, which the publisher sets exactly once after the bus
/// acknowledges the send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEntry {
    /// Unique identifier, reused as the event ID on the wire.
    pub id: EventId,

    /// The aggregate this event belongs to (partition key on publish).
    pub aggregate_id: Uuid,

    /// The wire label of the event (e.g. `"RestaurantOrderAccepted"`).
    pub event_type: String,

    /// The bus topic the entry is published to.
    pub destination_topic: String,

    /// Immutable serialized snapshot of the event payload.
    pub payload: serde_json::Value,

    /// When the entry was written.
    pub created_at: DateTime<Utc>,

    /// When the entry was acknowledged by the bus, if it has been.
    pub published_at: Option<DateTime<Utc>>,
}

impl OutboxEntry {
    /// Creates an entry from a publishable domain event.
    ///
    /// The payload is serialized eagerly so the entry is a self-contained
    /// snapshot, independent of any later change to the source record.
    pub fn for_event<E: PublishableEvent>(event: &E) -> Result<Self> {
        Ok(Self {
            id: EventId::new(),
            aggregate_id: event.aggregate_id(),
            event_type: event.event_type().to_string(),
            destination_topic: event.destination_topic().to_string(),
            payload: serde_json::to_value(event)?,
            created_at: Utc::now(),
            published_at: None,
        })
    }

    /// Creates an entry from raw parts, mainly for tests and replay tooling.
    pub fn from_parts(
        aggregate_id: Uuid,
        event_type: impl Into<String>,
        destination_topic: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: EventId::new(),
            aggregate_id,
            event_type: event_type.into(),
            destination_topic: destination_topic.into(),
            payload,
            created_at: Utc::now(),
            published_at: None,
        }
    }

    /// Returns true if the entry has been acknowledged by the bus.
    pub fn is_published(&self) -> bool {
        self.published_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct TestEvent {
        order_id: Uuid,
        note: &'static str,
    }

    impl PublishableEvent for TestEvent {
        fn event_type(&self) -> &'static str {
            "TestEvent"
        }

        fn destination_topic(&self) -> &'static str {
            "test.topic"
        }

        fn aggregate_id(&self) -> Uuid {
            self.order_id
        }
    }

    #[test]
    fn event_id_new_creates_unique_ids() {
        assert_ne!(EventId::new(), EventId::new());
    }

    #[test]
    fn entry_for_event_snapshots_payload() {
        let order_id = Uuid::new_v4();
        let event = TestEvent {
            order_id,
            note: "hello",
        };

        let entry = OutboxEntry::for_event(&event).unwrap();
        assert_eq!(entry.aggregate_id, order_id);
        assert_eq!(entry.event_type, "TestEvent");
        assert_eq!(entry.destination_topic, "test.topic");
        assert_eq!(entry.payload["note"], "hello");
        assert_eq!(entry.payload["orderId"], order_id.to_string());
        assert!(!entry.is_published());
    }

    #[test]
    fn entry_from_parts() {
        let aggregate_id = Uuid::new_v4();
        let entry = OutboxEntry::from_parts(
            aggregate_id,
            "SomeEvent",
            "some.topic",
            serde_json::json!({"k": 1}),
        );
        assert_eq!(entry.aggregate_id, aggregate_id);
        assert!(entry.published_at.is_none());
    }
}
