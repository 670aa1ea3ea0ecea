use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entry::{EventId, OutboxEntry};

/// Trace correlation identifiers carried on every published event.
///
/// Both fields are optional on the wire; consumers must not rely on their
/// presence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceContext {
    /// Correlation ID shared by all events of one logical flow.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,

    /// The producing unit of work within the trace.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
}

impl TraceContext {
    /// Creates a trace context with both identifiers set.
    pub fn new(trace_id: impl Into<String>, span_id: impl Into<String>) -> Self {
        Self {
            trace_id: Some(trace_id.into()),
            span_id: Some(span_id.into()),
        }
    }
}

/// Wire format of every event this system produces or consumes.
///
/// The payload is a self-contained snapshot: consumers never need a
/// synchronous callback to the producer to interpret it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    /// Unique identifier of this event occurrence.
    pub event_id: EventId,

    /// The wire label of the event (e.g. `"OrderPlaced"`).
    pub event_type: String,

    /// When the event occurred at the producer.
    pub occurred_at: DateTime<Utc>,

    /// Trace correlation identifiers.
    #[serde(default)]
    pub trace: TraceContext,

    /// The event-specific payload.
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Builds the wire envelope for an outbox entry.
    ///
    /// The entry's ID and creation time become the event ID and occurrence
    /// time, so a retried publish carries the identical envelope and
    /// consumers can deduplicate on `event_id`.
    pub fn for_entry(entry: &OutboxEntry) -> Self {
        Self {
            event_id: entry.id,
            event_type: entry.event_type.clone(),
            occurred_at: entry.created_at,
            trace: TraceContext::default(),
            payload: entry.payload.clone(),
        }
    }

    /// Creates an envelope from raw parts, mainly for tests and external
    /// collaborators simulated in-process.
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_id: EventId::new(),
            event_type: event_type.into(),
            occurred_at: Utc::now(),
            trace: TraceContext::default(),
            payload,
        }
    }

    /// Sets the trace context.
    pub fn with_trace(mut self, trace: TraceContext) -> Self {
        self.trace = trace;
        self
    }

    /// Deserializes the payload into a concrete event type.
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}
