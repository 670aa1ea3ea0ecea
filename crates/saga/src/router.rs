//! Explicit event-handler registration and dispatch.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use outbox::EventEnvelope;

use crate::error::SagaError;

type Handler = Arc<dyn Fn(EventEnvelope) -> BoxFuture<'static, Result<(), SagaError>> + Send + Sync>;

/// Retry behavior for transient handler failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(100),
        }
    }
}

/// Routes consumed envelopes to handlers registered per event type.
///
/// One registered callback per event type, invoked by an explicit dispatch
/// call from the consumer loop. `dispatch` never returns an error: a
/// malformed or business-rejected event is logged and dropped, a transient
/// infrastructure fault is retried a bounded number of times with fixed
/// backoff and then logged at error level as a dead-letter candidate. The
/// consumer loop therefore cannot be crashed by a bad message.
#[derive(Default)]
pub struct EventRouter {
    handlers: HashMap<String, Handler>,
    retry: RetryPolicy,
}

impl EventRouter {
    /// Creates a router with the default retry policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a router with a custom retry policy.
    pub fn with_retry(retry: RetryPolicy) -> Self {
        Self {
            handlers: HashMap::new(),
            retry,
        }
    }

    /// Registers the handler for an event type, replacing any previous one.
    pub fn register<F, Fut>(&mut self, event_type: &str, handler: F)
    where
        F: Fn(EventEnvelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), SagaError>> + Send + 'static,
    {
        self.handlers.insert(
            event_type.to_string(),
            Arc::new(move |envelope| Box::pin(handler(envelope))),
        );
    }

    /// Returns the number of registered event types.
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Delivers an envelope to its registered handler.
    #[tracing::instrument(
        skip(self, envelope),
        fields(event_type = %envelope.event_type, event_id = %envelope.event_id)
    )]
    pub async fn dispatch(&self, envelope: &EventEnvelope) {
        let Some(handler) = self.handlers.get(&envelope.event_type) else {
            tracing::debug!("no handler registered for event type");
            return;
        };

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match handler(envelope.clone()).await {
                Ok(()) => {
                    metrics::counter!("saga_events_processed").increment(1);
                    return;
                }
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    tracing::warn!(error = %e, attempt, "transient handler failure, retrying");
                    tokio::time::sleep(self.retry.backoff).await;
                }
                Err(e) if e.is_transient() => {
                    metrics::counter!("saga_events_failed").increment(1);
                    tracing::error!(
                        error = %e,
                        attempts = attempt,
                        "handler failed after retries, candidate for manual replay"
                    );
                    return;
                }
                Err(e) => {
                    metrics::counter!("saga_events_dropped").increment(1);
                    tracing::warn!(error = %e, "dropping event");
                    return;
                }
            }
        }
    }
}
