//! Saga error types.

use domain::DomainError;
use outbox::OutboxError;
use thiserror::Error;

/// Errors that can occur while processing a consumed event.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The event payload is missing fields or unparseable. Logged and
    /// dropped; never retried.
    #[error("Malformed '{event_type}' payload: {source}")]
    Malformed {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },

    /// Error from the order store or another domain collaborator.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Error writing the next command to the outbox.
    #[error("Outbox error: {0}")]
    Outbox(#[from] OutboxError),

    /// Error surfaced by an externally registered handler.
    #[error("Handler error: {0}")]
    Handler(String),
}

impl SagaError {
    /// Returns true for infrastructure faults the router should retry
    /// with backoff; everything else is logged and dropped.
    pub fn is_transient(&self) -> bool {
        match self {
            SagaError::Domain(e) => e.is_transient(),
            SagaError::Outbox(OutboxError::Database(_)) => true,
            SagaError::Outbox(OutboxError::Migration(_)) => true,
            _ => false,
        }
    }
}

/// Result type for saga operations.
pub type Result<T> = std::result::Result<T, SagaError>;
