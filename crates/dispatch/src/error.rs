use common::OrderId;
use thiserror::Error;

use crate::attempt::AttemptId;

/// Errors that can occur during dispatch operations.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A live offer already exists for the order. Losing this race is
    /// normal under concurrent dispatch; callers treat it as "no dispatch
    /// occurred".
    #[error("Order {0} already has a live offer")]
    OfferConflict(OrderId),

    /// The referenced attempt does not exist.
    #[error("Dispatch attempt not found: {0}")]
    AttemptNotFound(AttemptId),

    /// Error from the order store or driver registry.
    #[error("Domain error: {0}")]
    Domain(#[from] domain::DomainError),

    /// Error writing to the outbox.
    #[error("Outbox error: {0}")]
    Outbox(#[from] outbox::OutboxError),
}

/// Result type for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;
