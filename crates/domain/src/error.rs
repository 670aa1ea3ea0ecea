use common::OrderId;
use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The order does not exist in the order store.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// A stored status string is outside the closed status set.
    #[error("Invalid order status: '{0}'")]
    InvalidStatus(String),

    /// The driver registry is temporarily unavailable.
    #[error("Driver registry error: {0}")]
    Registry(String),

    /// The order store is temporarily unavailable.
    #[error("Order store error: {0}")]
    Storage(String),
}

impl DomainError {
    /// Returns true for infrastructure faults worth retrying, as opposed
    /// to business-rule violations.
    pub fn is_transient(&self) -> bool {
        matches!(self, DomainError::Registry(_) | DomainError::Storage(_))
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
