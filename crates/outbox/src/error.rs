use thiserror::Error;

use crate::entry::EventId;

/// Errors that can occur when interacting with the outbox.
#[derive(Debug, Error)]
pub enum OutboxError {
    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The bus did not acknowledge a publish. Retried on the next poll.
    #[error("Publish to topic '{topic}' failed: {reason}")]
    PublishFailed { topic: String, reason: String },

    /// The referenced entry does not exist.
    #[error("Outbox entry not found: {0}")]
    EntryNotFound(EventId),
}

/// Result type for outbox operations.
pub type Result<T> = std::result::Result<T, OutboxError>;
