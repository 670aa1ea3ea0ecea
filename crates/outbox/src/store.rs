use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::entry::{EventId, OutboxEntry};
use crate::error::Result;

/// Core trait for outbox store implementations.
///
/// The outbox is append-only: entries are never mutated after creation
/// except to set `published_at`, and never deleted. All implementations
/// must be thread-safe (Send + Sync).
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Appends entries to the outbox.
    ///
    /// Callers that also mutate business state are expected to do both in
    /// one transaction; the in-memory implementation approximates this with
    /// a single atomic append.
    async fn append(&self, entries: Vec<OutboxEntry>) -> Result<()>;

    /// Fetches all entries that have not been published yet, ordered by
    /// `created_at` ascending.
    async fn fetch_unpublished(&self) -> Result<Vec<OutboxEntry>>;

    /// Marks an entry as published at the given time.
    ///
    /// Once set, `published_at` is never changed; marking an already
    /// published entry is a no-op so a racing duplicate ack is harmless.
    async fn mark_published(&self, id: EventId, published_at: DateTime<Utc>) -> Result<()>;

    /// Returns all entries for an aggregate in `created_at` order,
    /// published or not. Used by tests and replay tooling.
    async fn entries_for_aggregate(&self, aggregate_id: Uuid) -> Result<Vec<OutboxEntry>>;
}

/// Extension trait providing convenience methods for outbox stores.
#[async_trait]
pub trait OutboxStoreExt: OutboxStore {
    /// Appends a single entry.
    async fn append_entry(&self, entry: OutboxEntry) -> Result<()> {
        self.append(vec![entry]).await
    }

    /// Returns the number of entries still awaiting publication.
    async fn unpublished_count(&self) -> Result<usize> {
        Ok(self.fetch_unpublished().await?.len())
    }
}

// Blanket implementation for all OutboxStore implementations
impl<T: OutboxStore + ?Sized> OutboxStoreExt for T {}
