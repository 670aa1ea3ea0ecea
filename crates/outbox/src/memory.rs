use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::entry::{EventId, OutboxEntry};
use crate::error::Result;
use crate::store::OutboxStore;

/// In-memory outbox store for testing and single-process deployments.
///
/// Provides the same interface as the PostgreSQL implementation. The vector
/// preserves insertion order, so entries created at the same instant keep
/// their append order when sorted by `created_at`.
#[derive(Clone, Default)]
pub struct InMemoryOutboxStore {
    entries: Arc<RwLock<Vec<OutboxEntry>>>,
}

impl InMemoryOutboxStore {
    /// Creates a new empty in-memory outbox store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of entries stored, published or not.
    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Clears all entries.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn append(&self, entries: Vec<OutboxEntry>) -> Result<()> {
        self.entries.write().await.extend(entries);
        Ok(())
    }

    async fn fetch_unpublished(&self) -> Result<Vec<OutboxEntry>> {
        let store = self.entries.read().await;
        let mut pending: Vec<_> = store
            .iter()
            .filter(|e| e.published_at.is_none())
            .cloned()
            .collect();
        pending.sort_by_key(|e| e.created_at);
        Ok(pending)
    }

    async fn mark_published(&self, id: EventId, published_at: DateTime<Utc>) -> Result<()> {
        let mut store = self.entries.write().await;
        for entry in store.iter_mut() {
            if entry.id == id {
                if entry.published_at.is_none() {
                    entry.published_at = Some(published_at);
                }
                return Ok(());
            }
        }
        Err(crate::error::OutboxError::EntryNotFound(id))
    }

    async fn entries_for_aggregate(&self, aggregate_id: Uuid) -> Result<Vec<OutboxEntry>> {
        let store = self.entries.read().await;
        let mut entries: Vec<_> = store
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.created_at);
        Ok(entries)
    }
}
