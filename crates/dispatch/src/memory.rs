use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::OrderId;
use tokio::sync::RwLock;

use crate::attempt::{AttemptId, AttemptStatus, DispatchAttempt};
use crate::error::{DispatchError, Result};
use crate::store::DispatchStore;

/// In-memory dispatch store for testing and single-process deployments.
///
/// The at-most-one-PENDING-per-order check runs inside the write lock, so
/// it is atomic with the insert just like a database unique constraint.
#[derive(Clone, Default)]
pub struct InMemoryDispatchStore {
    attempts: Arc<RwLock<Vec<DispatchAttempt>>>,
}

impl InMemoryDispatchStore {
    /// Creates a new empty dispatch store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of attempts recorded.
    pub async fn attempt_count(&self) -> usize {
        self.attempts.read().await.len()
    }
}

#[async_trait]
impl DispatchStore for InMemoryDispatchStore {
    async fn insert_pending(&self, attempt: DispatchAttempt) -> Result<()> {
        let mut store = self.attempts.write().await;

        let has_live = store
            .iter()
            .any(|a| a.order_id == attempt.order_id && a.status == AttemptStatus::Pending);
        if has_live {
            return Err(DispatchError::OfferConflict(attempt.order_id));
        }

        store.push(attempt);
        Ok(())
    }

    async fn get(&self, id: AttemptId) -> Result<Option<DispatchAttempt>> {
        let store = self.attempts.read().await;
        Ok(store.iter().find(|a| a.id == id).cloned())
    }

    async fn pending_for_order(&self, order_id: OrderId) -> Result<Option<DispatchAttempt>> {
        let store = self.attempts.read().await;
        Ok(store
            .iter()
            .find(|a| a.order_id == order_id && a.status == AttemptStatus::Pending)
            .cloned())
    }

    async fn attempts_for_order(&self, order_id: OrderId) -> Result<Vec<DispatchAttempt>> {
        let store = self.attempts.read().await;
        let mut attempts: Vec<_> = store
            .iter()
            .filter(|a| a.order_id == order_id)
            .cloned()
            .collect();
        attempts.sort_by_key(|a| a.offered_at);
        Ok(attempts)
    }

    async fn resolve(
        &self,
        id: AttemptId,
        from: AttemptStatus,
        to: AttemptStatus,
        responded_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut store = self.attempts.write().await;
        let Some(attempt) = store.iter_mut().find(|a| a.id == id) else {
            return Err(DispatchError::AttemptNotFound(id));
        };

        if attempt.status != from {
            return Ok(false);
        }

        attempt.status = to;
        attempt.responded_at = Some(responded_at);
        Ok(true)
    }

    async fn pending_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<DispatchAttempt>> {
        let store = self.attempts.read().await;
        Ok(store
            .iter()
            .filter(|a| a.status == AttemptStatus::Pending && a.offered_at < cutoff)
            .cloned()
            .collect())
    }
}
