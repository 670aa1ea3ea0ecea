use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::OrderId;

use crate::attempt::{AttemptId, AttemptStatus, DispatchAttempt};
use crate::error::Result;

/// Core trait for dispatch attempt store implementations.
///
/// The store is the source of truth for who currently holds an offer. It
/// enforces the one invariant the engine cannot enforce alone: at most one
/// PENDING attempt per order, even under concurrent writers. Attempts are
/// never deleted.
#[async_trait]
pub trait DispatchStore: Send + Sync {
    /// Inserts a new PENDING attempt.
    ///
    /// Fails with [`DispatchError::OfferConflict`] if the order already has
    /// a PENDING attempt — the store-level equivalent of a unique
    /// constraint on `(order_id, status = PENDING)`.
    ///
    /// [`DispatchError::OfferConflict`]: crate::error::DispatchError::OfferConflict
    async fn insert_pending(&self, attempt: DispatchAttempt) -> Result<()>;

    /// Loads an attempt by ID.
    async fn get(&self, id: AttemptId) -> Result<Option<DispatchAttempt>>;

    /// Returns the order's live offer, if one exists.
    async fn pending_for_order(&self, order_id: OrderId) -> Result<Option<DispatchAttempt>>;

    /// Returns every attempt ever made for the order, oldest first.
    async fn attempts_for_order(&self, order_id: OrderId) -> Result<Vec<DispatchAttempt>>;

    /// Atomically transitions an attempt from `from` to `to`, recording the
    /// resolution time.
    ///
    /// Returns false without mutating if the attempt is not currently in
    /// `from` — the compare-and-set that makes racing resolvers (a response
    /// handler vs. the expiry sweep) safe.
    async fn resolve(
        &self,
        id: AttemptId,
        from: AttemptStatus,
        to: AttemptStatus,
        responded_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Returns all PENDING attempts offered before the cutoff.
    async fn pending_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<DispatchAttempt>>;
}
