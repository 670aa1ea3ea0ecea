//! The dispatch engine: offer lifecycle and driver matching.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{DriverId, OrderId};
use dashmap::DashMap;
use domain::{DriverAssigned, DriverNotifier, DriverRegistry, OrderStatus, OrderStore};
use outbox::{OutboxEntry, OutboxStore};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::attempt::{AttemptId, AttemptStatus, DispatchAttempt};
use crate::error::{DispatchError, Result};
use crate::scoring::{DistanceScorer, StraightLineScorer};
use crate::store::DispatchStore;

/// Default time a driver has to respond to an offer.
pub const DEFAULT_OFFER_TIMEOUT: Duration = Duration::from_secs(120);

/// Tunables for the dispatch engine.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// How long a PENDING offer stays live before the sweep expires it.
    pub offer_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            offer_timeout: DEFAULT_OFFER_TIMEOUT,
        }
    }
}

/// Where an order stands in the dispatch process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispatchPhase {
    /// A driver has accepted and holds the assignment.
    Assigned,

    /// A live offer is awaiting a driver's response.
    PendingOffer,

    /// No live offer and no assignment.
    AwaitingDispatch,
}

/// Snapshot of an order's dispatch state, as reported to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchStatus {
    pub status: DispatchPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_driver_id: Option<DriverId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_offer_id: Option<AttemptId>,
}

/// Per-order async locks serializing every mutating dispatch operation.
///
/// The response handler, the expiry sweep, and a scheduler-triggered
/// dispatch may all target the same order concurrently; the lock makes
/// each one read fresh state before mutating.
#[derive(Default)]
struct OrderLocks {
    locks: DashMap<OrderId, Arc<Mutex<()>>>,
}

impl OrderLocks {
    fn for_order(&self, order_id: OrderId) -> Arc<Mutex<()>> {
        self.locks
            .entry(order_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Matches orders to the nearest available, non-rejecting driver and
/// manages the offer protocol.
///
/// Holds exactly one live offer per order. Drivers that reject, time out,
/// or cancel are permanently excluded from that order; dispatch then
/// retries with the next-nearest driver until one accepts or no eligible
/// driver remains.
pub struct DispatchEngine<O, R, S, N, B>
where
    O: OrderStore,
    R: DriverRegistry,
    S: DispatchStore,
    N: DriverNotifier,
    B: OutboxStore,
{
    orders: O,
    drivers: R,
    attempts: S,
    notifier: N,
    outbox: B,
    scorer: Box<dyn DistanceScorer>,
    config: DispatchConfig,
    locks: OrderLocks,
}

impl<O, R, S, N, B> DispatchEngine<O, R, S, N, B>
where
    O: OrderStore,
    R: DriverRegistry,
    S: DispatchStore,
    N: DriverNotifier,
    B: OutboxStore,
{
    /// Creates an engine with the straight-line scorer and default config.
    pub fn new(orders: O, drivers: R, attempts: S, notifier: N, outbox: B) -> Self {
        Self {
            orders,
            drivers,
            attempts,
            notifier,
            outbox,
            scorer: Box::new(StraightLineScorer),
            config: DispatchConfig::default(),
            locks: OrderLocks::default(),
        }
    }

    /// Replaces the proximity scoring strategy.
    pub fn with_scorer(mut self, scorer: Box<dyn DistanceScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    /// Replaces the engine configuration.
    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Finds a driver for the order and creates a PENDING offer.
    ///
    /// Returns `None` without error when no dispatch occurred: unknown
    /// order, ineligible status, driver already assigned, a live offer
    /// already held, or no eligible driver available. Schedulers can
    /// therefore invoke this repeatedly without special-casing.
    #[tracing::instrument(skip(self))]
    pub async fn start_dispatch(&self, order_id: OrderId) -> Result<Option<DispatchAttempt>> {
        let lock = self.locks.for_order(order_id);
        let _guard = lock.lock().await;
        self.dispatch_locked(order_id).await
    }

    /// Dispatch body; caller must hold the order lock.
    async fn dispatch_locked(&self, order_id: OrderId) -> Result<Option<DispatchAttempt>> {
        let Some(order) = self.orders.get_order(order_id).await? else {
            tracing::warn!(%order_id, "dispatch requested for unknown order");
            return Ok(None);
        };

        if !order.status.dispatch_eligible() || order.has_driver() {
            tracing::debug!(
                %order_id,
                status = %order.status,
                has_driver = order.has_driver(),
                "order not eligible for dispatch"
            );
            return Ok(None);
        }

        if self.attempts.pending_for_order(order_id).await?.is_some() {
            tracing::debug!(%order_id, "order already has a live offer");
            return Ok(None);
        }

        let available = self.drivers.get_available_drivers().await?;
        if available.is_empty() {
            tracing::debug!(%order_id, "no drivers available");
            return Ok(None);
        }

        let excluded: HashSet<DriverId> = self
            .attempts
            .attempts_for_order(order_id)
            .await?
            .iter()
            .filter(|a| a.status.excludes_driver())
            .map(|a| a.driver_id)
            .collect();

        let mut ranked: Vec<(f64, DriverId)> = available
            .into_iter()
            .filter(|d| !excluded.contains(&d.driver_id))
            .map(|d| {
                (
                    self.scorer.score(&d.location, &order.restaurant_location),
                    d.driver_id,
                )
            })
            .collect();

        if ranked.is_empty() {
            tracing::info!(
                %order_id,
                excluded = excluded.len(),
                "no eligible drivers remain for order"
            );
            metrics::counter!("dispatch_no_eligible_driver").increment(1);
            return Ok(None);
        }

        // nearest first; driver ID breaks score ties deterministically
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        let (score, chosen) = ranked[0];

        let attempt = DispatchAttempt::pending(order_id, chosen);
        match self.attempts.insert_pending(attempt.clone()).await {
            Ok(()) => {}
            Err(DispatchError::OfferConflict(_)) => {
                // lost the race to a concurrent dispatcher
                tracing::debug!(%order_id, "concurrent dispatch won the offer slot");
                return Ok(None);
            }
            Err(e) => return Err(e),
        }

        metrics::counter!("dispatch_offers_created").increment(1);
        tracing::info!(
            %order_id,
            driver_id = %chosen,
            score,
            attempt_id = %attempt.id,
            "offer created"
        );

        // Best effort: an unreachable device just means the offer expires.
        if let Err(e) = self.notifier.notify_offer(chosen, order_id).await {
            tracing::warn!(%order_id, driver_id = %chosen, error = %e, "offer notification failed");
        }

        Ok(Some(attempt))
    }

    /// Processes a driver's response to their live offer.
    ///
    /// Returns false for stale responses: no live offer, a different
    /// driver's offer, or an offer already resolved by the expiry sweep.
    /// A rejection immediately re-dispatches to the next eligible driver.
    #[tracing::instrument(skip(self))]
    pub async fn respond_to_offer(
        &self,
        order_id: OrderId,
        driver_id: DriverId,
        accepted: bool,
    ) -> Result<bool> {
        let lock = self.locks.for_order(order_id);
        let _guard = lock.lock().await;

        let Some(pending) = self.attempts.pending_for_order(order_id).await? else {
            tracing::debug!(%order_id, %driver_id, "response for order with no live offer");
            return Ok(false);
        };
        if pending.driver_id != driver_id {
            tracing::debug!(
                %order_id,
                %driver_id,
                holder = %pending.driver_id,
                "response from driver not holding the offer"
            );
            return Ok(false);
        }

        let now = Utc::now();

        if !accepted {
            if !self
                .attempts
                .resolve(pending.id, AttemptStatus::Pending, AttemptStatus::Rejected, now)
                .await?
            {
                return Ok(false);
            }
            metrics::counter!("dispatch_offers_rejected").increment(1);
            tracing::info!(%order_id, %driver_id, "offer rejected, retrying with next driver");

            // self-healing: the rejecting driver is now excluded
            self.dispatch_locked(order_id).await?;
            return Ok(true);
        }

        // Re-check the order before finalizing: a cancellation upstream may
        // have landed while the offer was out.
        let Some(order) = self.orders.get_order(order_id).await? else {
            self.attempts
                .resolve(pending.id, AttemptStatus::Pending, AttemptStatus::Cancelled, now)
                .await?;
            return Ok(false);
        };
        if !order.status.can_assign_driver() || order.has_driver() {
            tracing::info!(
                %order_id,
                %driver_id,
                status = %order.status,
                "acceptance arrived for an order no longer assignable"
            );
            self.attempts
                .resolve(pending.id, AttemptStatus::Pending, AttemptStatus::Cancelled, now)
                .await?;
            return Ok(false);
        }

        if !self
            .attempts
            .resolve(pending.id, AttemptStatus::Pending, AttemptStatus::Accepted, now)
            .await?
        {
            return Ok(false);
        }

        self.orders.update_driver(order_id, Some(driver_id)).await?;

        let event = DriverAssigned {
            order_id,
            driver_id,
        };
        self.outbox.append(vec![OutboxEntry::for_event(&event)?]).await?;

        metrics::counter!("dispatch_assignments_total").increment(1);
        tracing::info!(%order_id, %driver_id, "driver assigned");
        Ok(true)
    }

    /// Expires every PENDING offer older than the configured timeout and
    /// re-dispatches the affected orders that are still unassigned and
    /// eligible. Returns the number of offers expired.
    ///
    /// This is a periodic sweep, not a per-offer timer: bounded expiry
    /// latency in exchange for having no in-memory timers to lose on
    /// restart.
    #[tracing::instrument(skip(self))]
    pub async fn expire_pending_offers(&self) -> Result<usize> {
        let timeout = chrono::Duration::from_std(self.config.offer_timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(DEFAULT_OFFER_TIMEOUT.as_secs() as i64));
        let cutoff = Utc::now() - timeout;

        let stale = self.attempts.pending_older_than(cutoff).await?;
        let mut expired = 0usize;

        for attempt in stale {
            let lock = self.locks.for_order(attempt.order_id);
            let _guard = lock.lock().await;

            // Re-check under the lock: a response may have resolved it.
            if !self
                .attempts
                .resolve(
                    attempt.id,
                    AttemptStatus::Pending,
                    AttemptStatus::Expired,
                    Utc::now(),
                )
                .await?
            {
                continue;
            }

            expired += 1;
            metrics::counter!("dispatch_offers_expired").increment(1);
            tracing::info!(
                order_id = %attempt.order_id,
                driver_id = %attempt.driver_id,
                attempt_id = %attempt.id,
                "offer expired"
            );

            self.dispatch_locked(attempt.order_id).await?;
        }

        Ok(expired)
    }

    /// Handles a driver abandoning an assignment they had accepted.
    ///
    /// Valid only while the order is in an active delivery state and the
    /// driver matches the assignment; otherwise returns false. On success
    /// the order reverts to dispatch eligibility and a fresh offer is
    /// sought, excluding every driver who has failed this order before.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_assignment(&self, order_id: OrderId, driver_id: DriverId) -> Result<bool> {
        let lock = self.locks.for_order(order_id);
        let _guard = lock.lock().await;

        let Some(order) = self.orders.get_order(order_id).await? else {
            tracing::warn!(%order_id, "cancellation for unknown order");
            return Ok(false);
        };

        if order.assigned_driver_id != Some(driver_id) || !order.status.delivery_active() {
            tracing::debug!(
                %order_id,
                %driver_id,
                status = %order.status,
                "cancellation rejected: driver or status mismatch"
            );
            return Ok(false);
        }

        let accepted = self
            .attempts
            .attempts_for_order(order_id)
            .await?
            .into_iter()
            .find(|a| a.driver_id == driver_id && a.status == AttemptStatus::Accepted);
        let Some(accepted) = accepted else {
            tracing::warn!(%order_id, %driver_id, "assigned order has no accepted attempt");
            return Ok(false);
        };

        if !self
            .attempts
            .resolve(
                accepted.id,
                AttemptStatus::Accepted,
                AttemptStatus::Cancelled,
                Utc::now(),
            )
            .await?
        {
            return Ok(false);
        }

        self.orders.update_driver(order_id, None).await?;
        self.orders
            .update_status(order_id, OrderStatus::Accepted)
            .await?;

        metrics::counter!("dispatch_assignments_cancelled").increment(1);
        tracing::info!(%order_id, %driver_id, "assignment cancelled, re-dispatching");

        self.dispatch_locked(order_id).await?;
        Ok(true)
    }

    /// Reports where the order stands in the dispatch process.
    ///
    /// Returns `None` for an unknown order.
    pub async fn dispatch_status(&self, order_id: OrderId) -> Result<Option<DispatchStatus>> {
        let Some(order) = self.orders.get_order(order_id).await? else {
            return Ok(None);
        };

        if let Some(driver_id) = order.assigned_driver_id {
            return Ok(Some(DispatchStatus {
                status: DispatchPhase::Assigned,
                current_driver_id: Some(driver_id),
                pending_offer_id: None,
            }));
        }

        if let Some(pending) = self.attempts.pending_for_order(order_id).await? {
            return Ok(Some(DispatchStatus {
                status: DispatchPhase::PendingOffer,
                current_driver_id: Some(pending.driver_id),
                pending_offer_id: Some(pending.id),
            }));
        }

        Ok(Some(DispatchStatus {
            status: DispatchPhase::AwaitingDispatch,
            current_driver_id: None,
            pending_offer_id: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{
        GeoPoint, InMemoryDriverNotifier, InMemoryDriverRegistry, InMemoryOrderStore, Order,
    };
    use outbox::InMemoryOutboxStore;

    use crate::memory::InMemoryDispatchStore;

    type TestEngine = DispatchEngine<
        InMemoryOrderStore,
        InMemoryDriverRegistry,
        InMemoryDispatchStore,
        InMemoryDriverNotifier,
        InMemoryOutboxStore,
    >;

    struct Harness {
        engine: Arc<TestEngine>,
        orders: InMemoryOrderStore,
        registry: InMemoryDriverRegistry,
        attempts: InMemoryDispatchStore,
        notifier: InMemoryDriverNotifier,
        outbox: InMemoryOutboxStore,
    }

    fn setup() -> Harness {
        let orders = InMemoryOrderStore::new();
        let registry = InMemoryDriverRegistry::new();
        let attempts = InMemoryDispatchStore::new();
        let notifier = InMemoryDriverNotifier::new();
        let outbox = InMemoryOutboxStore::new();

        let engine = Arc::new(DispatchEngine::new(
            orders.clone(),
            registry.clone(),
            attempts.clone(),
            notifier.clone(),
            outbox.clone(),
        ));

        Harness {
            engine,
            orders,
            registry,
            attempts,
            notifier,
            outbox,
        }
    }

    /// Seeds an order whose restaurant sits at the origin.
    async fn seed_order(orders: &InMemoryOrderStore, status: OrderStatus) -> OrderId {
        let mut order = Order::submitted(
            OrderId::new(),
            common::RestaurantId::new(),
            GeoPoint::new(10.0, 10.0),
            GeoPoint::new(0.0, 0.0),
        );
        order.status = status;
        let id = order.id;
        orders.insert(order).await.unwrap();
        id
    }

    fn driver_at(registry: &InMemoryDriverRegistry, lat: f64, lon: f64) -> DriverId {
        let id = DriverId::new();
        registry.add_driver(id, GeoPoint::new(lat, lon));
        id
    }

    #[tokio::test]
    async fn nearest_driver_gets_the_first_offer() {
        let h = setup();
        let order_id = seed_order(&h.orders, OrderStatus::Accepted).await;
        let far = driver_at(&h.registry, 5.0, 0.0);
        let near = driver_at(&h.registry, 1.0, 0.0);

        let attempt = h.engine.start_dispatch(order_id).await.unwrap().unwrap();

        assert_eq!(attempt.driver_id, near);
        assert_ne!(attempt.driver_id, far);
        assert_eq!(h.notifier.notifications(), vec![(near, order_id)]);
    }

    #[tokio::test]
    async fn dispatch_is_a_noop_for_unknown_order() {
        let h = setup();
        driver_at(&h.registry, 1.0, 0.0);
        let result = h.engine.start_dispatch(OrderId::new()).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn dispatch_is_a_noop_for_ineligible_status() {
        let h = setup();
        driver_at(&h.registry, 1.0, 0.0);
        for status in [
            OrderStatus::Submitted,
            OrderStatus::DriverAssigned,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ] {
            let order_id = seed_order(&h.orders, status).await;
            assert!(h.engine.start_dispatch(order_id).await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn dispatch_is_a_noop_when_driver_already_assigned() {
        let h = setup();
        let order_id = seed_order(&h.orders, OrderStatus::Accepted).await;
        driver_at(&h.registry, 1.0, 0.0);
        h.orders
            .update_driver(order_id, Some(DriverId::new()))
            .await
            .unwrap();

        assert!(h.engine.start_dispatch(order_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dispatch_is_a_noop_with_no_available_drivers() {
        let h = setup();
        let order_id = seed_order(&h.orders, OrderStatus::Accepted).await;
        assert!(h.engine.start_dispatch(order_id).await.unwrap().is_none());
        assert_eq!(h.attempts.attempt_count().await, 0);
    }

    #[tokio::test]
    async fn second_dispatch_does_not_create_second_offer() {
        let h = setup();
        let order_id = seed_order(&h.orders, OrderStatus::Accepted).await;
        driver_at(&h.registry, 1.0, 0.0);
        driver_at(&h.registry, 2.0, 0.0);

        assert!(h.engine.start_dispatch(order_id).await.unwrap().is_some());
        assert!(h.engine.start_dispatch(order_id).await.unwrap().is_none());
        assert_eq!(h.attempts.attempt_count().await, 1);
    }

    #[tokio::test]
    async fn concurrent_dispatch_creates_at_most_one_live_offer() {
        let h = setup();
        let order_id = seed_order(&h.orders, OrderStatus::Accepted).await;
        for i in 0..5 {
            driver_at(&h.registry, 1.0 + i as f64, 0.0);
        }

        let mut handles = Vec::new();
        for _ in 0..10 {
            let engine = Arc::clone(&h.engine);
            handles.push(tokio::spawn(
                async move { engine.start_dispatch(order_id).await },
            ));
        }

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_some() {
                created += 1;
            }
        }

        assert_eq!(created, 1);
        assert!(h
            .attempts
            .pending_for_order(order_id)
            .await
            .unwrap()
            .is_some());
        assert_eq!(h.attempts.attempt_count().await, 1);
    }

    #[tokio::test]
    async fn accept_assigns_driver_and_emits_event() {
        let h = setup();
        let order_id = seed_order(&h.orders, OrderStatus::Accepted).await;
        let driver = driver_at(&h.registry, 1.0, 0.0);

        h.engine.start_dispatch(order_id).await.unwrap().unwrap();
        let ok = h
            .engine
            .respond_to_offer(order_id, driver, true)
            .await
            .unwrap();
        assert!(ok);

        let order = h.orders.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.assigned_driver_id, Some(driver));

        let entries = h
            .outbox
            .entries_for_aggregate(order_id.as_uuid())
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event_type, "DriverAssigned");
        assert_eq!(entries[0].payload["driverId"], driver.to_string());
    }

    #[tokio::test]
    async fn reject_excludes_driver_and_reoffers_to_next() {
        let h = setup();
        let order_id = seed_order(&h.orders, OrderStatus::Accepted).await;
        let d1 = driver_at(&h.registry, 2.0, 0.0);
        let d2 = driver_at(&h.registry, 4.0, 0.0);

        let first = h.engine.start_dispatch(order_id).await.unwrap().unwrap();
        assert_eq!(first.driver_id, d1);

        let ok = h.engine.respond_to_offer(order_id, d1, false).await.unwrap();
        assert!(ok);

        let pending = h
            .attempts
            .pending_for_order(order_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pending.driver_id, d2);

        let rejected = h.attempts.get(first.id).await.unwrap().unwrap();
        assert_eq!(rejected.status, AttemptStatus::Rejected);
        assert!(rejected.responded_at.is_some());

        // now accept with the second driver
        let ok = h.engine.respond_to_offer(order_id, d2, true).await.unwrap();
        assert!(ok);
        let order = h.orders.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.assigned_driver_id, Some(d2));
    }

    #[tokio::test]
    async fn rejected_driver_is_never_offered_the_order_again() {
        let h = setup();
        let order_id = seed_order(&h.orders, OrderStatus::Accepted).await;
        let d1 = driver_at(&h.registry, 1.0, 0.0);

        h.engine.start_dispatch(order_id).await.unwrap().unwrap();
        h.engine
            .respond_to_offer(order_id, d1, false)
            .await
            .unwrap();

        // d1 is the only driver, so no new offer can exist
        assert!(h
            .attempts
            .pending_for_order(order_id)
            .await
            .unwrap()
            .is_none());
        assert!(h.engine.start_dispatch(order_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn response_without_live_offer_is_stale() {
        let h = setup();
        let order_id = seed_order(&h.orders, OrderStatus::Accepted).await;
        let driver = driver_at(&h.registry, 1.0, 0.0);

        let ok = h
            .engine
            .respond_to_offer(order_id, driver, true)
            .await
            .unwrap();
        assert!(!ok);
    }

    #[tokio::test]
    async fn response_from_wrong_driver_is_stale() {
        let h = setup();
        let order_id = seed_order(&h.orders, OrderStatus::Accepted).await;
        let holder = driver_at(&h.registry, 1.0, 0.0);
        let other = DriverId::new();

        h.engine.start_dispatch(order_id).await.unwrap().unwrap();
        assert!(!h
            .engine
            .respond_to_offer(order_id, other, true)
            .await
            .unwrap());

        // the real holder's offer is untouched
        let pending = h
            .attempts
            .pending_for_order(order_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pending.driver_id, holder);
    }

    #[tokio::test]
    async fn acceptance_after_upstream_cancellation_is_voided() {
        let h = setup();
        let order_id = seed_order(&h.orders, OrderStatus::Accepted).await;
        let driver = driver_at(&h.registry, 1.0, 0.0);

        let attempt = h.engine.start_dispatch(order_id).await.unwrap().unwrap();

        // order cancelled upstream while the offer was out
        h.orders
            .update_status(order_id, OrderStatus::Cancelled)
            .await
            .unwrap();

        let ok = h
            .engine
            .respond_to_offer(order_id, driver, true)
            .await
            .unwrap();
        assert!(!ok);

        let resolved = h.attempts.get(attempt.id).await.unwrap().unwrap();
        assert_eq!(resolved.status, AttemptStatus::Cancelled);
        let order = h.orders.get_order(order_id).await.unwrap().unwrap();
        assert!(order.assigned_driver_id.is_none());
    }

    #[tokio::test]
    async fn notification_failure_does_not_void_the_offer() {
        let h = setup();
        let order_id = seed_order(&h.orders, OrderStatus::Accepted).await;
        driver_at(&h.registry, 1.0, 0.0);
        h.notifier.set_fail(true);

        let attempt = h.engine.start_dispatch(order_id).await.unwrap();
        assert!(attempt.is_some());
        assert!(h
            .attempts
            .pending_for_order(order_id)
            .await
            .unwrap()
            .is_some());
    }

    /// Builds an engine whose offers expire almost immediately.
    fn setup_with_short_timeout() -> Harness {
        let h = setup();
        let engine = DispatchEngine::new(
            h.orders.clone(),
            h.registry.clone(),
            h.attempts.clone(),
            h.notifier.clone(),
            h.outbox.clone(),
        )
        .with_config(DispatchConfig {
            offer_timeout: Duration::from_millis(20),
        });
        Harness {
            engine: Arc::new(engine),
            ..h
        }
    }

    #[tokio::test]
    async fn expiry_resolves_stale_offers_and_redispatches() {
        let h = setup_with_short_timeout();
        let order_id = seed_order(&h.orders, OrderStatus::Accepted).await;
        let d1 = driver_at(&h.registry, 1.0, 0.0);
        let d2 = driver_at(&h.registry, 2.0, 0.0);

        let first = h.engine.start_dispatch(order_id).await.unwrap().unwrap();
        assert_eq!(first.driver_id, d1);

        tokio::time::sleep(Duration::from_millis(40)).await;
        let expired = h.engine.expire_pending_offers().await.unwrap();
        assert_eq!(expired, 1);

        let resolved = h.attempts.get(first.id).await.unwrap().unwrap();
        assert_eq!(resolved.status, AttemptStatus::Expired);

        let pending = h
            .attempts
            .pending_for_order(order_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pending.driver_id, d2);
    }

    #[tokio::test]
    async fn expiry_without_remaining_drivers_leaves_order_unoffered() {
        let h = setup_with_short_timeout();
        let order_id = seed_order(&h.orders, OrderStatus::Accepted).await;
        driver_at(&h.registry, 1.0, 0.0);
        h.engine.start_dispatch(order_id).await.unwrap().unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(h.engine.expire_pending_offers().await.unwrap(), 1);
        assert!(h
            .attempts
            .pending_for_order(order_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn fresh_offers_survive_the_sweep() {
        let h = setup();
        let order_id = seed_order(&h.orders, OrderStatus::Accepted).await;
        driver_at(&h.registry, 1.0, 0.0);
        h.engine.start_dispatch(order_id).await.unwrap().unwrap();

        assert_eq!(h.engine.expire_pending_offers().await.unwrap(), 0);
        assert!(h
            .attempts
            .pending_for_order(order_id)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn cancellation_reverts_order_and_redispatches_excluding_both() {
        let h = setup();
        let order_id = seed_order(&h.orders, OrderStatus::Accepted).await;
        let d1 = driver_at(&h.registry, 2.0, 0.0);
        let d2 = driver_at(&h.registry, 4.0, 0.0);
        let d3 = driver_at(&h.registry, 6.0, 0.0);

        // D1 rejects, D2 accepts
        h.engine.start_dispatch(order_id).await.unwrap().unwrap();
        h.engine
            .respond_to_offer(order_id, d1, false)
            .await
            .unwrap();
        h.engine.respond_to_offer(order_id, d2, true).await.unwrap();

        // the saga would have moved the order on; simulate it
        h.orders
            .update_status(order_id, OrderStatus::DriverAssigned)
            .await
            .unwrap();

        let ok = h.engine.cancel_assignment(order_id, d2).await.unwrap();
        assert!(ok);

        let order = h.orders.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Accepted);
        assert!(order.assigned_driver_id.is_none());

        // the fresh offer goes to D3: D1 rejected, D2 cancelled
        let pending = h
            .attempts
            .pending_for_order(order_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pending.driver_id, d3);
    }

    #[tokio::test]
    async fn cancellation_by_wrong_driver_is_rejected() {
        let h = setup();
        let order_id = seed_order(&h.orders, OrderStatus::Accepted).await;
        let driver = driver_at(&h.registry, 1.0, 0.0);

        h.engine.start_dispatch(order_id).await.unwrap().unwrap();
        h.engine
            .respond_to_offer(order_id, driver, true)
            .await
            .unwrap();
        h.orders
            .update_status(order_id, OrderStatus::DriverAssigned)
            .await
            .unwrap();

        assert!(!h
            .engine
            .cancel_assignment(order_id, DriverId::new())
            .await
            .unwrap());
        let order = h.orders.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.assigned_driver_id, Some(driver));
    }

    #[tokio::test]
    async fn cancellation_in_terminal_status_is_rejected() {
        let h = setup();
        let order_id = seed_order(&h.orders, OrderStatus::Accepted).await;
        let driver = driver_at(&h.registry, 1.0, 0.0);

        h.engine.start_dispatch(order_id).await.unwrap().unwrap();
        h.engine
            .respond_to_offer(order_id, driver, true)
            .await
            .unwrap();
        h.orders
            .update_status(order_id, OrderStatus::Delivered)
            .await
            .unwrap();

        assert!(!h.engine.cancel_assignment(order_id, driver).await.unwrap());
    }

    #[tokio::test]
    async fn dispatch_status_reports_each_phase() {
        let h = setup();
        let order_id = seed_order(&h.orders, OrderStatus::Accepted).await;

        let status = h.engine.dispatch_status(order_id).await.unwrap().unwrap();
        assert_eq!(status.status, DispatchPhase::AwaitingDispatch);

        let driver = driver_at(&h.registry, 1.0, 0.0);
        let attempt = h.engine.start_dispatch(order_id).await.unwrap().unwrap();

        let status = h.engine.dispatch_status(order_id).await.unwrap().unwrap();
        assert_eq!(status.status, DispatchPhase::PendingOffer);
        assert_eq!(status.pending_offer_id, Some(attempt.id));
        assert_eq!(status.current_driver_id, Some(driver));

        h.engine
            .respond_to_offer(order_id, driver, true)
            .await
            .unwrap();
        let status = h.engine.dispatch_status(order_id).await.unwrap().unwrap();
        assert_eq!(status.status, DispatchPhase::Assigned);
        assert_eq!(status.current_driver_id, Some(driver));
        assert_eq!(status.pending_offer_id, None);

        assert!(h
            .engine
            .dispatch_status(OrderId::new())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn score_ties_break_on_driver_id() {
        let h = setup();
        let order_id = seed_order(&h.orders, OrderStatus::Accepted).await;
        let a = driver_at(&h.registry, 3.0, 0.0);
        let b = driver_at(&h.registry, 3.0, 0.0);
        let expected = if a < b { a } else { b };

        let attempt = h.engine.start_dispatch(order_id).await.unwrap().unwrap();
        assert_eq!(attempt.driver_id, expected);
    }
}
