//! The order fulfillment saga state machine.

use std::sync::Arc;

use domain::{
    AssignDriverCommand, DeliveryCompleted, DriverAssigned, DriverDeliveryFailed, Order,
    OrderPlaced, OrderStatus, OrderStore, RestaurantOrderAccepted, RestaurantOrderRejected,
    RestaurantOrderRequest,
};
use outbox::{EventEnvelope, OutboxEntry, OutboxStore, OutboxStoreExt};

use crate::error::{Result, SagaError};
use crate::router::EventRouter;

/// Advances orders through the fulfillment lifecycle.
///
/// Each handler loads the order, checks the precondition status, applies
/// the transition, and emits at most one follow-up command through the
/// outbox. An order that has already advanced past the precondition makes
/// the handler a no-op, which is what makes redelivery and duplicate
/// consumption safe.
///
/// Transition table (event → precondition → new status → emits):
///
/// | event                   | precondition              | new status     | emits                  |
/// |-------------------------|---------------------------|----------------|------------------------|
/// | OrderPlaced             | Submitted                 | Submitted      | RestaurantOrderRequest |
/// | RestaurantOrderAccepted | Submitted                 | Accepted       | AssignDriverCommand    |
/// | RestaurantOrderRejected | Submitted or Accepted     | Cancelled      | —                      |
/// | DriverAssigned          | Accepted/AwaitingDriver   | DriverAssigned | —                      |
/// | DeliveryCompleted       | DriverAssigned/Dispatched | Delivered      | —                      |
/// | DriverDeliveryFailed    | DriverAssigned/Dispatched | DispatchFailed | —                      |
pub struct SagaManager<O, B>
where
    O: OrderStore,
    B: OutboxStore,
{
    orders: O,
    outbox: B,
}

impl<O, B> SagaManager<O, B>
where
    O: OrderStore,
    B: OutboxStore,
{
    /// Creates a saga manager over the given stores.
    pub fn new(orders: O, outbox: B) -> Self {
        Self { orders, outbox }
    }

    /// Loads the order an event refers to. A missing order is dropped with
    /// a log line: the order producer is the source of truth, and a record
    /// that does not exist there will not appear by retrying here.
    async fn load_order(&self, event_type: &str, order: common::OrderId) -> Result<Option<Order>> {
        let loaded = self.orders.get_order(order).await?;
        if loaded.is_none() {
            metrics::counter!("saga_events_dropped").increment(1);
            tracing::warn!(order_id = %order, event_type, "event references unknown order, dropping");
        }
        Ok(loaded)
    }

    fn skip(event_type: &str, order: &Order) {
        metrics::counter!("saga_events_skipped").increment(1);
        tracing::debug!(
            order_id = %order.id,
            status = %order.status,
            event_type,
            "order already past precondition, no-op"
        );
    }

    /// A customer placed an order: ask the restaurant to confirm it.
    ///
    /// The status does not change here, so the emitted request itself is
    /// the idempotency witness: a redelivered OrderPlaced finds the
    /// request already in the outbox and does nothing.
    #[tracing::instrument(skip(self, event), fields(order_id = %event.order_id))]
    pub async fn on_order_placed(&self, event: OrderPlaced) -> Result<()> {
        let Some(order) = self.load_order(OrderPlaced::EVENT_TYPE, event.order_id).await? else {
            return Ok(());
        };

        if order.status != OrderStatus::Submitted {
            Self::skip(OrderPlaced::EVENT_TYPE, &order);
            return Ok(());
        }

        let already_requested = self
            .outbox
            .entries_for_aggregate(order.id.as_uuid())
            .await?
            .iter()
            .any(|e| e.event_type == RestaurantOrderRequest::EVENT_TYPE);
        if already_requested {
            Self::skip(OrderPlaced::EVENT_TYPE, &order);
            return Ok(());
        }

        let request = RestaurantOrderRequest {
            order_id: order.id,
            restaurant_id: order.restaurant_id,
        };
        self.outbox
            .append_entry(OutboxEntry::for_event(&request)?)
            .await?;

        tracing::info!(order_id = %order.id, "restaurant confirmation requested");
        Ok(())
    }

    /// The restaurant accepted: mark the order and request a driver.
    #[tracing::instrument(skip(self, event), fields(order_id = %event.order_id))]
    pub async fn on_restaurant_accepted(&self, event: RestaurantOrderAccepted) -> Result<()> {
        let Some(order) = self
            .load_order(RestaurantOrderAccepted::EVENT_TYPE, event.order_id)
            .await?
        else {
            return Ok(());
        };

        if order.status != OrderStatus::Submitted {
            Self::skip(RestaurantOrderAccepted::EVENT_TYPE, &order);
            return Ok(());
        }

        self.orders
            .update_status(order.id, OrderStatus::Accepted)
            .await?;

        let command = AssignDriverCommand {
            order_id: order.id,
            restaurant_id: order.restaurant_id,
        };
        self.outbox
            .append_entry(OutboxEntry::for_event(&command)?)
            .await?;

        tracing::info!(order_id = %order.id, "order accepted, driver assignment requested");
        Ok(())
    }

    /// The restaurant rejected: cancel the order.
    #[tracing::instrument(skip(self, event), fields(order_id = %event.order_id))]
    pub async fn on_restaurant_rejected(&self, event: RestaurantOrderRejected) -> Result<()> {
        let Some(order) = self
            .load_order(RestaurantOrderRejected::EVENT_TYPE, event.order_id)
            .await?
        else {
            return Ok(());
        };

        if !order.status.awaiting_restaurant() {
            Self::skip(RestaurantOrderRejected::EVENT_TYPE, &order);
            return Ok(());
        }

        self.orders
            .update_status(order.id, OrderStatus::Cancelled)
            .await?;

        tracing::info!(
            order_id = %order.id,
            reason = %event.reason,
            "order cancelled by restaurant rejection"
        );
        Ok(())
    }

    /// A driver accepted the delivery offer.
    #[tracing::instrument(skip(self, event), fields(order_id = %event.order_id))]
    pub async fn on_driver_assigned(&self, event: DriverAssigned) -> Result<()> {
        let Some(order) = self
            .load_order(DriverAssigned::EVENT_TYPE, event.order_id)
            .await?
        else {
            return Ok(());
        };

        if !order.status.can_assign_driver() {
            Self::skip(DriverAssigned::EVENT_TYPE, &order);
            return Ok(());
        }

        if order.assigned_driver_id != Some(event.driver_id) {
            self.orders
                .update_driver(order.id, Some(event.driver_id))
                .await?;
        }
        self.orders
            .update_status(order.id, OrderStatus::DriverAssigned)
            .await?;

        tracing::info!(order_id = %order.id, driver_id = %event.driver_id, "driver assigned");
        Ok(())
    }

    /// The driver delivered the order: terminal success.
    #[tracing::instrument(skip(self, event), fields(order_id = %event.order_id))]
    pub async fn on_delivery_completed(&self, event: DeliveryCompleted) -> Result<()> {
        let Some(order) = self
            .load_order(DeliveryCompleted::EVENT_TYPE, event.order_id)
            .await?
        else {
            return Ok(());
        };

        if !order.status.delivery_active() {
            Self::skip(DeliveryCompleted::EVENT_TYPE, &order);
            return Ok(());
        }

        self.orders
            .update_status(order.id, OrderStatus::Delivered)
            .await?;

        metrics::counter!("saga_orders_delivered").increment(1);
        tracing::info!(order_id = %order.id, driver_id = %event.driver_id, "order delivered");
        Ok(())
    }

    /// The driver could not complete the delivery: terminal failure.
    #[tracing::instrument(skip(self, event), fields(order_id = %event.order_id))]
    pub async fn on_delivery_failed(&self, event: DriverDeliveryFailed) -> Result<()> {
        let Some(order) = self
            .load_order(DriverDeliveryFailed::EVENT_TYPE, event.order_id)
            .await?
        else {
            return Ok(());
        };

        if !order.status.delivery_active() {
            Self::skip(DriverDeliveryFailed::EVENT_TYPE, &order);
            return Ok(());
        }

        self.orders
            .update_status(order.id, OrderStatus::DispatchFailed)
            .await?;

        metrics::counter!("saga_orders_dispatch_failed").increment(1);
        tracing::warn!(
            order_id = %order.id,
            driver_id = %event.driver_id,
            reason = %event.reason,
            "delivery failed"
        );
        Ok(())
    }
}

/// Parses an envelope payload, mapping failures to [`SagaError::Malformed`].
fn parse<T: serde::de::DeserializeOwned>(envelope: &EventEnvelope) -> Result<T> {
    envelope.payload_as().map_err(|source| SagaError::Malformed {
        event_type: envelope.event_type.clone(),
        source,
    })
}

/// Registers every saga handler on the router, keyed by event type.
pub fn register_saga_handlers<O, B>(router: &mut EventRouter, manager: Arc<SagaManager<O, B>>)
where
    O: OrderStore + 'static,
    B: OutboxStore + 'static,
{
    let m = Arc::clone(&manager);
    router.register(OrderPlaced::EVENT_TYPE, move |env| {
        let m = Arc::clone(&m);
        async move { m.on_order_placed(parse(&env)?).await }
    });

    let m = Arc::clone(&manager);
    router.register(RestaurantOrderAccepted::EVENT_TYPE, move |env| {
        let m = Arc::clone(&m);
        async move { m.on_restaurant_accepted(parse(&env)?).await }
    });

    let m = Arc::clone(&manager);
    router.register(RestaurantOrderRejected::EVENT_TYPE, move |env| {
        let m = Arc::clone(&m);
        async move { m.on_restaurant_rejected(parse(&env)?).await }
    });

    let m = Arc::clone(&manager);
    router.register(DriverAssigned::EVENT_TYPE, move |env| {
        let m = Arc::clone(&m);
        async move { m.on_driver_assigned(parse(&env)?).await }
    });

    let m = Arc::clone(&manager);
    router.register(DeliveryCompleted::EVENT_TYPE, move |env| {
        let m = Arc::clone(&m);
        async move { m.on_delivery_completed(parse(&env)?).await }
    });

    let m = Arc::clone(&manager);
    router.register(DriverDeliveryFailed::EVENT_TYPE, move |env| {
        let m = Arc::clone(&m);
        async move { m.on_delivery_failed(parse(&env)?).await }
    });
}
