//! Cross-service event payloads produced and consumed by this core.
//!
//! Every payload is a self-contained snapshot: consumers never follow a
//! foreign key back to the producer's database. Field names are camelCase
//! on the wire.

use common::{DriverId, OrderId, RestaurantId, UserId};
use outbox::PublishableEvent;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Topic carrying order lifecycle events.
pub const ORDER_EVENTS_TOPIC: &str = "orders.events";

/// Topic carrying commands for the restaurant service.
pub const RESTAURANT_COMMANDS_TOPIC: &str = "restaurant.commands";

/// Topic carrying commands for the dispatch engine.
pub const DISPATCH_COMMANDS_TOPIC: &str = "dispatch.commands";

/// Generates the [`PublishableEvent`] impl and wire-label constant for an
/// event payload. All fulfillment events partition by order ID.
macro_rules! publishable {
    ($name:ident, $topic:expr) => {
        impl $name {
            /// Wire label of this event.
            pub const EVENT_TYPE: &'static str = stringify!($name);
        }

        impl PublishableEvent for $name {
            fn event_type(&self) -> &'static str {
                Self::EVENT_TYPE
            }

            fn destination_topic(&self) -> &'static str {
                $topic
            }

            fn aggregate_id(&self) -> Uuid {
                self.order_id.as_uuid()
            }
        }
    };
}

/// A customer placed an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPlaced {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub total_cents: i64,
}

publishable!(OrderPlaced, ORDER_EVENTS_TOPIC);

/// Ask the restaurant to confirm it will prepare the order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestaurantOrderRequest {
    pub order_id: OrderId,
    pub restaurant_id: RestaurantId,
}

publishable!(RestaurantOrderRequest, RESTAURANT_COMMANDS_TOPIC);

/// The restaurant accepted the order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestaurantOrderAccepted {
    pub order_id: OrderId,
    pub restaurant_id: RestaurantId,
}

publishable!(RestaurantOrderAccepted, ORDER_EVENTS_TOPIC);

/// The restaurant rejected the order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestaurantOrderRejected {
    pub order_id: OrderId,
    pub restaurant_id: RestaurantId,
    pub reason: String,
}

publishable!(RestaurantOrderRejected, ORDER_EVENTS_TOPIC);

/// Ask the dispatch engine to find a driver for the order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignDriverCommand {
    pub order_id: OrderId,
    pub restaurant_id: RestaurantId,
}

publishable!(AssignDriverCommand, DISPATCH_COMMANDS_TOPIC);

/// A driver accepted the delivery offer for the order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverAssigned {
    pub order_id: OrderId,
    pub driver_id: DriverId,
}

publishable!(DriverAssigned, ORDER_EVENTS_TOPIC);

/// The assigned driver delivered the order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryCompleted {
    pub order_id: OrderId,
    pub driver_id: DriverId,
}

publishable!(DeliveryCompleted, ORDER_EVENTS_TOPIC);

/// The assigned driver could not complete the delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverDeliveryFailed {
    pub order_id: OrderId,
    pub driver_id: DriverId,
    pub reason: String,
}

publishable!(DriverDeliveryFailed, ORDER_EVENTS_TOPIC);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payloads_serialize_camel_case() {
        let event = OrderPlaced {
            order_id: OrderId::new(),
            user_id: UserId::new(),
            total_cents: 2599,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("orderId").is_some());
        assert!(json.get("userId").is_some());
        assert_eq!(json["totalCents"], 2599);
    }

    #[test]
    fn event_types_match_struct_names() {
        assert_eq!(OrderPlaced::EVENT_TYPE, "OrderPlaced");
        assert_eq!(AssignDriverCommand::EVENT_TYPE, "AssignDriverCommand");
        assert_eq!(DriverDeliveryFailed::EVENT_TYPE, "DriverDeliveryFailed");
    }

    #[test]
    fn events_partition_by_order_id() {
        let order_id = OrderId::new();
        let event = DriverAssigned {
            order_id,
            driver_id: DriverId::new(),
        };
        assert_eq!(event.aggregate_id(), order_id.as_uuid());
        assert_eq!(event.destination_topic(), ORDER_EVENTS_TOPIC);
    }

    #[test]
    fn command_topics() {
        let order_id = OrderId::new();
        let restaurant_id = RestaurantId::new();

        let request = RestaurantOrderRequest {
            order_id,
            restaurant_id,
        };
        assert_eq!(request.destination_topic(), RESTAURANT_COMMANDS_TOPIC);

        let assign = AssignDriverCommand {
            order_id,
            restaurant_id,
        };
        assert_eq!(assign.destination_topic(), DISPATCH_COMMANDS_TOPIC);
    }
}
