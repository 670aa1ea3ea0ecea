//! The order projection consumed by the fulfillment core.

use common::{DriverId, OrderId, RestaurantId};
use serde::{Deserialize, Serialize};

use crate::location::GeoPoint;
use crate::status::OrderStatus;

/// Projection of an order as seen by the saga manager and dispatch engine.
///
/// The order-writing component owns this record; this core reads it and
/// conditionally mutates `status` and `assigned_driver_id` through the
/// order store. `assigned_driver_id` is non-null only in statuses at or
/// after driver assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Unique order identifier.
    pub id: OrderId,

    /// Current lifecycle status.
    pub status: OrderStatus,

    /// Driver currently assigned to deliver the order, if any.
    pub assigned_driver_id: Option<DriverId>,

    /// The restaurant preparing the order.
    pub restaurant_id: RestaurantId,

    /// Delivery destination.
    pub customer_location: GeoPoint,

    /// Pickup point, used for driver proximity ranking.
    pub restaurant_location: GeoPoint,
}

impl Order {
    /// Creates a freshly submitted order with no driver assigned.
    pub fn submitted(
        id: OrderId,
        restaurant_id: RestaurantId,
        customer_location: GeoPoint,
        restaurant_location: GeoPoint,
    ) -> Self {
        Self {
            id,
            status: OrderStatus::Submitted,
            assigned_driver_id: None,
            restaurant_id,
            customer_location,
            restaurant_location,
        }
    }

    /// Returns true if a driver is currently assigned.
    pub fn has_driver(&self) -> bool {
        self.assigned_driver_id.is_some()
    }
}
