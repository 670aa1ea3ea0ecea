//! Domain types and collaborator interfaces for the fulfillment core.
//!
//! The order record is a projection owned by the order-writing component;
//! this core reads and conditionally mutates it through the [`OrderStore`]
//! interface. The driver registry and driver notifier are consulted, never
//! owned.

pub mod driver;
pub mod error;
pub mod events;
pub mod location;
pub mod order;
pub mod status;
pub mod store;

pub use driver::{
    AvailableDriver, DriverNotifier, DriverRegistry, InMemoryDriverNotifier,
    InMemoryDriverRegistry,
};
pub use error::{DomainError, Result};
pub use events::{
    AssignDriverCommand, DeliveryCompleted, DriverAssigned, DriverDeliveryFailed, OrderPlaced,
    RestaurantOrderAccepted, RestaurantOrderRejected, RestaurantOrderRequest,
    DISPATCH_COMMANDS_TOPIC, ORDER_EVENTS_TOPIC, RESTAURANT_COMMANDS_TOPIC,
};
pub use location::GeoPoint;
pub use order::Order;
pub use status::OrderStatus;
pub use store::{InMemoryOrderStore, OrderStore};
