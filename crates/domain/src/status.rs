//! Order status state machine.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// The status of an order in its fulfillment lifecycle.
///
/// Status transitions:
/// ```text
/// Submitted ──► Accepted ──► AwaitingDriver ──► DriverAssigned ──► Dispatched ──► Delivered
///     │             │                                │                  │
///     └─────────────┴──► Cancelled                   └──────────────────┴──► DispatchFailed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Order has been placed by the customer.
    #[default]
    Submitted,

    /// The restaurant accepted the order; eligible for driver dispatch.
    Accepted,

    /// A driver is being sought for the order.
    AwaitingDriver,

    /// A driver accepted the delivery offer.
    DriverAssigned,

    /// The driver picked up the order and is en route.
    Dispatched,

    /// The order was delivered (terminal state).
    Delivered,

    /// The order was cancelled (terminal state).
    Cancelled,

    /// No driver could complete the delivery (terminal state).
    DispatchFailed,
}

impl OrderStatus {
    /// Returns true if the restaurant's accept/reject response applies in
    /// this status. `Accepted` is included so a redelivered response stays
    /// a no-op rather than an error.
    pub fn awaiting_restaurant(&self) -> bool {
        matches!(self, OrderStatus::Submitted | OrderStatus::Accepted)
    }

    /// Returns true if the order is eligible for driver dispatch.
    pub fn dispatch_eligible(&self) -> bool {
        matches!(self, OrderStatus::Accepted | OrderStatus::AwaitingDriver)
    }

    /// Returns true if a driver assignment can be recorded in this status.
    pub fn can_assign_driver(&self) -> bool {
        matches!(self, OrderStatus::Accepted | OrderStatus::AwaitingDriver)
    }

    /// Returns true if a delivery outcome (completed/failed) applies in
    /// this status.
    pub fn delivery_active(&self) -> bool {
        matches!(self, OrderStatus::DriverAssigned | OrderStatus::Dispatched)
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::DispatchFailed
        )
    }

    /// Returns the status name as stored and transmitted.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Submitted => "SUBMITTED",
            OrderStatus::Accepted => "ACCEPTED",
            OrderStatus::AwaitingDriver => "AWAITING_DRIVER",
            OrderStatus::DriverAssigned => "DRIVER_ASSIGNED",
            OrderStatus::Dispatched => "DISPATCHED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::DispatchFailed => "DISPATCH_FAILED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = DomainError;

    /// Validates a raw stored string at the store boundary; anything
    /// outside the closed set is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUBMITTED" => Ok(OrderStatus::Submitted),
            "ACCEPTED" => Ok(OrderStatus::Accepted),
            "AWAITING_DRIVER" => Ok(OrderStatus::AwaitingDriver),
            "DRIVER_ASSIGNED" => Ok(OrderStatus::DriverAssigned),
            "DISPATCHED" => Ok(OrderStatus::Dispatched),
            "DELIVERED" => Ok(OrderStatus::Delivered),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            "DISPATCH_FAILED" => Ok(OrderStatus::DispatchFailed),
            other => Err(DomainError::InvalidStatus(other.to_string())),
        }
    }
}
