//! Dispatch attempt record and its state machine.

use chrono::{DateTime, Utc};
use common::{DriverId, OrderId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttemptId(Uuid);

impl AttemptId {
    /// Creates a new random attempt ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an attempt ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AttemptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The state of a dispatch attempt.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Accepted
///           ├──► Rejected
///           ├──► Expired
///           └──► Cancelled
/// ```
/// All four outcomes are terminal; no attempt leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptStatus {
    /// The offer is live and awaiting the driver's response.
    Pending,

    /// The driver accepted the offer (terminal state).
    Accepted,

    /// The driver declined the offer (terminal state).
    Rejected,

    /// The offer timed out without a response (terminal state).
    Expired,

    /// The assignment was cancelled after acceptance (terminal state).
    Cancelled,
}

impl AttemptStatus {
    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AttemptStatus::Pending)
    }

    /// Returns true if an attempt in this status permanently excludes the
    /// driver from future offers for the order.
    pub fn excludes_driver(&self) -> bool {
        matches!(
            self,
            AttemptStatus::Rejected | AttemptStatus::Expired | AttemptStatus::Cancelled
        )
    }

    /// Returns the status name as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Pending => "PENDING",
            AttemptStatus::Accepted => "ACCEPTED",
            AttemptStatus::Rejected => "REJECTED",
            AttemptStatus::Expired => "EXPIRED",
            AttemptStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single offer of an order to a driver.
///
/// Attempts are append-only audit records: created PENDING by the engine
/// and resolved exactly once by the response, expiry, or cancellation
/// handler. Never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchAttempt {
    /// Unique attempt identifier.
    pub id: AttemptId,

    /// The order being offered.
    pub order_id: OrderId,

    /// The driver holding the offer.
    pub driver_id: DriverId,

    /// Current state of the attempt.
    pub status: AttemptStatus,

    /// When the offer was created.
    pub offered_at: DateTime<Utc>,

    /// When the attempt was resolved, if it has been.
    pub responded_at: Option<DateTime<Utc>>,
}

impl DispatchAttempt {
    /// Creates a fresh PENDING offer for the driver.
    pub fn pending(order_id: OrderId, driver_id: DriverId) -> Self {
        Self {
            id: AttemptId::new(),
            order_id,
            driver_id,
            status: AttemptStatus::Pending,
            offered_at: Utc::now(),
            responded_at: None,
        }
    }

    /// Returns true if the offer is still live.
    pub fn is_pending(&self) -> bool {
        self.status == AttemptStatus::Pending
    }
}
