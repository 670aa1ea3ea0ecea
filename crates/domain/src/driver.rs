//! Driver registry and driver notification interfaces.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{DriverId, OrderId};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};
use crate::location::GeoPoint;

/// Read-only view of a driver currently available for deliveries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableDriver {
    pub driver_id: DriverId,
    pub location: GeoPoint,
}

/// Interface to the driver-availability service.
///
/// Consulted, never owned, by the dispatch engine.
#[async_trait]
pub trait DriverRegistry: Send + Sync {
    /// Returns the drivers currently available for an offer.
    async fn get_available_drivers(&self) -> Result<Vec<AvailableDriver>>;
}

/// Interface for pushing a delivery offer to a driver's device.
///
/// Delivery of the notification is best effort; the offer itself lives in
/// the dispatch store and expires through the periodic sweep regardless.
#[async_trait]
pub trait DriverNotifier: Send + Sync {
    /// Notifies a driver that an offer for the order awaits their response.
    async fn notify_offer(&self, driver_id: DriverId, order_id: OrderId) -> Result<()>;
}

#[derive(Debug, Default)]
struct InMemoryRegistryState {
    drivers: HashMap<DriverId, GeoPoint>,
    fail: bool,
}

/// In-memory driver registry for testing.
#[derive(Clone, Default)]
pub struct InMemoryDriverRegistry {
    state: Arc<RwLock<InMemoryRegistryState>>,
}

impl InMemoryDriverRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or relocates an available driver.
    pub fn add_driver(&self, driver_id: DriverId, location: GeoPoint) {
        self.state.write().unwrap().drivers.insert(driver_id, location);
    }

    /// Removes a driver from availability.
    pub fn remove_driver(&self, driver_id: DriverId) {
        self.state.write().unwrap().drivers.remove(&driver_id);
    }

    /// Configures the registry to fail lookups, simulating an outage.
    pub fn set_fail(&self, fail: bool) {
        self.state.write().unwrap().fail = fail;
    }

    /// Returns the number of available drivers.
    pub fn driver_count(&self) -> usize {
        self.state.read().unwrap().drivers.len()
    }
}

#[async_trait]
impl DriverRegistry for InMemoryDriverRegistry {
    async fn get_available_drivers(&self) -> Result<Vec<AvailableDriver>> {
        let state = self.state.read().unwrap();
        if state.fail {
            return Err(DomainError::Registry("simulated outage".to_string()));
        }
        Ok(state
            .drivers
            .iter()
            .map(|(driver_id, location)| AvailableDriver {
                driver_id: *driver_id,
                location: *location,
            })
            .collect())
    }
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    notifications: Vec<(DriverId, OrderId)>,
    fail: bool,
}

/// In-memory driver notifier for testing.
#[derive(Clone, Default)]
pub struct InMemoryDriverNotifier {
    state: Arc<RwLock<InMemoryNotifierState>>,
}

impl InMemoryDriverNotifier {
    /// Creates a new notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the notifier to fail, simulating an unreachable device.
    pub fn set_fail(&self, fail: bool) {
        self.state.write().unwrap().fail = fail;
    }

    /// Returns the number of notifications sent.
    pub fn notification_count(&self) -> usize {
        self.state.read().unwrap().notifications.len()
    }

    /// Returns all notifications in send order.
    pub fn notifications(&self) -> Vec<(DriverId, OrderId)> {
        self.state.read().unwrap().notifications.clone()
    }
}

#[async_trait]
impl DriverNotifier for InMemoryDriverNotifier {
    async fn notify_offer(&self, driver_id: DriverId, order_id: OrderId) -> Result<()> {
        let mut state = self.state.write().unwrap();
        if state.fail {
            return Err(DomainError::Registry(
                "driver device unreachable".to_string(),
            ));
        }
        state.notifications.push((driver_id, order_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_and_list_drivers() {
        let registry = InMemoryDriverRegistry::new();
        let driver = DriverId::new();
        registry.add_driver(driver, GeoPoint::new(1.0, 2.0));

        let drivers = registry.get_available_drivers().await.unwrap();
        assert_eq!(drivers.len(), 1);
        assert_eq!(drivers[0].driver_id, driver);

        registry.remove_driver(driver);
        assert!(registry.get_available_drivers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn registry_outage() {
        let registry = InMemoryDriverRegistry::new();
        registry.set_fail(true);
        let result = registry.get_available_drivers().await;
        assert!(matches!(result, Err(DomainError::Registry(_))));
        assert!(result.unwrap_err().is_transient());
    }

    #[tokio::test]
    async fn notifier_records_offers() {
        let notifier = InMemoryDriverNotifier::new();
        let driver = DriverId::new();
        let order = OrderId::new();

        notifier.notify_offer(driver, order).await.unwrap();

        assert_eq!(notifier.notification_count(), 1);
        assert_eq!(notifier.notifications(), vec![(driver, order)]);
    }

    #[tokio::test]
    async fn notifier_outage() {
        let notifier = InMemoryDriverNotifier::new();
        notifier.set_fail(true);
        assert!(notifier
            .notify_offer(DriverId::new(), OrderId::new())
            .await
            .is_err());
        assert_eq!(notifier.notification_count(), 0);
    }
}
