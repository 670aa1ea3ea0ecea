//! Order store interface and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{DriverId, OrderId};
use tokio::sync::RwLock;

use crate::error::{DomainError, Result};
use crate::order::Order;
use crate::status::OrderStatus;

/// Interface to the order projection owned by the order-writing component.
///
/// Callers follow read-then-conditional-write: load the order, check its
/// current status, then apply the mutation. The store itself does not
/// enforce transition legality.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Loads an order by ID. `None` if it does not exist.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Sets the order's status.
    async fn update_status(&self, id: OrderId, status: OrderStatus) -> Result<()>;

    /// Sets or clears the order's assigned driver.
    async fn update_driver(&self, id: OrderId, driver_id: Option<DriverId>) -> Result<()>;

    /// Inserts a new order record. Exposed for the order-writing
    /// collaborator and for tests.
    async fn insert(&self, order: Order) -> Result<()>;
}

#[derive(Debug, Default)]
struct InMemoryOrderState {
    orders: HashMap<OrderId, Order>,
    fail_remaining: u32,
    fail_always: bool,
}

impl InMemoryOrderState {
    fn check_available(&mut self) -> Result<()> {
        if self.fail_always {
            return Err(DomainError::Storage("simulated outage".to_string()));
        }
        if self.fail_remaining > 0 {
            self.fail_remaining -= 1;
            return Err(DomainError::Storage("simulated outage".to_string()));
        }
        Ok(())
    }
}

/// In-memory order store for testing and single-process deployments.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<RwLock<InMemoryOrderState>>,
}

impl InMemoryOrderStore {
    /// Creates a new empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the store to fail every operation, simulating an outage.
    pub async fn set_fail(&self, fail: bool) {
        self.state.write().await.fail_always = fail;
    }

    /// Configures the store to fail the next `n` operations, then recover.
    pub async fn set_fail_times(&self, n: u32) {
        self.state.write().await.fail_remaining = n;
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let mut state = self.state.write().await;
        state.check_available()?;
        Ok(state.orders.get(&id).cloned())
    }

    async fn update_status(&self, id: OrderId, status: OrderStatus) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_available()?;
        let order = state
            .orders
            .get_mut(&id)
            .ok_or(DomainError::OrderNotFound(id))?;
        order.status = status;
        Ok(())
    }

    async fn update_driver(&self, id: OrderId, driver_id: Option<DriverId>) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_available()?;
        let order = state
            .orders
            .get_mut(&id)
            .ok_or(DomainError::OrderNotFound(id))?;
        order.assigned_driver_id = driver_id;
        Ok(())
    }

    async fn insert(&self, order: Order) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_available()?;
        state.orders.insert(order.id, order);
        Ok(())
    }
}
