use crate::domain::value_objects::OrderId;
use crate::ports::order_service::{OrderDetails, OrderService as OrderServiceTrait, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Mock implementation of OrderService
///
/// Supports stateful testing by storing order details in memory.
pub struct OrderService {
    orders: Mutex<HashMap<OrderId, OrderDetails>>,
}

impl OrderService {
    pub fn new() -> Self {
        Self {
            orders: Mutex::new(HashMap::new()),
        }
    }

    /// Register an order for testing purposes
    pub fn add_order(&self, order: OrderDetails) {
        self.orders.lock().unwrap().insert(order.order_id, order);
    }
}

impl Default for OrderService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderServiceTrait for OrderService {
    /// Look up a registered order
    async fn get_order(&self, order_id: OrderId) -> Result<Option<OrderDetails>> {
        Ok(self.orders.lock().unwrap().get(&order_id).cloned())
    }
}
