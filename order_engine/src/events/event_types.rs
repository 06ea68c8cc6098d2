use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderItem, OrderStatusType};

/// Emitted once, after the transaction that moved an order from `pending` to `paid` commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPaidEvent {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

impl OrderPaidEvent {
    pub fn new(order: Order, items: Vec<OrderItem>) -> Self {
        Self { order, items }
    }
}

/// Emitted after an admin transition or a refund changes an order's status. The sweep does not emit these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusChangedEvent {
    pub order: Order,
    pub old_status: OrderStatusType,
}

impl OrderStatusChangedEvent {
    pub fn new(order: Order, old_status: OrderStatusType) -> Self {
        Self { order, old_status }
    }

    pub fn new_status(&self) -> OrderStatusType {
        self.order.status
    }
}
