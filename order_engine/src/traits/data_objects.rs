use serde::{Deserialize, Serialize};

use crate::db_types::{Money, Order, OrderItem, OrderStatusType, ProductId};

/// The outcome of an attempt to mark an order as paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkPaidResult {
    /// The order moved from `pending` to `paid` in this call, and stock was deducted.
    Paid { order: Order, items: Vec<OrderItem>, adjustments: Vec<InventoryAdjustment> },
    /// The order had already been paid (and may have progressed further). Nothing changed.
    AlreadyPaid(Order),
    /// The order is cancelled or refunded and can no longer be paid. Nothing changed.
    NotPayable(Order),
}

impl MarkPaidResult {
    pub fn order(&self) -> &Order {
        match self {
            MarkPaidResult::Paid { order, .. } => order,
            MarkPaidResult::AlreadyPaid(order) => order,
            MarkPaidResult::NotPayable(order) => order,
        }
    }

    pub fn newly_paid(&self) -> bool {
        matches!(self, MarkPaidResult::Paid { .. })
    }
}

/// A stock deduction applied to a single product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryAdjustment {
    pub product_id: ProductId,
    pub requested: i64,
    pub previous: i64,
    pub remaining: i64,
}

impl InventoryAdjustment {
    /// Units that could not be covered by stock on hand.
    pub fn shortfall(&self) -> i64 {
        (self.requested - self.previous).max(0)
    }
}

/// A status change along with the details that some transitions require.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: OrderStatusType,
    pub tracking_number: Option<String>,
    pub courier: Option<String>,
}

impl StatusUpdate {
    pub fn new(status: OrderStatusType) -> Self {
        Self { status, tracking_number: None, courier: None }
    }

    pub fn with_shipping(mut self, tracking_number: &str, courier: &str) -> Self {
        self.tracking_number = Some(tracking_number.to_string());
        self.courier = Some(courier.to_string());
        self
    }
}

/// Count and summed totals of all orders with the given status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StatusTotal {
    pub status: OrderStatusType,
    pub count: i64,
    pub amount: Money,
}

/// Order count and revenue for a single calendar day (UTC), as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DailyTotal {
    /// `YYYY-MM-DD`
    pub day: String,
    pub count: i64,
    pub revenue: Money,
}
