use crate::{
    db_types::{Order, OrderId, OrderItem, PaymentProviderKind},
    engine_api::order_objects::OrderQueryFilter,
    traits::OrderFlowError,
};

/// Read-only queries over orders and their line items.
#[allow(async_fn_in_trait)]
pub trait OrderManagement {
    async fn fetch_order(&self, order_id: OrderId) -> Result<Option<Order>, OrderFlowError>;

    async fn fetch_order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, OrderFlowError>;

    /// Fetches all orders owned by the given user, newest first.
    async fn fetch_orders_for_user(&self, user_id: i64) -> Result<Vec<Order>, OrderFlowError>;

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderFlowError>;

    async fn fetch_order_by_provider_order_id(
        &self,
        provider: PaymentProviderKind,
        provider_order_id: &str,
    ) -> Result<Option<Order>, OrderFlowError>;
}
