use crate::{
    db_types::{InventoryAlert, NewProduct, Product, ProductId},
    traits::{InventoryAdjustment, OrderFlowError},
};

/// The slice of the product catalog the order engine relies on: price lookups and stock accounting.
#[allow(async_fn_in_trait)]
pub trait CatalogManagement {
    async fn fetch_product(&self, product_id: ProductId) -> Result<Option<Product>, OrderFlowError>;

    async fn insert_product(&self, product: NewProduct) -> Result<Product, OrderFlowError>;

    /// Deducts `quantity` units of stock, clamping at zero. Prefer [`crate::traits::PaymentGatewayDatabase::mark_order_paid`],
    /// which deducts stock for a whole order atomically with the status change.
    async fn decrement_inventory(
        &self,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<InventoryAdjustment, OrderFlowError>;

    /// Fetches all recorded stock shortfalls, newest first.
    async fn fetch_inventory_alerts(&self) -> Result<Vec<InventoryAlert>, OrderFlowError>;
}
