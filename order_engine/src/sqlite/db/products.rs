use log::{debug, warn};
use sqlx::SqliteConnection;

use crate::{
    db_types::{InventoryAlert, NewProduct, OrderId, Product, ProductId},
    traits::{InventoryAdjustment, OrderFlowError},
};

pub async fn insert_product(product: NewProduct, conn: &mut SqliteConnection) -> Result<Product, OrderFlowError> {
    if product.price.is_negative() || product.inventory < 0 {
        return Err(OrderFlowError::ValidationError("Price and inventory cannot be negative".into()));
    }
    let product: Product =
        sqlx::query_as("INSERT INTO products (name, price, inventory) VALUES ($1, $2, $3) RETURNING *")
            .bind(product.name)
            .bind(product.price)
            .bind(product.inventory)
            .fetch_one(conn)
            .await?;
    debug!("🗃️ Product {} ({}) created with price {}", product.id, product.name, product.price);
    Ok(product)
}

pub async fn fetch_product(id: ProductId, conn: &mut SqliteConnection) -> Result<Option<Product>, OrderFlowError> {
    let product = sqlx::query_as("SELECT * FROM products WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(product)
}

/// Deducts stock for a product, clamping at zero. This is not atomic on its own: run it inside a transaction that
/// has already taken the write lock (e.g. after the order status update) to keep the read and the write consistent.
///
/// If there is not enough stock on hand, the shortfall is recorded in `inventory_alerts`.
pub async fn decrement_inventory(
    product_id: ProductId,
    quantity: i64,
    order_id: Option<OrderId>,
    conn: &mut SqliteConnection,
) -> Result<InventoryAdjustment, OrderFlowError> {
    if quantity <= 0 {
        return Err(OrderFlowError::ValidationError(format!("Cannot deduct {quantity} units of stock")));
    }
    let previous: Option<i64> = sqlx::query_scalar("SELECT inventory FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_optional(&mut *conn)
        .await?;
    let previous = previous.ok_or(OrderFlowError::ProductNotFound(product_id))?;
    let remaining: i64 = sqlx::query_scalar(
        "UPDATE products SET inventory = MAX(inventory - $1, 0), updated_at = CURRENT_TIMESTAMP WHERE id = $2 \
         RETURNING inventory",
    )
    .bind(quantity)
    .bind(product_id)
    .fetch_one(&mut *conn)
    .await?;
    let adjustment = InventoryAdjustment { product_id, requested: quantity, previous, remaining };
    if adjustment.shortfall() > 0 {
        warn!(
            "🗃️ Stock shortfall on {product_id}: {quantity} units requested but only {previous} on hand. Inventory \
             has been clamped at zero."
        );
        sqlx::query("INSERT INTO inventory_alerts (product_id, order_id, requested, available) VALUES ($1, $2, $3, $4)")
            .bind(product_id)
            .bind(order_id)
            .bind(quantity)
            .bind(previous)
            .execute(&mut *conn)
            .await?;
    }
    debug!("🗃️ Stock for {product_id} reduced from {previous} to {remaining}");
    Ok(adjustment)
}

pub async fn fetch_inventory_alerts(conn: &mut SqliteConnection) -> Result<Vec<InventoryAlert>, OrderFlowError> {
    let alerts = sqlx::query_as("SELECT * FROM inventory_alerts ORDER BY id DESC").fetch_all(conn).await?;
    Ok(alerts)
}
