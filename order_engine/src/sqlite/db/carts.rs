use log::trace;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Cart, CartItem, ProductId, MAX_LINE_QUANTITY},
    traits::OrderFlowError,
};

const CART_ITEM_SELECT: &str = r#"
    SELECT
        cart_items.id AS id,
        cart_items.cart_id AS cart_id,
        cart_items.product_id AS product_id,
        products.name AS product_name,
        cart_items.quantity AS quantity,
        products.price AS unit_price
    FROM cart_items JOIN products ON products.id = cart_items.product_id
"#;

pub async fn fetch_cart(user_id: i64, conn: &mut SqliteConnection) -> Result<Option<Cart>, OrderFlowError> {
    let cart = sqlx::query_as("SELECT * FROM carts WHERE user_id = $1").bind(user_id).fetch_optional(conn).await?;
    Ok(cart)
}

/// Fetches the user's cart with an update statement, so that a transaction that starts with this call holds the
/// write lock from the outset.
pub async fn lock_cart(user_id: i64, conn: &mut SqliteConnection) -> Result<Option<Cart>, OrderFlowError> {
    let cart = sqlx::query_as("UPDATE carts SET updated_at = CURRENT_TIMESTAMP WHERE user_id = $1 RETURNING *")
        .bind(user_id)
        .fetch_optional(conn)
        .await?;
    Ok(cart)
}

/// Carts are created lazily. The upsert makes this safe to call concurrently for the same user.
pub async fn fetch_or_create_cart(user_id: i64, conn: &mut SqliteConnection) -> Result<Cart, OrderFlowError> {
    sqlx::query("INSERT INTO carts (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    let cart = sqlx::query_as("SELECT * FROM carts WHERE user_id = $1").bind(user_id).fetch_one(&mut *conn).await?;
    Ok(cart)
}

pub async fn fetch_cart_items(cart_id: i64, conn: &mut SqliteConnection) -> Result<Vec<CartItem>, OrderFlowError> {
    let sql = format!("{CART_ITEM_SELECT} WHERE cart_items.cart_id = $1 ORDER BY cart_items.id");
    let items = sqlx::query_as(&sql).bind(cart_id).fetch_all(conn).await?;
    Ok(items)
}

/// Adds the product to the cart, or increases the quantity of the existing line if the product is already there.
/// A line never holds more than [`MAX_LINE_QUANTITY`] units; an addition that would exceed it changes nothing.
pub async fn add_item(
    cart_id: i64,
    product_id: ProductId,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<CartItem, OrderFlowError> {
    if !(1..=MAX_LINE_QUANTITY).contains(&quantity) {
        return Err(quantity_error(quantity));
    }
    let id: Option<i64> = sqlx::query_scalar(
        r#"
        INSERT INTO cart_items (cart_id, product_id, quantity) VALUES ($1, $2, $3)
        ON CONFLICT (cart_id, product_id) DO UPDATE SET quantity = quantity + excluded.quantity
        WHERE quantity + excluded.quantity <= $4
        RETURNING id
        "#,
    )
    .bind(cart_id)
    .bind(product_id)
    .bind(quantity)
    .bind(MAX_LINE_QUANTITY)
    .fetch_optional(&mut *conn)
    .await?;
    let Some(id) = id else {
        return Err(OrderFlowError::ValidationError(format!(
            "A cart line cannot hold more than {MAX_LINE_QUANTITY} units of {product_id}"
        )));
    };
    touch_cart(cart_id, conn).await?;
    let sql = format!("{CART_ITEM_SELECT} WHERE cart_items.id = $1");
    let item: CartItem = sqlx::query_as(&sql).bind(id).fetch_one(&mut *conn).await?;
    trace!("🗃️ Cart {cart_id} now holds {} x {}", item.quantity, item.product_name);
    Ok(item)
}

pub fn quantity_error(quantity: i64) -> OrderFlowError {
    OrderFlowError::ValidationError(format!("Quantity must be between 1 and {MAX_LINE_QUANTITY}, not {quantity}"))
}

pub async fn remove_item(
    cart_id: i64,
    product_id: ProductId,
    conn: &mut SqliteConnection,
) -> Result<bool, OrderFlowError> {
    let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND product_id = $2")
        .bind(cart_id)
        .bind(product_id)
        .execute(&mut *conn)
        .await?;
    touch_cart(cart_id, conn).await?;
    Ok(result.rows_affected() > 0)
}

/// Empties the cart. The cart itself is kept.
pub async fn clear_cart(cart_id: i64, conn: &mut SqliteConnection) -> Result<u64, OrderFlowError> {
    let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1").bind(cart_id).execute(&mut *conn).await?;
    touch_cart(cart_id, conn).await?;
    Ok(result.rows_affected())
}

async fn touch_cart(cart_id: i64, conn: &mut SqliteConnection) -> Result<(), OrderFlowError> {
    sqlx::query("UPDATE carts SET updated_at = CURRENT_TIMESTAMP WHERE id = $1").bind(cart_id).execute(conn).await?;
    Ok(())
}
