use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{
        NewOrder,
        NewOrderItem,
        Order,
        OrderId,
        OrderItem,
        OrderStatusType,
        PaymentProviderKind,
        PaymentReference,
    },
    engine_api::order_objects::OrderQueryFilter,
    traits::{OrderFlowError, StatusUpdate},
};

const FORCE_REFUND_ATTEMPTS: usize = 3;

/// Inserts a new order and its line items using the given connection. This is not atomic. You can embed this call
/// inside a transaction if you need to ensure atomicity, and pass `&mut *tx` as the connection argument.
///
/// The order total is taken from the item snapshots, and product names are copied from the catalog.
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, OrderFlowError> {
    if order.items.is_empty() {
        return Err(OrderFlowError::EmptyCart);
    }
    let total = order
        .total_amount()
        .ok_or_else(|| OrderFlowError::ValidationError("The order total is too large to be charged".into()))?;
    let inserted: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (user_id, status, total_amount, currency, created_at, updated_at)
            VALUES ($1, 'pending', $2, $3, $4, $4)
            RETURNING *;
        "#,
    )
    .bind(order.user_id)
    .bind(total)
    .bind(order.currency)
    .bind(order.created_at)
    .fetch_one(&mut *conn)
    .await?;
    for item in order.items {
        insert_order_item(inserted.id, item, conn).await?;
    }
    debug!("🗃️ Order {} inserted for user {} with total {}", inserted.id, inserted.user_id, inserted.total_amount);
    Ok(inserted)
}

async fn insert_order_item(
    order_id: OrderId,
    item: NewOrderItem,
    conn: &mut SqliteConnection,
) -> Result<(), OrderFlowError> {
    let result = sqlx::query(
        r#"
        INSERT INTO order_items (order_id, product_id, product_name, quantity, price_at_purchase)
        SELECT $1, id, name, $2, $3 FROM products WHERE id = $4
        "#,
    )
    .bind(order_id)
    .bind(item.quantity)
    .bind(item.price_at_purchase)
    .bind(item.product_id)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(OrderFlowError::ProductNotFound(item.product_id));
    }
    Ok(())
}

pub async fn fetch_order(id: OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, OrderFlowError> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_items(id: OrderId, conn: &mut SqliteConnection) -> Result<Vec<OrderItem>, OrderFlowError> {
    let items =
        sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id").bind(id).fetch_all(conn).await?;
    Ok(items)
}

pub async fn fetch_orders_for_user(user_id: i64, conn: &mut SqliteConnection) -> Result<Vec<Order>, OrderFlowError> {
    let orders = sqlx::query_as("SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC")
        .bind(user_id)
        .fetch_all(conn)
        .await?;
    Ok(orders)
}

pub async fn fetch_order_by_provider_order_id(
    provider: PaymentProviderKind,
    provider_order_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, OrderFlowError> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE payment_provider = $1 AND provider_order_id = $2")
        .bind(provider)
        .bind(provider_order_id)
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`
///
/// Resulting orders are ordered by `created_at` in descending order
pub async fn search_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, OrderFlowError> {
    let mut builder = QueryBuilder::new("SELECT * FROM orders ");
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(user_id) = query.user_id {
        where_clause.push("user_id = ");
        where_clause.push_bind_unseparated(user_id);
    }
    if let Some(provider) = query.provider {
        where_clause.push("payment_provider = ");
        where_clause.push_bind_unseparated(provider);
    }
    if let Some(statuses) = query.status.as_ref().filter(|s| !s.is_empty()) {
        where_clause.push("status IN (");
        for (i, status) in statuses.iter().enumerate() {
            if i > 0 {
                where_clause.push_unseparated(", ");
            }
            where_clause.push_bind_unseparated(*status);
        }
        where_clause.push_unseparated(")");
    }
    if let Some(since) = query.since {
        where_clause.push("unixepoch(created_at) >= ");
        where_clause.push_bind_unseparated(since.timestamp());
    }
    if let Some(until) = query.until {
        where_clause.push("unixepoch(created_at) <= ");
        where_clause.push_bind_unseparated(until.timestamp());
    }
    builder.push(" ORDER BY created_at DESC, id DESC");

    trace!("🗃️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    trace!("🗃️ Result of search_orders: {} orders", orders.len());
    Ok(orders)
}

/// Pins a provider order id to a pending order. Succeeds if nothing was bound yet, or if exactly this reference is
/// already bound. Returns `None` otherwise.
pub async fn bind_provider_order(
    id: OrderId,
    provider: PaymentProviderKind,
    provider_order_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, OrderFlowError> {
    let order = sqlx::query_as(
        r#"
        UPDATE orders SET
            payment_provider = $1,
            provider_order_id = $2,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $3
          AND status = 'pending'
          AND (payment_provider IS NULL OR payment_provider = $1)
          AND (provider_order_id IS NULL OR provider_order_id = $2)
        RETURNING *
        "#,
    )
    .bind(provider)
    .bind(provider_order_id)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// The compare-and-set at the heart of payment confirmation. The order moves to `paid` only if it is still `pending`
/// and the reference does not contradict references already on file. Concurrent callers race on this single
/// statement; exactly one of them gets the row back.
///
/// Manual confirmations leave the provider columns alone.
pub async fn set_paid_if_pending(
    id: OrderId,
    reference: &PaymentReference,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, OrderFlowError> {
    let manual = reference.provider == PaymentProviderKind::Manual;
    let order = sqlx::query_as(
        r#"
        UPDATE orders SET
            status = 'paid',
            paid_at = CURRENT_TIMESTAMP,
            updated_at = CURRENT_TIMESTAMP,
            payment_provider = CASE WHEN $5 THEN payment_provider ELSE COALESCE(payment_provider, $1) END,
            provider_order_id = CASE WHEN $5 THEN provider_order_id ELSE COALESCE(provider_order_id, $2) END,
            provider_payment_id = CASE WHEN $5 THEN provider_payment_id ELSE COALESCE(provider_payment_id, $3) END
        WHERE id = $4
          AND status = 'pending'
          AND (
            $5
            OR payment_provider IS NULL
            OR (payment_provider = $1 AND (provider_order_id IS NULL OR $2 IS NULL OR provider_order_id = $2))
          )
        RETURNING *
        "#,
    )
    .bind(reference.provider)
    .bind(reference.provider_order_id.as_deref())
    .bind(reference.provider_payment_id.as_deref())
    .bind(id)
    .bind(manual)
    .fetch_optional(conn)
    .await
    .map_err(|e| match e {
        // Another order already holds this provider reference.
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            OrderFlowError::ProviderReferenceConflict(id)
        },
        e => OrderFlowError::from(e),
    })?;
    Ok(order)
}

/// Changes the status of the order, only if its current status is `expected`. Shipping details are only ever
/// overwritten by new values, never cleared.
pub async fn update_status_if(
    id: OrderId,
    expected: OrderStatusType,
    update: StatusUpdate,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, OrderFlowError> {
    let order = sqlx::query_as(
        r#"
        UPDATE orders SET
            status = $1,
            tracking_number = COALESCE($2, tracking_number),
            courier = COALESCE($3, courier),
            shipped_at = CASE WHEN $1 = 'shipped' THEN CURRENT_TIMESTAMP ELSE shipped_at END,
            delivered_at = CASE WHEN $1 = 'delivered' THEN CURRENT_TIMESTAMP ELSE delivered_at END,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $4 AND status = $5
        RETURNING *
        "#,
    )
    .bind(update.status)
    .bind(update.tracking_number)
    .bind(update.courier)
    .bind(id)
    .bind(expected)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

pub async fn refund_if_refundable(id: OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, OrderFlowError> {
    let order = sqlx::query_as(
        "UPDATE orders SET status = 'refunded', updated_at = CURRENT_TIMESTAMP WHERE id = $1 AND status IN ('paid', \
         'shipped') RETURNING *",
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Unconditionally refunds the order carrying the payment id, unless it is already refunded.
///
/// The previous status is read first and then used as the guard of the update, so a concurrent status change is
/// detected and the read is retried.
pub async fn force_refund_by_payment_id(
    provider: PaymentProviderKind,
    provider_payment_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<(OrderStatusType, Order)>, OrderFlowError> {
    for _ in 0..FORCE_REFUND_ATTEMPTS {
        let existing: Option<Order> =
            sqlx::query_as("SELECT * FROM orders WHERE payment_provider = $1 AND provider_payment_id = $2")
                .bind(provider)
                .bind(provider_payment_id)
                .fetch_optional(&mut *conn)
                .await?;
        let Some(existing) = existing.filter(|o| o.status != OrderStatusType::Refunded) else {
            return Ok(None);
        };
        let refunded: Option<Order> = sqlx::query_as(
            "UPDATE orders SET status = 'refunded', updated_at = CURRENT_TIMESTAMP WHERE id = $1 AND status = $2 \
             RETURNING *",
        )
        .bind(existing.id)
        .bind(existing.status)
        .fetch_optional(&mut *conn)
        .await?;
        if let Some(order) = refunded {
            return Ok(Some((existing.status, order)));
        }
        trace!("🗃️ Order {} changed status while being refunded. Retrying.", existing.id);
    }
    Err(OrderFlowError::DatabaseError(format!(
        "Could not refund the order for payment {provider_payment_id} after {FORCE_REFUND_ATTEMPTS} attempts"
    )))
}

/// Bulk-cancels stale pending orders. The status filter is evaluated at the moment of the update, so orders that
/// were paid in the meantime are never touched.
pub async fn cancel_stale_orders(
    cutoff: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, OrderFlowError> {
    let orders = sqlx::query_as(
        "UPDATE orders SET status = 'cancelled', updated_at = CURRENT_TIMESTAMP WHERE status = 'pending' AND \
         unixepoch(created_at) < $1 RETURNING *",
    )
    .bind(cutoff.timestamp())
    .fetch_all(conn)
    .await?;
    Ok(orders)
}
