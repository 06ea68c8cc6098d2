//! `SqliteDatabase` is a concrete implementation of an order engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`]
//! module.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqlitePool;

use super::db::{carts, db_url, new_pool, orders, products, reports};
use crate::{
    db_types::{
        Cart,
        CartItem,
        InventoryAlert,
        Money,
        NewOrder,
        NewProduct,
        Order,
        OrderId,
        OrderItem,
        OrderStatusType,
        PaymentProviderKind,
        PaymentReference,
        Product,
        ProductId,
        MAX_LINE_QUANTITY,
    },
    engine_api::order_objects::OrderQueryFilter,
    traits::{
        CartManagement,
        CatalogManagement,
        DailyTotal,
        InventoryAdjustment,
        MarkPaidResult,
        OrderFlowError,
        OrderManagement,
        PaymentGatewayDatabase,
        ReportingManagement,
        StatusTotal,
        StatusUpdate,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl PaymentGatewayDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::insert_order(order, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn bind_provider_order(
        &self,
        order_id: OrderId,
        provider: PaymentProviderKind,
        provider_order_id: &str,
    ) -> Result<Order, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        if let Some(order) = orders::bind_provider_order(order_id, provider, provider_order_id, &mut conn).await? {
            debug!("🗃️ Order {order_id} is bound to {provider} order {provider_order_id}");
            return Ok(order);
        }
        match orders::fetch_order(order_id, &mut conn).await? {
            None => Err(OrderFlowError::OrderNotFound(order_id)),
            Some(order) if order.status != OrderStatusType::Pending => {
                Err(OrderFlowError::OrderNotPayable { id: order_id, status: order.status })
            },
            Some(_) => Err(OrderFlowError::ProviderReferenceConflict(order_id)),
        }
    }

    /// Takes a payment confirmation, and in a single atomic transaction,
    /// * moves the order from `pending` to `paid`. If this does not happen, nothing further is done.
    /// * deducts stock for every line item, clamping at zero and recording any shortfall.
    async fn mark_order_paid(
        &self,
        order_id: OrderId,
        reference: &PaymentReference,
    ) -> Result<MarkPaidResult, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let Some(order) = orders::set_paid_if_pending(order_id, reference, &mut tx).await? else {
            tx.rollback().await?;
            return self.classify_unpayable_order(order_id).await;
        };
        let items = orders::fetch_order_items(order_id, &mut tx).await?;
        let mut adjustments = Vec::with_capacity(items.len());
        for item in &items {
            let adjustment =
                products::decrement_inventory(item.product_id, item.quantity, Some(order_id), &mut tx).await?;
            adjustments.push(adjustment);
        }
        tx.commit().await?;
        debug!("🗃️ Order {order_id} marked as paid via {}. Stock deducted for {} items.", reference.provider, items.len());
        Ok(MarkPaidResult::Paid { order, items, adjustments })
    }

    async fn update_order_status(
        &self,
        order_id: OrderId,
        expected: OrderStatusType,
        update: StatusUpdate,
    ) -> Result<Option<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::update_status_if(order_id, expected, update, &mut conn).await?;
        Ok(order)
    }

    async fn refund_order(&self, order_id: OrderId) -> Result<Option<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::refund_if_refundable(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn force_refund_by_payment_id(
        &self,
        provider: PaymentProviderKind,
        provider_payment_id: &str,
    ) -> Result<Option<(OrderStatusType, Order)>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let result = orders::force_refund_by_payment_id(provider, provider_payment_id, &mut conn).await?;
        Ok(result)
    }

    async fn cancel_stale_orders(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let cancelled = orders::cancel_stale_orders(cutoff, &mut conn).await?;
        Ok(cancelled)
    }
}

impl OrderManagement for SqliteDatabase {
    async fn fetch_order(&self, order_id: OrderId) -> Result<Option<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order(order_id, &mut conn).await
    }

    async fn fetch_order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_items(order_id, &mut conn).await
    }

    async fn fetch_orders_for_user(&self, user_id: i64) -> Result<Vec<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_orders_for_user(user_id, &mut conn).await
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        orders::search_orders(query, &mut conn).await
    }

    async fn fetch_order_by_provider_order_id(
        &self,
        provider: PaymentProviderKind,
        provider_order_id: &str,
    ) -> Result<Option<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_by_provider_order_id(provider, provider_order_id, &mut conn).await
    }
}

impl CartManagement for SqliteDatabase {
    async fn fetch_or_create_cart(&self, user_id: i64) -> Result<Cart, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        carts::fetch_or_create_cart(user_id, &mut conn).await
    }

    async fn fetch_cart(&self, user_id: i64) -> Result<Option<Cart>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        carts::fetch_cart(user_id, &mut conn).await
    }

    async fn fetch_cart_items(&self, cart_id: i64) -> Result<Vec<CartItem>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        carts::fetch_cart_items(cart_id, &mut conn).await
    }

    async fn add_cart_item(
        &self,
        user_id: i64,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<CartItem, OrderFlowError> {
        if !(1..=MAX_LINE_QUANTITY).contains(&quantity) {
            return Err(carts::quantity_error(quantity));
        }
        let mut tx = self.pool.begin().await?;
        let cart = carts::fetch_or_create_cart(user_id, &mut tx).await?;
        if products::fetch_product(product_id, &mut tx).await?.is_none() {
            return Err(OrderFlowError::ProductNotFound(product_id));
        }
        let item = carts::add_item(cart.id, product_id, quantity, &mut tx).await?;
        let lines = carts::fetch_cart_items(cart.id, &mut tx).await?;
        let total = lines.iter().try_fold(Money::default(), |total, line| {
            line.unit_price.checked_mul(line.quantity).and_then(|amount| total.checked_add(amount))
        });
        if total.is_none() {
            return Err(OrderFlowError::ValidationError("The cart total would be too large to be charged".into()));
        }
        tx.commit().await?;
        Ok(item)
    }

    async fn remove_cart_item(&self, user_id: i64, product_id: ProductId) -> Result<bool, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let Some(cart) = carts::fetch_cart(user_id, &mut conn).await? else {
            return Ok(false);
        };
        carts::remove_item(cart.id, product_id, &mut conn).await
    }

    /// In a single atomic transaction:
    /// * locks the user's cart
    /// * snapshots every line at the product's current price into a new `pending` order
    /// * empties the cart
    async fn checkout_cart(&self, user_id: i64, currency: &str) -> Result<(Order, Vec<OrderItem>), OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let cart = carts::lock_cart(user_id, &mut tx).await?.ok_or(OrderFlowError::CartNotFound(user_id))?;
        let lines = carts::fetch_cart_items(cart.id, &mut tx).await?;
        if lines.is_empty() {
            return Err(OrderFlowError::EmptyCart);
        }
        let new_order = lines
            .iter()
            .fold(NewOrder::new(user_id, currency), |order, line| {
                order.with_item(line.product_id, line.quantity, line.unit_price)
            });
        let order = orders::insert_order(new_order, &mut tx).await?;
        let items = orders::fetch_order_items(order.id, &mut tx).await?;
        let cleared = carts::clear_cart(cart.id, &mut tx).await?;
        tx.commit().await?;
        trace!("🗃️ Cart {} converted into order {}. {cleared} lines cleared.", cart.id, order.id);
        Ok((order, items))
    }
}

impl CatalogManagement for SqliteDatabase {
    async fn fetch_product(&self, product_id: ProductId) -> Result<Option<Product>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        products::fetch_product(product_id, &mut conn).await
    }

    async fn insert_product(&self, product: NewProduct) -> Result<Product, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        products::insert_product(product, &mut conn).await
    }

    async fn decrement_inventory(
        &self,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<InventoryAdjustment, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let adjustment = products::decrement_inventory(product_id, quantity, None, &mut tx).await?;
        tx.commit().await?;
        Ok(adjustment)
    }

    async fn fetch_inventory_alerts(&self) -> Result<Vec<InventoryAlert>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        products::fetch_inventory_alerts(&mut conn).await
    }
}

impl ReportingManagement for SqliteDatabase {
    async fn fetch_status_totals(&self) -> Result<Vec<StatusTotal>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        reports::fetch_status_totals(&mut conn).await
    }

    async fn fetch_daily_totals(
        &self,
        since: DateTime<Utc>,
        revenue_statuses: &[OrderStatusType],
    ) -> Result<Vec<DailyTotal>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        reports::fetch_daily_totals(since, revenue_statuses, &mut conn).await
    }
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Brings the schema up to date. Migrations that have already been applied are skipped.
    pub async fn migrate(&self) -> Result<(), OrderFlowError> {
        sqlx::migrate!("./src/sqlite/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| OrderFlowError::DatabaseError(format!("Could not run migrations. {e}")))?;
        info!("🗃️ Database migrations are up to date");
        Ok(())
    }

    /// Works out why an order could not be marked as paid.
    async fn classify_unpayable_order(&self, order_id: OrderId) -> Result<MarkPaidResult, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order(order_id, &mut conn).await?.ok_or(OrderFlowError::OrderNotFound(order_id))?;
        match order.status {
            OrderStatusType::Pending => Err(OrderFlowError::ProviderReferenceConflict(order_id)),
            _ if order.paid_at.is_some() => Ok(MarkPaidResult::AlreadyPaid(order)),
            _ => Ok(MarkPaidResult::NotPayable(order)),
        }
    }
}
