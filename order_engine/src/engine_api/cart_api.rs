use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{ProductId, Principal, MAX_LINE_QUANTITY},
    engine_api::order_objects::{CartSummary, FullOrder},
    traits::{CartManagement, OrderFlowError},
};

/// Cart management and checkout for the authenticated customer.
pub struct CartApi<B> {
    db: B,
    currency: String,
}

impl<B> Debug for CartApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CartApi ({})", self.currency)
    }
}

impl<B> CartApi<B> {
    /// New orders are created in `currency`.
    pub fn new<S: Into<String>>(db: B, currency: S) -> Self {
        Self { db, currency: currency.into() }
    }
}

impl<B> CartApi<B>
where B: CartManagement
{
    /// The caller's cart, priced at current catalog prices. The cart is created if it does not exist yet.
    pub async fn view_cart(&self, principal: &Principal) -> Result<CartSummary, OrderFlowError> {
        let cart = self.db.fetch_or_create_cart(principal.user_id).await?;
        let items = self.db.fetch_cart_items(cart.id).await?;
        Ok(CartSummary::new(cart, items))
    }

    pub async fn add_to_cart(
        &self,
        principal: &Principal,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<CartSummary, OrderFlowError> {
        if !(1..=MAX_LINE_QUANTITY).contains(&quantity) {
            return Err(OrderFlowError::ValidationError(format!(
                "Quantity must be between 1 and {MAX_LINE_QUANTITY}, not {quantity}"
            )));
        }
        let item = self.db.add_cart_item(principal.user_id, product_id, quantity).await?;
        debug!(
            "🛒️ User {} added {quantity} x {} to their cart. Line total is now {}",
            principal.user_id,
            item.product_name,
            item.line_total()
        );
        self.view_cart(principal).await
    }

    pub async fn remove_from_cart(
        &self,
        principal: &Principal,
        product_id: ProductId,
    ) -> Result<CartSummary, OrderFlowError> {
        if !self.db.remove_cart_item(principal.user_id, product_id).await? {
            return Err(OrderFlowError::CartItemNotFound(product_id));
        }
        debug!("🛒️ User {} removed {product_id} from their cart", principal.user_id);
        self.view_cart(principal).await
    }

    /// Converts the caller's cart into a `pending` order. Stock is not touched until the order is paid.
    pub async fn checkout(&self, principal: &Principal) -> Result<FullOrder, OrderFlowError> {
        let (order, items) = self.db.checkout_cart(principal.user_id, &self.currency).await?;
        info!(
            "🛒️ User {} checked out order {} with {} lines, totalling {} {}",
            principal.user_id,
            order.id,
            items.len(),
            order.total_amount,
            order.currency
        );
        Ok(FullOrder::new(order, items))
    }
}
