use crate::{
    db_types::{Cart, CartItem, Order, OrderItem, ProductId},
    traits::OrderFlowError,
};

/// Carts hold a user's selections until checkout. There is at most one cart per user.
#[allow(async_fn_in_trait)]
pub trait CartManagement {
    /// Fetches the user's cart, creating an empty one if it does not exist yet.
    async fn fetch_or_create_cart(&self, user_id: i64) -> Result<Cart, OrderFlowError>;

    /// Fetches the user's cart, if one has ever been created.
    async fn fetch_cart(&self, user_id: i64) -> Result<Option<Cart>, OrderFlowError>;

    /// Fetches the lines in the cart, priced at the products' current prices.
    async fn fetch_cart_items(&self, cart_id: i64) -> Result<Vec<CartItem>, OrderFlowError>;

    /// Adds `quantity` units of the product to the user's cart. If the product is already in the cart, the quantities
    /// are summed. Fails with [`OrderFlowError::ProductNotFound`] if the product does not exist.
    async fn add_cart_item(
        &self,
        user_id: i64,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<CartItem, OrderFlowError>;

    /// Removes the product from the user's cart. Returns false if it was not in the cart.
    async fn remove_cart_item(&self, user_id: i64, product_id: ProductId) -> Result<bool, OrderFlowError>;

    /// Converts the user's cart into a new `pending` order, in a single atomic transaction. Prices are snapshotted from
    /// the current product prices and the cart is emptied. Inventory is not touched.
    ///
    /// Fails with [`OrderFlowError::CartNotFound`] if the user has no cart and [`OrderFlowError::EmptyCart`] if it has
    /// no items.
    async fn checkout_cart(&self, user_id: i64, currency: &str) -> Result<(Order, Vec<OrderItem>), OrderFlowError>;
}
