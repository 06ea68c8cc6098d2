use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{NewOrder, Order, OrderId, OrderStatusType, PaymentProviderKind, PaymentReference, ProductId},
    engine_api::errors::AuthorizationError,
    traits::{
        data_objects::{MarkPaidResult, StatusUpdate},
        OrderManagement,
        PaymentProviderError,
    },
};

/// This trait defines the highest level of behaviour for backends supporting the order engine.
///
/// This behaviour includes:
/// * Storing new orders along with their line item snapshots.
/// * The compare-and-set transitions of the order state machine, including the atomic "mark paid" operation that
///   deducts stock exactly once.
/// * Binding payment provider references to orders.
/// * The bulk sweep of stale, unpaid orders.
#[allow(async_fn_in_trait)]
pub trait PaymentGatewayDatabase: Clone + OrderManagement {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Stores a new order in `pending` status along with its items, in a single atomic transaction.
    /// The order total is computed from the item snapshots.
    async fn insert_order(&self, order: NewOrder) -> Result<Order, OrderFlowError>;

    /// Pins the provider's order id to the order. This only succeeds if the order is pending and is not already
    /// bound to a different provider or provider order id. Binding the same id twice is a no-op.
    async fn bind_provider_order(
        &self,
        order_id: OrderId,
        provider: PaymentProviderKind,
        provider_order_id: &str,
    ) -> Result<Order, OrderFlowError>;

    /// Marks the order as paid, in a single atomic transaction:
    /// * The status is changed from `pending` to `paid` with a conditional update. If the order is not pending, nothing
    ///   else happens and the current order is returned in [`MarkPaidResult::AlreadyPaid`] or
    ///   [`MarkPaidResult::NotPayable`].
    /// * `paid_at` is stamped and any provider references not already on file are stored.
    /// * Inventory is deducted for every item, clamped at zero. Shortfalls are recorded as inventory alerts.
    async fn mark_order_paid(
        &self,
        order_id: OrderId,
        reference: &PaymentReference,
    ) -> Result<MarkPaidResult, OrderFlowError>;

    /// Changes the status of the order to `update.status`, but only if the order currently has status `expected`.
    /// Shipping details are stored, and the `shipped_at`/`delivered_at` timestamps stamped, as appropriate.
    ///
    /// Returns `None` if the order's status did not match `expected` (or the order does not exist).
    async fn update_order_status(
        &self,
        order_id: OrderId,
        expected: OrderStatusType,
        update: StatusUpdate,
    ) -> Result<Option<Order>, OrderFlowError>;

    /// Sets the order status to `refunded` if, and only if, it is currently `paid` or `shipped`.
    async fn refund_order(&self, order_id: OrderId) -> Result<Option<Order>, OrderFlowError>;

    /// Sets the status of the order carrying the given provider payment id to `refunded`, whatever its current status.
    /// Provider refund notifications are authoritative.
    ///
    /// Returns the status the order had before, along with the refunded order. Returns `None` if no order carries the
    /// payment id, or if the order is already refunded.
    async fn force_refund_by_payment_id(
        &self,
        provider: PaymentProviderKind,
        provider_payment_id: &str,
    ) -> Result<Option<(OrderStatusType, Order)>, OrderFlowError>;

    /// Cancels every order that is still `pending` and was created before `cutoff`, in a single bulk update.
    /// Returns the orders that were cancelled.
    async fn cancel_stale_orders(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>, OrderFlowError>;
}

/// The broad category of an [`OrderFlowError`]. Callers at the request boundary map this to a status class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    BusinessRule,
    Authorization,
    NotFound,
    ExternalProvider,
    Signature,
    Internal,
}

#[derive(Debug, Clone, Error)]
pub enum OrderFlowError {
    #[error("We have an internal database engine (configuration/uptime etc.) : {0}")]
    DatabaseError(String),
    #[error("Invalid request. {0}")]
    ValidationError(String),
    #[error("'{0}' is not a valid order status")]
    UnknownStatus(String),
    #[error("Order status cannot change from {from} to {to}")]
    IllegalTransition { from: OrderStatusType, to: OrderStatusType },
    #[error("The cart is empty")]
    EmptyCart,
    #[error("User {0} does not have a cart")]
    CartNotFound(i64),
    #[error("{0} is not in the cart")]
    CartItemNotFound(ProductId),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("The requested {0} does not exist")]
    ProductNotFound(ProductId),
    #[error("Refund not allowed for an order that is {0}")]
    RefundNotAllowed(OrderStatusType),
    #[error("No payment ID stored for order {0}")]
    MissingPaymentReference(OrderId),
    #[error("Order {id} cannot be paid, since it is {status}")]
    OrderNotPayable { id: OrderId, status: OrderStatusType },
    #[error("Order {0} is already bound to a different payment provider reference")]
    ProviderReferenceConflict(OrderId),
    #[error("{0}")]
    AuthorizationError(#[from] AuthorizationError),
    #[error("Payment provider error. {0}")]
    ProviderError(#[from] PaymentProviderError),
    #[error("Payment signature verification failed")]
    SignatureVerificationFailed,
    #[error("Invalid webhook signature")]
    InvalidWebhookSignature,
    #[error("Malformed webhook payload. {0}")]
    MalformedPayload(String),
}

impl OrderFlowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DatabaseError(_) => ErrorKind::Internal,
            Self::ValidationError(_) | Self::UnknownStatus(_) => ErrorKind::Validation,
            Self::IllegalTransition { .. } |
            Self::EmptyCart |
            Self::RefundNotAllowed(_) |
            Self::MissingPaymentReference(_) |
            Self::OrderNotPayable { .. } |
            Self::ProviderReferenceConflict(_) => ErrorKind::BusinessRule,
            Self::CartNotFound(_) | Self::CartItemNotFound(_) | Self::OrderNotFound(_) | Self::ProductNotFound(_) => {
                ErrorKind::NotFound
            },
            Self::AuthorizationError(_) => ErrorKind::Authorization,
            Self::ProviderError(_) => ErrorKind::ExternalProvider,
            Self::SignatureVerificationFailed | Self::InvalidWebhookSignature | Self::MalformedPayload(_) => {
                ErrorKind::Signature
            },
        }
    }
}

impl From<sqlx::Error> for OrderFlowError {
    fn from(e: sqlx::Error) -> Self {
        OrderFlowError::DatabaseError(e.to_string())
    }
}
