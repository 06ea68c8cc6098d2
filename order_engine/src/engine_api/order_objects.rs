use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Cart, CartItem, Money, Order, OrderId, OrderItem, OrderStatusType, PaymentProviderKind},
    traits::{InventoryAdjustment, OrderFlowError, ProviderOrder, RefundReceipt},
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderQueryFilter {
    pub user_id: Option<i64>,
    pub provider: Option<PaymentProviderKind>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub status: Option<Vec<OrderStatusType>>,
}

impl OrderQueryFilter {
    pub fn since<T>(mut self, since: T) -> Result<Self, OrderFlowError>
    where
        T: TryInto<DateTime<Utc>>,
        T::Error: Display,
    {
        let dt = since.try_into().map_err(|e| OrderFlowError::ValidationError(e.to_string()))?;
        self.since = Some(dt);
        Ok(self)
    }

    pub fn until<T>(mut self, until: T) -> Result<Self, OrderFlowError>
    where
        T: TryInto<DateTime<Utc>>,
        T::Error: Display,
    {
        let dt = until.try_into().map_err(|e| OrderFlowError::ValidationError(e.to_string()))?;
        self.until = Some(dt);
        Ok(self)
    }

    pub fn with_user_id(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_provider(mut self, provider: PaymentProviderKind) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_status(mut self, status: OrderStatusType) -> Self {
        self.status.get_or_insert_with(Vec::new).push(status);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.user_id.is_none() &&
            self.provider.is_none() &&
            self.status.as_ref().map(|s| s.is_empty()).unwrap_or(true) &&
            self.since.is_none() &&
            self.until.is_none()
    }
}

impl Display for OrderQueryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "No filters.")?;
            return Ok(());
        }
        if let Some(user_id) = &self.user_id {
            write!(f, "user_id: {user_id}. ")?;
        }
        if let Some(provider) = &self.provider {
            write!(f, "provider: {provider}. ")?;
        }
        if let Some(since) = &self.since {
            write!(f, "since {since}. ")?;
        }
        if let Some(until) = &self.until {
            write!(f, "until {until}. ")?;
        }
        if let Some(statuses) = &self.status {
            let statuses = statuses.iter().map(|s| s.to_string()).collect::<Vec<String>>().join(",");
            write!(f, "statuses: [{statuses}]. ")?;
        }
        Ok(())
    }
}

/// An admin request to move an order along the state machine. The status is kept as a string so that unknown statuses
/// can be reported as such.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub status: String,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub courier: Option<String>,
}

impl TransitionRequest {
    pub fn new<S: Into<String>>(status: S) -> Self {
        Self { status: status.into(), tracking_number: None, courier: None }
    }

    pub fn with_shipping(mut self, tracking_number: &str, courier: &str) -> Self {
        self.tracking_number = Some(tracking_number.to_string());
        self.courier = Some(courier.to_string());
        self
    }
}

/// An order along with its line items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullOrder {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

impl FullOrder {
    pub fn new(order: Order, items: Vec<OrderItem>) -> Self {
        Self { order, items }
    }
}

/// A cart priced at the current catalog prices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSummary {
    pub cart_id: i64,
    pub user_id: i64,
    pub items: Vec<CartItem>,
    pub total: Money,
}

impl CartSummary {
    pub fn new(cart: Cart, items: Vec<CartItem>) -> Self {
        let total = items.iter().map(CartItem::line_total).sum();
        Self { cart_id: cart.id, user_id: cart.user_id, items, total }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// What a payment confirmation (client verification or manual confirmation) did to the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    pub order: Order,
    /// False if the order had already been paid by an earlier confirmation.
    pub newly_paid: bool,
    pub adjustments: Vec<InventoryAdjustment>,
}

/// The provider order (or intent) a client should pay against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub order_id: OrderId,
    #[serde(flatten)]
    pub provider_order: ProviderOrder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundResult {
    pub order: Order,
    pub receipt: RefundReceipt,
}

/// How a webhook delivery was handled. Every variant is acknowledged to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    OrderPaid { order_id: OrderId },
    AlreadyPaid { order_id: OrderId },
    NotPayable { order_id: OrderId, status: OrderStatusType },
    OrderRefunded { order_id: OrderId },
    /// The payment was captured against a provider reference that contradicts the one stored on the order.
    ReferenceConflict { order_id: OrderId },
    /// The event refers to an order or payment this system does not know about.
    UnknownOrder { reference: String },
    /// The event was understood, but there was nothing left to change.
    NoChange { reference: String },
    Ignored { event: String },
}

impl Display for WebhookOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WebhookOutcome::OrderPaid { order_id } => write!(f, "order {order_id} paid"),
            WebhookOutcome::AlreadyPaid { order_id } => write!(f, "order {order_id} was already paid"),
            WebhookOutcome::NotPayable { order_id, status } => write!(f, "order {order_id} is {status}"),
            WebhookOutcome::OrderRefunded { order_id } => write!(f, "order {order_id} refunded"),
            WebhookOutcome::ReferenceConflict { order_id } => write!(f, "order {order_id} has conflicting references"),
            WebhookOutcome::UnknownOrder { reference } => write!(f, "no order for {reference}"),
            WebhookOutcome::NoChange { reference } => write!(f, "nothing to change for {reference}"),
            WebhookOutcome::Ignored { event } => write!(f, "{event} ignored"),
        }
    }
}
