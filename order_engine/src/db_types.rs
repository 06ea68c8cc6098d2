use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
pub use shop_common::Money;
use sqlx::{FromRow, Type};
use thiserror::Error;

use crate::engine_api::errors::AuthorizationError;

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatusType {
    /// Created at checkout. No payment has been confirmed yet.
    Pending,
    /// Payment has been confirmed and stock has been deducted.
    Paid,
    /// The merchant is preparing the order.
    Processing,
    /// Handed to a courier. Tracking details are on file.
    Shipped,
    Delivered,
    /// Terminal. Either abandoned before payment (sweep) or cancelled by an admin.
    Cancelled,
    /// Terminal. Money has been (or is being) returned through the payment provider.
    Refunded,
}

impl OrderStatusType {
    pub const ALL: [OrderStatusType; 7] = [
        OrderStatusType::Pending,
        OrderStatusType::Paid,
        OrderStatusType::Processing,
        OrderStatusType::Shipped,
        OrderStatusType::Delivered,
        OrderStatusType::Cancelled,
        OrderStatusType::Refunded,
    ];

    /// Statuses whose totals count towards revenue. Refunded orders are included, i.e. revenue is gross bookings.
    pub const REVENUE: [OrderStatusType; 4] =
        [OrderStatusType::Paid, OrderStatusType::Shipped, OrderStatusType::Delivered, OrderStatusType::Refunded];

    /// Statuses from which an admin may issue a refund.
    pub const REFUNDABLE: [OrderStatusType; 2] = [OrderStatusType::Paid, OrderStatusType::Shipped];

    /// The statuses reachable from `self` through a regular transition. `refunded` is deliberately absent: it is only
    /// reachable through the refund operation or a provider refund notification.
    pub fn allowed_next(&self) -> &'static [OrderStatusType] {
        use OrderStatusType::*;
        match self {
            Pending => &[Paid, Cancelled],
            Paid => &[Processing, Shipped, Cancelled],
            Processing => &[Shipped, Cancelled],
            Shipped => &[Delivered],
            Delivered | Cancelled | Refunded => &[],
        }
    }

    pub fn can_transition_to(&self, target: OrderStatusType) -> bool {
        self.allowed_next().contains(&target)
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_next().is_empty()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatusType::Pending => "pending",
            OrderStatusType::Paid => "paid",
            OrderStatusType::Processing => "processing",
            OrderStatusType::Shipped => "shipped",
            OrderStatusType::Delivered => "delivered",
            OrderStatusType::Cancelled => "cancelled",
            OrderStatusType::Refunded => "refunded",
        }
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid order status: {0}")]
pub struct ConversionError(pub String);

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "processing" => Ok(Self::Processing),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            "refunded" => Ok(Self::Refunded),
            _ => Err(ConversionError(s.to_string())),
        }
    }
}

//--------------------------------------        OrderId        ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderId(pub i64);

impl From<i64> for OrderId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn value(&self) -> i64 {
        self.0
    }
}

//--------------------------------------       ProductId       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct ProductId(pub i64);

impl From<i64> for ProductId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "product {}", self.0)
    }
}

//--------------------------------------  PaymentProviderKind  ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentProviderKind {
    Razorpay,
    Stripe,
    /// Payment confirmed out of band by an admin.
    Manual,
}

impl Display for PaymentProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentProviderKind::Razorpay => f.write_str("razorpay"),
            PaymentProviderKind::Stripe => f.write_str("stripe"),
            PaymentProviderKind::Manual => f.write_str("manual"),
        }
    }
}

//--------------------------------------   PaymentReference    ---------------------------------------------------------
/// Identifies which provider, and which provider-side transaction, confirmed payment for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReference {
    pub provider: PaymentProviderKind,
    pub provider_order_id: Option<String>,
    pub provider_payment_id: Option<String>,
}

impl PaymentReference {
    pub fn new(provider: PaymentProviderKind, provider_order_id: &str, provider_payment_id: &str) -> Self {
        Self {
            provider,
            provider_order_id: Some(provider_order_id.to_string()),
            provider_payment_id: Some(provider_payment_id.to_string()),
        }
    }

    pub fn manual() -> Self {
        Self { provider: PaymentProviderKind::Manual, provider_order_id: None, provider_payment_id: None }
    }
}

//--------------------------------------         Order         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: i64,
    pub status: OrderStatusType,
    /// Snapshot of the cart total at checkout. Never recomputed.
    pub total_amount: Money,
    pub currency: String,
    pub tracking_number: Option<String>,
    pub courier: Option<String>,
    pub payment_provider: Option<PaymentProviderKind>,
    pub provider_order_id: Option<String>,
    pub provider_payment_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Returns the payment reference pinned to this order, if any provider has been bound to it.
    pub fn payment_reference(&self) -> Option<PaymentReference> {
        self.payment_provider.map(|provider| PaymentReference {
            provider,
            provider_order_id: self.provider_order_id.clone(),
            provider_payment_id: self.provider_payment_id.clone(),
        })
    }

    /// True if the given reference does not contradict the references already stored on this order. Stored
    /// references are immutable, so a different provider or a different id for an already-set field conflicts.
    /// Manual confirmations carry no references and never conflict.
    pub fn is_compatible_with(&self, reference: &PaymentReference) -> bool {
        if reference.provider == PaymentProviderKind::Manual {
            return true;
        }
        fn same(stored: &Option<String>, incoming: &Option<String>) -> bool {
            match (stored, incoming) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
        }
        match self.payment_provider {
            None => true,
            Some(p) if p != reference.provider => false,
            Some(_) => {
                same(&self.provider_order_id, &reference.provider_order_id)
                    && same(&self.provider_payment_id, &reference.provider_payment_id)
            },
        }
    }
}

//--------------------------------------        NewOrder       ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: i64,
    pub currency: String,
    pub items: Vec<NewOrderItem>,
    pub created_at: DateTime<Utc>,
}

impl NewOrder {
    pub fn new(user_id: i64, currency: &str) -> Self {
        Self { user_id, currency: currency.to_string(), items: vec![], created_at: Utc::now() }
    }

    pub fn with_item(mut self, product_id: ProductId, quantity: i64, price_at_purchase: Money) -> Self {
        self.items.push(NewOrderItem { product_id, quantity, price_at_purchase });
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// The order total is always derived from the item snapshots. `None` if it does not fit in minor units.
    pub fn total_amount(&self) -> Option<Money> {
        self.items.iter().try_fold(Money::default(), |total, i| {
            i.price_at_purchase.checked_mul(i.quantity).and_then(|line| total.checked_add(line))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub quantity: i64,
    pub price_at_purchase: Money,
}

//--------------------------------------       OrderItem       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: i64,
    pub price_at_purchase: Money,
}

impl OrderItem {
    pub fn line_total(&self) -> Money {
        self.price_at_purchase.saturating_mul(self.quantity)
    }
}

//--------------------------------------        Product        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub inventory: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub price: Money,
    pub inventory: i64,
}

impl NewProduct {
    pub fn new<S: Into<String>>(name: S, price: Money, inventory: i64) -> Self {
        Self { name: name.into(), price, inventory }
    }
}

//--------------------------------------         Cart          ---------------------------------------------------------
/// The most units of one product a single cart line may hold.
pub const MAX_LINE_QUANTITY: i64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Cart {
    pub id: i64,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A cart line joined with the product's live price.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct CartItem {
    pub id: i64,
    pub cart_id: i64,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price: Money,
}

impl CartItem {
    pub fn line_total(&self) -> Money {
        self.unit_price.saturating_mul(self.quantity)
    }
}

//--------------------------------------    InventoryAlert     ---------------------------------------------------------
/// Raised when a paid order asks for more stock than is on hand. Stock is clamped at zero and the shortfall recorded.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct InventoryAlert {
    pub id: i64,
    pub product_id: ProductId,
    /// The paid order that asked for the stock, if the deduction was part of one.
    pub order_id: Option<OrderId>,
    pub requested: i64,
    pub available: i64,
    pub created_at: DateTime<Utc>,
}

impl InventoryAlert {
    pub fn shortfall(&self) -> i64 {
        self.requested - self.available
    }
}

//--------------------------------------      Principal        ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Admin,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Customer => f.write_str("customer"),
            Role::Admin => f.write_str("admin"),
        }
    }
}

impl FromStr for Role {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "customer" => Ok(Self::Customer),
            "admin" => Ok(Self::Admin),
            _ => Err(ConversionError(s.to_string())),
        }
    }
}

/// Things a principal may be allowed to do beyond managing their own cart and orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    ManageOrders,
    IssueRefunds,
    ViewReports,
    ViewAllOrders,
    ManageCatalog,
}

impl Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::ManageOrders => f.write_str("manage orders"),
            Capability::IssueRefunds => f.write_str("issue refunds"),
            Capability::ViewReports => f.write_str("view reports"),
            Capability::ViewAllOrders => f.write_str("view all orders"),
            Capability::ManageCatalog => f.write_str("manage catalog"),
        }
    }
}

impl Role {
    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            Role::Customer => &[],
            Role::Admin => &[
                Capability::ManageOrders,
                Capability::IssueRefunds,
                Capability::ViewReports,
                Capability::ViewAllOrders,
                Capability::ManageCatalog,
            ],
        }
    }
}

/// The authenticated caller of an engine operation, as vouched for by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: i64,
    pub role: Role,
}

impl Principal {
    pub fn customer(user_id: i64) -> Self {
        Self { user_id, role: Role::Customer }
    }

    pub fn admin(user_id: i64) -> Self {
        Self { user_id, role: Role::Admin }
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.role.capabilities().contains(&capability)
    }

    /// The single authorization check used by the engine APIs.
    pub fn require(&self, capability: Capability) -> Result<(), AuthorizationError> {
        if self.has(capability) {
            Ok(())
        } else {
            Err(AuthorizationError::PermissionDenied { user_id: self.user_id, capability })
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
