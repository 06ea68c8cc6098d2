use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::{Money, OrderId, PaymentProviderKind};

/// The contract the engine requires of an external payment processor.
///
/// Implementations are injected into [`crate::PaymentFlowApi`], so tests can substitute a fake provider. All network
/// calls must be bounded by a timeout; a timeout surfaces as [`PaymentProviderError::Timeout`].
#[allow(async_fn_in_trait)]
pub trait PaymentProvider {
    /// Which provider this is. Stored on orders so refunds and refund notifications are routed correctly.
    fn kind(&self) -> PaymentProviderKind;

    /// Creates the provider-side order (or payment intent) that the client will pay against.
    async fn create_provider_order(&self, request: &ProviderOrderRequest)
        -> Result<ProviderOrder, PaymentProviderError>;

    /// Checks a client's claim that it completed a payment. Returns `Ok(false)` if the claim is not genuine.
    async fn verify_payment(&self, claim: &PaymentClaim) -> Result<bool, PaymentProviderError>;

    /// Fetches the provider's record of an order, including the metadata we attached when creating it.
    async fn fetch_provider_order(&self, provider_order_id: &str)
        -> Result<ProviderOrderMetadata, PaymentProviderError>;

    /// Refunds `amount` (in minor units) of the given payment.
    async fn refund(&self, payment_id: &str, amount: Money) -> Result<RefundReceipt, PaymentProviderError>;

    /// Verifies the signature header of a webhook delivery against the raw request body.
    /// Implementations must compare in constant time.
    fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> bool;

    /// Parses a (verified) webhook body into one of the events the engine understands.
    fn parse_webhook_event(&self, body: &[u8]) -> Result<WebhookEvent, PaymentProviderError>;
}

#[derive(Debug, Clone, Error)]
pub enum PaymentProviderError {
    #[error("The payment provider did not respond in time")]
    Timeout,
    #[error("Could not communicate with the payment provider. {0}")]
    Http(String),
    #[error("The payment provider rejected the request (status {status}). {message}")]
    Rejected { status: u16, message: String },
    #[error("Unexpected response from the payment provider. {0}")]
    MalformedResponse(String),
    #[error("{0} is not supported by this provider")]
    Unsupported(String),
    #[error("The payment provider is not configured. {0}")]
    NotConfigured(String),
}

/// What the engine asks the provider to create when a customer is ready to pay for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderOrderRequest {
    pub order_id: OrderId,
    pub user_id: i64,
    pub amount: Money,
    pub currency: String,
}

impl ProviderOrderRequest {
    /// The merchant-side receipt reference sent along with the provider order.
    pub fn receipt(&self) -> String {
        format!("order_rcpt_{}", self.order_id.value())
    }
}

/// A provider-side order or payment intent, as handed back to the client so that it can complete the payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderOrder {
    pub provider: PaymentProviderKind,
    pub provider_order_id: String,
    pub amount: Money,
    pub currency: String,
    /// Publishable key id or client secret, depending on the provider.
    pub client_token: Option<String>,
}

/// The provider's record of an order, along with the internal references we attached to it on creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderOrderMetadata {
    pub provider_order_id: String,
    pub order_id: Option<OrderId>,
    pub user_id: Option<i64>,
    pub amount: Option<Money>,
    pub currency: Option<String>,
    pub status: Option<String>,
    pub client_token: Option<String>,
}

/// A client's claim that it has completed payment for a provider order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentClaim {
    pub provider_order_id: String,
    pub payment_id: String,
    pub signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundReceipt {
    pub refund_id: String,
    pub payment_id: String,
    pub amount: Money,
    pub status: String,
}

/// The provider events the engine acts on. Everything else is acknowledged and ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WebhookEvent {
    PaymentCaptured {
        provider_order_id: Option<String>,
        payment_id: String,
        /// Internal order id found in the payment's notes. The paying client can write these, so this is only
        /// compared against the order the provider order id resolves to, and never used to find the order.
        order_id: Option<OrderId>,
    },
    RefundProcessed {
        payment_id: String,
    },
    Ignored(String),
}
