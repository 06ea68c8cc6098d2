//! An in-memory [`PaymentProvider`] for tests.
//!
//! * Provider orders are stored in memory and numbered `<kind>_order_<n>`.
//! * A payment claim is genuine if its signature is `"<provider_order_id>|<payment_id>"`.
//! * A webhook signature is genuine if it is `"<secret>:<sum of body bytes>"`. See [`FakeProvider::sign`].
//! * Webhook bodies are JSON: `{"event": "...", "provider_order_id": "...", "payment_id": "...", "order_id": 1}`.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use serde::Deserialize;

use crate::{
    db_types::{Money, OrderId, PaymentProviderKind},
    traits::{
        PaymentClaim,
        PaymentProvider,
        PaymentProviderError,
        ProviderOrder,
        ProviderOrderMetadata,
        ProviderOrderRequest,
        RefundReceipt,
        WebhookEvent,
    },
};

const WEBHOOK_SECRET: &str = "fake_webhook_secret";

#[derive(Debug, Default)]
struct FakeProviderState {
    orders: HashMap<String, ProviderOrderMetadata>,
    refunds: Vec<(String, Money)>,
    created: usize,
    fail_refunds: bool,
}

#[derive(Debug, Clone)]
pub struct FakeProvider {
    kind: PaymentProviderKind,
    state: Arc<Mutex<FakeProviderState>>,
}

#[derive(Deserialize)]
struct FakeWebhook {
    event: String,
    provider_order_id: Option<String>,
    payment_id: Option<String>,
    order_id: Option<i64>,
}

impl FakeProvider {
    pub fn new(kind: PaymentProviderKind) -> Self {
        Self { kind, state: Arc::new(Mutex::new(FakeProviderState::default())) }
    }

    /// The signature a genuine webhook delivery of `body` would carry.
    pub fn sign(body: &[u8]) -> String {
        let sum: u64 = body.iter().map(|b| *b as u64).sum();
        format!("{WEBHOOK_SECRET}:{sum}")
    }

    /// The signature a genuine client payment claim would carry.
    pub fn claim(provider_order_id: &str, payment_id: &str) -> PaymentClaim {
        PaymentClaim {
            provider_order_id: provider_order_id.to_string(),
            payment_id: payment_id.to_string(),
            signature: Some(format!("{provider_order_id}|{payment_id}")),
        }
    }

    /// Registers a provider order as if it had been created outside of the engine.
    pub fn register_order(&self, provider_order_id: &str, order_id: Option<OrderId>, user_id: Option<i64>) {
        let metadata = ProviderOrderMetadata {
            provider_order_id: provider_order_id.to_string(),
            order_id,
            user_id,
            ..Default::default()
        };
        self.state.lock().unwrap().orders.insert(provider_order_id.to_string(), metadata);
    }

    pub fn fail_refunds(&self, fail: bool) {
        self.state.lock().unwrap().fail_refunds = fail;
    }

    /// Every refund the provider accepted, as (payment id, amount).
    pub fn refunds(&self) -> Vec<(String, Money)> {
        self.state.lock().unwrap().refunds.clone()
    }

    pub fn created_orders(&self) -> usize {
        self.state.lock().unwrap().created
    }
}

impl PaymentProvider for FakeProvider {
    fn kind(&self) -> PaymentProviderKind {
        self.kind
    }

    async fn create_provider_order(
        &self,
        request: &ProviderOrderRequest,
    ) -> Result<ProviderOrder, PaymentProviderError> {
        let mut state = self.state.lock().unwrap();
        state.created += 1;
        let provider_order_id = format!("{}_order_{}", self.kind, state.created);
        let metadata = ProviderOrderMetadata {
            provider_order_id: provider_order_id.clone(),
            order_id: Some(request.order_id),
            user_id: Some(request.user_id),
            amount: Some(request.amount),
            currency: Some(request.currency.clone()),
            status: Some("created".into()),
            client_token: Some("fake_client_token".into()),
        };
        state.orders.insert(provider_order_id.clone(), metadata);
        Ok(ProviderOrder {
            provider: self.kind,
            provider_order_id,
            amount: request.amount,
            currency: request.currency.clone(),
            client_token: Some("fake_client_token".into()),
        })
    }

    async fn verify_payment(&self, claim: &PaymentClaim) -> Result<bool, PaymentProviderError> {
        let expected = format!("{}|{}", claim.provider_order_id, claim.payment_id);
        Ok(claim.signature.as_deref() == Some(expected.as_str()))
    }

    async fn fetch_provider_order(
        &self,
        provider_order_id: &str,
    ) -> Result<ProviderOrderMetadata, PaymentProviderError> {
        self.state.lock().unwrap().orders.get(provider_order_id).cloned().ok_or_else(|| {
            PaymentProviderError::Rejected { status: 404, message: format!("No such order: {provider_order_id}") }
        })
    }

    async fn refund(&self, payment_id: &str, amount: Money) -> Result<RefundReceipt, PaymentProviderError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_refunds {
            return Err(PaymentProviderError::Timeout);
        }
        state.refunds.push((payment_id.to_string(), amount));
        Ok(RefundReceipt {
            refund_id: format!("rfnd_{}", state.refunds.len()),
            payment_id: payment_id.to_string(),
            amount,
            status: "processed".into(),
        })
    }

    fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> bool {
        Self::sign(body) == signature
    }

    fn parse_webhook_event(&self, body: &[u8]) -> Result<WebhookEvent, PaymentProviderError> {
        let hook: FakeWebhook =
            serde_json::from_slice(body).map_err(|e| PaymentProviderError::MalformedResponse(e.to_string()))?;
        let missing = || PaymentProviderError::MalformedResponse("payment_id is missing".into());
        match hook.event.as_str() {
            "payment.captured" => Ok(WebhookEvent::PaymentCaptured {
                provider_order_id: hook.provider_order_id,
                payment_id: hook.payment_id.ok_or_else(missing)?,
                order_id: hook.order_id.map(OrderId::from),
            }),
            "refund.processed" => Ok(WebhookEvent::RefundProcessed { payment_id: hook.payment_id.ok_or_else(missing)? }),
            _ => Ok(WebhookEvent::Ignored(hook.event)),
        }
    }
}
