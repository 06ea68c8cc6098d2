use log::*;
use order_engine::{
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
use reqwest::Method;
use serde_json::{json, Value};

use crate::{
    config::RazorpayConfig,
    data_objects::{note_as_i64, RazorpayOrder, RazorpayRefund},
    rest::RestClient,
    signatures::{razorpay_checkout_payload, verify_hmac_sha256_hex},
    ProviderApiError,
};

/// Razorpay orders API client.
#[derive(Clone)]
pub struct RazorpayProvider {
    config: RazorpayConfig,
    rest: RestClient,
}

impl RazorpayProvider {
    pub fn new(config: RazorpayConfig) -> Result<Self, ProviderApiError> {
        let rest =
            RestClient::new(&config.api_url, &config.key_id, Some(config.key_secret.clone()), config.timeout)?;
        Ok(Self { config, rest })
    }

    pub fn key_id(&self) -> &str {
        &self.config.key_id
    }

    pub async fn create_order(&self, request: &ProviderOrderRequest) -> Result<RazorpayOrder, ProviderApiError> {
        if self.config.key_id.is_empty() {
            return Err(ProviderApiError::NotConfigured("Razorpay key id".into()));
        }
        let body = json!({
            "amount": request.amount.value(),
            "currency": request.currency,
            "receipt": request.receipt(),
            "notes": {
                "order_id": request.order_id.value().to_string(),
                "user_id": request.user_id.to_string(),
            },
        });
        debug!("💳️ Creating Razorpay order for order {}", request.order_id);
        let req = self.rest.request(Method::POST, "/v1/orders").json(&body);
        let order = self.rest.send::<RazorpayOrder>(req).await?;
        info!("💳️ Razorpay order {} created for order {}", order.id, request.order_id);
        Ok(order)
    }

    pub async fn get_order(&self, provider_order_id: &str) -> Result<RazorpayOrder, ProviderApiError> {
        let path = format!("/v1/orders/{provider_order_id}");
        let req = self.rest.request(Method::GET, &path);
        self.rest.send(req).await
    }

    pub async fn refund_payment(&self, payment_id: &str, amount: Money) -> Result<RazorpayRefund, ProviderApiError> {
        let path = format!("/v1/payments/{payment_id}/refund");
        let req = self.rest.request(Method::POST, &path).json(&json!({ "amount": amount.value() }));
        debug!("💳️ Requesting a Razorpay refund of {amount} for payment {payment_id}");
        self.rest.send(req).await
    }
}

impl PaymentProvider for RazorpayProvider {
    fn kind(&self) -> PaymentProviderKind {
        PaymentProviderKind::Razorpay
    }

    async fn create_provider_order(
        &self,
        request: &ProviderOrderRequest,
    ) -> Result<ProviderOrder, PaymentProviderError> {
        let order = self.create_order(request).await?;
        Ok(ProviderOrder {
            provider: PaymentProviderKind::Razorpay,
            provider_order_id: order.id,
            amount: Money::from(order.amount),
            currency: order.currency,
            client_token: Some(self.config.key_id.clone()),
        })
    }

    /// The checkout signature is hex(HMAC-SHA256(key_secret, "<order_id>|<payment_id>")). No network call is needed.
    async fn verify_payment(&self, claim: &PaymentClaim) -> Result<bool, PaymentProviderError> {
        let Some(signature) = claim.signature.as_deref() else {
            debug!("💳️ Razorpay payment claim for {} carries no signature", claim.provider_order_id);
            return Ok(false);
        };
        let payload = razorpay_checkout_payload(&claim.provider_order_id, &claim.payment_id);
        match verify_hmac_sha256_hex(self.config.key_secret.reveal().as_bytes(), payload.as_bytes(), signature) {
            Ok(()) => Ok(true),
            Err(e) => {
                debug!("💳️ Razorpay payment claim for {} rejected. {e}", claim.provider_order_id);
                Ok(false)
            },
        }
    }

    async fn fetch_provider_order(
        &self,
        provider_order_id: &str,
    ) -> Result<ProviderOrderMetadata, PaymentProviderError> {
        let order = self.get_order(provider_order_id).await?;
        Ok(ProviderOrderMetadata {
            order_id: order.note_order_id(),
            user_id: order.note_user_id(),
            amount: Some(Money::from(order.amount)),
            currency: Some(order.currency),
            status: order.status,
            client_token: Some(self.config.key_id.clone()),
            provider_order_id: order.id,
        })
    }

    async fn refund(&self, payment_id: &str, amount: Money) -> Result<RefundReceipt, PaymentProviderError> {
        let refund = self.refund_payment(payment_id, amount).await?;
        info!("💳️ Razorpay refund {} of {} issued for payment {payment_id}", refund.id, refund.amount);
        Ok(RefundReceipt {
            refund_id: refund.id,
            payment_id: refund.payment_id,
            amount: Money::from(refund.amount),
            status: refund.status.unwrap_or_else(|| "pending".to_string()),
        })
    }

    /// `X-Razorpay-Signature` is hex(HMAC-SHA256(webhook_secret, raw body)).
    fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> bool {
        match verify_hmac_sha256_hex(self.config.webhook_secret.reveal().as_bytes(), body, signature) {
            Ok(()) => true,
            Err(e) => {
                debug!("🪝️ Razorpay webhook signature rejected. {e}");
                false
            },
        }
    }

    fn parse_webhook_event(&self, body: &[u8]) -> Result<WebhookEvent, PaymentProviderError> {
        parse_razorpay_webhook(body)
    }
}

pub(crate) fn parse_razorpay_webhook(body: &[u8]) -> Result<WebhookEvent, PaymentProviderError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| PaymentProviderError::MalformedResponse(e.to_string()))?;
    let event = value["event"]
        .as_str()
        .ok_or_else(|| PaymentProviderError::MalformedResponse("Webhook has no event".into()))?;
    let missing = |field: &str| PaymentProviderError::MalformedResponse(format!("{event} webhook has no {field}"));
    match event {
        "payment.captured" => {
            let payment = &value["payload"]["payment"]["entity"];
            let payment_id = payment["id"].as_str().ok_or_else(|| missing("payment id"))?.to_string();
            let provider_order_id = payment["order_id"].as_str().map(String::from);
            let order_id = note_as_i64(&payment["notes"], "order_id").map(OrderId::from);
            Ok(WebhookEvent::PaymentCaptured { provider_order_id, payment_id, order_id })
        },
        "refund.processed" => {
            let refund = &value["payload"]["refund"]["entity"];
            let payment_id = refund["payment_id"].as_str().ok_or_else(|| missing("payment id"))?.to_string();
            Ok(WebhookEvent::RefundProcessed { payment_id })
        },
        other => Ok(WebhookEvent::Ignored(other.to_string())),
    }
}
