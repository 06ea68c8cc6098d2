use chrono::Utc;
use log::*;
use order_engine::{
    db_types::{Money, PaymentProviderKind},
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

use crate::{
    config::StripeConfig,
    data_objects::{PaymentIntent, StripeEvent, StripeRefund},
    rest::RestClient,
    signatures::verify_stripe_signature,
    ProviderApiError,
};

/// Stripe payment intents client. A payment intent plays the part of the provider order, and its id doubles as the
/// payment reference.
#[derive(Clone)]
pub struct StripeProvider {
    config: StripeConfig,
    rest: RestClient,
}

impl StripeProvider {
    pub fn new(config: StripeConfig) -> Result<Self, ProviderApiError> {
        // Stripe takes the secret key as the basic auth username, with no password
        let rest = RestClient::new(&config.api_url, config.secret_key.reveal(), None, config.timeout)?;
        Ok(Self { config, rest })
    }

    pub async fn create_payment_intent(
        &self,
        request: &ProviderOrderRequest,
    ) -> Result<PaymentIntent, ProviderApiError> {
        if self.config.secret_key.is_empty() {
            return Err(ProviderApiError::NotConfigured("Stripe secret key".into()));
        }
        let form = [
            ("amount", request.amount.value().to_string()),
            ("currency", request.currency.to_lowercase()),
            ("metadata[order_id]", request.order_id.value().to_string()),
            ("metadata[user_id]", request.user_id.to_string()),
            ("metadata[receipt]", request.receipt()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
        ];
        debug!("💳️ Creating Stripe payment intent for order {}", request.order_id);
        let req = self.rest.request(Method::POST, "/v1/payment_intents").form(&form);
        let intent = self.rest.send::<PaymentIntent>(req).await?;
        info!("💳️ Payment intent {} created for order {}", intent.id, request.order_id);
        Ok(intent)
    }

    pub async fn get_payment_intent(&self, id: &str) -> Result<PaymentIntent, ProviderApiError> {
        let path = format!("/v1/payment_intents/{id}");
        let req = self.rest.request(Method::GET, &path);
        self.rest.send(req).await
    }

    pub async fn create_refund(&self, payment_intent: &str, amount: Money) -> Result<StripeRefund, ProviderApiError> {
        let form = [("payment_intent", payment_intent.to_string()), ("amount", amount.value().to_string())];
        debug!("💳️ Requesting a Stripe refund of {amount} for {payment_intent}");
        let req = self.rest.request(Method::POST, "/v1/refunds").form(&form);
        self.rest.send(req).await
    }
}

impl PaymentProvider for StripeProvider {
    fn kind(&self) -> PaymentProviderKind {
        PaymentProviderKind::Stripe
    }

    async fn create_provider_order(
        &self,
        request: &ProviderOrderRequest,
    ) -> Result<ProviderOrder, PaymentProviderError> {
        let intent = self.create_payment_intent(request).await?;
        Ok(ProviderOrder {
            provider: PaymentProviderKind::Stripe,
            provider_order_id: intent.id,
            amount: Money::from(intent.amount),
            currency: intent.currency.to_uppercase(),
            client_token: intent.client_secret,
        })
    }

    /// Stripe clients do not sign anything. The claim is genuine if the intent it names has succeeded.
    async fn verify_payment(&self, claim: &PaymentClaim) -> Result<bool, PaymentProviderError> {
        if claim.payment_id != claim.provider_order_id {
            debug!("💳️ Stripe payment claim names two different intents");
            return Ok(false);
        }
        let intent = match self.get_payment_intent(&claim.provider_order_id).await {
            Ok(intent) => intent,
            Err(ProviderApiError::QueryError { status: 404, .. }) => {
                debug!("💳️ Stripe has no payment intent {}", claim.provider_order_id);
                return Ok(false);
            },
            Err(e) => return Err(e.into()),
        };
        let genuine = intent.id == claim.provider_order_id && intent.is_succeeded();
        if !genuine {
            debug!("💳️ Payment intent {} is {}", intent.id, intent.status);
        }
        Ok(genuine)
    }

    async fn fetch_provider_order(
        &self,
        provider_order_id: &str,
    ) -> Result<ProviderOrderMetadata, PaymentProviderError> {
        let intent = self.get_payment_intent(provider_order_id).await?;
        Ok(ProviderOrderMetadata {
            order_id: intent.metadata_order_id(),
            user_id: intent.metadata_user_id(),
            amount: Some(Money::from(intent.amount)),
            currency: Some(intent.currency.to_uppercase()),
            status: Some(intent.status),
            client_token: intent.client_secret,
            provider_order_id: intent.id,
        })
    }

    async fn refund(&self, payment_id: &str, amount: Money) -> Result<RefundReceipt, PaymentProviderError> {
        let refund = self.create_refund(payment_id, amount).await?;
        info!("💳️ Stripe refund {} of {} issued for {payment_id}", refund.id, refund.amount);
        Ok(RefundReceipt {
            refund_id: refund.id,
            payment_id: refund.payment_intent.unwrap_or_else(|| payment_id.to_string()),
            amount: Money::from(refund.amount),
            status: refund.status.unwrap_or_else(|| "pending".to_string()),
        })
    }

    fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> bool {
        let secret = self.config.webhook_secret.reveal().as_bytes();
        match verify_stripe_signature(secret, body, signature, self.config.webhook_tolerance, Utc::now().timestamp()) {
            Ok(()) => true,
            Err(e) => {
                debug!("🪝️ Stripe webhook signature rejected. {e}");
                false
            },
        }
    }

    fn parse_webhook_event(&self, body: &[u8]) -> Result<WebhookEvent, PaymentProviderError> {
        parse_stripe_webhook(body)
    }
}

pub(crate) fn parse_stripe_webhook(body: &[u8]) -> Result<WebhookEvent, PaymentProviderError> {
    let event: StripeEvent =
        serde_json::from_slice(body).map_err(|e| PaymentProviderError::MalformedResponse(e.to_string()))?;
    let object = &event.data.object;
    let missing =
        |field: &str| PaymentProviderError::MalformedResponse(format!("{} event has no {field}", event.event_type));
    match event.event_type.as_str() {
        "payment_intent.succeeded" => {
            let intent: PaymentIntent = serde_json::from_value(object.clone()).map_err(|_| missing("payment intent"))?;
            let order_id = intent.metadata_order_id();
            Ok(WebhookEvent::PaymentCaptured {
                provider_order_id: Some(intent.id.clone()),
                payment_id: intent.id,
                order_id,
            })
        },
        "charge.refunded" => {
            if !object["refunded"].as_bool().unwrap_or(false) {
                trace!("🪝️ Partial refund on {}. Ignoring.", event.id);
                return Ok(WebhookEvent::Ignored("charge.refunded (partial)".into()));
            }
            let payment_id = object["payment_intent"].as_str().ok_or_else(|| missing("payment intent"))?.to_string();
            Ok(WebhookEvent::RefundProcessed { payment_id })
        },
        other => Ok(WebhookEvent::Ignored(other.to_string())),
    }
}
