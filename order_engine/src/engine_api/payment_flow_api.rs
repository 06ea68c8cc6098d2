use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{Capability, Order, OrderId, OrderStatusType, PaymentProviderKind, PaymentReference, Principal},
    engine_api::{
        errors::AuthorizationError,
        order_flow_api::OrderFlowApi,
        order_objects::{CheckoutSession, PaymentConfirmation, RefundResult, WebhookOutcome},
    },
    traits::{
        MarkPaidResult,
        OrderFlowError,
        PaymentClaim,
        PaymentGatewayDatabase,
        PaymentProvider,
        PaymentProviderError,
        ProviderOrder,
        ProviderOrderRequest,
        WebhookEvent,
    },
};

/// `PaymentFlowApi` reconciles the engine's orders with one external payment provider.
///
/// There is one instance per provider. All the paths that can confirm a payment (client verification and webhooks)
/// end up in [`OrderFlowApi::mark_paid`], so it does not matter which of them arrives first, or how often.
pub struct PaymentFlowApi<B, P> {
    orders: OrderFlowApi<B>,
    provider: P,
}

impl<B, P> Debug for PaymentFlowApi<B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentFlowApi")
    }
}

impl<B, P> PaymentFlowApi<B, P> {
    pub fn new(orders: OrderFlowApi<B>, provider: P) -> Self {
        Self { orders, provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

impl<B, P> PaymentFlowApi<B, P>
where
    B: PaymentGatewayDatabase,
    P: PaymentProvider,
{
    /// Creates (or returns the existing) provider order for one of the caller's pending orders.
    ///
    /// Provider references are immutable once stored, so calling this again for the same provider returns the same
    /// provider order, and an order already bound to another provider is rejected.
    pub async fn create_provider_order(
        &self,
        principal: &Principal,
        order_id: OrderId,
    ) -> Result<CheckoutSession, OrderFlowError> {
        let kind = self.provider.kind();
        let order = self.owned_order(principal, order_id).await?;
        if order.status != OrderStatusType::Pending {
            return Err(OrderFlowError::OrderNotPayable { id: order_id, status: order.status });
        }
        match (order.payment_provider, order.provider_order_id.as_deref()) {
            (Some(provider), Some(provider_order_id)) if provider == kind => {
                debug!("💳️ Order {order_id} is already bound to {kind} order {provider_order_id}");
                let metadata = self.provider.fetch_provider_order(provider_order_id).await?;
                let provider_order = ProviderOrder {
                    provider: kind,
                    provider_order_id: provider_order_id.to_string(),
                    amount: metadata.amount.unwrap_or(order.total_amount),
                    currency: metadata.currency.unwrap_or_else(|| order.currency.clone()),
                    client_token: metadata.client_token,
                };
                return Ok(CheckoutSession { order_id, provider_order });
            },
            (Some(provider), _) if provider != kind => {
                warn!("💳️ Order {order_id} is bound to {provider}. Cannot create a {kind} order for it.");
                return Err(OrderFlowError::ProviderReferenceConflict(order_id));
            },
            _ => {},
        }
        let request = ProviderOrderRequest {
            order_id,
            user_id: order.user_id,
            amount: order.total_amount,
            currency: order.currency.clone(),
        };
        let provider_order = self.provider.create_provider_order(&request).await?;
        self.orders.db().bind_provider_order(order_id, kind, &provider_order.provider_order_id).await?;
        info!(
            "💳️ Created {kind} order {} for order {order_id} ({} {})",
            provider_order.provider_order_id, provider_order.amount, provider_order.currency
        );
        Ok(CheckoutSession { order_id, provider_order })
    }

    /// Handles a client's report that it completed a payment.
    ///
    /// The claim's signature is checked with the provider first. The provider's record of the order is then used to
    /// find the internal order and its owner; the caller must be that owner.
    pub async fn verify_payment(
        &self,
        principal: &Principal,
        claim: PaymentClaim,
    ) -> Result<PaymentConfirmation, OrderFlowError> {
        let kind = self.provider.kind();
        if !self.provider.verify_payment(&claim).await? {
            warn!(
                "💳️ User {} submitted a {kind} payment claim for {} that failed verification",
                principal.user_id, claim.provider_order_id
            );
            return Err(OrderFlowError::SignatureVerificationFailed);
        }
        let metadata = self.provider.fetch_provider_order(&claim.provider_order_id).await?;
        let order_id = match metadata.order_id {
            Some(id) => id,
            None => self
                .orders
                .db()
                .fetch_order_by_provider_order_id(kind, &claim.provider_order_id)
                .await?
                .map(|o| o.id)
                .ok_or_else(|| {
                    OrderFlowError::ValidationError(format!(
                        "{kind} order {} is not linked to any order",
                        claim.provider_order_id
                    ))
                })?,
        };
        let order = self.orders.db().fetch_order(order_id).await?.ok_or(OrderFlowError::OrderNotFound(order_id))?;
        let claimed_by_owner = principal.user_id == order.user_id;
        let metadata_matches = metadata.user_id.map(|uid| uid == order.user_id).unwrap_or(true);
        if !(claimed_by_owner && metadata_matches) {
            warn!("💳️ User {} tried to claim payment for order {order_id}, which they do not own", principal.user_id);
            return Err(AuthorizationError::UnauthorizedClaim { order_id, user_id: principal.user_id }.into());
        }
        let reference = PaymentReference::new(kind, &claim.provider_order_id, &claim.payment_id);
        self.orders.mark_paid(order_id, reference).await
    }

    /// Handles a webhook delivery from the provider.
    ///
    /// The signature is verified against the raw body before anything else is read. After that, every delivery is
    /// acknowledged, including events for unknown orders and events this system does not model, so that the provider
    /// does not retry them forever.
    pub async fn handle_webhook(&self, body: &[u8], signature: &str) -> Result<WebhookOutcome, OrderFlowError> {
        let kind = self.provider.kind();
        if !self.provider.verify_webhook_signature(body, signature) {
            warn!("🪝️ Rejected a {kind} webhook with an invalid signature");
            return Err(OrderFlowError::InvalidWebhookSignature);
        }
        let event = self
            .provider
            .parse_webhook_event(body)
            .map_err(|e| OrderFlowError::MalformedPayload(e.to_string()))?;
        trace!("🪝️ {kind} webhook event: {event:?}");
        let outcome = match event {
            WebhookEvent::PaymentCaptured { provider_order_id, payment_id, order_id } => {
                self.on_payment_captured(provider_order_id, payment_id, order_id).await?
            },
            WebhookEvent::RefundProcessed { payment_id } => match self.orders.force_refund(kind, &payment_id).await? {
                Some(order) => WebhookOutcome::OrderRefunded { order_id: order.id },
                None => {
                    info!("🪝️ {kind} refunded payment {payment_id}, but no unrefunded order carries it");
                    WebhookOutcome::NoChange { reference: payment_id }
                },
            },
            WebhookEvent::Ignored(event) => {
                debug!("🪝️ Ignoring {kind} event {event}");
                WebhookOutcome::Ignored { event }
            },
        };
        info!("🪝️ {kind} webhook handled: {outcome}");
        Ok(outcome)
    }

    async fn on_payment_captured(
        &self,
        provider_order_id: Option<String>,
        payment_id: String,
        hint: Option<OrderId>,
    ) -> Result<WebhookOutcome, OrderFlowError> {
        let kind = self.provider.kind();
        let Some(provider_order_id) = provider_order_id else {
            warn!("🪝️ {kind} captured payment {payment_id} without a provider order. It cannot be matched to an order.");
            return Ok(WebhookOutcome::UnknownOrder { reference: payment_id });
        };
        let order = match self.resolve_captured_order(&provider_order_id).await? {
            CaptureTarget::Order(order) => order,
            CaptureTarget::Unknown => {
                warn!("🪝️ {kind} captured payment {payment_id} for {provider_order_id}, which does not match any order");
                return Ok(WebhookOutcome::UnknownOrder { reference: provider_order_id });
            },
            CaptureTarget::Conflict(order_id) => {
                error!(
                    "🪝️ {kind} captured payment {payment_id} for {provider_order_id}, which does not agree with order \
                     {order_id}. Manual reconciliation is required."
                );
                return Ok(WebhookOutcome::ReferenceConflict { order_id });
            },
        };
        let order_id = order.id;
        if let Some(hint) = hint.filter(|h| *h != order_id) {
            warn!(
                "🪝️ {kind} payment {payment_id} names order {hint}, but {provider_order_id} belongs to order {order_id}. \
                 Ignoring the name."
            );
        }
        let reference = PaymentReference::new(kind, &provider_order_id, &payment_id);
        let outcome = match self.orders.record_payment(order_id, reference).await {
            Ok(MarkPaidResult::Paid { .. }) => WebhookOutcome::OrderPaid { order_id },
            Ok(MarkPaidResult::AlreadyPaid(_)) => WebhookOutcome::AlreadyPaid { order_id },
            Ok(MarkPaidResult::NotPayable(order)) => {
                warn!("🪝️ {kind} captured payment {payment_id} for order {order_id}, but the order is {}", order.status);
                WebhookOutcome::NotPayable { order_id, status: order.status }
            },
            Err(OrderFlowError::OrderNotFound(_)) => {
                warn!("🪝️ {kind} captured payment {payment_id} for order {order_id}, which does not exist");
                WebhookOutcome::UnknownOrder { reference: order_id.to_string() }
            },
            Err(OrderFlowError::ProviderReferenceConflict(_)) => {
                error!(
                    "🪝️ {kind} captured payment {payment_id} for order {order_id}, but the order is bound to a \
                     different provider reference. Manual reconciliation is required."
                );
                WebhookOutcome::ReferenceConflict { order_id }
            },
            Err(e) => return Err(e),
        };
        Ok(outcome)
    }

    /// Finds the order a captured payment belongs to, using only references this server created: the provider order id
    /// stored on the order, or the metadata attached to the provider order when it was created. Anything the paying
    /// client could have written, such as payment notes, is not used.
    ///
    /// A provider order whose metadata points at an order bound to another provider reference, owned by someone else,
    /// or with a different total, is a conflict.
    async fn resolve_captured_order(&self, provider_order_id: &str) -> Result<CaptureTarget, OrderFlowError> {
        let kind = self.provider.kind();
        let db = self.orders.db();
        if let Some(order) = db.fetch_order_by_provider_order_id(kind, provider_order_id).await? {
            return Ok(CaptureTarget::Order(order));
        }
        let metadata = match self.provider.fetch_provider_order(provider_order_id).await {
            Ok(metadata) => metadata,
            Err(PaymentProviderError::Rejected { status, message }) => {
                debug!("🪝️ {kind} does not know order {provider_order_id} either ({status}). {message}");
                return Ok(CaptureTarget::Unknown);
            },
            Err(e) => return Err(e.into()),
        };
        let Some(order_id) = metadata.order_id else {
            return Ok(CaptureTarget::Unknown);
        };
        let Some(order) = db.fetch_order(order_id).await? else {
            return Ok(CaptureTarget::Unknown);
        };
        let bound_elsewhere = order.payment_provider.is_some_and(|p| p != kind) ||
            order.provider_order_id.as_deref().is_some_and(|id| id != provider_order_id);
        let other_owner = metadata.user_id.is_some_and(|uid| uid != order.user_id);
        let other_amount = metadata.amount.is_some_and(|amount| amount != order.total_amount);
        if bound_elsewhere || other_owner || other_amount {
            return Ok(CaptureTarget::Conflict(order_id));
        }
        Ok(CaptureTarget::Order(order))
    }

    /// Refunds an order through the provider on behalf of an admin.
    ///
    /// Only `paid` and `shipped` orders with a stored payment id can be refunded. The full order total is refunded.
    /// The order is marked as refunded as soon as the provider accepts the refund, without waiting for the provider's
    /// refund notification. If the provider call fails, the order keeps its status.
    pub async fn refund_order(&self, principal: &Principal, order_id: OrderId) -> Result<RefundResult, OrderFlowError> {
        principal.require(Capability::IssueRefunds)?;
        let kind = self.provider.kind();
        let order = self.orders.db().fetch_order(order_id).await?.ok_or(OrderFlowError::OrderNotFound(order_id))?;
        if !OrderStatusType::REFUNDABLE.contains(&order.status) {
            info!("🧾️ Admin {} asked to refund order {order_id}, which is {}. Denied.", principal.user_id, order.status);
            return Err(OrderFlowError::RefundNotAllowed(order.status));
        }
        let payment_id = order.provider_payment_id.clone().ok_or(OrderFlowError::MissingPaymentReference(order_id))?;
        if order.payment_provider != Some(kind) {
            return Err(OrderFlowError::ValidationError(format!(
                "Order {order_id} was not paid through {kind} and cannot be refunded by it"
            )));
        }
        let receipt = self.provider.refund(&payment_id, order.total_amount).await.map_err(|e| {
            error!("🧾️ {kind} refund of {} for order {order_id} failed. {e}", order.total_amount);
            e
        })?;
        let refunded = match self.orders.refund_in_db(&order).await? {
            Some(refunded) => refunded,
            None => self.refund_race_outcome(&order, kind).await?,
        };
        info!(
            "🧾️ Admin {} refunded {} {} for order {order_id} ({kind} refund {})",
            principal.user_id, order.total_amount, order.currency, receipt.refund_id
        );
        Ok(RefundResult { order: refunded, receipt })
    }

    async fn owned_order(&self, principal: &Principal, order_id: OrderId) -> Result<Order, OrderFlowError> {
        self.orders
            .db()
            .fetch_order(order_id)
            .await?
            .filter(|o| o.user_id == principal.user_id)
            .ok_or(OrderFlowError::OrderNotFound(order_id))
    }

    /// The provider accepted a refund, but the order was no longer refundable by the time we updated it. This is fine if
    /// the provider's own refund notification got there first.
    async fn refund_race_outcome(&self, order: &Order, kind: PaymentProviderKind) -> Result<Order, OrderFlowError> {
        let current = self.orders.db().fetch_order(order.id).await?.ok_or(OrderFlowError::OrderNotFound(order.id))?;
        if current.status == OrderStatusType::Refunded {
            return Ok(current);
        }
        error!(
            "🧾️ {kind} refunded order {}, but the order changed from {} to {} in the meantime. Manual reconciliation is \
             required.",
            order.id, order.status, current.status
        );
        Err(OrderFlowError::RefundNotAllowed(current.status))
    }
}

enum CaptureTarget {
    Order(Order),
    Unknown,
    Conflict(OrderId),
}
