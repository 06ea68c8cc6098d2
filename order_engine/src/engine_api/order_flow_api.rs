use std::fmt::Debug;

use chrono::{Duration, Utc};
use log::*;

use crate::{
    db_types::{Capability, Order, OrderId, OrderItem, OrderStatusType, PaymentProviderKind, PaymentReference, Principal},
    engine_api::order_objects::{FullOrder, OrderQueryFilter, PaymentConfirmation, TransitionRequest},
    events::{EventProducers, OrderPaidEvent, OrderStatusChangedEvent},
    traits::{MarkPaidResult, OrderFlowError, PaymentGatewayDatabase, StatusUpdate},
};

/// `OrderFlowApi` drives the order state machine. It owns the one operation that confirms payment
/// ([`Self::mark_paid`]), the admin transitions, the stale order sweep, and the order queries.
///
/// State changes are committed by the backend before any event is published, so a slow or failing subscriber can
/// never roll back a transition.
pub struct OrderFlowApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B: Clone> Clone for OrderFlowApi<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), producers: self.producers.clone() }
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> OrderFlowApi<B>
where B: PaymentGatewayDatabase
{
    /// Confirms payment for an order. This is idempotent and safe to call concurrently: exactly one caller moves the
    /// order to `paid`, deducts stock and triggers the order paid notifications. Every other caller sees
    /// `newly_paid == false` and nothing changes.
    ///
    /// Orders that are cancelled or refunded cannot be paid, and an order already bound to a different provider
    /// reference is rejected.
    pub async fn mark_paid(
        &self,
        order_id: OrderId,
        reference: PaymentReference,
    ) -> Result<PaymentConfirmation, OrderFlowError> {
        match self.record_payment(order_id, reference).await? {
            MarkPaidResult::Paid { order, adjustments, .. } => {
                for adj in adjustments.iter().filter(|a| a.shortfall() > 0) {
                    warn!(
                        "📦️ Order {order_id} was paid for {} units of {}, but only {} were in stock",
                        adj.requested, adj.product_id, adj.previous
                    );
                }
                Ok(PaymentConfirmation { order, newly_paid: true, adjustments })
            },
            MarkPaidResult::AlreadyPaid(order) => {
                debug!("📦️ Order {order_id} is already paid. Nothing to do.");
                Ok(PaymentConfirmation { order, newly_paid: false, adjustments: vec![] })
            },
            MarkPaidResult::NotPayable(order) => {
                warn!("📦️ A payment confirmation arrived for order {order_id}, but it is {}", order.status);
                Err(OrderFlowError::OrderNotPayable { id: order_id, status: order.status })
            },
        }
    }

    /// Like [`Self::mark_paid`], but an order that can no longer be paid is reported in the result rather than as an
    /// error. Provider notifications use this, since they must be acknowledged regardless.
    pub async fn record_payment(
        &self,
        order_id: OrderId,
        reference: PaymentReference,
    ) -> Result<MarkPaidResult, OrderFlowError> {
        let result = self.db.mark_order_paid(order_id, &reference).await?;
        if let MarkPaidResult::Paid { order, items, .. } = &result {
            info!("📦️ Order {order_id} has been paid via {}", reference.provider);
            self.call_order_paid_hook(order, items.clone()).await;
        }
        Ok(result)
    }

    /// Moves an order along the state machine on behalf of an admin.
    ///
    /// The checks happen in this order, and the first failure is returned:
    /// * The caller must hold [`Capability::ManageOrders`]. Nothing is read before this check.
    /// * The target status must be one of the seven known statuses.
    /// * The order must exist.
    /// * The transition must be in the adjacency list of the current status.
    /// * Moving to `shipped` requires a tracking number and a courier.
    ///
    /// `pending -> paid` is delegated to [`Self::mark_paid`] with a manual payment reference, so that stock is
    /// deducted exactly once however the order gets paid.
    ///
    /// The update itself is a compare-and-set on the status that was read. If another request changed the status in
    /// the meantime, the transition is rejected as illegal from the new status.
    pub async fn transition_order(
        &self,
        principal: &Principal,
        order_id: OrderId,
        request: TransitionRequest,
    ) -> Result<Order, OrderFlowError> {
        principal.require(Capability::ManageOrders)?;
        let target = request
            .status
            .parse::<OrderStatusType>()
            .map_err(|_| OrderFlowError::UnknownStatus(request.status.clone()))?;
        let order = self.db.fetch_order(order_id).await?.ok_or(OrderFlowError::OrderNotFound(order_id))?;
        let from = order.status;
        if !from.can_transition_to(target) {
            info!("📦️ Admin {} tried to move order {order_id} from {from} to {target}. Denied.", principal.user_id);
            return Err(OrderFlowError::IllegalTransition { from, to: target });
        }
        let mut update = StatusUpdate::new(target);
        if target == OrderStatusType::Shipped {
            let tracking = non_blank(request.tracking_number);
            let courier = non_blank(request.courier);
            match (tracking, courier) {
                (Some(t), Some(c)) => update = update.with_shipping(&t, &c),
                _ => {
                    return Err(OrderFlowError::ValidationError(
                        "A tracking number and courier are required to ship an order".into(),
                    ))
                },
            }
        }
        if from == OrderStatusType::Pending && target == OrderStatusType::Paid {
            let confirmation = self.mark_paid(order_id, PaymentReference::manual()).await?;
            info!("📦️ Admin {} manually marked order {order_id} as paid", principal.user_id);
            return Ok(confirmation.order);
        }
        let updated = match self.db.update_order_status(order_id, from, update).await? {
            Some(order) => order,
            None => {
                let current = self.db.fetch_order(order_id).await?.ok_or(OrderFlowError::OrderNotFound(order_id))?;
                warn!(
                    "📦️ Order {order_id} changed from {from} to {} while admin {} was moving it to {target}",
                    current.status, principal.user_id
                );
                return Err(OrderFlowError::IllegalTransition { from: current.status, to: target });
            },
        };
        info!("📦️ Admin {} moved order {order_id} from {from} to {target}", principal.user_id);
        self.call_status_changed_hook(&updated, from).await;
        Ok(updated)
    }

    /// Cancels every `pending` order older than `threshold` in a single bulk update. No notifications are sent.
    /// Running this repeatedly is harmless: orders that have been paid or cancelled are never selected.
    pub async fn cancel_stale_orders(&self, threshold: Duration) -> Result<Vec<Order>, OrderFlowError> {
        let cutoff = Utc::now() - threshold;
        let cancelled = self.db.cancel_stale_orders(cutoff).await?;
        if cancelled.is_empty() {
            trace!("📦️ No stale orders to cancel");
        } else {
            let ids = cancelled.iter().map(|o| o.id.to_string()).collect::<Vec<String>>().join(", ");
            info!("📦️ Cancelled {} stale orders created before {cutoff}: {ids}", cancelled.len());
        }
        Ok(cancelled)
    }

    /// Fetches an order and its items. Customers can only see their own orders. For anyone else the order does not
    /// exist.
    pub async fn order(&self, principal: &Principal, order_id: OrderId) -> Result<FullOrder, OrderFlowError> {
        let order = self
            .db
            .fetch_order(order_id)
            .await?
            .filter(|o| o.user_id == principal.user_id || principal.has(Capability::ViewAllOrders))
            .ok_or(OrderFlowError::OrderNotFound(order_id))?;
        let items = self.db.fetch_order_items(order_id).await?;
        Ok(FullOrder::new(order, items))
    }

    /// The caller's own orders, newest first.
    pub async fn my_orders(&self, principal: &Principal) -> Result<Vec<Order>, OrderFlowError> {
        self.db.fetch_orders_for_user(principal.user_id).await
    }

    pub async fn search_orders(
        &self,
        principal: &Principal,
        filter: OrderQueryFilter,
    ) -> Result<Vec<Order>, OrderFlowError> {
        principal.require(Capability::ViewAllOrders)?;
        debug!("📦️ Admin {} searching orders. {filter}", principal.user_id);
        self.db.search_orders(filter).await
    }

    /// Refunds the order in the database, provided it is still `paid` or `shipped`. The provider call is the
    /// caller's responsibility. Returns `None` if the order left the refundable statuses in the meantime.
    pub(crate) async fn refund_in_db(&self, order: &Order) -> Result<Option<Order>, OrderFlowError> {
        let refunded = self.db.refund_order(order.id).await?;
        if let Some(updated) = &refunded {
            self.call_status_changed_hook(updated, order.status).await;
        }
        Ok(refunded)
    }

    /// Applies a provider's refund notification. The provider is authoritative, so the order is refunded whatever
    /// its status.
    pub(crate) async fn force_refund(
        &self,
        provider: PaymentProviderKind,
        payment_id: &str,
    ) -> Result<Option<Order>, OrderFlowError> {
        let result = self.db.force_refund_by_payment_id(provider, payment_id).await?;
        match result {
            Some((old_status, order)) => {
                info!("📦️ Order {} refunded by {provider} (was {old_status})", order.id);
                self.call_status_changed_hook(&order, old_status).await;
                Ok(Some(order))
            },
            None => Ok(None),
        }
    }

    async fn call_order_paid_hook(&self, order: &Order, items: Vec<OrderItem>) {
        for emitter in &self.producers.order_paid_producer {
            debug!("📬️ Notifying order paid hook subscribers");
            let event = OrderPaidEvent::new(order.clone(), items.clone());
            emitter.publish_event(event).await;
        }
    }

    async fn call_status_changed_hook(&self, order: &Order, old_status: OrderStatusType) {
        for emitter in &self.producers.status_changed_producer {
            debug!("📬️ Notifying status changed hook subscribers");
            let event = OrderStatusChangedEvent::new(order.clone(), old_status);
            emitter.publish_event(event).await;
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
