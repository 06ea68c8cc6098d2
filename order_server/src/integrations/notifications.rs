//! Customer notifications.
//!
//! The order engine publishes an event after an order is paid and after an order's status changes. Here those events
//! become notification jobs: an order confirmation email and an invoice when an order is paid, and a status update
//! email when an admin moves an order along or it is refunded.
//!
//! Jobs are POSTed as JSON to an external job queue, which takes care of rendering templates and delivering mail. If no
//! queue is configured, jobs are only logged. Delivery failures are logged and never reach the order flow.
use std::time::Duration;

use futures::future::BoxFuture;
use log::*;
use order_engine::{
    db_types::{Money, Order, OrderItem, OrderStatusType},
    events::{EventHandlers, EventHooks, OrderPaidEvent, OrderStatusChangedEvent},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const NOTIFICATION_EVENT_BUFFER_SIZE: usize = 25;
const QUEUE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Could not build the notification queue client. {0}")]
    ClientError(String),
    #[error("Could not deliver the notification job. {0}")]
    DeliveryError(String),
    #[error("The notification queue rejected the job with status {0}")]
    Rejected(u16),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub product_name: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub line_total: Money,
}

impl From<&OrderItem> for InvoiceLine {
    fn from(item: &OrderItem) -> Self {
        Self {
            product_name: item.product_name.clone(),
            quantity: item.quantity,
            unit_price: item.price_at_purchase,
            line_total: item.line_total(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum NotificationJob {
    OrderConfirmationEmail { user_id: i64, order_id: i64, subject: String, body: String },
    Invoice {
        user_id: i64,
        order_id: i64,
        lines: Vec<InvoiceLine>,
        total: Money,
        currency: String,
        subject: String,
        body: String,
    },
    OrderStatusUpdateEmail {
        user_id: i64,
        order_id: i64,
        old_status: OrderStatusType,
        new_status: OrderStatusType,
        subject: String,
        body: String,
    },
}

impl NotificationJob {
    pub fn order_confirmation(order: &Order) -> Self {
        let subject = format!("Order #{} confirmed", order.id.value());
        let body = format!(
            "Thank you for your order!\n\nWe have received your payment of {} {} for order #{}. We will let you know \
             as soon as it ships.\n",
            order.total_amount,
            order.currency,
            order.id.value()
        );
        Self::OrderConfirmationEmail { user_id: order.user_id, order_id: order.id.value(), subject, body }
    }

    pub fn invoice(order: &Order, items: &[OrderItem]) -> Self {
        let lines = items.iter().map(InvoiceLine::from).collect::<Vec<_>>();
        let subject = format!("Invoice for order #{}", order.id.value());
        let mut body = format!("Invoice for order #{}\n\n", order.id.value());
        for line in &lines {
            body.push_str(&format!(
                "{:<30} {:>4} x {:>10} = {:>10}\n",
                line.product_name, line.quantity, line.unit_price, line.line_total
            ));
        }
        body.push_str(&format!("\nTotal: {} {}\n", order.total_amount, order.currency));
        Self::Invoice {
            user_id: order.user_id,
            order_id: order.id.value(),
            lines,
            total: order.total_amount,
            currency: order.currency.clone(),
            subject,
            body,
        }
    }

    pub fn status_update(order: &Order, old_status: OrderStatusType) -> Self {
        let subject = format!("Order #{} is now {}", order.id.value(), order.status);
        let mut body = format!("Your order #{} has moved from {old_status} to {}.\n", order.id.value(), order.status);
        if order.status == OrderStatusType::Shipped {
            if let (Some(tracking), Some(courier)) = (&order.tracking_number, &order.courier) {
                body.push_str(&format!("It is on its way with {courier}. Tracking number: {tracking}\n"));
            }
        }
        if order.status == OrderStatusType::Refunded {
            body.push_str(&format!("A refund of {} {} has been issued.\n", order.total_amount, order.currency));
        }
        Self::OrderStatusUpdateEmail {
            user_id: order.user_id,
            order_id: order.id.value(),
            old_status,
            new_status: order.status,
            subject,
            body,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::OrderConfirmationEmail { .. } => "order_confirmation_email",
            Self::Invoice { .. } => "invoice",
            Self::OrderStatusUpdateEmail { .. } => "order_status_update_email",
        }
    }

    pub fn order_id(&self) -> i64 {
        match self {
            Self::OrderConfirmationEmail { order_id, .. } |
            Self::Invoice { order_id, .. } |
            Self::OrderStatusUpdateEmail { order_id, .. } => *order_id,
        }
    }
}

/// Hands notification jobs to the external job queue.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    client: reqwest::Client,
    queue_url: Option<String>,
}

impl NotificationDispatcher {
    pub fn new(queue_url: Option<String>) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder()
            .timeout(QUEUE_TIMEOUT)
            .build()
            .map_err(|e| NotificationError::ClientError(e.to_string()))?;
        if queue_url.is_none() {
            warn!("📨️ No notification queue is configured. Notification jobs will only be logged.");
        }
        Ok(Self { client, queue_url })
    }

    pub async fn dispatch(&self, job: &NotificationJob) -> Result<(), NotificationError> {
        let Some(url) = &self.queue_url else {
            info!("📨️ [{}] for order {}: {job:?}", job.name(), job.order_id());
            return Ok(());
        };
        let response = self
            .client
            .post(url)
            .json(job)
            .send()
            .await
            .map_err(|e| NotificationError::DeliveryError(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotificationError::Rejected(status.as_u16()));
        }
        debug!("📨️ Queued {} for order {}", job.name(), job.order_id());
        Ok(())
    }

    async fn dispatch_all(&self, jobs: Vec<NotificationJob>) {
        for job in jobs {
            if let Err(e) = self.dispatch(&job).await {
                error!("📨️ Could not queue {} for order {}. {e}", job.name(), job.order_id());
            }
        }
    }
}

/// Subscribes the notification dispatcher to the order engine's events.
///
/// 1. OrderPaidEvent - An order confirmation email and an invoice are queued.
/// 2. OrderStatusChangedEvent - A status update email is queued.
pub fn create_notification_handlers(dispatcher: NotificationDispatcher) -> EventHandlers {
    let mut hooks = EventHooks::default();
    let paid_dispatcher = dispatcher.clone();
    hooks.on_order_paid(move |ev: OrderPaidEvent| {
        let jobs = vec![NotificationJob::order_confirmation(&ev.order), NotificationJob::invoice(&ev.order, &ev.items)];
        let dispatcher = paid_dispatcher.clone();
        Box::pin(async move { dispatcher.dispatch_all(jobs).await }) as BoxFuture<'static, ()>
    });
    hooks.on_status_changed(move |ev: OrderStatusChangedEvent| {
        debug!("📨️ Order {} moved from {} to {}", ev.order.id, ev.old_status, ev.new_status());
        let jobs = vec![NotificationJob::status_update(&ev.order, ev.old_status)];
        let dispatcher = dispatcher.clone();
        Box::pin(async move { dispatcher.dispatch_all(jobs).await }) as BoxFuture<'static, ()>
    });
    EventHandlers::new(NOTIFICATION_EVENT_BUFFER_SIZE, hooks)
}

#[cfg(test)]
mod test {
    use chrono::Utc;
    use order_engine::db_types::{OrderId, PaymentProviderKind, ProductId};
    use serde_json::json;
    use wiremock::{
        matchers::{body_partial_json, method, path},
        Mock,
        MockServer,
        ResponseTemplate,
    };

    use super::*;

    fn order(status: OrderStatusType) -> Order {
        Order {
            id: OrderId(12),
            user_id: 5,
            status,
            total_amount: Money::from(2500),
            currency: "INR".into(),
            tracking_number: Some("TRK-99".into()),
            courier: Some("BlueDart".into()),
            payment_provider: Some(PaymentProviderKind::Razorpay),
            provider_order_id: Some("order_abc".into()),
            provider_payment_id: Some("pay_abc".into()),
            paid_at: Some(Utc::now()),
            shipped_at: None,
            delivered_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn items() -> Vec<OrderItem> {
        vec![
            OrderItem {
                id: 1,
                order_id: OrderId(12),
                product_id: ProductId(1),
                product_name: "Notebook".into(),
                quantity: 2,
                price_at_purchase: Money::from(1000),
            },
            OrderItem {
                id: 2,
                order_id: OrderId(12),
                product_id: ProductId(2),
                product_name: "Pen".into(),
                quantity: 1,
                price_at_purchase: Money::from(500),
            },
        ]
    }

    #[test]
    fn invoice_lines_and_totals() {
        let job = NotificationJob::invoice(&order(OrderStatusType::Paid), &items());
        let NotificationJob::Invoice { lines, total, subject, body, .. } = &job else {
            panic!("Expected an invoice");
        };
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].line_total, Money::from(2000));
        assert_eq!(*total, Money::from(2500));
        assert_eq!(subject, "Invoice for order #12");
        assert!(body.contains("Notebook"));
        assert!(body.contains("Total: 25.00 INR"));
        assert_eq!(job.name(), "invoice");
    }

    #[test]
    fn shipping_updates_include_tracking() {
        let job = NotificationJob::status_update(&order(OrderStatusType::Shipped), OrderStatusType::Processing);
        let NotificationJob::OrderStatusUpdateEmail { body, subject, new_status, .. } = &job else {
            panic!("Expected a status update");
        };
        assert_eq!(*new_status, OrderStatusType::Shipped);
        assert_eq!(subject, "Order #12 is now shipped");
        assert!(body.contains("BlueDart"));
        assert!(body.contains("TRK-99"));
    }

    #[test]
    fn jobs_are_tagged() {
        let job = NotificationJob::order_confirmation(&order(OrderStatusType::Paid));
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["job"], "order_confirmation_email");
        assert_eq!(value["order_id"], 12);
        assert_eq!(value["user_id"], 5);
    }

    #[tokio::test]
    async fn jobs_are_posted_to_the_queue() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/jobs"))
            .and(body_partial_json(json!({"job": "order_status_update_email", "order_id": 12})))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;
        let dispatcher = NotificationDispatcher::new(Some(format!("{}/jobs", server.uri()))).unwrap();
        let job = NotificationJob::status_update(&order(OrderStatusType::Refunded), OrderStatusType::Paid);
        dispatcher.dispatch(&job).await.unwrap();
    }

    #[tokio::test]
    async fn queue_failures_are_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(503)).mount(&server).await;
        let dispatcher = NotificationDispatcher::new(Some(server.uri())).unwrap();
        let job = NotificationJob::order_confirmation(&order(OrderStatusType::Paid));
        let err = dispatcher.dispatch(&job).await.unwrap_err();
        assert!(matches!(err, NotificationError::Rejected(503)));
    }

    #[tokio::test]
    async fn without_a_queue_jobs_are_logged() {
        let dispatcher = NotificationDispatcher::new(None).unwrap();
        let job = NotificationJob::order_confirmation(&order(OrderStatusType::Paid));
        assert!(dispatcher.dispatch(&job).await.is_ok());
    }
}
