use actix_web::{http::StatusCode, test, test::TestRequest, web, web::ServiceConfig, App};
use order_engine::{
    db_types::{Money, NewProduct, Order, OrderId, OrderStatusType, PaymentProviderKind, Principal, Product},
    events::EventProducers,
    order_objects::{CartSummary, CheckoutSession, FullOrder, PaymentConfirmation, RefundResult},
    test_utils::{
        fake_provider::FakeProvider,
        prepare_env::{fresh_database, tear_down},
    },
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
    CartApi,
    CatalogApi,
    OrderFlowApi,
    PaymentFlowApi,
    SqliteDatabase,
};
use serde_json::{json, Value};

use super::helpers::{get_request, issue_token, post_request, send_request};
use crate::{
    config::ServerOptions,
    routes::{
        AddToCartRoute,
        CheckoutRoute,
        MyOrdersRoute,
        OrderByIdRoute,
        RazorpayOrderRoute,
        RazorpayVerifyRoute,
        RazorpayWebhookRoute,
        RefundOrderRoute,
        RemoveFromCartRoute,
        StripeConfirmRoute,
        StripeIntentRoute,
        TransitionOrderRoute,
        ViewCartRoute,
        RAZORPAY_SIGNATURE_HEADER,
    },
    server::json_config,
};

/// Behaves like Stripe: the payment intent is its own payment reference, and a claim is genuine if the intent exists.
#[derive(Debug, Clone)]
struct StripeFake(FakeProvider);

impl PaymentProvider for StripeFake {
    fn kind(&self) -> PaymentProviderKind {
        self.0.kind()
    }

    async fn create_provider_order(
        &self,
        request: &ProviderOrderRequest,
    ) -> Result<ProviderOrder, PaymentProviderError> {
        self.0.create_provider_order(request).await
    }

    async fn verify_payment(&self, claim: &PaymentClaim) -> Result<bool, PaymentProviderError> {
        let exists = self.0.fetch_provider_order(&claim.provider_order_id).await.is_ok();
        Ok(exists && claim.payment_id == claim.provider_order_id)
    }

    async fn fetch_provider_order(
        &self,
        provider_order_id: &str,
    ) -> Result<ProviderOrderMetadata, PaymentProviderError> {
        self.0.fetch_provider_order(provider_order_id).await
    }

    async fn refund(&self, payment_id: &str, amount: Money) -> Result<RefundReceipt, PaymentProviderError> {
        self.0.refund(payment_id, amount).await
    }

    fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> bool {
        self.0.verify_webhook_signature(body, signature)
    }

    fn parse_webhook_event(&self, body: &[u8]) -> Result<WebhookEvent, PaymentProviderError> {
        self.0.parse_webhook_event(body)
    }
}

struct Shop {
    db: SqliteDatabase,
    razorpay: FakeProvider,
    stripe: StripeFake,
    product: Product,
}

impl Shop {
    async fn new() -> Self {
        let _ = env_logger::try_init().ok();
        let db = fresh_database().await;
        let product = CatalogApi::new(db.clone())
            .create_product(&Principal::admin(1), NewProduct::new("Notebook", Money::from(1000), 5))
            .await
            .expect("Could not create product");
        let razorpay = FakeProvider::new(PaymentProviderKind::Razorpay);
        let stripe = StripeFake(FakeProvider::new(PaymentProviderKind::Stripe));
        Self { db, razorpay, stripe, product }
    }

    fn configure(&self) -> impl FnOnce(&mut ServiceConfig) {
        let db = self.db.clone();
        let razorpay = self.razorpay.clone();
        let stripe = self.stripe.clone();
        move |cfg| {
            let orders = OrderFlowApi::new(db.clone(), EventProducers::default());
            cfg.app_data(web::Data::new(CartApi::new(db.clone(), "INR")))
                .app_data(web::Data::new(PaymentFlowApi::new(orders.clone(), razorpay)))
                .app_data(web::Data::new(PaymentFlowApi::new(orders.clone(), stripe)))
                .app_data(web::Data::new(orders))
                .app_data(web::Data::new(ServerOptions::default()))
                .service(ViewCartRoute::<SqliteDatabase>::new())
                .service(AddToCartRoute::<SqliteDatabase>::new())
                .service(RemoveFromCartRoute::<SqliteDatabase>::new())
                .service(CheckoutRoute::<SqliteDatabase>::new())
                .service(MyOrdersRoute::<SqliteDatabase>::new())
                .service(OrderByIdRoute::<SqliteDatabase>::new())
                .service(RazorpayOrderRoute::<SqliteDatabase, FakeProvider>::new())
                .service(RazorpayVerifyRoute::<SqliteDatabase, FakeProvider>::new())
                .service(StripeIntentRoute::<SqliteDatabase, StripeFake>::new())
                .service(StripeConfirmRoute::<SqliteDatabase, StripeFake>::new())
                .service(TransitionOrderRoute::<SqliteDatabase>::new())
                .service(RefundOrderRoute::<SqliteDatabase, FakeProvider, StripeFake>::new())
                .service(RazorpayWebhookRoute::<SqliteDatabase, FakeProvider>::new());
        }
    }

    async fn get(&self, principal: Principal, path: &str) -> (StatusCode, String) {
        get_request(&issue_token(principal), path, self.configure()).await
    }

    async fn post(&self, principal: Principal, path: &str, body: Value) -> (StatusCode, String) {
        post_request(&issue_token(principal), path, body, self.configure()).await
    }

    /// Webhooks are not behind the token middleware.
    async fn webhook(&self, body: &str, signature: &str) -> (StatusCode, String) {
        let app = test::init_service(App::new().app_data(json_config()).configure(self.configure())).await;
        let req = TestRequest::post()
            .uri("/webhooks/razorpay")
            .insert_header((RAZORPAY_SIGNATURE_HEADER, signature))
            .set_payload(body.to_string())
            .to_request();
        let res = test::call_service(&app, req).await;
        let status = res.status();
        let body = test::read_body(res).await;
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    async fn checkout(&self, customer: Principal, quantity: i64) -> FullOrder {
        let body = json!({"product_id": self.product.id, "quantity": quantity});
        let (status, body) = self.post(customer, "/cart/items", body).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        let (status, body) = self.post(customer, "/checkout", json!({})).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        serde_json::from_str(&body).unwrap()
    }

    async fn order(&self, id: OrderId) -> Order {
        let (status, body) = self.get(Principal::admin(1), &format!("/orders/{}", id.value())).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        serde_json::from_str::<FullOrder>(&body).unwrap().order
    }

    async fn stock(&self) -> i64 {
        CatalogApi::new(self.db.clone()).product(self.product.id).await.unwrap().inventory
    }
}

#[actix_web::test]
async fn cart_operations() {
    let shop = Shop::new().await;
    let customer = Principal::customer(7);
    let body = json!({"product_id": shop.product.id});
    let (status, _) = shop.post(customer, "/cart/items", body.clone()).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = shop.post(customer, "/cart/items", body).await;
    assert_eq!(status, StatusCode::OK);
    let cart: CartSummary = serde_json::from_str(&body).unwrap();
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 2);
    assert_eq!(cart.total, Money::from(2000));

    let (status, body) = shop.post(customer, "/cart/items", json!({"product_id": 999})).await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{body}");
    let (status, _) = shop.post(customer, "/cart/items", json!({"product_id": shop.product.id, "quantity": 0})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let path = format!("/cart/items/{}", shop.product.id.0);
    let token = issue_token(customer);
    let (status, body) = send_request(TestRequest::delete().uri(&path), &token, shop.configure()).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let cart: CartSummary = serde_json::from_str(&body).unwrap();
    assert!(cart.is_empty());
    let (status, _) = send_request(TestRequest::delete().uri(&path), &token, shop.configure()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = shop.post(customer, "/checkout", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, r#"{"error":"The request cannot be completed. The cart is empty"}"#);
    tear_down(shop.db).await;
}

#[actix_web::test]
async fn razorpay_checkout_and_payment() {
    let shop = Shop::new().await;
    let customer = Principal::customer(7);
    let order = shop.checkout(customer, 2).await;
    assert_eq!(order.order.status, OrderStatusType::Pending);
    assert_eq!(order.order.total_amount, Money::from(2000));
    assert_eq!(shop.stock().await, 5, "Stock must not move at checkout");
    let id = order.order.id.value();

    // Someone else's order does not exist, as far as they are concerned
    let (status, _) = shop.post(Principal::customer(8), &format!("/payments/razorpay/orders/{id}"), json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = shop.get(Principal::customer(8), &format!("/orders/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = shop.post(customer, &format!("/payments/razorpay/orders/{id}"), json!({})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let session: CheckoutSession = serde_json::from_str(&body).unwrap();
    let provider_order_id = session.provider_order.provider_order_id.clone();
    assert_eq!(session.provider_order.amount, Money::from(2000));
    // Asking again returns the same provider order
    let (_, body) = shop.post(customer, &format!("/payments/razorpay/orders/{id}"), json!({})).await;
    let again: CheckoutSession = serde_json::from_str(&body).unwrap();
    assert_eq!(again.provider_order.provider_order_id, provider_order_id);
    assert_eq!(shop.razorpay.created_orders(), 1);
    // and a Stripe intent cannot be created for it any more
    let (status, _) = shop.post(customer, &format!("/payments/stripe/intents/{id}"), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let forged = json!({
        "razorpay_order_id": provider_order_id,
        "razorpay_payment_id": "pay_1",
        "razorpay_signature": "not-a-signature"
    });
    let (status, body) = shop.post(customer, "/payments/razorpay/verify", forged).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, r#"{"error":"Signature verification failed. Payment signature verification failed"}"#);
    assert_eq!(shop.order(order.order.id).await.status, OrderStatusType::Pending);

    let claim = FakeProvider::claim(&provider_order_id, "pay_1");
    let genuine = json!({
        "razorpay_order_id": claim.provider_order_id,
        "razorpay_payment_id": claim.payment_id,
        "razorpay_signature": claim.signature
    });
    // Only the owner may claim the payment
    let (status, _) = shop.post(Principal::customer(8), "/payments/razorpay/verify", genuine.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = shop.post(customer, "/payments/razorpay/verify", genuine.clone()).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let confirmation: PaymentConfirmation = serde_json::from_str(&body).unwrap();
    assert!(confirmation.newly_paid);
    assert_eq!(confirmation.order.status, OrderStatusType::Paid);
    assert_eq!(confirmation.order.provider_payment_id.as_deref(), Some("pay_1"));
    assert_eq!(shop.stock().await, 3);

    // A second verification changes nothing
    let (status, body) = shop.post(customer, "/payments/razorpay/verify", genuine).await;
    assert_eq!(status, StatusCode::OK);
    let confirmation: PaymentConfirmation = serde_json::from_str(&body).unwrap();
    assert!(!confirmation.newly_paid);
    assert_eq!(shop.stock().await, 3);

    // Nor does the provider's webhook arriving afterwards
    let hook = json!({
        "event": "payment.captured",
        "provider_order_id": provider_order_id,
        "payment_id": "pay_1",
        "order_id": id
    })
    .to_string();
    let (status, body) = shop.webhook(&hook, &FakeProvider::sign(hook.as_bytes())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, format!(r#"{{"outcome":"already_paid","order_id":{id}}}"#));
    assert_eq!(shop.stock().await, 3);
    tear_down(shop.db).await;
}

#[actix_web::test]
async fn webhooks() {
    let shop = Shop::new().await;
    let customer = Principal::customer(7);
    let order = shop.checkout(customer, 1).await;
    let id = order.order.id.value();
    let (status, body) = shop.post(customer, &format!("/payments/razorpay/orders/{id}"), json!({})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let session: CheckoutSession = serde_json::from_str(&body).unwrap();
    let rzp_order = session.provider_order.provider_order_id;

    let hook = json!({"event": "payment.captured", "provider_order_id": rzp_order, "payment_id": "pay_9"}).to_string();
    let (status, body) = shop.webhook(&hook, "fake_webhook_secret:0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, r#"{"error":"Signature verification failed. Invalid webhook signature"}"#);
    assert_eq!(shop.order(order.order.id).await.status, OrderStatusType::Pending);

    let (status, body) = shop.webhook(&hook, &FakeProvider::sign(hook.as_bytes())).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body, format!(r#"{{"outcome":"order_paid","order_id":{id}}}"#));
    assert_eq!(shop.order(order.order.id).await.status, OrderStatusType::Paid);
    assert_eq!(shop.stock().await, 4);

    // Unknown orders and unmodelled events are acknowledged
    let unknown = json!({"event": "payment.captured", "payment_id": "pay_x", "order_id": 9999}).to_string();
    let (status, body) = shop.webhook(&unknown, &FakeProvider::sign(unknown.as_bytes())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"outcome":"unknown_order","reference":"pay_x"}"#);
    let other = json!({"event": "payment.failed"}).to_string();
    let (status, body) = shop.webhook(&other, &FakeProvider::sign(other.as_bytes())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"outcome":"ignored","event":"payment.failed"}"#);

    let garbage = "{not json";
    let (status, _) = shop.webhook(garbage, &FakeProvider::sign(garbage.as_bytes())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // The provider's refund notification is authoritative
    let refund = json!({"event": "refund.processed", "payment_id": "pay_9"}).to_string();
    let (status, body) = shop.webhook(&refund, &FakeProvider::sign(refund.as_bytes())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, format!(r#"{{"outcome":"order_refunded","order_id":{id}}}"#));
    assert_eq!(shop.order(order.order.id).await.status, OrderStatusType::Refunded);
    tear_down(shop.db).await;
}

#[actix_web::test]
async fn admin_transitions() {
    let shop = Shop::new().await;
    let admin = Principal::admin(1);
    let order = shop.checkout(Principal::customer(7), 1).await;
    let path = format!("/admin/orders/{}/status", order.order.id.value());

    let (status, _) = shop.post(Principal::customer(7), &path, json!({"status": "paid"})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = shop.post(admin, &path, json!({"status": "shipped"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, r#"{"error":"The request cannot be completed. Order status cannot change from pending to shipped"}"#);
    let (status, body) = shop.post(admin, &path, json!({"status": "lost"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, r#"{"error":"Could not read request body: 'lost' is not a valid order status"}"#);

    // Manually marking an order as paid deducts stock like any other payment
    let (status, body) = shop.post(admin, &path, json!({"status": "paid"})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(shop.stock().await, 4);
    let (status, _) = shop.post(admin, &path, json!({"status": "processing"})).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = shop.post(admin, &path, json!({"status": "shipped", "tracking_number": "  "})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let shipping = json!({"status": "shipped", "tracking_number": "TRK-1", "courier": "BlueDart"});
    let (status, body) = shop.post(admin, &path, shipping).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let shipped: Order = serde_json::from_str(&body).unwrap();
    assert_eq!(shipped.status, OrderStatusType::Shipped);
    assert_eq!(shipped.tracking_number.as_deref(), Some("TRK-1"));
    assert!(shipped.shipped_at.is_some());

    // A manually paid order has no provider payment to refund
    let refund_path = format!("/admin/orders/{}/refund", order.order.id.value());
    let (status, body) = shop.post(admin, &refund_path, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    tear_down(shop.db).await;
}

#[actix_web::test]
async fn refunds_go_to_the_provider_that_took_the_payment() {
    let shop = Shop::new().await;
    let customer = Principal::customer(7);
    let order = shop.checkout(customer, 1).await;
    let id = order.order.id.value();

    let (status, body) = shop.post(customer, &format!("/payments/stripe/intents/{id}"), json!({})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let session: CheckoutSession = serde_json::from_str(&body).unwrap();
    let intent_id = session.provider_order.provider_order_id;
    let (status, body) =
        shop.post(customer, "/payments/stripe/confirm", json!({"payment_intent_id": intent_id})).await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let path = format!("/admin/orders/{id}/refund");
    let (status, _) = shop.post(customer, &path, json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = shop.post(Principal::admin(1), &path, json!({})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let result: RefundResult = serde_json::from_str(&body).unwrap();
    assert_eq!(result.order.status, OrderStatusType::Refunded);
    assert_eq!(result.receipt.amount, Money::from(1000));
    assert_eq!(shop.stripe.0.refunds(), vec![(intent_id, Money::from(1000))]);
    assert!(shop.razorpay.refunds().is_empty());

    let (status, body) = shop.post(Principal::admin(1), &path, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, r#"{"error":"The request cannot be completed. Refund not allowed for an order that is refunded"}"#);
    tear_down(shop.db).await;
}

#[actix_web::test]
async fn failed_refunds_leave_the_order_alone() {
    let shop = Shop::new().await;
    let customer = Principal::customer(7);
    let order = shop.checkout(customer, 1).await;
    let id = order.order.id.value();
    let (_, body) = shop.post(customer, &format!("/payments/razorpay/orders/{id}"), json!({})).await;
    let session: CheckoutSession = serde_json::from_str(&body).unwrap();
    let claim = FakeProvider::claim(&session.provider_order.provider_order_id, "pay_5");
    let body = json!({
        "razorpay_order_id": claim.provider_order_id,
        "razorpay_payment_id": claim.payment_id,
        "razorpay_signature": claim.signature
    });
    let (status, _) = shop.post(customer, "/payments/razorpay/verify", body).await;
    assert_eq!(status, StatusCode::OK);

    shop.razorpay.fail_refunds(true);
    let (status, body) = shop.post(Principal::admin(1), &format!("/admin/orders/{id}/refund"), json!({})).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY, "{body}");
    assert_eq!(shop.order(order.order.id).await.status, OrderStatusType::Paid);
    tear_down(shop.db).await;
}

#[actix_web::test]
async fn order_listings() {
    let shop = Shop::new().await;
    shop.checkout(Principal::customer(7), 1).await;
    shop.checkout(Principal::customer(8), 1).await;
    shop.checkout(Principal::customer(7), 1).await;

    let (status, body) = shop.get(Principal::customer(7), "/orders").await;
    assert_eq!(status, StatusCode::OK);
    let orders: Vec<Order> = serde_json::from_str(&body).unwrap();
    assert_eq!(orders.len(), 2);
    assert!(orders.iter().all(|o| o.user_id == 7));
    assert!(orders[0].id.value() > orders[1].id.value(), "Newest orders come first");

    let (status, body) = shop.get(Principal::admin(1), "/orders").await;
    assert_eq!(status, StatusCode::OK);
    let orders: Vec<Order> = serde_json::from_str(&body).unwrap();
    assert_eq!(orders.len(), 3);
    tear_down(shop.db).await;
}
