use std::time::Duration;

use chrono::Utc;
use cucumber::{given, then, when};
use order_engine::{
    db_types::{Money, NewOrder, OrderStatusType, PaymentReference},
    order_objects::TransitionRequest,
    test_utils::fake_provider::FakeProvider,
    CatalogManagement,
    OrderManagement,
    PaymentGatewayDatabase,
};

use crate::cucumber::ShopWorld;

#[when(expr = "customer '{word}' adds {int} '{word}' to the cart")]
async fn add_to_cart(world: &mut ShopWorld, name: String, quantity: i64, product: String) {
    let customer = world.customer(&name);
    let product = world.product(&product);
    let result = world.system().carts.add_to_cart(&customer, product, quantity).await;
    world.record(result);
}

#[when(expr = "customer '{word}' checks out")]
async fn checkout(world: &mut ShopWorld, name: String) {
    let customer = world.customer(&name);
    let result = world.system().carts.checkout(&customer).await;
    if let Some(order) = world.record(result) {
        world.orders.insert(name, order.order.id);
    }
}

#[given(expr = "an order for '{word}' of {int} '{word}' placed {int} minutes ago")]
async fn backdated_order(world: &mut ShopWorld, name: String, quantity: i64, product: String, minutes: i64) {
    let customer = world.customer(&name);
    let product = world.product(&product);
    let db = &world.system().db;
    let price = db.fetch_product(product).await.expect("Error fetching product").expect("No such product").price;
    let order = NewOrder::new(customer.user_id, "INR")
        .with_item(product, quantity, price)
        .created_at(Utc::now() - chrono::Duration::minutes(minutes));
    let order = db.insert_order(order).await.expect("Error inserting order");
    world.orders.insert(name, order.id);
}

#[when(expr = "customer '{word}' pays for the order through razorpay")]
async fn pay_with_razorpay(world: &mut ShopWorld, name: String) {
    let customer = world.customer(&name);
    let order_id = world.order_of(&name);
    let session = world.system().razorpay.create_provider_order(&customer, order_id).await;
    let Some(session) = world.record(session) else {
        return;
    };
    let claim = FakeProvider::claim(&session.provider_order.provider_order_id, &format!("pay_{order_id}"));
    let result = world.system().razorpay.verify_payment(&customer, claim).await;
    world.record(result);
}

#[when(expr = "the razorpay webhook confirms the payment for '{word}'")]
async fn webhook_confirms(world: &mut ShopWorld, name: String) {
    let order_id = world.order_of(&name);
    let order = world.system().db.fetch_order(order_id).await.expect("Error fetching order").expect("No such order");
    let body = serde_json::json!({
        "event": "payment.captured",
        "provider_order_id": order.provider_order_id,
        "payment_id": format!("pay_{order_id}"),
        "order_id": order_id.value(),
    });
    let body = serde_json::to_vec(&body).expect("Error serializing webhook");
    let result = world.system().razorpay.handle_webhook(&body, &FakeProvider::sign(&body)).await;
    world.record(result);
}

#[when(expr = "admin marks the order for '{word}' as {word}")]
async fn admin_transition(world: &mut ShopWorld, name: String, status: String) {
    let (admin, order_id) = (world.admin(), world.order_of(&name));
    let result = world.system().orders.transition_order(&admin, order_id, TransitionRequest::new(status)).await;
    world.record(result);
}

#[when(expr = "admin ships the order for '{word}' with tracking '{word}' via '{word}'")]
async fn admin_ships(world: &mut ShopWorld, name: String, tracking: String, courier: String) {
    let (admin, order_id) = (world.admin(), world.order_of(&name));
    let request = TransitionRequest::new("shipped").with_shipping(&tracking, &courier);
    let result = world.system().orders.transition_order(&admin, order_id, request).await;
    world.record(result);
}

#[when(expr = "admin confirms payment for the order for '{word}' manually")]
async fn manual_payment(world: &mut ShopWorld, name: String) {
    let order_id = world.order_of(&name);
    let result = world.system().orders.mark_paid(order_id, PaymentReference::manual()).await;
    world.record(result);
}

#[when(expr = "admin refunds the order for '{word}'")]
async fn admin_refund(world: &mut ShopWorld, name: String) {
    let (admin, order_id) = (world.admin(), world.order_of(&name));
    let result = world.system().razorpay.refund_order(&admin, order_id).await;
    world.record(result);
}

#[when(expr = "the sweep runs with a threshold of {int} minutes")]
async fn sweep(world: &mut ShopWorld, minutes: i64) {
    let result = world.system().orders.cancel_stale_orders(chrono::Duration::minutes(minutes)).await;
    world.record(result);
}

#[when(expr = "I pause for {int}ms")]
async fn pause(_world: &mut ShopWorld, ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[then(expr = "the order for '{word}' is {word}")]
async fn check_status(world: &mut ShopWorld, name: String, status: String) {
    let expected = status.parse::<OrderStatusType>().expect("Not a valid status");
    let order_id = world.order_of(&name);
    let order = world.system().db.fetch_order(order_id).await.expect("Error fetching order").expect("No such order");
    assert_eq!(order.status, expected, "Order {order_id} has the wrong status");
}

#[then(expr = "the order for '{word}' is pending with a total of {int}")]
async fn check_pending_total(world: &mut ShopWorld, name: String, total: i64) {
    let order_id = world.order_of(&name);
    let order = world.system().db.fetch_order(order_id).await.expect("Error fetching order").expect("No such order");
    assert_eq!(order.status, OrderStatusType::Pending);
    assert_eq!(order.total_amount, Money::from(total));
}

#[then(expr = "the order for '{word}' has tracking number '{word}'")]
async fn check_tracking(world: &mut ShopWorld, name: String, tracking: String) {
    let order_id = world.order_of(&name);
    let order = world.system().db.fetch_order(order_id).await.expect("Error fetching order").expect("No such order");
    assert_eq!(order.tracking_number, Some(tracking));
    assert!(order.shipped_at.is_some());
}

#[then(expr = "product '{word}' has {int} in stock")]
async fn check_stock(world: &mut ShopWorld, product: String, inventory: i64) {
    let id = world.product(&product);
    let product = world.system().catalog.product(id).await.expect("Error fetching product");
    assert_eq!(product.inventory, inventory, "Wrong stock level for {}", product.name);
}

#[then(expr = "the cart for '{word}' is empty")]
async fn check_cart_empty(world: &mut ShopWorld, name: String) {
    let customer = world.customer(&name);
    let cart = world.system().carts.view_cart(&customer).await.expect("Error fetching cart");
    assert!(cart.is_empty(), "Cart is not empty: {cart:?}");
}

#[then(expr = "the last request failed with a {word} error")]
async fn check_failure(world: &mut ShopWorld, kind: String) {
    let err = world.last_error.as_ref().expect("The last request succeeded");
    assert_eq!(format!("{:?}", err.kind()), kind, "Unexpected error: {err}");
}

#[then("the last request succeeded")]
async fn check_success(world: &mut ShopWorld) {
    assert!(world.last_error.is_none(), "The last request failed: {:?}", world.last_error);
}

#[then(expr = "the admin report shows {int} orders and revenue of {int}")]
async fn check_report(world: &mut ShopWorld, orders: i64, revenue: i64) {
    let admin = world.admin();
    let stats = world.system().reports.order_stats(&admin).await.expect("Error fetching report");
    assert_eq!(stats.total_orders, orders);
    assert_eq!(stats.total_revenue, Money::from(revenue));
}
