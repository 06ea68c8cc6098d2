#![allow(dead_code)]
use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc,
    },
    time::Duration,
};

use order_engine::{
    db_types::{Money, NewProduct, OrderId, PaymentProviderKind, Principal, Product, ProductId},
    events::{EventHandlers, EventHooks},
    order_objects::FullOrder,
    test_utils::{
        fake_provider::FakeProvider,
        prepare_env::{fresh_database, tear_down},
    },
    CartApi,
    CatalogApi,
    CatalogManagement,
    OrderFlowApi,
    PaymentFlowApi,
    ReportingApi,
    SqliteDatabase,
};

pub const ADMIN: Principal = Principal { user_id: 1, role: order_engine::db_types::Role::Admin };
pub const ALICE: Principal = Principal { user_id: 100, role: order_engine::db_types::Role::Customer };
pub const BOB: Principal = Principal { user_id: 200, role: order_engine::db_types::Role::Customer };

#[derive(Debug, Clone, Default)]
pub struct EventCounts {
    paid: Arc<AtomicI32>,
    status_changed: Arc<AtomicI32>,
}

impl EventCounts {
    pub fn paid(&self) -> i32 {
        self.paid.load(Ordering::SeqCst)
    }

    pub fn status_changed(&self) -> i32 {
        self.status_changed.load(Ordering::SeqCst)
    }
}

pub struct TestShop {
    pub db: SqliteDatabase,
    pub carts: CartApi<SqliteDatabase>,
    pub orders: OrderFlowApi<SqliteDatabase>,
    pub catalog: CatalogApi<SqliteDatabase>,
    pub reports: ReportingApi<SqliteDatabase>,
    pub razorpay: PaymentFlowApi<SqliteDatabase, FakeProvider>,
    pub stripe: PaymentFlowApi<SqliteDatabase, FakeProvider>,
    pub rzp_provider: FakeProvider,
    pub stripe_provider: FakeProvider,
    pub events: EventCounts,
}

impl TestShop {
    pub async fn new() -> Self {
        let db = fresh_database().await;
        let events = EventCounts::default();
        let mut hooks = EventHooks::default();
        let paid = events.paid.clone();
        hooks.on_order_paid(move |_ev| {
            let paid = paid.clone();
            Box::pin(async move {
                paid.fetch_add(1, Ordering::SeqCst);
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        let changed = events.status_changed.clone();
        hooks.on_status_changed(move |_ev| {
            let changed = changed.clone();
            Box::pin(async move {
                changed.fetch_add(1, Ordering::SeqCst);
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        let handlers = EventHandlers::new(16, hooks);
        let producers = handlers.producers();
        handlers.start_handlers().await;

        let orders = OrderFlowApi::new(db.clone(), producers);
        let rzp_provider = FakeProvider::new(PaymentProviderKind::Razorpay);
        let stripe_provider = FakeProvider::new(PaymentProviderKind::Stripe);
        Self {
            carts: CartApi::new(db.clone(), "INR"),
            catalog: CatalogApi::new(db.clone()),
            reports: ReportingApi::new(db.clone()),
            razorpay: PaymentFlowApi::new(orders.clone(), rzp_provider.clone()),
            stripe: PaymentFlowApi::new(orders.clone(), stripe_provider.clone()),
            orders,
            rzp_provider,
            stripe_provider,
            events,
            db,
        }
    }

    pub async fn product(&self, name: &str, price: i64, inventory: i64) -> Product {
        self.db.insert_product(NewProduct::new(name, Money::from(price), inventory)).await.expect("Error creating product")
    }

    pub async fn inventory(&self, id: ProductId) -> i64 {
        self.db.fetch_product(id).await.expect("Error fetching product").expect("Product does not exist").inventory
    }

    /// Fills the customer's cart with the given (product, quantity) lines and checks out.
    pub async fn order_for(&self, customer: &Principal, lines: &[(ProductId, i64)]) -> FullOrder {
        for (product, qty) in lines {
            self.carts.add_to_cart(customer, *product, *qty).await.expect("Error adding to cart");
        }
        self.carts.checkout(customer).await.expect("Error checking out")
    }

    /// Gives the event handlers a moment to run.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    pub async fn tear_down(self) {
        tear_down(self.db).await;
    }
}

pub fn oid(order: &FullOrder) -> OrderId {
    order.order.id
}
