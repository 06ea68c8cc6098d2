use std::collections::HashMap;

use cucumber::World;
use log::*;
use order_engine::{
    db_types::{OrderId, PaymentProviderKind, Principal, ProductId},
    events::EventProducers,
    test_utils::{
        fake_provider::FakeProvider,
        prepare_env::{create_database, random_db_path, run_migrations},
    },
    CartApi,
    CatalogApi,
    OrderFlowApi,
    OrderFlowError,
    PaymentFlowApi,
    ReportingApi,
    SqliteDatabase,
};

#[derive(Default, Debug, World)]
pub struct ShopWorld {
    pub system: Option<ShopSystem>,
    pub customers: HashMap<String, Principal>,
    pub products: HashMap<String, ProductId>,
    /// The most recent order placed by each customer
    pub orders: HashMap<String, OrderId>,
    pub last_error: Option<OrderFlowError>,
}

#[derive(Debug)]
pub struct ShopSystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub carts: CartApi<SqliteDatabase>,
    pub orders: OrderFlowApi<SqliteDatabase>,
    pub catalog: CatalogApi<SqliteDatabase>,
    pub reports: ReportingApi<SqliteDatabase>,
    pub razorpay: PaymentFlowApi<SqliteDatabase, FakeProvider>,
}

impl ShopWorld {
    pub fn system(&self) -> &ShopSystem {
        self.system.as_ref().expect("Shop system not initialised")
    }

    pub fn admin(&self) -> Principal {
        Principal::admin(1)
    }

    /// Customers are created on first mention.
    pub fn customer(&mut self, name: &str) -> Principal {
        let next_id = 100 + self.customers.len() as i64;
        *self.customers.entry(name.to_string()).or_insert_with(|| Principal::customer(next_id))
    }

    pub fn product(&self, name: &str) -> ProductId {
        *self.products.get(name).unwrap_or_else(|| panic!("Product {name} has not been created"))
    }

    pub fn order_of(&self, name: &str) -> OrderId {
        *self.orders.get(name).unwrap_or_else(|| panic!("{name} has not placed an order"))
    }

    /// Remembers the error of a request that was expected to possibly fail.
    pub fn record<T>(&mut self, result: Result<T, OrderFlowError>) -> Option<T> {
        match result {
            Ok(v) => {
                self.last_error = None;
                Some(v)
            },
            Err(e) => {
                debug!("🚀️ Request failed: {e}");
                self.last_error = Some(e);
                None
            },
        }
    }
}

impl ShopSystem {
    pub async fn new() -> Self {
        let url = prepare_test_env().await;
        let db = SqliteDatabase::new_with_url(&url, 1).await.expect("Error creating connection to database");
        debug!("Created database: {url}");
        let orders = OrderFlowApi::new(db.clone(), EventProducers::default());
        let razorpay = PaymentFlowApi::new(orders.clone(), FakeProvider::new(PaymentProviderKind::Razorpay));
        Self {
            db_path: url,
            carts: CartApi::new(db.clone(), "INR"),
            catalog: CatalogApi::new(db.clone()),
            reports: ReportingApi::new(db.clone()),
            orders,
            razorpay,
            db,
        }
    }
}

pub async fn prepare_test_env() -> String {
    let path = random_db_path();
    create_database(&path).await;
    run_migrations(&path).await;
    path
}
