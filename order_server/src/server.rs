use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::*;
use order_engine::{
    events::EventProducers,
    CartApi,
    CatalogApi,
    OrderFlowApi,
    PaymentFlowApi,
    ReportingApi,
    SqliteDatabase,
};
use payment_providers::{RazorpayProvider, StripeProvider};

use crate::{
    auth::JwtAuthority,
    config::{ServerConfig, ServerOptions},
    errors::ServerError,
    integrations::notifications::{create_notification_handlers, NotificationDispatcher},
    middleware::JwtMiddlewareFactory,
    routes::{
        health,
        AddToCartRoute,
        CheckoutRoute,
        CreateProductRoute,
        InventoryAlertsRoute,
        MyOrdersRoute,
        OrderByIdRoute,
        OrderStatsRoute,
        RazorpayOrderRoute,
        RazorpayVerifyRoute,
        RazorpayWebhookRoute,
        RefundOrderRoute,
        RemoveFromCartRoute,
        SearchOrdersRoute,
        StripeConfirmRoute,
        StripeIntentRoute,
        StripeWebhookRoute,
        TransitionOrderRoute,
        ViewCartRoute,
    },
    sweep_worker::start_sweep_worker,
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, config.max_connections)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.migrate().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let dispatcher = NotificationDispatcher::new(config.notification_queue_url.clone())
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let handlers = create_notification_handlers(dispatcher);
    let producers = handlers.producers();
    handlers.start_handlers().await;
    info!("📨️ Notification handlers started");
    let razorpay = RazorpayProvider::new(config.razorpay.clone())
        .map_err(|e| ServerError::InitializeError(format!("Could not create the Razorpay client. {e}")))?;
    let stripe = StripeProvider::new(config.stripe.clone())
        .map_err(|e| ServerError::InitializeError(format!("Could not create the Stripe client. {e}")))?;
    let sweep = start_sweep_worker(
        OrderFlowApi::new(db.clone(), producers.clone()),
        config.stale_order_timeout,
        config.sweep_interval,
    );
    let srv = create_server_instance(config, db, producers, razorpay, stripe)?;
    let result = srv.await.map_err(|e| ServerError::Unspecified(e.to_string()));
    sweep.abort();
    result
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    producers: EventProducers,
    razorpay: RazorpayProvider,
    stripe: StripeProvider,
) -> Result<Server, ServerError> {
    let options = ServerOptions::from_config(&config);
    let authority = JwtAuthority::new(&config.auth);
    let currency = config.currency.clone();
    let srv = HttpServer::new(move || {
        let orders_api = OrderFlowApi::new(db.clone(), producers.clone());
        let cart_api = CartApi::new(db.clone(), currency.clone());
        let razorpay_api = PaymentFlowApi::new(orders_api.clone(), razorpay.clone());
        let stripe_api = PaymentFlowApi::new(orders_api.clone(), stripe.clone());
        let reporting_api = ReportingApi::new(db.clone());
        let catalog_api = CatalogApi::new(db.clone());
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("shop::access_log"))
            .app_data(json_config())
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(cart_api))
            .app_data(web::Data::new(razorpay_api))
            .app_data(web::Data::new(stripe_api))
            .app_data(web::Data::new(reporting_api))
            .app_data(web::Data::new(catalog_api))
            .app_data(web::Data::new(options));
        // Routes that require authentication
        let api_scope = web::scope("/api")
            .wrap(JwtMiddlewareFactory::new(authority.clone()))
            .service(ViewCartRoute::<SqliteDatabase>::new())
            .service(AddToCartRoute::<SqliteDatabase>::new())
            .service(RemoveFromCartRoute::<SqliteDatabase>::new())
            .service(CheckoutRoute::<SqliteDatabase>::new())
            .service(MyOrdersRoute::<SqliteDatabase>::new())
            .service(OrderByIdRoute::<SqliteDatabase>::new())
            .service(RazorpayOrderRoute::<SqliteDatabase, RazorpayProvider>::new())
            .service(RazorpayVerifyRoute::<SqliteDatabase, RazorpayProvider>::new())
            .service(StripeIntentRoute::<SqliteDatabase, StripeProvider>::new())
            .service(StripeConfirmRoute::<SqliteDatabase, StripeProvider>::new())
            .service(TransitionOrderRoute::<SqliteDatabase>::new())
            .service(RefundOrderRoute::<SqliteDatabase, RazorpayProvider, StripeProvider>::new())
            .service(SearchOrdersRoute::<SqliteDatabase>::new())
            .service(OrderStatsRoute::<SqliteDatabase>::new())
            .service(InventoryAlertsRoute::<SqliteDatabase>::new())
            .service(CreateProductRoute::<SqliteDatabase>::new());
        // Webhooks are authenticated by their signatures
        app.service(health)
            .service(api_scope)
            .service(RazorpayWebhookRoute::<SqliteDatabase, RazorpayProvider>::new())
            .service(StripeWebhookRoute::<SqliteDatabase, StripeProvider>::new())
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}

/// Malformed JSON bodies are reported with the same `{"error": ...}` body as every other error.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .error_handler(|err, _req| ServerError::InvalidRequestBody(err.to_string()).into())
}
