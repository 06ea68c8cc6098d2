//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate function. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests:
//! ```nocompile
//!     fn my_handler() -> impl Responder {
//!         std::thread::sleep(Duration::from_secs(5)); // <-- Bad practice! Will cause the current worker thread to
//! hang!
//!     }
//! ```
//! For this reason, any long, non-cpu-bound operation (e.g. I/O, database operations, provider calls etc.) should be
//! expressed as futures or asynchronous functions. Async handlers get executed concurrently by worker threads and thus
//! don’t block execution.
use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use log::*;
use order_engine::{
    db_types::{NewProduct, OrderId, PaymentProviderKind, ProductId, Role},
    order_objects::{OrderQueryFilter, TransitionRequest},
    traits::{PaymentClaim, PaymentProvider},
    CartApi,
    CartManagement,
    CatalogApi,
    CatalogManagement,
    OrderFlowApi,
    PaymentFlowApi,
    PaymentGatewayDatabase,
    ReportingApi,
    ReportingManagement,
};

use crate::{
    auth::JwtClaims,
    config::ServerOptions,
    data_objects::{AddToCartParams, RazorpayVerification, StripeConfirmation},
    errors::ServerError,
    helpers::get_remote_ip,
};

pub const RAZORPAY_SIGNATURE_HEADER: &str = "X-Razorpay-Signature";
pub const STRIPE_SIGNATURE_HEADER: &str = "Stripe-Signature";

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $bound:path where requires [$($roles:path),+]) => {
        paste::paste! { pub struct [<$name:camel Route>]<A>(core::marker::PhantomData<fn() -> A>);}
        paste::paste! { impl<A> [<$name:camel Route>]<A> {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(core::marker::PhantomData::<fn() -> A>)
            }
        }}
        paste::paste! { impl<A> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<A>
        where
            A: $bound + 'static,
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::<A>)
                    .wrap($crate::middleware::AclMiddlewareFactory::new(&[$($roles),+]));
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };

    ($name:ident => $method:ident $path:literal <$($param:ident: $bound:path),+> where requires [$($roles:path),+]) => {
        paste::paste! { pub struct [<$name:camel Route>]<$($param),+>(core::marker::PhantomData<fn() -> ($($param,)+)>);}
        paste::paste! { impl<$($param),+> [<$name:camel Route>]<$($param),+> {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(core::marker::PhantomData)
            }
        }}
        paste::paste! { impl<$($param),+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$($param),+>
        where
            $($param: $bound + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::<$($param),+>)
                    .wrap($crate::middleware::AclMiddlewareFactory::new(&[$($roles),+]));
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };

    ($name:ident => $method:ident $path:literal <$($param:ident: $bound:path),+>) => {
        paste::paste! { pub struct [<$name:camel Route>]<$($param),+>(core::marker::PhantomData<fn() -> ($($param,)+)>);}
        paste::paste! { impl<$($param),+> [<$name:camel Route>]<$($param),+> {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(core::marker::PhantomData)
            }
        }}
        paste::paste! { impl<$($param),+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$($param),+>
        where
            $($param: $bound + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::<$($param),+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Cart  ----------------------------------------------------
route!(view_cart => Get "/cart" impl CartManagement where requires [Role::Customer, Role::Admin]);
pub async fn view_cart<B: CartManagement>(
    claims: JwtClaims,
    api: web::Data<CartApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET cart for user {}", claims.sub);
    let cart = api.view_cart(&claims.principal()).await?;
    Ok(HttpResponse::Ok().json(cart))
}

route!(add_to_cart => Post "/cart/items" impl CartManagement where requires [Role::Customer, Role::Admin]);
/// Adds `quantity` (default 1) of a product to the caller's cart. Adding a product that is already in the cart
/// increases the quantity of the existing line.
pub async fn add_to_cart<B: CartManagement>(
    claims: JwtClaims,
    body: web::Json<AddToCartParams>,
    api: web::Data<CartApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let params = body.into_inner();
    debug!("💻️ POST add {} x {} to cart for user {}", params.quantity, params.product_id, claims.sub);
    let cart = api.add_to_cart(&claims.principal(), params.product_id, params.quantity).await?;
    Ok(HttpResponse::Ok().json(cart))
}

route!(remove_from_cart => Delete "/cart/items/{product_id}" impl CartManagement where requires [Role::Customer, Role::Admin]);
pub async fn remove_from_cart<B: CartManagement>(
    claims: JwtClaims,
    path: web::Path<i64>,
    api: web::Data<CartApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let product_id = ProductId::from(path.into_inner());
    debug!("💻️ DELETE {product_id} from cart for user {}", claims.sub);
    let cart = api.remove_from_cart(&claims.principal(), product_id).await?;
    Ok(HttpResponse::Ok().json(cart))
}

route!(checkout => Post "/checkout" impl CartManagement where requires [Role::Customer, Role::Admin]);
/// Converts the caller's cart into a pending order. The response is the new order and its line items.
pub async fn checkout<B: CartManagement>(
    claims: JwtClaims,
    api: web::Data<CartApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ POST checkout for user {}", claims.sub);
    let order = api.checkout(&claims.principal()).await?;
    Ok(HttpResponse::Created().json(order))
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(my_orders => Get "/orders" impl PaymentGatewayDatabase where requires [Role::Customer, Role::Admin]);
/// Route handler for the orders endpoint
///
/// Customers get their own orders, newest first. Admins get every order.
pub async fn my_orders<B: PaymentGatewayDatabase>(
    claims: JwtClaims,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let principal = claims.principal();
    debug!("💻️ GET orders for user {} ({})", principal.user_id, principal.role);
    let orders = if principal.is_admin() {
        api.search_orders(&principal, OrderQueryFilter::default()).await?
    } else {
        api.my_orders(&principal).await?
    };
    Ok(HttpResponse::Ok().json(orders))
}

route!(order_by_id => Get "/orders/{order_id}" impl PaymentGatewayDatabase where requires [Role::Customer, Role::Admin]);
/// Fetches a single order with its line items. Customers asking for someone else's order get a 404.
pub async fn order_by_id<B: PaymentGatewayDatabase>(
    claims: JwtClaims,
    path: web::Path<i64>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    debug!("💻️ GET order {order_id} for user {}", claims.sub);
    let order = api.order(&claims.principal(), order_id).await?;
    Ok(HttpResponse::Ok().json(order))
}

//----------------------------------------------   Payments  ----------------------------------------------------
route!(razorpay_order => Post "/payments/razorpay/orders/{order_id}" <B: PaymentGatewayDatabase, P: PaymentProvider> where requires [Role::Customer, Role::Admin]);
/// Creates the Razorpay order a customer pays against from the checkout widget. Calling this again for the same order
/// returns the same Razorpay order.
pub async fn razorpay_order<B, P>(
    claims: JwtClaims,
    path: web::Path<i64>,
    api: web::Data<PaymentFlowApi<B, P>>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase,
    P: PaymentProvider,
{
    create_checkout_session(claims, path.into_inner(), api.as_ref()).await
}

route!(stripe_intent => Post "/payments/stripe/intents/{order_id}" <B: PaymentGatewayDatabase, P: PaymentProvider> where requires [Role::Customer, Role::Admin]);
/// Creates the Stripe payment intent for an order. The response carries the intent's client secret.
pub async fn stripe_intent<B, P>(
    claims: JwtClaims,
    path: web::Path<i64>,
    api: web::Data<PaymentFlowApi<B, P>>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase,
    P: PaymentProvider,
{
    create_checkout_session(claims, path.into_inner(), api.as_ref()).await
}

async fn create_checkout_session<B, P>(
    claims: JwtClaims,
    order_id: i64,
    api: &PaymentFlowApi<B, P>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase,
    P: PaymentProvider,
{
    let order_id = OrderId::from(order_id);
    let kind = api.provider().kind();
    debug!("💻️ POST create {kind} order for order {order_id} by user {}", claims.sub);
    let session = api.create_provider_order(&claims.principal(), order_id).await?;
    Ok(HttpResponse::Ok().json(session))
}

route!(razorpay_verify => Post "/payments/razorpay/verify" <B: PaymentGatewayDatabase, P: PaymentProvider> where requires [Role::Customer, Role::Admin]);
/// The Razorpay checkout widget hands the client an order id, a payment id and a signature once payment completes.
/// The client forwards them here; if the signature checks out, the order is marked as paid.
pub async fn razorpay_verify<B, P>(
    claims: JwtClaims,
    body: web::Json<RazorpayVerification>,
    api: web::Data<PaymentFlowApi<B, P>>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase,
    P: PaymentProvider,
{
    verify_payment_claim(claims, body.into_inner().into(), api.as_ref()).await
}

route!(stripe_confirm => Post "/payments/stripe/confirm" <B: PaymentGatewayDatabase, P: PaymentProvider> where requires [Role::Customer, Role::Admin]);
pub async fn stripe_confirm<B, P>(
    claims: JwtClaims,
    body: web::Json<StripeConfirmation>,
    api: web::Data<PaymentFlowApi<B, P>>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase,
    P: PaymentProvider,
{
    verify_payment_claim(claims, body.into_inner().into(), api.as_ref()).await
}

async fn verify_payment_claim<B, P>(
    claims: JwtClaims,
    claim: PaymentClaim,
    api: &PaymentFlowApi<B, P>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase,
    P: PaymentProvider,
{
    let kind = api.provider().kind();
    debug!("💻️ POST verify {kind} payment {} for user {}", claim.payment_id, claims.sub);
    let confirmation = api.verify_payment(&claims.principal(), claim).await?;
    Ok(HttpResponse::Ok().json(confirmation))
}

//----------------------------------------------   Webhooks  ----------------------------------------------------
route!(razorpay_webhook => Post "/webhooks/razorpay" <B: PaymentGatewayDatabase, P: PaymentProvider>);
/// Razorpay signs the raw body with the webhook secret and sends the signature in `X-Razorpay-Signature`.
pub async fn razorpay_webhook<B, P>(
    req: HttpRequest,
    body: web::Bytes,
    api: web::Data<PaymentFlowApi<B, P>>,
    options: web::Data<ServerOptions>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase,
    P: PaymentProvider,
{
    handle_webhook(&req, &body, RAZORPAY_SIGNATURE_HEADER, api.as_ref(), options.as_ref()).await
}

route!(stripe_webhook => Post "/webhooks/stripe" <B: PaymentGatewayDatabase, P: PaymentProvider>);
/// Stripe sends `Stripe-Signature: t=<timestamp>,v1=<signature>` over `<timestamp>.<raw body>`.
pub async fn stripe_webhook<B, P>(
    req: HttpRequest,
    body: web::Bytes,
    api: web::Data<PaymentFlowApi<B, P>>,
    options: web::Data<ServerOptions>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase,
    P: PaymentProvider,
{
    handle_webhook(&req, &body, STRIPE_SIGNATURE_HEADER, api.as_ref(), options.as_ref()).await
}

/// Every verified delivery is acknowledged with a 200, whatever the outcome, so that the provider stops retrying it.
/// Only bad signatures and unreadable payloads are rejected. Storage failures return a 500, which makes the provider
/// deliver the event again later.
async fn handle_webhook<B, P>(
    req: &HttpRequest,
    body: &[u8],
    header: &str,
    api: &PaymentFlowApi<B, P>,
    options: &ServerOptions,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase,
    P: PaymentProvider,
{
    let kind = api.provider().kind();
    let peer = get_remote_ip(req, options.use_x_forwarded_for, options.use_forwarded);
    let peer = peer.map(|ip| ip.to_string()).unwrap_or_else(|| "an unknown address".into());
    info!("🪝️ Received {kind} webhook from {peer}");
    let signature = req.headers().get(header).and_then(|v| v.to_str().ok()).unwrap_or_default();
    if signature.is_empty() {
        warn!("🪝️ {kind} webhook from {peer} did not include a {header} header");
    }
    let outcome = api.handle_webhook(body, signature).await.map_err(|e| {
        warn!("🪝️ Could not process {kind} webhook from {peer}. {e}");
        ServerError::from(e)
    })?;
    info!("🪝️ {kind} webhook handled: {outcome}");
    Ok(HttpResponse::Ok().json(outcome))
}

//----------------------------------------------   Admin  ----------------------------------------------------
route!(transition_order => Post "/admin/orders/{order_id}/status" impl PaymentGatewayDatabase where requires [Role::Admin]);
/// Moves an order along the order state machine. Shipping an order requires a tracking number and a courier.
pub async fn transition_order<B: PaymentGatewayDatabase>(
    claims: JwtClaims,
    path: web::Path<i64>,
    body: web::Json<TransitionRequest>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    let request = body.into_inner();
    info!("💻️ POST admin {} moves order {order_id} to {}", claims.sub, request.status);
    let order = api.transition_order(&claims.principal(), order_id, request).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(refund_order => Post "/admin/orders/{order_id}/refund" <B: PaymentGatewayDatabase, R: PaymentProvider, S: PaymentProvider> where requires [Role::Admin]);
/// Refunds the full order total through whichever provider took the payment.
///
/// `R` is the Razorpay payment flow and `S` the Stripe flow. Orders without a provider payment are handed to the
/// Razorpay flow, whose own checks reject them.
pub async fn refund_order<B, R, S>(
    claims: JwtClaims,
    path: web::Path<i64>,
    orders: web::Data<OrderFlowApi<B>>,
    razorpay: web::Data<PaymentFlowApi<B, R>>,
    stripe: web::Data<PaymentFlowApi<B, S>>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase,
    R: PaymentProvider,
    S: PaymentProvider,
{
    let order_id = OrderId::from(path.into_inner());
    let principal = claims.principal();
    info!("💻️ POST admin {} requests a refund of order {order_id}", principal.user_id);
    let order = orders.order(&principal, order_id).await?.order;
    let result = match order.payment_provider {
        Some(PaymentProviderKind::Stripe) => stripe.refund_order(&principal, order_id).await?,
        _ => razorpay.refund_order(&principal, order_id).await?,
    };
    Ok(HttpResponse::Ok().json(result))
}

route!(search_orders => Post "/admin/orders/search" impl PaymentGatewayDatabase where requires [Role::Admin]);
/// Searches orders by user, provider, status list and creation date range. All criteria are optional.
pub async fn search_orders<B: PaymentGatewayDatabase>(
    claims: JwtClaims,
    body: web::Json<OrderQueryFilter>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let filter = body.into_inner();
    debug!("💻️ POST order search by admin {}. {filter}", claims.sub);
    let orders = api.search_orders(&claims.principal(), filter).await?;
    Ok(HttpResponse::Ok().json(orders))
}

route!(order_stats => Get "/admin/stats" impl ReportingManagement where requires [Role::Admin]);
pub async fn order_stats<B: ReportingManagement>(
    claims: JwtClaims,
    api: web::Data<ReportingApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET order stats for admin {}", claims.sub);
    let stats = api.order_stats(&claims.principal()).await?;
    Ok(HttpResponse::Ok().json(stats))
}

route!(inventory_alerts => Get "/admin/inventory/alerts" impl CatalogManagement where requires [Role::Admin]);
pub async fn inventory_alerts<B: CatalogManagement>(
    claims: JwtClaims,
    api: web::Data<CatalogApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET inventory alerts for admin {}", claims.sub);
    let alerts = api.inventory_alerts(&claims.principal()).await?;
    Ok(HttpResponse::Ok().json(alerts))
}

route!(create_product => Post "/admin/products" impl CatalogManagement where requires [Role::Admin]);
pub async fn create_product<B: CatalogManagement>(
    claims: JwtClaims,
    body: web::Json<NewProduct>,
    api: web::Data<CatalogApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let product = body.into_inner();
    info!("💻️ POST admin {} adds product '{}'", claims.sub, product.name);
    let product = api.create_product(&claims.principal(), product).await?;
    Ok(HttpResponse::Created().json(product))
}
