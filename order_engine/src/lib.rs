//! Order Engine
//!
//! The order engine takes a customer's cart to a confirmed, paid order, and keeps the order in step with the payment
//! providers that take the money. It is provider-agnostic: payment processors plug in through the
//! [`PaymentProvider`] trait.
//!
//! The library is divided into these main sections:
//! 1. Storage. [`traits`] defines the backend contracts, and [`SqliteDatabase`] is the SQLite implementation. You
//!    should never need to access the database directly. Instead, use the public API provided by the engine.
//!    The exception is the data types used in the database. These are defined in the [`db_types`] module and are
//!    public.
//! 2. The public API (`engine_api`): [`CartApi`], [`OrderFlowApi`], [`PaymentFlowApi`], [`ReportingApi`] and
//!    [`CatalogApi`]. Every operation takes the authenticated [`db_types::Principal`] making the request.
//!
//! The engine also provides a set of events that can be subscribed to. These events are emitted after an order is
//! paid, or after its status changes through an admin transition or a refund. A simple Actor framework is used so
//! that you can easily hook into these events and perform custom actions, like sending emails.
pub mod db_types;
pub mod events;
pub mod traits;

mod engine_api;
#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use engine_api::{
    cart_api::CartApi,
    catalog_api::CatalogApi,
    errors::AuthorizationError,
    order_flow_api::OrderFlowApi,
    order_objects,
    payment_flow_api::PaymentFlowApi,
    report_objects,
    reporting_api::ReportingApi,
};
#[cfg(feature = "sqlite")]
pub use sqlite::{db::db_url, SqliteDatabase};
pub use traits::{
    CartManagement,
    CatalogManagement,
    ErrorKind,
    OrderFlowError,
    OrderManagement,
    PaymentGatewayDatabase,
    PaymentProvider,
    PaymentProviderError,
    ReportingManagement,
};
