//! # Backend contracts
//!
//! This module defines the interface contracts that storage *backends* and external collaborators must fulfil in
//! order to be driven by the order engine.
//!
//! * [`PaymentGatewayDatabase`] defines the order state machine writes: inserting orders, the atomic mark-paid
//!   operation, conditional status updates, refunds and the stale order sweep.
//! * [`OrderManagement`] provides read-only queries over orders.
//! * [`CartManagement`] manages carts and the checkout conversion.
//! * [`CatalogManagement`] covers product lookups and stock accounting.
//! * [`ReportingManagement`] provides aggregate queries for admin reporting.
//! * [`PaymentProvider`] is implemented by clients of external payment processors rather than by storage backends.
mod cart_management;
mod catalog_management;
mod data_objects;
mod order_management;
mod payment_gateway_database;
mod payment_provider;
mod reporting_management;

pub use cart_management::CartManagement;
pub use catalog_management::CatalogManagement;
pub use data_objects::{DailyTotal, InventoryAdjustment, MarkPaidResult, StatusTotal, StatusUpdate};
pub use order_management::OrderManagement;
pub use payment_gateway_database::{ErrorKind, OrderFlowError, PaymentGatewayDatabase};
pub use payment_provider::{
    PaymentClaim,
    PaymentProvider,
    PaymentProviderError,
    ProviderOrder,
    ProviderOrderMetadata,
    ProviderOrderRequest,
    RefundReceipt,
    WebhookEvent,
};
pub use reporting_management::ReportingManagement;
