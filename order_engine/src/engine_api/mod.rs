//! # Order engine public API
//!
//! The `engine_api` module exposes the programmatic API for the order engine.
//! The API is modular, so that clients of the API can pick and choose the functionality they want.
//!
//! * [`cart_api`] manages a customer's cart and converts it into an order at checkout.
//! * [`order_flow_api`] drives the order state machine: payment confirmation, admin transitions, the stale order
//!   sweep and order queries.
//! * [`payment_flow_api`] reconciles orders with an external payment provider: provider order creation, client
//!   payment verification, webhooks and refunds.
//! * [`reporting_api`] provides the admin dashboard figures.
//! * [`catalog_api`] seeds products and lists stock shortfalls.
//!
//! The other submodules in this module are support types.
//!
//! # API usage
//!
//! The pattern for using all the APIs is the same. An API instance is created by supplying a database backend that
//! implements the specific backend traits required by the API. Every operation takes the authenticated
//! [`crate::db_types::Principal`] and performs its own capability checks.
//!
//! ```rust,ignore
//! use order_engine::{CartApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url(...).await?;
//! // SqliteDatabase implements CartManagement
//! let api = CartApi::new(db, "INR");
//! let order = api.checkout(&principal).await?;
//! ```

pub mod cart_api;
pub mod catalog_api;
pub mod errors;
pub mod order_flow_api;
pub mod order_objects;
pub mod payment_flow_api;
pub mod report_objects;
pub mod reporting_api;
