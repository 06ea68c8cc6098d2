//! # Order server
//! This crate hosts the HTTP server for the storefront's order lifecycle. It is responsible for:
//! * Authenticating callers from the bearer tokens minted by the identity provider, and enforcing role access.
//! * Exposing the cart, checkout and order endpoints to customers.
//! * Creating provider orders with Razorpay and Stripe, verifying client payment claims, and receiving the
//!   providers' webhooks.
//! * Exposing order transitions, refunds, order search, reports and inventory alerts to admins.
//! * Running the stale order sweep and queueing customer notifications.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/webhooks/razorpay` and `/webhooks/stripe`: Payment provider notifications. These are authenticated by their
//!   signatures rather than by a token.
//! * `/api/...`: Everything else. See [routes](routes/index.html).

pub mod auth;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod integrations;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod sweep_worker;

#[cfg(test)]
mod endpoint_tests;
