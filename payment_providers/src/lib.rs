//! HTTP clients for the payment providers the shop accepts.
//!
//! Each client implements [`order_engine::traits::PaymentProvider`], so the engine's payment flow can be wired to
//! either of them (or to a fake in tests):
//! * [`RazorpayProvider`] creates Razorpay orders and checks the `order_id|payment_id` checkout signature.
//! * [`StripeProvider`] creates payment intents and checks `Stripe-Signature` webhook headers.
//!
//! Signature helpers live in [`signatures`]. Every comparison of a signature is constant-time.
mod config;
mod data_objects;
mod error;
mod razorpay;
mod rest;
mod stripe;

pub mod signatures;

pub use config::{RazorpayConfig, StripeConfig};
pub use data_objects::{PaymentIntent, RazorpayOrder, RazorpayRefund, StripeEvent, StripeRefund};
pub use error::ProviderApiError;
pub use razorpay::RazorpayProvider;
pub use stripe::StripeProvider;
