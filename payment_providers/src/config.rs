use std::time::Duration;

use log::*;
use shop_common::{helpers::parse_positive_int, Secret};

const DEFAULT_TIMEOUT_SECS: u64 = 15;
/// Stripe's own default tolerance for webhook timestamps.
const DEFAULT_STRIPE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone, Default)]
pub struct RazorpayConfig {
    pub api_url: String,
    pub key_id: String,
    pub key_secret: Secret<String>,
    pub webhook_secret: Secret<String>,
    pub timeout: Duration,
}

impl RazorpayConfig {
    pub fn new_from_env_or_default() -> Self {
        let api_url = std::env::var("SHOP_RAZORPAY_API_URL").unwrap_or_else(|_| "https://api.razorpay.com".to_string());
        let key_id = std::env::var("SHOP_RAZORPAY_KEY_ID").unwrap_or_else(|_| {
            warn!("🪛️ SHOP_RAZORPAY_KEY_ID not set. Razorpay checkouts will fail.");
            String::default()
        });
        let key_secret = Secret::new(std::env::var("SHOP_RAZORPAY_KEY_SECRET").unwrap_or_else(|_| {
            warn!("🪛️ SHOP_RAZORPAY_KEY_SECRET not set. Razorpay payments cannot be verified.");
            String::default()
        }));
        let webhook_secret = Secret::new(std::env::var("SHOP_RAZORPAY_WEBHOOK_SECRET").unwrap_or_else(|_| {
            warn!("🪛️ SHOP_RAZORPAY_WEBHOOK_SECRET not set. All Razorpay webhooks will be rejected.");
            String::default()
        }));
        Self { api_url, key_id, key_secret, webhook_secret, timeout: provider_timeout() }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StripeConfig {
    pub api_url: String,
    pub secret_key: Secret<String>,
    pub webhook_secret: Secret<String>,
    pub timeout: Duration,
    /// Maximum age, in seconds, of a webhook's signed timestamp.
    pub webhook_tolerance: i64,
}

impl StripeConfig {
    pub fn new_from_env_or_default() -> Self {
        let api_url = std::env::var("SHOP_STRIPE_API_URL").unwrap_or_else(|_| "https://api.stripe.com".to_string());
        let secret_key = Secret::new(std::env::var("SHOP_STRIPE_SECRET_KEY").unwrap_or_else(|_| {
            warn!("🪛️ SHOP_STRIPE_SECRET_KEY not set. Stripe checkouts will fail.");
            String::default()
        }));
        let webhook_secret = Secret::new(std::env::var("SHOP_STRIPE_WEBHOOK_SECRET").unwrap_or_else(|_| {
            warn!("🪛️ SHOP_STRIPE_WEBHOOK_SECRET not set. All Stripe webhooks will be rejected.");
            String::default()
        }));
        Self {
            api_url,
            secret_key,
            webhook_secret,
            timeout: provider_timeout(),
            webhook_tolerance: DEFAULT_STRIPE_TOLERANCE_SECS,
        }
    }
}

fn provider_timeout() -> Duration {
    let secs = parse_positive_int(std::env::var("SHOP_PROVIDER_TIMEOUT_SECS").ok()).unwrap_or_else(|| {
        debug!("🪛️ SHOP_PROVIDER_TIMEOUT_SECS not set or invalid. Using {DEFAULT_TIMEOUT_SECS}s.");
        DEFAULT_TIMEOUT_SECS
    });
    Duration::from_secs(secs)
}
