use std::{env, io::Write};

use chrono::Duration;
use log::*;
use payment_providers::{RazorpayConfig, StripeConfig};
use rand::{thread_rng, RngCore};
use shop_common::{
    helpers::{parse_boolean_flag, parse_positive_int},
    Secret,
    DEFAULT_CURRENCY,
};
use tempfile::NamedTempFile;

use crate::errors::ServerError;

const DEFAULT_SHOP_HOST: &str = "127.0.0.1";
const DEFAULT_SHOP_PORT: u16 = 8380;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/shop_orders.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 25;
const DEFAULT_STALE_ORDER_MINUTES: i64 = 30;
const DEFAULT_SWEEP_INTERVAL_MINUTES: i64 = 10;
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::hours(24);
/// HS256 secrets shorter than this are rejected.
const MIN_JWT_SECRET_LENGTH: usize = 32;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub max_connections: u32,
    pub auth: AuthConfig,
    /// The currency new orders are created in.
    pub currency: String,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_forwarded: bool,
    /// Pending orders older than this are cancelled by the sweep.
    pub stale_order_timeout: Duration,
    /// How often the sweep runs.
    pub sweep_interval: Duration,
    pub razorpay: RazorpayConfig,
    pub stripe: StripeConfig,
    /// Notification jobs are POSTed here. If not set, jobs are only logged.
    pub notification_queue_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SHOP_HOST.to_string(),
            port: DEFAULT_SHOP_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            auth: AuthConfig::default(),
            currency: DEFAULT_CURRENCY.to_string(),
            use_x_forwarded_for: false,
            use_forwarded: false,
            stale_order_timeout: Duration::minutes(DEFAULT_STALE_ORDER_MINUTES),
            sweep_interval: Duration::minutes(DEFAULT_SWEEP_INTERVAL_MINUTES),
            razorpay: RazorpayConfig::default(),
            stripe: StripeConfig::default(),
            notification_queue_url: None,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("SHOP_HOST").ok().unwrap_or_else(|| DEFAULT_SHOP_HOST.into());
        let port = env::var("SHOP_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for SHOP_PORT. {e} Using the default, {DEFAULT_SHOP_PORT}, instead."
                    );
                    DEFAULT_SHOP_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_SHOP_PORT);
        let database_url = env::var("SHOP_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ SHOP_DATABASE_URL is not set. Using {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let max_connections = parse_positive_int(env::var("SHOP_DB_MAX_CONNECTIONS").ok())
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(DEFAULT_MAX_CONNECTIONS);
        let auth = AuthConfig::try_from_env().unwrap_or_else(|e| {
            warn!(
                "🪛️ Could not load the authentication configuration from environment variables. {e}. Reverting to the \
                 default configuration."
            );
            AuthConfig::default()
        });
        let currency = env::var("SHOP_CURRENCY").map(|s| s.trim().to_uppercase()).unwrap_or_else(|_| {
            info!("🪛️ SHOP_CURRENCY is not set. Orders will be created in {DEFAULT_CURRENCY}.");
            DEFAULT_CURRENCY.to_string()
        });
        let use_x_forwarded_for = parse_boolean_flag(env::var("SHOP_USE_X_FORWARDED_FOR").ok(), false);
        let use_forwarded = parse_boolean_flag(env::var("SHOP_USE_FORWARDED").ok(), false);
        let stale_order_timeout = minutes_from_env("SHOP_STALE_ORDER_MINUTES", DEFAULT_STALE_ORDER_MINUTES);
        let sweep_interval = minutes_from_env("SHOP_SWEEP_INTERVAL_MINUTES", DEFAULT_SWEEP_INTERVAL_MINUTES);
        let notification_queue_url = env::var("SHOP_NOTIFICATION_QUEUE_URL").ok().filter(|s| !s.trim().is_empty());
        if notification_queue_url.is_none() {
            info!("🪛️ SHOP_NOTIFICATION_QUEUE_URL is not set. Notifications will be logged, not sent.");
        }
        Self {
            host,
            port,
            database_url,
            max_connections,
            auth,
            currency,
            use_x_forwarded_for,
            use_forwarded,
            stale_order_timeout,
            sweep_interval,
            razorpay: RazorpayConfig::new_from_env_or_default(),
            stripe: StripeConfig::new_from_env_or_default(),
            notification_queue_url,
        }
    }
}

fn minutes_from_env(var: &str, default: i64) -> Duration {
    match env::var(var) {
        Ok(s) => match parse_positive_int(Some(s.clone())).and_then(|m| i64::try_from(m).ok()) {
            Some(m) => Duration::minutes(m),
            None => {
                warn!("🪛️ Invalid configuration value for {var}: {s}. Using the default of {default} minutes.");
                Duration::minutes(default)
            },
        },
        Err(_) => {
            info!("🪛️ {var} is not set. Using the default value of {default} minutes.");
            Duration::minutes(default)
        },
    }
}

//-------------------------------------------------  AuthConfig  -------------------------------------------------------
#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// The HS256 secret used to sign and verify access tokens.
    pub jwt_secret: Secret<String>,
    /// The lifetime of tokens issued by this server.
    pub token_lifetime: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        let mut tmpfile = NamedTempFile::new().ok().and_then(|f| f.keep().ok());
        warn!(
            "🚨️🚨️🚨️ The JWT secret has not been set. I'm using a random value for this session. DO NOT operate on \
             production like this, since every token will be invalidated when the server restarts. 🚨️🚨️🚨️"
        );
        let mut key = [0u8; 32];
        thread_rng().fill_bytes(&mut key);
        let secret = hex::encode(key);
        match &mut tmpfile {
            Some((f, p)) => match writeln!(f, "{secret}") {
                Ok(()) => warn!(
                    "🚨️🚨️🚨️ The JWT secret for this session was written to {}. If this is a production instance, you \
                     are doing it wrong! Set the SHOP_JWT_SECRET environment variable instead. 🚨️🚨️🚨️",
                    p.to_str().unwrap_or("???")
                ),
                Err(e) => warn!("🪛️ Could not write the JWT secret to the temporary file. {e}"),
            },
            None => {
                warn!("🪛️ Could not create a temporary file to store the JWT secret.");
            },
        }
        Self { jwt_secret: Secret::new(secret), token_lifetime: DEFAULT_TOKEN_LIFETIME }
    }
}

impl AuthConfig {
    pub fn new<S: Into<String>>(secret: S) -> Self {
        Self { jwt_secret: Secret::new(secret.into()), token_lifetime: DEFAULT_TOKEN_LIFETIME }
    }

    pub fn try_from_env() -> Result<Self, ServerError> {
        let secret =
            env::var("SHOP_JWT_SECRET").map_err(|e| ServerError::ConfigurationError(format!("{e} [SHOP_JWT_SECRET]")))?;
        if secret.len() < MIN_JWT_SECRET_LENGTH {
            return Err(ServerError::ConfigurationError(format!(
                "SHOP_JWT_SECRET must be at least {MIN_JWT_SECRET_LENGTH} characters long"
            )));
        }
        Ok(Self::new(secret))
    }
}

//-------------------------------------------------  ServerOptions  ----------------------------------------------------
/// A subset of the server configuration that is used to configure the server's behaviour. Generally we try to keep this
/// as small as possible, and exclude secrets to avoid passing sensitive information around the system.
#[derive(Clone, Copy, Debug, Default)]
pub struct ServerOptions {
    pub use_x_forwarded_for: bool,
    pub use_forwarded: bool,
}

impl ServerOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self { use_x_forwarded_for: config.use_x_forwarded_for, use_forwarded: config.use_forwarded }
    }
}
