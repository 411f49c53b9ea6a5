//! Server configuration.
//!
//! Everything is read from `SETTLE_*` environment variables by [`ServerConfig::from_env_or_default`]. Malformed values
//! are logged and replaced with their defaults. Missing values that the server cannot run without (the database URL
//! and the gateway secret key) are reported by [`ServerConfig::validate`], which `run_server` calls before binding.
use std::{env, fmt::Display, str::FromStr, time::Duration as StdDuration};

use chrono::Duration;
use log::*;
use settlement_common::{helpers::parse_boolean_flag, Kobo, Secret};
use settlement_engine::{
    settlement_api::{
        checkout_api::{DEFAULT_PAYMENT_GRACE_MINS, DEFAULT_PLATFORM_FEE_BPS},
        fund_release_api::DEFAULT_RELEASE_BATCH_SIZE,
        wallet_api::{
            DEFAULT_MAX_WITHDRAWAL,
            DEFAULT_MIN_WITHDRAWAL,
            DEFAULT_WITHDRAWAL_FEE_BPS,
            DEFAULT_WITHDRAWAL_FEE_FIXED,
        },
    },
    CheckoutPolicy,
    ReleasePolicy,
    WithdrawalPolicy,
};

use crate::errors::ServerError;

const DEFAULT_SETTLE_HOST: &str = "127.0.0.1";
const DEFAULT_SETTLE_PORT: u16 = 8360;
const DEFAULT_GATEWAY_BASE_URL: &str = "https://api.flutterwave.com/v3";
const DEFAULT_RELEASE_INTERVAL_SECS: u64 = 86_400;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Bring the database schema up to date before serving requests.
    pub run_migrations: bool,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address.
    pub use_forwarded: bool,
    /// Requests carrying this key in `X-Admin-Key` act as an administrator with every permission. When empty, all
    /// admin routes are refused.
    pub admin_api_key: Secret<String>,
    pub gateway: GatewayConfig,
    pub catalog_base_url: String,
    /// Time between runs of the release scheduler and abandoned payment expiry.
    pub release_interval: StdDuration,
    pub release_policy: ReleasePolicy,
    pub checkout_policy: CheckoutPolicy,
    pub withdrawal_policy: WithdrawalPolicy,
}

#[derive(Clone, Debug, Default)]
pub struct GatewayConfig {
    /// e.g. "https://api.flutterwave.com/v3"
    pub base_url: String,
    pub secret_key: Secret<String>,
    /// The shared value the gateway sends in the `verif-hash` header of webhook calls
    pub webhook_hash: Secret<String>,
    /// Where the gateway sends the buyer once they have paid
    pub redirect_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SETTLE_HOST.to_string(),
            port: DEFAULT_SETTLE_PORT,
            database_url: String::default(),
            run_migrations: true,
            use_x_forwarded_for: false,
            use_forwarded: false,
            admin_api_key: Secret::default(),
            gateway: GatewayConfig { base_url: DEFAULT_GATEWAY_BASE_URL.to_string(), ..Default::default() },
            catalog_base_url: String::default(),
            release_interval: StdDuration::from_secs(DEFAULT_RELEASE_INTERVAL_SECS),
            release_policy: ReleasePolicy::default(),
            checkout_policy: CheckoutPolicy::default(),
            withdrawal_policy: WithdrawalPolicy::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("SETTLE_HOST").ok().unwrap_or_else(|| DEFAULT_SETTLE_HOST.into());
        let port = env_or_default("SETTLE_PORT", DEFAULT_SETTLE_PORT);
        let database_url = env::var("SETTLE_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ SETTLE_DATABASE_URL is not set. Please set it to the URL for the settlement database.");
            String::default()
        });
        let run_migrations = parse_boolean_flag(env::var("SETTLE_RUN_MIGRATIONS").ok(), true);
        let use_x_forwarded_for = parse_boolean_flag(env::var("SETTLE_USE_X_FORWARDED_FOR").ok(), false);
        let use_forwarded = parse_boolean_flag(env::var("SETTLE_USE_FORWARDED").ok(), false);
        let admin_api_key = Secret::new(env::var("SETTLE_ADMIN_API_KEY").ok().unwrap_or_else(|| {
            warn!("🪛️ SETTLE_ADMIN_API_KEY is not set. Every admin route will be refused.");
            String::default()
        }));
        let gateway = GatewayConfig::from_env_or_defaults();
        let catalog_base_url = env::var("SETTLE_CATALOG_BASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ SETTLE_CATALOG_BASE_URL is not set. Checkouts will fail until it is.");
            String::default()
        });
        let release_interval =
            StdDuration::from_secs(env_or_default("SETTLE_RELEASE_INTERVAL_SECS", DEFAULT_RELEASE_INTERVAL_SECS));
        let release_policy = ReleasePolicy {
            batch_size: env_or_default("SETTLE_RELEASE_BATCH_SIZE", DEFAULT_RELEASE_BATCH_SIZE),
            ..ReleasePolicy::default()
        };
        let checkout_policy = CheckoutPolicy {
            platform_fee_bps: env_or_default("SETTLE_PLATFORM_FEE_BPS", DEFAULT_PLATFORM_FEE_BPS),
            payment_grace: Duration::minutes(env_or_default("SETTLE_PAYMENT_GRACE_MINS", DEFAULT_PAYMENT_GRACE_MINS)),
        };
        let withdrawal_policy = WithdrawalPolicy {
            min_amount: Kobo::from(env_or_default("SETTLE_MIN_WITHDRAWAL", DEFAULT_MIN_WITHDRAWAL)),
            max_amount: Kobo::from(env_or_default("SETTLE_MAX_WITHDRAWAL", DEFAULT_MAX_WITHDRAWAL)),
            fee_bps: env_or_default("SETTLE_WITHDRAWAL_FEE_BPS", DEFAULT_WITHDRAWAL_FEE_BPS),
            fixed_fee: Kobo::from(env_or_default("SETTLE_WITHDRAWAL_FEE_FIXED", DEFAULT_WITHDRAWAL_FEE_FIXED)),
        };
        Self {
            host,
            port,
            database_url,
            run_migrations,
            use_x_forwarded_for,
            use_forwarded,
            admin_api_key,
            gateway,
            catalog_base_url,
            release_interval,
            release_policy,
            checkout_policy,
            withdrawal_policy,
        }
    }

    /// Refuses configurations that would let the server run but corrupt or lose financial state.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.database_url.trim().is_empty() {
            return Err(ServerError::ConfigurationError("SETTLE_DATABASE_URL must be set".into()));
        }
        if self.gateway.secret_key.is_empty() {
            return Err(ServerError::ConfigurationError("SETTLE_GATEWAY_SECRET_KEY must be set".into()));
        }
        if self.gateway.base_url.trim().is_empty() {
            return Err(ServerError::ConfigurationError("SETTLE_GATEWAY_BASE_URL must not be empty".into()));
        }
        if self.release_interval.is_zero() {
            return Err(ServerError::ConfigurationError("SETTLE_RELEASE_INTERVAL_SECS must be positive".into()));
        }
        let w = &self.withdrawal_policy;
        if !w.min_amount.is_positive() || w.min_amount > w.max_amount {
            return Err(ServerError::ConfigurationError(format!(
                "The withdrawal bounds are inconsistent. Minimum: {}, maximum: {}",
                w.min_amount, w.max_amount
            )));
        }
        if !(0..10_000).contains(&self.checkout_policy.platform_fee_bps) {
            return Err(ServerError::ConfigurationError("SETTLE_PLATFORM_FEE_BPS must be between 0 and 9999".into()));
        }
        Ok(())
    }
}

impl GatewayConfig {
    pub fn from_env_or_defaults() -> Self {
        let base_url = env::var("SETTLE_GATEWAY_BASE_URL").ok().unwrap_or_else(|| {
            info!("🪛️ SETTLE_GATEWAY_BASE_URL is not set. Using {DEFAULT_GATEWAY_BASE_URL}");
            DEFAULT_GATEWAY_BASE_URL.to_string()
        });
        let secret_key = env::var("SETTLE_GATEWAY_SECRET_KEY").ok().unwrap_or_else(|| {
            error!("🪛️ SETTLE_GATEWAY_SECRET_KEY is not set. Payments cannot be verified without it.");
            String::default()
        });
        let webhook_hash = env::var("SETTLE_GATEWAY_WEBHOOK_HASH").ok().unwrap_or_else(|| {
            warn!("🚨️ SETTLE_GATEWAY_WEBHOOK_HASH is not set. Every gateway webhook call will be refused.");
            String::default()
        });
        let redirect_url = env::var("SETTLE_GATEWAY_REDIRECT_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ SETTLE_GATEWAY_REDIRECT_URL is not set. Buyers will not be sent back after paying.");
            String::default()
        });
        Self { base_url, secret_key: Secret::new(secret_key), webhook_hash: Secret::new(webhook_hash), redirect_url }
    }
}

fn env_or_default<T>(name: &str, default: T) -> T
where
    T: FromStr + Display + Copy,
    T::Err: Display,
{
    match env::var(name) {
        Ok(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            warn!("🪛️ Invalid configuration value for {name} ({s}). {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => {
            debug!("🪛️ {name} is not set. Using the default value of {default}.");
            default
        },
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
