//! Application configuration
//!
//! Values come from an optional `shop.toml` next to the binary, overridden by
//! environment variables (a `.env` file is loaded first when present). Every
//! key has a default except the credentials, which stay `None` until set.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use secrecy::SecretString;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Optional configuration file merged under the environment.
pub const CONFIG_FILE: &str = "shop.toml";

/// Environment variables the bot reads. Everything else in the environment is ignored.
const ENV_KEYS: &[&str] = &[
    "BOT_TOKEN",
    "BOT_API_URL",
    "DATABASE_PATH",
    "LOG_FILE_PATH",
    "LOG_LEVEL",
    "YOOKASSA_SHOP_ID",
    "YOOKASSA_SECRET_KEY",
    "YOOKASSA_API_URL",
    "PAYMENT_RETURN_URL",
    "PAYMENT_CURRENCY",
    "PAYMENT_POLL_ATTEMPTS",
    "PAYMENT_POLL_INTERVAL_SECS",
    "HTTP_TIMEOUT_SECS",
    "METRICS_ENABLED",
    "METRICS_PORT",
];

/// Payment polling configuration
pub mod payment {
    use super::Duration;

    /// Number of status checks before a payment session expires
    pub const MAX_POLL_ATTEMPTS: u32 = 60;

    /// Delay between two status checks (in seconds)
    /// 60 × 15s gives the customer 15 minutes to pay
    pub const POLL_INTERVAL_SECS: u64 = 15;

    /// Poll interval duration
    pub fn poll_interval() -> Duration {
        Duration::from_secs(POLL_INTERVAL_SECS)
    }
}

/// Network configuration
pub mod network {
    use super::Duration;

    /// Request timeout for gateway HTTP requests (in seconds)
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;

    /// Request timeout duration
    pub fn timeout() -> Duration {
        Duration::from_secs(REQUEST_TIMEOUT_SECS)
    }
}

/// Prometheus endpoint configuration
pub mod metrics {
    /// Port of the `/metrics` HTTP endpoint
    pub const DEFAULT_PORT: u16 = 9090;
}

/// YooKassa production API root
pub const DEFAULT_GATEWAY_URL: &str = "https://api.yookassa.ru/v3";

/// Where the payment page sends the customer back after paying
pub const DEFAULT_RETURN_URL: &str = "https://t.me/bot_username";

/// Environment values that look numeric (shop ids) arrive as numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Integer(i64),
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Scalar>::deserialize(deserializer)?.map(|value| match value {
        Scalar::Text(text) => text,
        Scalar::Integer(number) => number.to_string(),
    }))
}

fn default_database_path() -> String {
    "shop.sqlite".to_string()
}

fn default_log_file_path() -> String {
    "shop.log".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_gateway_url() -> String {
    DEFAULT_GATEWAY_URL.to_string()
}

fn default_return_url() -> String {
    DEFAULT_RETURN_URL.to_string()
}

fn default_currency() -> String {
    "RUB".to_string()
}

fn default_poll_attempts() -> u32 {
    payment::MAX_POLL_ATTEMPTS
}

fn default_poll_interval_secs() -> u64 {
    payment::POLL_INTERVAL_SECS
}

fn default_http_timeout_secs() -> u64 {
    network::REQUEST_TIMEOUT_SECS
}

fn default_metrics_port() -> u16 {
    metrics::DEFAULT_PORT
}

/// Flat application configuration, one field per environment variable.
#[derive(Clone, Deserialize)]
pub struct Config {
    #[serde(default, deserialize_with = "lenient_string")]
    bot_token: Option<String>,
    /// Custom Bot API server (local telegram-bot-api), if any
    #[serde(default)]
    pub bot_api_url: Option<String>,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_log_file_path")]
    pub log_file_path: String,
    /// `tracing_subscriber::EnvFilter` directive, e.g. `info` or `shopcore=debug`
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default, deserialize_with = "lenient_string")]
    yookassa_shop_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    yookassa_secret_key: Option<String>,
    #[serde(default = "default_gateway_url")]
    pub yookassa_api_url: String,
    #[serde(default = "default_return_url")]
    pub payment_return_url: String,
    #[serde(default = "default_currency")]
    pub payment_currency: String,
    #[serde(default = "default_poll_attempts")]
    pub payment_poll_attempts: u32,
    #[serde(default = "default_poll_interval_secs")]
    pub payment_poll_interval_secs: u64,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Serve Prometheus metrics over HTTP
    #[serde(default)]
    pub metrics_enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot_token: None,
            bot_api_url: None,
            database_path: default_database_path(),
            log_file_path: default_log_file_path(),
            log_level: default_log_level(),
            yookassa_shop_id: None,
            yookassa_secret_key: None,
            yookassa_api_url: default_gateway_url(),
            payment_return_url: default_return_url(),
            payment_currency: default_currency(),
            payment_poll_attempts: default_poll_attempts(),
            payment_poll_interval_secs: default_poll_interval_secs(),
            http_timeout_secs: default_http_timeout_secs(),
            metrics_enabled: false,
            metrics_port: default_metrics_port(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bot_token", &self.bot_token.as_ref().map(|_| "[REDACTED]"))
            .field("bot_api_url", &self.bot_api_url)
            .field("database_path", &self.database_path)
            .field("log_file_path", &self.log_file_path)
            .field("log_level", &self.log_level)
            .field("yookassa_shop_id", &self.yookassa_shop_id)
            .field("yookassa_secret_key", &self.yookassa_secret_key.as_ref().map(|_| "[REDACTED]"))
            .field("yookassa_api_url", &self.yookassa_api_url)
            .field("payment_return_url", &self.payment_return_url)
            .field("payment_currency", &self.payment_currency)
            .field("payment_poll_attempts", &self.payment_poll_attempts)
            .field("payment_poll_interval_secs", &self.payment_poll_interval_secs)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("metrics_enabled", &self.metrics_enabled)
            .field("metrics_port", &self.metrics_port)
            .finish()
    }
}

impl Config {
    /// Loads `.env`, then merges `shop.toml` and the environment.
    pub fn load() -> Result<Self, figment::Error> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!("Failed to read .env file: {}", e);
            }
        }
        Self::figment().extract()
    }

    /// The provider chain behind [`Config::load`], without touching `.env`.
    pub fn figment() -> Figment {
        Figment::new()
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::raw().only(ENV_KEYS))
    }

    /// Telegram bot token, if configured.
    pub fn bot_token(&self) -> Option<SecretString> {
        self.bot_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(|t| SecretString::from(t.to_string()))
    }

    /// Settings for the payment gateway client.
    pub fn gateway(&self) -> GatewayConfig {
        GatewayConfig {
            shop_id: self.yookassa_shop_id.clone().filter(|s| !s.is_empty()),
            secret_key: self
                .yookassa_secret_key
                .as_deref()
                .filter(|s| !s.is_empty())
                .map(|s| SecretString::from(s.to_string())),
            api_url: self.yookassa_api_url.trim_end_matches('/').to_string(),
            return_url: self.payment_return_url.clone(),
            currency: self.payment_currency.clone(),
            timeout: Duration::from_secs(self.http_timeout_secs),
        }
    }

    /// Settings for payment polling sessions.
    pub fn polling(&self) -> PollingConfig {
        PollingConfig {
            max_attempts: self.payment_poll_attempts,
            interval: Duration::from_secs(self.payment_poll_interval_secs),
        }
    }
}

/// Payment gateway connection settings.
///
/// Without credentials the bot still starts and serves the cart; every payment
/// attempt then fails with a configuration error before reaching the network.
pub struct GatewayConfig {
    pub shop_id: Option<String>,
    pub secret_key: Option<SecretString>,
    /// API root without trailing slash, e.g. `https://api.yookassa.ru/v3`
    pub api_url: String,
    pub return_url: String,
    pub currency: String,
    pub timeout: Duration,
}

impl GatewayConfig {
    /// Gateway settings pointing at `api_url`, without credentials.
    pub fn new(api_url: impl Into<String>) -> Self {
        let api_url: String = api_url.into();
        Self {
            shop_id: None,
            secret_key: None,
            api_url: api_url.trim_end_matches('/').to_string(),
            return_url: default_return_url(),
            currency: default_currency(),
            timeout: network::timeout(),
        }
    }

    /// Sets the shop identifier and secret key used for Basic auth.
    #[must_use]
    pub fn with_credentials(mut self, shop_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        self.shop_id = Some(shop_id.into());
        self.secret_key = Some(SecretString::from(secret_key.into()));
        self
    }

    /// Sets the URL the payment page returns to.
    #[must_use]
    pub fn with_return_url(mut self, return_url: impl Into<String>) -> Self {
        self.return_url = return_url.into();
        self
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("shop_id", &self.shop_id)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_url", &self.api_url)
            .field("return_url", &self.return_url)
            .field("currency", &self.currency)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Bounds of a payment polling session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingConfig {
    /// Status checks before the session expires
    pub max_attempts: u32,
    /// Delay after every status check
    pub interval: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            max_attempts: payment::MAX_POLL_ATTEMPTS,
            interval: payment::poll_interval(),
        }
    }
}
