use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub payment: PaymentConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Directory holding the static pages (login, register, admin, user, ...)
    /// and their assets, served at the site root and under `/static`
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    /// Upper bound for a single HTTP request, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// How long in-flight requests may drain after a shutdown signal
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            static_dir: default_static_dir(),
            request_timeout_secs: default_request_timeout(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("./static")
}

fn default_request_timeout() -> u64 {
    15
}

fn default_shutdown_grace() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret used to sign session tokens. Unset means a random
    /// per-process secret: sessions do not survive a restart.
    #[serde(default)]
    pub jwt_secret: Option<String>,
    /// Lifetime of every issued session token
    #[serde(default = "default_token_ttl")]
    pub token_ttl_seconds: u64,
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[serde(default = "default_audience")]
    pub audience: String,
    /// Mark the session cookie `Secure` (requires HTTPS in front of the server)
    #[serde(default)]
    pub secure_cookie: bool,
}

impl AuthConfig {
    pub fn has_secret(&self) -> bool {
        self.jwt_secret.as_deref().is_some_and(|s| !s.is_empty())
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_ttl_seconds: default_token_ttl(),
            issuer: default_issuer(),
            audience: default_audience(),
            secure_cookie: false,
        }
    }
}

fn default_token_ttl() -> u64 {
    3600
}

fn default_issuer() -> String {
    "storefront".to_string()
}

fn default_audience() -> String {
    "storefront".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Bucket capacity
    #[serde(default = "default_burst")]
    pub burst: u32,
    /// Tokens added back per second
    #[serde(default = "default_refill")]
    pub refill_per_second: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            burst: default_burst(),
            refill_per_second: default_refill(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_burst() -> u32 {
    5
}

fn default_refill() -> f64 {
    2.0
}

/// What happens when a message is sent to a chat that was already closed
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClosedChatPolicy {
    /// Answer the sender with an error, store nothing
    #[default]
    Reject,
    /// Store and publish the message; the chat stays inactive
    Accept,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ChatConfig {
    #[serde(default)]
    pub closed_chat_policy: ClosedChatPolicy,
}

/// SMTP settings for verification and relay emails
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    #[serde(default = "default_true")]
    pub smtp_tls: bool,
    pub from_address: Option<String>,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

impl EmailConfig {
    pub fn is_configured(&self) -> bool {
        self.smtp_host.is_some() && self.from_address.is_some()
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            smtp_tls: true,
            from_address: None,
            from_name: default_from_name(),
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_name() -> String {
    "Storefront".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    /// Full URL of the payment endpoint
    #[serde(default = "default_payment_url")]
    pub url: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_payment_timeout")]
    pub timeout_secs: u64,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            url: default_payment_url(),
            currency: default_currency(),
            timeout_secs: default_payment_timeout(),
        }
    }
}

fn default_payment_url() -> String {
    "http://localhost:8082/pay".to_string()
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_payment_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_toml(&content)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).with_context(|| "Failed to parse configuration file")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would silently disable or break a component
    pub fn validate(&self) -> Result<()> {
        let limit = &self.rate_limit;
        if !limit.refill_per_second.is_finite() || limit.refill_per_second < 0.0 {
            bail!(
                "rate_limit.refill_per_second must be a finite number >= 0, got {}",
                limit.refill_per_second
            );
        }
        if limit.enabled && limit.burst == 0 {
            bail!("rate_limit.burst must be at least 1 while rate limiting is enabled");
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            rate_limit: RateLimitConfig::default(),
            chat: ChatConfig::default(),
            email: EmailConfig::default(),
            payment: PaymentConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
