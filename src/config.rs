use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::info;
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_SESSION_COOKIE: &str = "session";
const DEFAULT_CART_COOKIE: &str = "cart";
const DEFAULT_SESSION_MAX_AGE_DAYS: i64 = 7;
const DEFAULT_TAX_RATE: f64 = 0.08;
const DEFAULT_FLAT_SHIPPING: f64 = 10.0;
const DEFAULT_FREE_SHIPPING_THRESHOLD: f64 = 50.0;
const DEV_DEFAULT_SESSION_SECRET: &str =
    "this_is_a_development_session_secret_that_is_at_least_64_characters_long";

/// Application configuration with validation.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Secret used to sign session cookies (minimum 64 characters)
    #[validate(length(min = 64))]
    pub session_secret: String,

    /// Name of the session cookie
    #[serde(default = "default_session_cookie")]
    pub session_cookie_name: String,

    /// Name of the cart snapshot cookie
    #[serde(default = "default_cart_cookie")]
    pub cart_cookie_name: String,

    /// Session lifetime in days (refreshed on activity)
    #[serde(default = "default_session_max_age_days")]
    pub session_max_age_days: i64,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port (1024-65535)
    #[serde(default = "default_port")]
    #[validate(range(min = 1024))]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// Default sales tax rate applied at checkout (fraction, 0.0 - 1.0)
    #[serde(default = "default_tax_rate")]
    #[validate(custom = "validate_tax_rate")]
    pub default_tax_rate: f64,

    /// Flat shipping rate for delivery orders under the free threshold
    #[serde(default = "default_flat_shipping")]
    pub flat_shipping_rate: f64,

    /// Order subtotal above which shipping is free
    #[serde(default = "default_free_shipping_threshold")]
    pub free_shipping_threshold: f64,

    /// Directory where uploaded product images are stored
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,

    /// Comma-separated list of allowed CORS origins (permissive when unset
    /// in development)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,
}

fn default_session_cookie() -> String {
    DEFAULT_SESSION_COOKIE.to_string()
}
fn default_cart_cookie() -> String {
    DEFAULT_CART_COOKIE.to_string()
}
fn default_session_max_age_days() -> i64 {
    DEFAULT_SESSION_MAX_AGE_DAYS
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_tax_rate() -> f64 {
    DEFAULT_TAX_RATE
}
fn default_flat_shipping() -> f64 {
    DEFAULT_FLAT_SHIPPING
}
fn default_free_shipping_threshold() -> f64 {
    DEFAULT_FREE_SHIPPING_THRESHOLD
}
fn default_upload_dir() -> String {
    "uploads".to_string()
}

fn validate_tax_rate(rate: f64) -> Result<(), ValidationError> {
    if !rate.is_finite() || !(0.0..=1.0).contains(&rate) {
        let mut err = ValidationError::new("default_tax_rate");
        err.message = Some("default_tax_rate must be a finite value between 0.0 and 1.0".into());
        return Err(err);
    }
    Ok(())
}

impl AppConfig {
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn session_max_age_secs(&self) -> i64 {
        self.session_max_age_days * 24 * 60 * 60
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("missing session secret: set APP__SESSION_SECRET (64+ characters)")]
    MissingSessionSecret,
}

/// Loads configuration from `config/default.toml`, an optional
/// `config/{environment}.toml` overlay, and `APP__`-prefixed environment
/// variables (highest precedence).
pub fn load_config() -> Result<AppConfig, ConfigLoadError> {
    let environment = env::var("APP_ENVIRONMENT").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let mut builder = Config::builder()
        .set_default("environment", environment.clone())?
        .set_default("database_url", "sqlite::memory:")?;

    let default_path = Path::new(CONFIG_DIR).join("default.toml");
    if default_path.exists() {
        builder = builder.add_source(File::from(default_path));
    }

    let env_path = Path::new(CONFIG_DIR).join(format!("{environment}.toml"));
    if env_path.exists() {
        builder = builder.add_source(File::from(env_path));
    }

    builder = builder.add_source(Environment::with_prefix("APP").separator("__"));

    // Development convenience only; production must provide its own secret.
    if environment.eq_ignore_ascii_case(DEFAULT_ENV) && env::var("APP__SESSION_SECRET").is_err() {
        builder = builder.set_default("session_secret", DEV_DEFAULT_SESSION_SECRET)?;
    }

    let config: AppConfig = builder.build()?.try_deserialize()?;

    if config.session_secret.is_empty() {
        return Err(ConfigLoadError::MissingSessionSecret);
    }
    config.validate()?;

    info!(
        environment = %config.environment,
        port = config.port,
        "Configuration loaded"
    );
    Ok(config)
}

/// Initializes the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured log level; `log_json`
/// switches to structured JSON output.
pub fn init_tracing(log_level: &str, log_json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("storefront_api={log_level},tower_http=info")));

    if log_json {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt().with_env_filter(filter).init();
    }
}
