//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `AURUM_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `AURUM_BASE_URL` - Public URL of the API, used for gateway return URLs
//! - `AURUM_SESSION_SECRET` - Session signing secret (min 32 chars, high entropy)
//!
//! ## Optional
//! - `AURUM_HOST` - Bind address (default: 127.0.0.1)
//! - `AURUM_PORT` - Listen port (default: 3000)
//! - `AURUM_UPLOAD_DIR` - Local image directory (default: `uploads`)
//! - `AURUM_OTP_TTL_SECONDS` - OTP lifetime (default: 300)
//! - `AURUM_FREE_SHIPPING_THRESHOLD` - Free shipping from this subtotal (default: 999.00)
//! - `AURUM_SHIPPING_CHARGE` - Flat shipping below the threshold (default: 79.00)
//! - `AURUM_COD_CHARGE` - Cash-on-delivery surcharge (default: 0.00)
//! - `AURUM_ADMIN_EMAIL` - Where contact-form notifications go
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`, `SENTRY_TRACES_SAMPLE_RATE`
//!
//! ## Integrations
//!
//! Each integration is enabled only when all of its required variables are
//! set. A partially configured integration stays disabled.
//!
//! - Razorpay: `RAZORPAY_KEY_ID`, `RAZORPAY_KEY_SECRET`, `RAZORPAY_WEBHOOK_SECRET` (optional)
//! - PayPal: `PAYPAL_CLIENT_ID`, `PAYPAL_CLIENT_SECRET`, `PAYPAL_MODE`, `PAYPAL_CURRENCY`, `PAYPAL_INR_RATE`
//! - Stripe: `STRIPE_SECRET_KEY`, `STRIPE_WEBHOOK_SECRET`
//! - Shiprocket: `SHIPROCKET_EMAIL`, `SHIPROCKET_PASSWORD`, `SHIPROCKET_PICKUP_LOCATION`
//! - SMTP: `SMTP_HOST`, `SMTP_PORT`, `SMTP_USERNAME`, `SMTP_PASSWORD`, `SMTP_FROM`
//! - Cloudinary: `CLOUDINARY_CLOUD_NAME`, `CLOUDINARY_API_KEY`, `CLOUDINARY_API_SECRET`

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

use aurum_core::{Email, Money};

const MIN_SESSION_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL, without a trailing slash
    pub base_url: String,
    /// Session signing secret
    pub session_secret: SecretString,
    /// Directory for locally stored images
    pub upload_dir: PathBuf,
    /// How long an emailed OTP stays valid
    pub otp_ttl: Duration,
    /// Shipping and surcharge settings
    pub pricing: PricingConfig,
    /// Recipient of contact-form notifications
    pub admin_email: Option<Email>,
    pub razorpay: Option<RazorpayConfig>,
    pub paypal: Option<PaypalConfig>,
    pub stripe: Option<StripeConfig>,
    pub shiprocket: Option<ShiprocketConfig>,
    pub email: Option<EmailConfig>,
    pub cloudinary: Option<CloudinaryConfig>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    pub sentry_environment: Option<String>,
    pub sentry_sample_rate: f32,
    pub sentry_traces_sample_rate: f32,
}

/// Shipping thresholds and surcharges applied by the pricing engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingConfig {
    pub free_shipping_threshold: Money,
    pub shipping_charge: Money,
    pub cod_charge: Money,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            free_shipping_threshold: Money::from_rupees(999),
            shipping_charge: Money::from_rupees(79),
            cod_charge: Money::ZERO,
        }
    }
}

/// Razorpay API credentials.
#[derive(Clone)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: SecretString,
    pub webhook_secret: Option<SecretString>,
}

impl std::fmt::Debug for RazorpayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RazorpayConfig")
            .field("key_id", &self.key_id)
            .field("key_secret", &"[REDACTED]")
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// PayPal environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaypalMode {
    Sandbox,
    Live,
}

impl PaypalMode {
    /// REST API base URL for this environment.
    #[must_use]
    pub const fn api_base(self) -> &'static str {
        match self {
            Self::Sandbox => "https://api-m.sandbox.paypal.com",
            Self::Live => "https://api-m.paypal.com",
        }
    }
}

impl FromStr for PaypalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sandbox" => Ok(Self::Sandbox),
            "live" => Ok(Self::Live),
            other => Err(format!("expected sandbox or live, got {other}")),
        }
    }
}

/// PayPal REST credentials and currency conversion.
///
/// PayPal does not settle INR for most merchants, so totals are converted
/// at `inr_rate` rupees per unit of `currency`.
#[derive(Clone)]
pub struct PaypalConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub mode: PaypalMode,
    pub currency: String,
    pub inr_rate: Decimal,
}

impl std::fmt::Debug for PaypalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaypalConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("mode", &self.mode)
            .field("currency", &self.currency)
            .field("inr_rate", &self.inr_rate)
            .finish()
    }
}

/// Stripe API credentials.
#[derive(Clone)]
pub struct StripeConfig {
    pub secret_key: SecretString,
    pub webhook_secret: SecretString,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"[REDACTED]")
            .field("webhook_secret", &"[REDACTED]")
            .finish()
    }
}

/// Shiprocket account used for shipment creation.
#[derive(Clone)]
pub struct ShiprocketConfig {
    pub email: String,
    pub password: SecretString,
    pub pickup_location: String,
}

impl std::fmt::Debug for ShiprocketConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShiprocketConfig")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("pickup_location", &self.pickup_location)
            .finish()
    }
}

/// SMTP relay settings.
#[derive(Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: SecretString,
    pub from_address: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish()
    }
}

/// Cloudinary signed-upload credentials.
#[derive(Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: SecretString,
}

impl std::fmt::Debug for CloudinaryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudinaryConfig")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("AURUM_DATABASE_URL")?;
        let host = parse_env_or_default::<IpAddr>("AURUM_HOST", "127.0.0.1")?;
        let port = parse_env_or_default::<u16>("AURUM_PORT", "3000")?;
        let base_url = normalize_base_url(&get_required_env("AURUM_BASE_URL")?)?;
        let session_secret = get_validated_secret("AURUM_SESSION_SECRET")?;
        validate_session_secret(&session_secret, "AURUM_SESSION_SECRET")?;

        let upload_dir = PathBuf::from(get_env_or_default("AURUM_UPLOAD_DIR", "uploads"));
        let otp_ttl = Duration::from_secs(parse_env_or_default::<u64>(
            "AURUM_OTP_TTL_SECONDS",
            "300",
        )?);
        let admin_email = get_optional_env("AURUM_ADMIN_EMAIL")
            .map(|value| {
                Email::parse(&value).map_err(|e| {
                    ConfigError::InvalidEnvVar("AURUM_ADMIN_EMAIL".to_string(), e.to_string())
                })
            })
            .transpose()?;

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            session_secret,
            upload_dir,
            otp_ttl,
            pricing: PricingConfig::from_env()?,
            admin_email,
            razorpay: RazorpayConfig::from_env(),
            paypal: PaypalConfig::from_env()?,
            stripe: StripeConfig::from_env(),
            shiprocket: ShiprocketConfig::from_env(),
            email: EmailConfig::from_env()?,
            cloudinary: CloudinaryConfig::from_env(),
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: parse_env_or_default::<f32>("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: parse_env_or_default::<f32>(
                "SENTRY_TRACES_SAMPLE_RATE",
                "0.1",
            )?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies should carry the `Secure` flag.
    #[must_use]
    pub fn is_https(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

impl PricingConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            free_shipping_threshold: parse_env_or_default::<Money>(
                "AURUM_FREE_SHIPPING_THRESHOLD",
                "999.00",
            )?,
            shipping_charge: parse_env_or_default::<Money>("AURUM_SHIPPING_CHARGE", "79.00")?,
            cod_charge: parse_env_or_default::<Money>("AURUM_COD_CHARGE", "0.00")?,
        })
    }
}

impl RazorpayConfig {
    fn from_env() -> Option<Self> {
        Some(Self {
            key_id: get_optional_env("RAZORPAY_KEY_ID")?,
            key_secret: SecretString::from(get_optional_env("RAZORPAY_KEY_SECRET")?),
            webhook_secret: get_optional_env("RAZORPAY_WEBHOOK_SECRET").map(SecretString::from),
        })
    }
}

impl PaypalConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let (Some(client_id), Some(client_secret)) = (
            get_optional_env("PAYPAL_CLIENT_ID"),
            get_optional_env("PAYPAL_CLIENT_SECRET"),
        ) else {
            return Ok(None);
        };

        let inr_rate = parse_env_or_default::<Decimal>("PAYPAL_INR_RATE", "83.00")?;
        if inr_rate <= Decimal::ZERO {
            return Err(ConfigError::InvalidEnvVar(
                "PAYPAL_INR_RATE".to_string(),
                "must be positive".to_string(),
            ));
        }

        Ok(Some(Self {
            client_id,
            client_secret: SecretString::from(client_secret),
            mode: parse_env_or_default::<PaypalMode>("PAYPAL_MODE", "sandbox")?,
            currency: get_env_or_default("PAYPAL_CURRENCY", "USD").to_ascii_uppercase(),
            inr_rate,
        }))
    }
}

impl StripeConfig {
    fn from_env() -> Option<Self> {
        Some(Self {
            secret_key: SecretString::from(get_optional_env("STRIPE_SECRET_KEY")?),
            webhook_secret: SecretString::from(get_optional_env("STRIPE_WEBHOOK_SECRET")?),
        })
    }
}

impl ShiprocketConfig {
    fn from_env() -> Option<Self> {
        Some(Self {
            email: get_optional_env("SHIPROCKET_EMAIL")?,
            password: SecretString::from(get_optional_env("SHIPROCKET_PASSWORD")?),
            pickup_location: get_env_or_default("SHIPROCKET_PICKUP_LOCATION", "Primary"),
        })
    }
}

impl EmailConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let (Some(smtp_host), Some(smtp_username), Some(smtp_password), Some(from_address)) = (
            get_optional_env("SMTP_HOST"),
            get_optional_env("SMTP_USERNAME"),
            get_optional_env("SMTP_PASSWORD"),
            get_optional_env("SMTP_FROM"),
        ) else {
            return Ok(None);
        };

        Ok(Some(Self {
            smtp_host,
            smtp_port: parse_env_or_default::<u16>("SMTP_PORT", "587")?,
            smtp_username,
            smtp_password: SecretString::from(smtp_password),
            from_address,
        }))
    }
}

impl CloudinaryConfig {
    fn from_env() -> Option<Self> {
        Some(Self {
            cloud_name: get_optional_env("CLOUDINARY_CLOUD_NAME")?,
            api_key: get_optional_env("CLOUDINARY_API_KEY")?,
            api_secret: SecretString::from(get_optional_env("CLOUDINARY_API_SECRET")?),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable. Empty values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse an environment variable, falling back to `default` when unset.
fn parse_env_or_default<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Validate the base URL and strip any trailing slash.
fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ConfigError::InvalidEnvVar("AURUM_BASE_URL".to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            "AURUM_BASE_URL".to_string(),
            "must be an http(s) URL".to_string(),
        ));
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

/// Validate that a session secret meets minimum length requirements.
fn validate_session_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SESSION_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SESSION_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let err = validate_secret_strength("your-session-key-here", "TEST_VAR").unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        let result = validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "TEST_VAR");
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_session_secret_too_short() {
        let secret = SecretString::from("short");
        assert!(validate_session_secret(&secret, "TEST_SESSION").is_err());
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("https://api.aurumjewels.in/").unwrap(),
            "https://api.aurumjewels.in"
        );
        assert!(normalize_base_url("ftp://files.example").is_err());
        assert!(normalize_base_url("not a url").is_err());
    }

    #[test]
    fn test_paypal_mode_parse() {
        assert_eq!("LIVE".parse::<PaypalMode>().unwrap(), PaypalMode::Live);
        assert_eq!(PaypalMode::Sandbox.api_base(), "https://api-m.sandbox.paypal.com");
        assert!("prod".parse::<PaypalMode>().is_err());
    }

    #[test]
    fn test_default_pricing() {
        let pricing = PricingConfig::default();
        assert_eq!(pricing.free_shipping_threshold, Money::from_rupees(999));
        assert_eq!(pricing.shipping_charge, Money::from_rupees(79));
        assert!(pricing.cod_charge.is_zero());
    }

    #[test]
    fn test_integration_debug_redacts_secrets() {
        let config = RazorpayConfig {
            key_id: "rzp_test_visible".to_string(),
            key_secret: SecretString::from("hidden_key_secret_value"),
            webhook_secret: Some(SecretString::from("hidden_webhook_value")),
        };
        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("rzp_test_visible"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("hidden_key_secret_value"));
        assert!(!debug_output.contains("hidden_webhook_value"));
    }
}
