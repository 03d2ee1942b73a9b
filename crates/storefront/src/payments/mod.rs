//! Payment gateway clients.
//!
//! Each gateway is a thin REST client over `reqwest`; no vendor SDKs. A
//! client exists only when its credentials are configured, so callers hold
//! `Option<Client>` and turn `None` into [`PaymentError::NotConfigured`].
//!
//! - [`razorpay`] - Orders API, checkout signature and webhook verification
//! - [`paypal`] - Orders v2 with client-credentials tokens
//! - [`stripe`] - Checkout Sessions and webhook verification

pub mod paypal;
pub mod razorpay;
pub mod stripe;

pub use paypal::PaypalClient;
pub use razorpay::RazorpayClient;
pub use stripe::StripeClient;

use std::time::Duration;

use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use sha2::Sha256;
use thiserror::Error;

use aurum_core::MoneyError;

/// Request timeout for all gateway calls.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur when talking to a payment gateway.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The gateway answered with a non-success status.
    #[error("{gateway} API error ({status}): {body}")]
    Api {
        gateway: &'static str,
        status: u16,
        body: String,
    },

    /// A checkout or webhook signature did not match.
    #[error("invalid payment signature")]
    InvalidSignature,

    /// The gateway has no credentials configured.
    #[error("{0} payments are not configured")]
    NotConfigured(&'static str),

    /// The gateway answered with something we cannot use.
    #[error("unexpected {gateway} response: {message}")]
    UnexpectedResponse {
        gateway: &'static str,
        message: String,
    },

    /// The payment exists but was not collected.
    #[error("payment not completed: {0}")]
    NotCompleted(String),

    /// Amount could not be expressed in the gateway's units.
    #[error("invalid amount: {0}")]
    Amount(#[from] MoneyError),
}

/// The configured gateways.
#[derive(Clone, Default)]
pub struct Gateways {
    pub razorpay: Option<RazorpayClient>,
    pub paypal: Option<PaypalClient>,
    pub stripe: Option<StripeClient>,
}

impl Gateways {
    /// Razorpay client, or `NotConfigured`.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::NotConfigured` when Razorpay is disabled.
    pub fn razorpay(&self) -> Result<&RazorpayClient, PaymentError> {
        self.razorpay
            .as_ref()
            .ok_or(PaymentError::NotConfigured("razorpay"))
    }

    /// PayPal client, or `NotConfigured`.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::NotConfigured` when PayPal is disabled.
    pub fn paypal(&self) -> Result<&PaypalClient, PaymentError> {
        self.paypal
            .as_ref()
            .ok_or(PaymentError::NotConfigured("paypal"))
    }

    /// Stripe client, or `NotConfigured`.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::NotConfigured` when Stripe is disabled.
    pub fn stripe(&self) -> Result<&StripeClient, PaymentError> {
        self.stripe
            .as_ref()
            .ok_or(PaymentError::NotConfigured("stripe"))
    }

    /// Names of the enabled gateways, for the checkout page.
    #[must_use]
    pub fn enabled(&self) -> Vec<&'static str> {
        [
            self.razorpay.as_ref().map(|_| "razorpay"),
            self.paypal.as_ref().map(|_| "paypal"),
            self.stripe.as_ref().map(|_| "stripe"),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

impl PaymentError {
    /// Whether the failure came from the gateway side rather than the caller.
    #[must_use]
    pub const fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Api { .. } | Self::UnexpectedResponse { .. }
        )
    }
}

/// Build the shared HTTP client used by a gateway.
fn http_client() -> Result<reqwest::Client, PaymentError> {
    Ok(reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?)
}

/// Decode a JSON body, turning error statuses into [`PaymentError::Api`].
async fn read_json<T: DeserializeOwned>(
    gateway: &'static str,
    response: reqwest::Response,
) -> Result<T, PaymentError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        tracing::warn!(gateway, status = status.as_u16(), body = %body, "Gateway request failed");
        return Err(PaymentError::Api {
            gateway,
            status: status.as_u16(),
            body,
        });
    }

    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| PaymentError::UnexpectedResponse {
        gateway,
        message: e.to_string(),
    })
}

/// Check a hex HMAC-SHA256 signature in constant time.
fn verify_hmac_hex(secret: &[u8], message: &[u8], signature_hex: &str) -> Result<(), PaymentError> {
    let expected = hex::decode(signature_hex.trim()).map_err(|_| PaymentError::InvalidSignature)?;
    let mut mac = Hmac::<Sha256>::new_from_slice(secret).map_err(|_| PaymentError::InvalidSignature)?;
    mac.update(message);
    mac.verify_slice(&expected)
        .map_err(|_| PaymentError::InvalidSignature)
}

/// Hex HMAC-SHA256, for signing fixtures the way the gateways do.
#[cfg(test)]
#[allow(clippy::unwrap_used)]
fn hmac_hex(secret: &[u8], message: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret).unwrap();
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_hmac_roundtrip() {
        let sig = hmac_hex(b"key", b"order_1|pay_1");
        assert!(verify_hmac_hex(b"key", b"order_1|pay_1", &sig).is_ok());
        assert!(matches!(
            verify_hmac_hex(b"key", b"order_1|pay_2", &sig),
            Err(PaymentError::InvalidSignature)
        ));
        assert!(matches!(
            verify_hmac_hex(b"key", b"order_1|pay_1", "not-hex"),
            Err(PaymentError::InvalidSignature)
        ));
    }

    #[test]
    fn test_known_hmac_vector() {
        // RFC 4231 test case 2.
        assert_eq!(
            hmac_hex(b"Jefe", b"what do ya want for nothing?"),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_upstream_classification() {
        assert!(
            PaymentError::Api {
                gateway: "razorpay",
                status: 500,
                body: String::new()
            }
            .is_upstream()
        );
        assert!(!PaymentError::InvalidSignature.is_upstream());
        assert!(!PaymentError::NotConfigured("stripe").is_upstream());
    }
}
