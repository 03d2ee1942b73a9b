//! PayPal Orders v2.
//!
//! The shopper approves the order on PayPal and comes back to the return
//! URL; the server then captures it. Totals are converted from INR into the
//! configured settlement currency.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::instrument;

use aurum_core::Money;

use super::{PaymentError, http_client, read_json};
use crate::config::PaypalConfig;

const GATEWAY: &str = "paypal";

/// Tokens are renewed this long before PayPal says they expire.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// A created PayPal order and where to send the shopper.
#[derive(Debug, Clone)]
pub struct PaypalOrder {
    pub id: String,
    pub approve_url: String,
}

/// Result of a successful capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaypalCapture {
    pub order_id: String,
    /// Capture id, needed for refunds.
    pub capture_id: String,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: SecretString,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self, now: Instant) -> bool {
        now + TOKEN_REFRESH_MARGIN < self.expires_at
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct OrderResponse {
    id: String,
    #[serde(default)]
    links: Vec<Link>,
}

#[derive(Deserialize)]
struct Link {
    href: String,
    rel: String,
}

#[derive(Deserialize)]
struct CaptureResponse {
    id: String,
    status: String,
    #[serde(default)]
    purchase_units: Vec<PurchaseUnit>,
}

#[derive(Deserialize)]
struct PurchaseUnit {
    payments: Option<Payments>,
}

#[derive(Deserialize)]
struct Payments {
    #[serde(default)]
    captures: Vec<Capture>,
}

#[derive(Deserialize)]
struct Capture {
    id: String,
}

#[derive(Deserialize)]
struct RefundResponse {
    id: String,
    status: String,
}

/// PayPal REST client with an in-memory token cache.
#[derive(Clone)]
pub struct PaypalClient {
    inner: Arc<PaypalInner>,
}

struct PaypalInner {
    client: reqwest::Client,
    config: PaypalConfig,
    token: RwLock<Option<CachedToken>>,
}

impl PaypalClient {
    /// Create a client for the configured account.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Http` if the HTTP client cannot be built.
    pub fn new(config: PaypalConfig) -> Result<Self, PaymentError> {
        Ok(Self {
            inner: Arc::new(PaypalInner {
                client: http_client()?,
                config,
                token: RwLock::new(None),
            }),
        })
    }

    /// Settlement currency, e.g. `USD`.
    #[must_use]
    pub fn currency(&self) -> &str {
        &self.inner.config.currency
    }

    /// Create an order for `amount` (converted from INR).
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Api` if PayPal rejects the order and
    /// `UnexpectedResponse` if it has no approval link.
    #[instrument(skip(self, return_url, cancel_url), fields(amount = %amount))]
    pub async fn create_order(
        &self,
        amount: Money,
        reference: &str,
        return_url: &str,
        cancel_url: &str,
    ) -> Result<PaypalOrder, PaymentError> {
        let value = amount.convert(self.inner.config.inr_rate);
        let body = serde_json::json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": reference,
                "amount": {
                    "currency_code": self.inner.config.currency,
                    "value": value,
                },
            }],
            "application_context": {
                "brand_name": "Aurum",
                "shipping_preference": "NO_SHIPPING",
                "user_action": "PAY_NOW",
                "return_url": return_url,
                "cancel_url": cancel_url,
            },
        });

        let url = format!("{}/v2/checkout/orders", self.api_base());
        let response = self
            .send_authorized(|client| client.post(&url).json(&body))
            .await?;
        let order: OrderResponse = read_json(GATEWAY, response).await?;

        let approve_url = approve_link(&order.links).ok_or_else(|| {
            PaymentError::UnexpectedResponse {
                gateway: GATEWAY,
                message: format!("order {} has no approval link", order.id),
            }
        })?;

        tracing::info!(paypal_order_id = %order.id, "PayPal order created");
        Ok(PaypalOrder {
            id: order.id,
            approve_url,
        })
    }

    /// Capture an approved order.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::NotCompleted` unless PayPal reports the
    /// capture `COMPLETED`.
    #[instrument(skip(self))]
    pub async fn capture_order(&self, order_id: &str) -> Result<PaypalCapture, PaymentError> {
        let url = format!("{}/v2/checkout/orders/{order_id}/capture", self.api_base());
        let response = self
            .send_authorized(|client| {
                client
                    .post(&url)
                    .header(reqwest::header::CONTENT_TYPE, "application/json")
                    .body("{}")
            })
            .await?;
        let capture: CaptureResponse = read_json(GATEWAY, response).await?;
        parse_capture(capture)
    }

    /// Refund a capture in full.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Api` if PayPal rejects the refund.
    #[instrument(skip(self))]
    pub async fn refund_capture(&self, capture_id: &str) -> Result<String, PaymentError> {
        let url = format!("{}/v2/payments/captures/{capture_id}/refund", self.api_base());
        let response = self
            .send_authorized(|client| {
                client
                    .post(&url)
                    .header(reqwest::header::CONTENT_TYPE, "application/json")
                    .body("{}")
            })
            .await?;
        let refund: RefundResponse = read_json(GATEWAY, response).await?;
        tracing::info!(refund_id = %refund.id, status = %refund.status, "PayPal refund issued");
        Ok(refund.id)
    }

    fn api_base(&self) -> &'static str {
        self.inner.config.mode.api_base()
    }

    /// Send with a bearer token, renewing it once if PayPal answers 401.
    async fn send_authorized(
        &self,
        build: impl Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, PaymentError> {
        let token = self.access_token().await?;
        let response = build(&self.inner.client)
            .bearer_auth(token.expose_secret())
            .send()
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        tracing::debug!("PayPal token rejected, renewing");
        self.inner.token.write().await.take();
        let token = self.access_token().await?;
        Ok(build(&self.inner.client)
            .bearer_auth(token.expose_secret())
            .send()
            .await?)
    }

    async fn access_token(&self) -> Result<SecretString, PaymentError> {
        let now = Instant::now();
        if let Some(token) = self.inner.token.read().await.as_ref()
            && token.is_fresh(now)
        {
            return Ok(token.access_token.clone());
        }

        let mut guard = self.inner.token.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(token) = guard.as_ref()
            && token.is_fresh(now)
        {
            return Ok(token.access_token.clone());
        }

        let response = self
            .inner
            .client
            .post(format!("{}/v1/oauth2/token", self.api_base()))
            .basic_auth(
                &self.inner.config.client_id,
                Some(self.inner.config.client_secret.expose_secret()),
            )
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        let token: TokenResponse = read_json(GATEWAY, response).await?;

        let cached = CachedToken {
            access_token: SecretString::from(token.access_token),
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        };
        let access_token = cached.access_token.clone();
        *guard = Some(cached);
        tracing::debug!(expires_in = token.expires_in, "PayPal token refreshed");
        Ok(access_token)
    }
}

fn approve_link(links: &[Link]) -> Option<String> {
    links
        .iter()
        .find(|l| l.rel == "approve" || l.rel == "payer-action")
        .map(|l| l.href.clone())
}

fn parse_capture(capture: CaptureResponse) -> Result<PaypalCapture, PaymentError> {
    if capture.status != "COMPLETED" {
        return Err(PaymentError::NotCompleted(format!(
            "PayPal order {} is {}",
            capture.id, capture.status
        )));
    }

    let capture_id = capture
        .purchase_units
        .into_iter()
        .filter_map(|unit| unit.payments)
        .flat_map(|payments| payments.captures)
        .map(|c| c.id)
        .next()
        .ok_or_else(|| PaymentError::UnexpectedResponse {
            gateway: GATEWAY,
            message: format!("completed order {} has no capture", capture.id),
        })?;

    Ok(PaypalCapture {
        order_id: capture.id,
        capture_id,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_token_freshness_margin() {
        let now = Instant::now();
        let token = CachedToken {
            access_token: SecretString::from("t"),
            expires_at: now + Duration::from_secs(30),
        };
        assert!(!token.is_fresh(now));

        let token = CachedToken {
            access_token: SecretString::from("t"),
            expires_at: now + Duration::from_secs(3600),
        };
        assert!(token.is_fresh(now));
    }

    #[test]
    fn test_approve_link() {
        let order: OrderResponse = serde_json::from_str(
            r#"{"id": "5O190127TN364715T", "status": "CREATED", "links": [
                {"href": "https://api.paypal.com/v2/checkout/orders/5O1", "rel": "self", "method": "GET"},
                {"href": "https://www.paypal.com/checkoutnow?token=5O1", "rel": "approve", "method": "GET"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(
            approve_link(&order.links).unwrap(),
            "https://www.paypal.com/checkoutnow?token=5O1"
        );
        assert!(approve_link(&[]).is_none());
    }

    #[test]
    fn test_completed_capture() {
        let capture: CaptureResponse = serde_json::from_str(
            r#"{"id": "5O1", "status": "COMPLETED", "purchase_units": [
                {"reference_id": "AUR", "payments": {"captures": [{"id": "3C6", "status": "COMPLETED"}]}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(
            parse_capture(capture).unwrap(),
            PaypalCapture {
                order_id: "5O1".to_owned(),
                capture_id: "3C6".to_owned(),
            }
        );
    }

    #[test]
    fn test_pending_capture_rejected() {
        let capture: CaptureResponse =
            serde_json::from_str(r#"{"id": "5O1", "status": "PAYER_ACTION_REQUIRED"}"#).unwrap();
        assert!(matches!(
            parse_capture(capture),
            Err(PaymentError::NotCompleted(_))
        ));
    }
}
