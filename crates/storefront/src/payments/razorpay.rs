//! Razorpay Orders API.
//!
//! Checkout runs client-side with the key id and the Razorpay order id; the
//! browser hands back `razorpay_payment_id` and `razorpay_signature`, which
//! must equal HMAC-SHA256(`order_id|payment_id`) under the key secret.

use std::sync::Arc;

use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use aurum_core::Money;

use super::{PaymentError, http_client, read_json, verify_hmac_hex};
use crate::config::RazorpayConfig;

const API_BASE: &str = "https://api.razorpay.com/v1";
const GATEWAY: &str = "razorpay";

/// A Razorpay order, created before the checkout widget opens.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RazorpayOrder {
    pub id: String,
    /// Amount in paise.
    pub amount: i64,
    pub currency: String,
    pub receipt: Option<String>,
    pub status: String,
}

/// A refund record.
#[derive(Debug, Clone, Deserialize)]
pub struct RazorpayRefund {
    pub id: String,
    pub payment_id: String,
    pub amount: i64,
    pub status: String,
}

/// Payment identified by a webhook event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookCapture {
    pub order_id: String,
    pub payment_id: String,
}

#[derive(Serialize)]
struct CreateOrderRequest<'a> {
    amount: i64,
    currency: &'static str,
    receipt: &'a str,
    notes: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct WebhookEnvelope {
    event: String,
    payload: WebhookPayload,
}

#[derive(Deserialize)]
struct WebhookPayload {
    payment: Option<WebhookEntity>,
}

#[derive(Deserialize)]
struct WebhookEntity {
    entity: WebhookPayment,
}

#[derive(Deserialize)]
struct WebhookPayment {
    id: String,
    order_id: Option<String>,
}

/// Razorpay REST client.
#[derive(Clone)]
pub struct RazorpayClient {
    inner: Arc<RazorpayInner>,
}

struct RazorpayInner {
    client: reqwest::Client,
    config: RazorpayConfig,
}

impl RazorpayClient {
    /// Create a client for the configured account.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Http` if the HTTP client cannot be built.
    pub fn new(config: RazorpayConfig) -> Result<Self, PaymentError> {
        Ok(Self {
            inner: Arc::new(RazorpayInner {
                client: http_client()?,
                config,
            }),
        })
    }

    /// Publishable key id handed to the checkout widget.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.inner.config.key_id
    }

    /// Create an order for `amount`.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Api` if Razorpay rejects the request.
    #[instrument(skip(self, notes), fields(amount = %amount))]
    pub async fn create_order(
        &self,
        amount: Money,
        receipt: &str,
        notes: &serde_json::Value,
    ) -> Result<RazorpayOrder, PaymentError> {
        let request = CreateOrderRequest {
            amount: amount.to_minor()?,
            currency: "INR",
            receipt,
            notes,
        };

        let response = self
            .inner
            .client
            .post(format!("{API_BASE}/orders"))
            .basic_auth(
                &self.inner.config.key_id,
                Some(self.inner.config.key_secret.expose_secret()),
            )
            .json(&request)
            .send()
            .await?;

        let order: RazorpayOrder = read_json(GATEWAY, response).await?;
        tracing::info!(razorpay_order_id = %order.id, "Razorpay order created");
        Ok(order)
    }

    /// Check the signature returned by the checkout widget.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::InvalidSignature` on mismatch.
    pub fn verify_payment_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<(), PaymentError> {
        verify_payment_signature(
            self.inner.config.key_secret.expose_secret(),
            order_id,
            payment_id,
            signature,
        )
    }

    /// Check an `X-Razorpay-Signature` header against the raw body.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::NotConfigured` without a webhook secret and
    /// `PaymentError::InvalidSignature` on mismatch.
    pub fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> Result<(), PaymentError> {
        let secret = self
            .inner
            .config
            .webhook_secret
            .as_ref()
            .ok_or(PaymentError::NotConfigured("razorpay webhook"))?;
        verify_hmac_hex(secret.expose_secret().as_bytes(), body, signature)
    }

    /// Refund a captured payment in full.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Api` if Razorpay rejects the refund.
    #[instrument(skip(self))]
    pub async fn refund(&self, payment_id: &str) -> Result<RazorpayRefund, PaymentError> {
        let response = self
            .inner
            .client
            .post(format!("{API_BASE}/payments/{payment_id}/refund"))
            .basic_auth(
                &self.inner.config.key_id,
                Some(self.inner.config.key_secret.expose_secret()),
            )
            .json(&serde_json::json!({}))
            .send()
            .await?;

        let refund: RazorpayRefund = read_json(GATEWAY, response).await?;
        tracing::info!(refund_id = %refund.id, "Razorpay refund issued");
        Ok(refund)
    }
}

/// HMAC check for the checkout widget's `razorpay_signature`.
fn verify_payment_signature(
    key_secret: &str,
    order_id: &str,
    payment_id: &str,
    signature: &str,
) -> Result<(), PaymentError> {
    let message = format!("{order_id}|{payment_id}");
    verify_hmac_hex(key_secret.as_bytes(), message.as_bytes(), signature)
}

/// Extract the paid order from a `payment.captured` or `order.paid` event.
/// Other events yield `None`.
///
/// # Errors
///
/// Returns `PaymentError::UnexpectedResponse` for malformed payloads.
pub fn capture_from_webhook(body: &[u8]) -> Result<Option<WebhookCapture>, PaymentError> {
    let envelope: WebhookEnvelope =
        serde_json::from_slice(body).map_err(|e| PaymentError::UnexpectedResponse {
            gateway: GATEWAY,
            message: e.to_string(),
        })?;

    if !matches!(envelope.event.as_str(), "payment.captured" | "order.paid") {
        return Ok(None);
    }

    let payment = envelope
        .payload
        .payment
        .ok_or_else(|| PaymentError::UnexpectedResponse {
            gateway: GATEWAY,
            message: format!("{} event without a payment", envelope.event),
        })?
        .entity;

    Ok(payment.order_id.map(|order_id| WebhookCapture {
        order_id,
        payment_id: payment.id,
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::hmac_hex;
    use super::*;

    #[test]
    fn test_payment_signature() {
        let signature = hmac_hex(b"rzp_secret", b"order_Nx1|pay_Nx2");
        assert!(verify_payment_signature("rzp_secret", "order_Nx1", "pay_Nx2", &signature).is_ok());
        assert!(matches!(
            verify_payment_signature("rzp_secret", "order_Nx1", "pay_OTHER", &signature),
            Err(PaymentError::InvalidSignature)
        ));
        assert!(matches!(
            verify_payment_signature("wrong_secret", "order_Nx1", "pay_Nx2", &signature),
            Err(PaymentError::InvalidSignature)
        ));
    }

    #[test]
    fn test_capture_from_payment_captured() {
        let body = br#"{
            "event": "payment.captured",
            "payload": {"payment": {"entity": {"id": "pay_1", "order_id": "order_1", "status": "captured"}}}
        }"#;
        assert_eq!(
            capture_from_webhook(body).unwrap(),
            Some(WebhookCapture {
                order_id: "order_1".to_owned(),
                payment_id: "pay_1".to_owned(),
            })
        );
    }

    #[test]
    fn test_capture_from_order_paid() {
        let body = br#"{
            "event": "order.paid",
            "payload": {
                "order": {"entity": {"id": "order_9"}},
                "payment": {"entity": {"id": "pay_9", "order_id": "order_9"}}
            }
        }"#;
        let capture = capture_from_webhook(body).unwrap().unwrap();
        assert_eq!(capture.order_id, "order_9");
    }

    #[test]
    fn test_other_events_ignored() {
        let body = br#"{"event": "payment.failed", "payload": {}}"#;
        assert_eq!(capture_from_webhook(body).unwrap(), None);
        assert!(capture_from_webhook(b"not json").is_err());
    }
}
