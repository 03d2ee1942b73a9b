//! Stripe Checkout via the REST API (no SDK dependency).
//!
//! Requests are form-encoded with the secret key as basic-auth user.

use std::sync::Arc;

use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::instrument;

use aurum_core::Money;

use super::{PaymentError, http_client, read_json, verify_hmac_hex};
use crate::config::StripeConfig;

const API_BASE: &str = "https://api.stripe.com/v1";
const GATEWAY: &str = "stripe";

/// Webhooks older than this are rejected as replays.
const WEBHOOK_TOLERANCE_SECS: u64 = 300;

/// A Checkout Session, as created or retrieved.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
    pub payment_status: String,
    pub payment_intent: Option<String>,
    pub client_reference_id: Option<String>,
    pub amount_total: Option<i64>,
}

impl CheckoutSession {
    /// Whether Stripe has collected the money.
    #[must_use]
    pub fn is_paid(&self) -> bool {
        self.payment_status == "paid"
    }
}

/// A verified webhook event.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

impl StripeEvent {
    /// The session of a `checkout.session.completed` event.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::UnexpectedResponse` if the object is not a session.
    pub fn completed_session(&self) -> Result<Option<CheckoutSession>, PaymentError> {
        if self.kind != "checkout.session.completed" {
            return Ok(None);
        }
        serde_json::from_value(self.data.object.clone())
            .map(Some)
            .map_err(|e| PaymentError::UnexpectedResponse {
                gateway: GATEWAY,
                message: e.to_string(),
            })
    }
}

#[derive(Deserialize)]
struct Refund {
    id: String,
    status: String,
}

/// Stripe REST client.
#[derive(Clone)]
pub struct StripeClient {
    inner: Arc<StripeInner>,
}

struct StripeInner {
    client: reqwest::Client,
    config: StripeConfig,
}

impl StripeClient {
    /// Create a client for the configured account.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Http` if the HTTP client cannot be built.
    pub fn new(config: StripeConfig) -> Result<Self, PaymentError> {
        Ok(Self {
            inner: Arc::new(StripeInner {
                client: http_client()?,
                config,
            }),
        })
    }

    /// Create a one-off payment Checkout Session for `amount` in INR.
    ///
    /// `success_url` may contain `{CHECKOUT_SESSION_ID}`, which Stripe fills in.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Api` if Stripe rejects the request.
    #[instrument(skip(self, success_url, cancel_url), fields(amount = %amount))]
    pub async fn create_checkout_session(
        &self,
        amount: Money,
        description: &str,
        reference: &str,
        customer_email: &str,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutSession, PaymentError> {
        let unit_amount = amount.to_minor()?.to_string();
        let response = self
            .inner
            .client
            .post(format!("{API_BASE}/checkout/sessions"))
            .basic_auth(self.inner.config.secret_key.expose_secret(), None::<&str>)
            .form(&[
                ("mode", "payment"),
                ("line_items[0][price_data][currency]", "inr"),
                ("line_items[0][price_data][unit_amount]", unit_amount.as_str()),
                ("line_items[0][price_data][product_data][name]", description),
                ("line_items[0][quantity]", "1"),
                ("client_reference_id", reference),
                ("customer_email", customer_email),
                ("success_url", success_url),
                ("cancel_url", cancel_url),
            ])
            .send()
            .await?;

        let session: CheckoutSession = read_json(GATEWAY, response).await?;
        tracing::info!(stripe_session_id = %session.id, "Stripe checkout session created");
        Ok(session)
    }

    /// Fetch a Checkout Session.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Api` if Stripe does not know the session.
    #[instrument(skip(self))]
    pub async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession, PaymentError> {
        let response = self
            .inner
            .client
            .get(format!("{API_BASE}/checkout/sessions/{session_id}"))
            .basic_auth(self.inner.config.secret_key.expose_secret(), None::<&str>)
            .send()
            .await?;
        read_json(GATEWAY, response).await
    }

    /// Refund a payment intent in full.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Api` if Stripe rejects the refund.
    #[instrument(skip(self))]
    pub async fn refund_payment_intent(&self, payment_intent: &str) -> Result<String, PaymentError> {
        let response = self
            .inner
            .client
            .post(format!("{API_BASE}/refunds"))
            .basic_auth(self.inner.config.secret_key.expose_secret(), None::<&str>)
            .form(&[("payment_intent", payment_intent)])
            .send()
            .await?;
        let refund: Refund = read_json(GATEWAY, response).await?;
        tracing::info!(refund_id = %refund.id, status = %refund.status, "Stripe refund issued");
        Ok(refund.id)
    }

    /// Verify a `Stripe-Signature` header and parse the event.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::InvalidSignature` for bad or stale signatures.
    pub fn verify_webhook(&self, payload: &[u8], sig_header: &str) -> Result<StripeEvent, PaymentError> {
        verify_webhook_signature(
            payload,
            sig_header,
            self.inner.config.webhook_secret.expose_secret(),
            chrono::Utc::now().timestamp(),
        )?;
        serde_json::from_slice(payload).map_err(|e| PaymentError::UnexpectedResponse {
            gateway: GATEWAY,
            message: e.to_string(),
        })
    }
}

/// Check `t=…,v1=…` against HMAC-SHA256(`t.payload`) and the replay window.
fn verify_webhook_signature(
    payload: &[u8],
    sig_header: &str,
    secret: &str,
    now: i64,
) -> Result<(), PaymentError> {
    let mut timestamp = "";
    let mut signatures = Vec::new();
    for part in sig_header.split(',') {
        let part = part.trim();
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = t;
        } else if let Some(v) = part.strip_prefix("v1=") {
            signatures.push(v);
        }
    }

    if timestamp.is_empty() || signatures.is_empty() {
        return Err(PaymentError::InvalidSignature);
    }

    let ts: i64 = timestamp
        .parse()
        .map_err(|_| PaymentError::InvalidSignature)?;
    let skew = now
        .checked_sub(ts)
        .map(i64::unsigned_abs)
        .ok_or(PaymentError::InvalidSignature)?;
    if skew > WEBHOOK_TOLERANCE_SECS {
        return Err(PaymentError::InvalidSignature);
    }

    let mut signed_payload = Vec::with_capacity(timestamp.len() + 1 + payload.len());
    signed_payload.extend_from_slice(timestamp.as_bytes());
    signed_payload.push(b'.');
    signed_payload.extend_from_slice(payload);

    // Stripe sends one v1 per active secret during rotation.
    if signatures
        .iter()
        .any(|sig| verify_hmac_hex(secret.as_bytes(), &signed_payload, sig).is_ok())
    {
        Ok(())
    } else {
        Err(PaymentError::InvalidSignature)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::hmac_hex;
    use super::*;

    const SECRET: &str = "whsec_test_aurum";
    const NOW: i64 = 1_760_000_000;

    fn header(payload: &[u8], ts: i64) -> String {
        let mut signed = format!("{ts}.").into_bytes();
        signed.extend_from_slice(payload);
        format!("t={ts},v1={}", hmac_hex(SECRET.as_bytes(), &signed))
    }

    #[test]
    fn test_valid_signature() {
        let payload = br#"{"id":"evt_1","type":"checkout.session.completed"}"#;
        assert!(verify_webhook_signature(payload, &header(payload, NOW), SECRET, NOW + 10).is_ok());
    }

    #[test]
    fn test_stale_signature_rejected() {
        let payload = b"{}";
        let sig = header(payload, NOW - 301);
        assert!(matches!(
            verify_webhook_signature(payload, &sig, SECRET, NOW),
            Err(PaymentError::InvalidSignature)
        ));
    }

    #[test]
    fn test_extreme_timestamps_rejected() {
        for ts in [i64::MIN, i64::MAX] {
            let sig = format!("t={ts},v1=00");
            assert!(matches!(
                verify_webhook_signature(b"{}", &sig, SECRET, NOW),
                Err(PaymentError::InvalidSignature)
            ));
            assert!(matches!(
                verify_webhook_signature(b"{}", &sig, SECRET, -NOW),
                Err(PaymentError::InvalidSignature)
            ));
        }
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let sig = header(b"{\"amount\":100}", NOW);
        assert!(verify_webhook_signature(b"{\"amount\":1}", &sig, SECRET, NOW).is_err());
        assert!(verify_webhook_signature(b"{}", "garbage", SECRET, NOW).is_err());
    }

    #[test]
    fn test_completed_session_event() {
        let event: StripeEvent = serde_json::from_str(
            r#"{"id": "evt_1", "type": "checkout.session.completed", "data": {"object": {
                "id": "cs_test_1", "url": null, "payment_status": "paid",
                "payment_intent": "pi_1", "client_reference_id": "42", "amount_total": 499900
            }}}"#,
        )
        .unwrap();
        let session = event.completed_session().unwrap().unwrap();
        assert!(session.is_paid());
        assert_eq!(session.payment_intent.as_deref(), Some("pi_1"));

        let other: StripeEvent = serde_json::from_str(
            r#"{"id": "evt_2", "type": "charge.refunded", "data": {"object": {}}}"#,
        )
        .unwrap();
        assert!(other.completed_session().unwrap().is_none());
    }
}
