//! Shiprocket REST client.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::sync::RwLock;
use tracing::instrument;

use super::ShiprocketError;
use super::types::{
    AdhocOrder, AssignAwbResponse, AssignedAwb, CreateOrderResponse, CreatedShipment,
    PickupLocation, PickupResponse, TrackResponse, Tracking,
};
use crate::config::ShiprocketConfig;
use crate::models::OrderDetail;

const API_BASE: &str = "https://apiv2.shiprocket.in/v1/external";

/// Shiprocket tokens are valid for ten days.
const TOKEN_LIFETIME: Duration = Duration::from_secs(10 * 24 * 60 * 60);

/// Renew the token this long before it expires.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct ShiprocketToken {
    token: SecretString,
    expires_at: Instant,
}

impl ShiprocketToken {
    fn is_fresh(&self, now: Instant) -> bool {
        now + TOKEN_REFRESH_MARGIN < self.expires_at
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Serialize)]
struct AssignAwbRequest {
    shipment_id: i64,
}

#[derive(Serialize)]
struct CancelRequest<'a> {
    ids: &'a [i64],
}

/// Shiprocket API client with an in-memory token cache.
#[derive(Clone)]
pub struct ShiprocketClient {
    inner: Arc<ShiprocketClientInner>,
}

struct ShiprocketClientInner {
    client: reqwest::Client,
    config: ShiprocketConfig,
    token: RwLock<Option<ShiprocketToken>>,
}

impl ShiprocketClient {
    /// Create a client. No request is made until the first call.
    ///
    /// # Errors
    ///
    /// Returns `ShiprocketError::Http` if the HTTP client cannot be built.
    pub fn new(config: ShiprocketConfig) -> Result<Self, ShiprocketError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            inner: Arc::new(ShiprocketClientInner {
                client,
                config,
                token: RwLock::new(None),
            }),
        })
    }

    /// Pickup location name used for new orders.
    #[must_use]
    pub fn pickup_location(&self) -> &str {
        &self.inner.config.pickup_location
    }

    /// Pickup addresses configured on the account.
    ///
    /// # Errors
    ///
    /// Returns `ShiprocketError` if the request fails.
    #[instrument(skip(self))]
    pub async fn pickup_locations(&self) -> Result<Vec<PickupLocation>, ShiprocketError> {
        let url = format!("{API_BASE}/settings/company/pickup");
        let response: PickupResponse = self
            .send_json(|client| client.get(&url))
            .await?;
        Ok(response.data.shipping_address)
    }

    /// Book an adhoc order for a placed order.
    ///
    /// # Errors
    ///
    /// Returns `ShiprocketError::UnexpectedResponse` when Shiprocket accepts
    /// the request but returns no ids.
    #[instrument(skip(self, detail), fields(order_number = %detail.order.order_number))]
    pub async fn create_order(&self, detail: &OrderDetail) -> Result<CreatedShipment, ShiprocketError> {
        let body = AdhocOrder::from_order(detail, self.pickup_location());
        let url = format!("{API_BASE}/orders/create/adhoc");
        let response: CreateOrderResponse = self
            .send_json(|client| client.post(&url).json(&body))
            .await?;

        match (response.order_id, response.shipment_id) {
            (Some(order_id), Some(shipment_id)) => {
                tracing::info!(
                    shiprocket_order_id = order_id,
                    shipment_id,
                    status = response.status.as_deref().unwrap_or_default(),
                    "Shiprocket order created"
                );
                Ok(CreatedShipment {
                    order_id,
                    shipment_id,
                })
            }
            _ => Err(ShiprocketError::UnexpectedResponse(
                response
                    .message
                    .unwrap_or_else(|| "order created without ids".to_owned()),
            )),
        }
    }

    /// Let Shiprocket pick a courier and generate the AWB.
    ///
    /// # Errors
    ///
    /// Returns `ShiprocketError::AwbNotAssigned` if no courier takes it.
    #[instrument(skip(self))]
    pub async fn assign_awb(&self, shipment_id: i64) -> Result<AssignedAwb, ShiprocketError> {
        let url = format!("{API_BASE}/courier/assign/awb");
        let body = AssignAwbRequest { shipment_id };
        let response: AssignAwbResponse = self
            .send_json(|client| client.post(&url).json(&body))
            .await?;
        let awb = response.into_awb().map_err(ShiprocketError::AwbNotAssigned)?;
        tracing::info!(awb_code = %awb.awb_code, courier = ?awb.courier_name, "AWB assigned");
        Ok(awb)
    }

    /// Tracking history for an AWB.
    ///
    /// # Errors
    ///
    /// Returns `ShiprocketError` if the request fails.
    #[instrument(skip(self))]
    pub async fn track(&self, awb_code: &str) -> Result<Tracking, ShiprocketError> {
        let url = format!("{API_BASE}/courier/track/awb/{awb_code}");
        let response: TrackResponse = self.send_json(|client| client.get(&url)).await?;
        Ok(response.into_tracking(awb_code))
    }

    /// Cancel Shiprocket orders by their Shiprocket ids.
    ///
    /// # Errors
    ///
    /// Returns `ShiprocketError` if the request fails.
    #[instrument(skip(self))]
    pub async fn cancel_orders(&self, order_ids: &[i64]) -> Result<(), ShiprocketError> {
        let url = format!("{API_BASE}/orders/cancel");
        let body = CancelRequest { ids: order_ids };
        let _: serde_json::Value = self
            .send_json(|client| client.post(&url).json(&body))
            .await?;
        tracing::info!(?order_ids, "Shiprocket orders cancelled");
        Ok(())
    }

    // =========================================================================
    // Transport
    // =========================================================================

    /// Send with the cached token; a 401 drops the token and retries once.
    async fn send_json<T: DeserializeOwned>(
        &self,
        build: impl Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    ) -> Result<T, ShiprocketError> {
        let token = self.token().await?;
        let mut response = build(&self.inner.client)
            .bearer_auth(token.expose_secret())
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            tracing::debug!("Shiprocket token rejected, logging in again");
            self.inner.token.write().await.take();
            let token = self.token().await?;
            response = build(&self.inner.client)
                .bearer_auth(token.expose_secret())
                .send()
                .await?;
        }

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ShiprocketError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| ShiprocketError::UnexpectedResponse(e.to_string()))
    }

    async fn token(&self) -> Result<SecretString, ShiprocketError> {
        let now = Instant::now();
        if let Some(token) = self.inner.token.read().await.as_ref()
            && token.is_fresh(now)
        {
            return Ok(token.token.clone());
        }

        let mut guard = self.inner.token.write().await;
        if let Some(token) = guard.as_ref()
            && token.is_fresh(now)
        {
            return Ok(token.token.clone());
        }

        let token = self.login().await?;
        let secret = token.token.clone();
        *guard = Some(token);
        Ok(secret)
    }

    #[instrument(skip(self), fields(email = %self.inner.config.email))]
    async fn login(&self) -> Result<ShiprocketToken, ShiprocketError> {
        let issued_at = Instant::now();
        let response = self
            .inner
            .client
            .post(format!("{API_BASE}/auth/login"))
            .json(&LoginRequest {
                email: &self.inner.config.email,
                password: self.inner.config.password.expose_secret(),
            })
            .send()
            .await?;

        let status = response.status();
        let body: LoginResponse = response.json().await.unwrap_or(LoginResponse {
            token: None,
            message: None,
        });

        match body.token {
            Some(token) if status.is_success() => {
                tracing::info!("Shiprocket login succeeded");
                Ok(ShiprocketToken {
                    token: SecretString::from(token),
                    expires_at: issued_at + TOKEN_LIFETIME,
                })
            }
            _ => Err(ShiprocketError::AuthenticationFailed(
                body.message
                    .unwrap_or_else(|| format!("HTTP {status}")),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_refresh_margin() {
        let now = Instant::now();
        let fresh = ShiprocketToken {
            token: SecretString::from("t"),
            expires_at: now + TOKEN_LIFETIME,
        };
        assert!(fresh.is_fresh(now));

        let stale = ShiprocketToken {
            token: SecretString::from("t"),
            expires_at: now + Duration::from_secs(59),
        };
        assert!(!stale.is_fresh(now));
    }

    #[test]
    fn test_cancel_request_shape() {
        let json = serde_json::to_value(CancelRequest { ids: &[101, 102] }).unwrap_or_default();
        assert_eq!(json, serde_json::json!({"ids": [101, 102]}));
    }
}
