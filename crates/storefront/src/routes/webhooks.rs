//! Payment gateway webhooks.
//!
//! Bodies are taken as raw bytes because the signatures cover the exact
//! payload. A verified event that refers to an already promoted or unknown
//! gateway order is acknowledged with 200 so the gateway stops retrying.

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
};
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/razorpay", post(razorpay))
        .route("/stripe", post(stripe))
}

fn signature<'h>(headers: &'h HeaderMap, name: &str) -> Result<&'h str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest(format!("Missing {name} header")))
}

#[instrument(skip_all)]
pub async fn razorpay(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode> {
    let sig = signature(&headers, "x-razorpay-signature")?;
    match state.checkout().razorpay_webhook(&body, sig).await? {
        Some(order) => tracing::info!(order_id = %order.id, "Razorpay webhook promoted order"),
        None => tracing::debug!("Razorpay webhook ignored"),
    }
    Ok(StatusCode::OK)
}

#[instrument(skip_all)]
pub async fn stripe(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode> {
    let sig = signature(&headers, "stripe-signature")?;
    match state.checkout().stripe_webhook(&body, sig).await? {
        Some(order) => tracing::info!(order_id = %order.id, "Stripe webhook promoted order"),
        None => tracing::debug!("Stripe webhook ignored"),
    }
    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_signature_header() {
        let mut headers = HeaderMap::new();
        assert!(signature(&headers, "stripe-signature").is_err());
        headers.insert("stripe-signature", HeaderValue::from_static("t=1,v1=ab"));
        assert_eq!(
            signature(&headers, "stripe-signature").ok(),
            Some("t=1,v1=ab")
        );
    }
}
