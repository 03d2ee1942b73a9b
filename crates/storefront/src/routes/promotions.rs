//! Public promotions: homepage sliders, running offers and coupon checks.

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use aurum_core::PaymentMethod;

use crate::db::{OfferRepository, SliderRepository};
use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::{Offer, Slider};
use crate::services::pricing::Quote;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/slider", get(sliders))
        .route("/offers", get(offers))
        .route("/offers/coupon/validate", post(validate_coupon))
}

#[derive(Debug, Deserialize)]
pub struct ValidateCouponRequest {
    pub code: String,
    pub payment_method: Option<PaymentMethod>,
}

#[derive(Debug, Serialize)]
pub struct ValidateCouponResponse {
    pub code: String,
    pub quote: Quote,
}

/// Active sliders in display order.
#[instrument(skip(state))]
pub async fn sliders(State(state): State<AppState>) -> Result<Json<Vec<Slider>>> {
    Ok(Json(SliderRepository::new(state.pool()).list_active().await?))
}

/// Offers running right now.
#[instrument(skip(state))]
pub async fn offers(State(state): State<AppState>) -> Result<Json<Vec<Offer>>> {
    Ok(Json(OfferRepository::new(state.pool()).list_running().await?))
}

/// Price the caller's cart with a coupon applied.
///
/// Fails with the coupon's reason when it cannot be used on this cart.
#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn validate_coupon(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Json(body): Json<ValidateCouponRequest>,
) -> Result<Json<ValidateCouponResponse>> {
    let method = body.payment_method.unwrap_or(PaymentMethod::Razorpay);
    let quote = state
        .checkout()
        .quote(user.id, Some(&body.code), method)
        .await?;
    Ok(Json(ValidateCouponResponse {
        code: crate::models::promotion::normalize_code(&body.code),
        quote,
    }))
}
