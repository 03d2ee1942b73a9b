//! Order route handlers: checkout, payment confirmation and order history.
//!
//! Prepaid checkouts are two-step. `POST /order/checkout` stages the cart
//! and returns what the client needs to open the gateway; the matching
//! confirm endpoint (or the gateway's webhook, whichever lands first)
//! turns the staged cart into an order.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use serde::Deserialize;
use tracing::instrument;

use aurum_core::{OrderId, PaymentMethod};

use crate::db::Page;
use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::{Order, OrderDetail};
use crate::routes::PageQuery;
use crate::services::checkout::{CheckoutOutcome, CheckoutRequest, OrderTracking};
use crate::services::pricing::Quote;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/quote", post(quote))
        .route("/checkout", post(checkout))
        .route("/razorpay/verify", post(razorpay_verify))
        .route("/paypal/capture", post(paypal_capture))
        .route("/stripe/confirm", post(stripe_confirm))
        .route("/{id}", get(show))
        .route("/{id}/track", get(track))
        .route("/{id}/cancel", post(cancel))
        .route("/{id}/return", post(request_return))
}

// =============================================================================
// Payloads
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    pub coupon_code: Option<String>,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Deserialize)]
pub struct RazorpayVerifyRequest {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
}

#[derive(Debug, Deserialize)]
pub struct PaypalCaptureRequest {
    pub paypal_order_id: String,
}

#[derive(Debug, Deserialize)]
pub struct StripeConfirmRequest {
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ReasonRequest {
    #[serde(default)]
    pub reason: String,
}

// =============================================================================
// Checkout
// =============================================================================

/// Price the current cart without placing anything.
#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn quote(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Json(body): Json<QuoteRequest>,
) -> Result<Json<Quote>> {
    Ok(Json(
        state
            .checkout()
            .quote(user.id, body.coupon_code.as_deref(), body.payment_method)
            .await?,
    ))
}

/// Place a COD order or stage a prepaid one.
#[instrument(skip(state, user, request), fields(user_id = %user.id, method = %request.payment_method))]
pub async fn checkout(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<CheckoutOutcome>> {
    Ok(Json(state.checkout().place_order(&user, &request).await?))
}

#[instrument(skip(state, user, body), fields(user_id = %user.id, razorpay_order_id = %body.razorpay_order_id))]
pub async fn razorpay_verify(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Json(body): Json<RazorpayVerifyRequest>,
) -> Result<Json<Order>> {
    Ok(Json(
        state
            .checkout()
            .confirm_razorpay(
                user.id,
                &body.razorpay_order_id,
                &body.razorpay_payment_id,
                &body.razorpay_signature,
            )
            .await?,
    ))
}

#[instrument(skip(state, user, body), fields(user_id = %user.id, paypal_order_id = %body.paypal_order_id))]
pub async fn paypal_capture(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Json(body): Json<PaypalCaptureRequest>,
) -> Result<Json<Order>> {
    Ok(Json(
        state
            .checkout()
            .capture_paypal(user.id, &body.paypal_order_id)
            .await?,
    ))
}

#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn stripe_confirm(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Json(body): Json<StripeConfirmRequest>,
) -> Result<Json<Order>> {
    Ok(Json(
        state
            .checkout()
            .confirm_stripe(user.id, &body.session_id)
            .await?,
    ))
}

// =============================================================================
// Order history
// =============================================================================

/// The caller's orders, newest first.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn list(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<Order>>> {
    Ok(Json(
        state
            .checkout()
            .orders(user.id, query.pagination())
            .await?,
    ))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn show(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
) -> Result<Json<OrderDetail>> {
    Ok(Json(state.checkout().detail(id, Some(user.id)).await?))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn track(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
) -> Result<Json<OrderTracking>> {
    Ok(Json(state.checkout().track(user.id, id).await?))
}

#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn cancel(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    Json(body): Json<ReasonRequest>,
) -> Result<Json<Order>> {
    Ok(Json(state.checkout().cancel(user.id, id, &body.reason).await?))
}

#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn request_return(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    Json(body): Json<ReasonRequest>,
) -> Result<Json<Order>> {
    Ok(Json(
        state
            .checkout()
            .request_return(user.id, id, &body.reason)
            .await?,
    ))
}
