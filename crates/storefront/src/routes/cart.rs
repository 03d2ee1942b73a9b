//! Cart and wishlist route handlers.
//!
//! Carts live in the database per user, so they follow the shopper across
//! devices. Every mutation answers with the freshly priced cart.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use aurum_core::ProductId;

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::WishlistItem;
use crate::services::cart::CartView;
use crate::state::AppState;

pub fn cart_router() -> Router<AppState> {
    Router::new()
        .route("/", get(show).delete(clear))
        .route("/count", get(count))
        .route("/add", post(add))
        .route("/update", post(update))
        .route("/remove", post(remove))
}

pub fn wishlist_router() -> Router<AppState> {
    Router::new()
        .route("/", get(wishlist))
        .route("/add", post(wishlist_add))
        .route("/remove", post(wishlist_remove))
        .route("/move-to-cart", post(move_to_cart))
}

/// Add-to-cart payload; quantity defaults to 1.
#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    pub product_id: ProductId,
    pub quantity: Option<u32>,
}

/// Set a line's quantity; 0 removes it.
#[derive(Debug, Deserialize)]
pub struct UpdateCartRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct ProductRequest {
    pub product_id: ProductId,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: i64,
}

// =============================================================================
// Cart
// =============================================================================

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn show(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
) -> Result<Json<CartView>> {
    Ok(Json(state.cart().view(user.id).await?))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn count(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
) -> Result<Json<CountResponse>> {
    let count = state.cart().count(user.id).await?;
    Ok(Json(CountResponse { count }))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn add(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Json(body): Json<AddToCartRequest>,
) -> Result<Json<CartView>> {
    let quantity = body.quantity.unwrap_or(1);
    Ok(Json(
        state.cart().add(user.id, body.product_id, quantity).await?,
    ))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn update(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Json(body): Json<UpdateCartRequest>,
) -> Result<Json<CartView>> {
    Ok(Json(
        state
            .cart()
            .set_quantity(user.id, body.product_id, body.quantity)
            .await?,
    ))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn remove(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Json(body): Json<ProductRequest>,
) -> Result<Json<CartView>> {
    Ok(Json(state.cart().remove(user.id, body.product_id).await?))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn clear(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
) -> Result<StatusCode> {
    state.cart().clear(user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Wishlist
// =============================================================================

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn wishlist(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
) -> Result<Json<Vec<WishlistItem>>> {
    Ok(Json(state.cart().wishlist(user.id).await?))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn wishlist_add(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Json(body): Json<ProductRequest>,
) -> Result<Json<Vec<WishlistItem>>> {
    Ok(Json(
        state
            .cart()
            .add_to_wishlist(user.id, body.product_id)
            .await?,
    ))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn wishlist_remove(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Json(body): Json<ProductRequest>,
) -> Result<Json<Vec<WishlistItem>>> {
    Ok(Json(
        state
            .cart()
            .remove_from_wishlist(user.id, body.product_id)
            .await?,
    ))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn move_to_cart(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Json(body): Json<ProductRequest>,
) -> Result<Json<CartView>> {
    Ok(Json(
        state.cart().move_to_cart(user.id, body.product_id).await?,
    ))
}
