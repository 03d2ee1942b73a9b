//! Offers, coupons and homepage sliders.

use axum::{
    Json, Router,
    extract::{Multipart, Path, State},
    http::StatusCode,
    routing::{get, put},
};
use tracing::instrument;

use aurum_core::{CouponId, OfferId, SliderId};

use super::UploadForm;
use crate::db::{CouponRepository, OfferRepository, SliderRepository};
use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::models::{Coupon, CouponInput, Offer, OfferInput, Slider, SliderInput};
use crate::state::AppState;

pub fn offers_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_offers).post(create_offer))
        .route("/{id}", put(update_offer).delete(delete_offer))
}

pub fn coupons_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_coupons).post(create_coupon))
        .route("/{id}", put(update_coupon).delete(delete_coupon))
}

pub fn sliders_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_sliders).post(create_slider))
        .route("/{id}", put(update_slider).delete(delete_slider))
}

// =============================================================================
// Offers
// =============================================================================

#[instrument(skip(state, _admin))]
pub async fn list_offers(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<Vec<Offer>>> {
    Ok(Json(OfferRepository::new(state.pool()).list_all().await?))
}

#[instrument(skip(state, _admin, input))]
pub async fn create_offer(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Json(input): Json<OfferInput>,
) -> Result<(StatusCode, Json<Offer>)> {
    let input = input.normalize().map_err(AppError::BadRequest)?;
    let offer = OfferRepository::new(state.pool()).create(&input).await?;
    Ok((StatusCode::CREATED, Json(offer)))
}

#[instrument(skip(state, _admin, input))]
pub async fn update_offer(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<OfferId>,
    Json(input): Json<OfferInput>,
) -> Result<Json<Offer>> {
    let input = input.normalize().map_err(AppError::BadRequest)?;
    Ok(Json(OfferRepository::new(state.pool()).update(id, &input).await?))
}

#[instrument(skip(state, _admin))]
pub async fn delete_offer(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<OfferId>,
) -> Result<StatusCode> {
    OfferRepository::new(state.pool()).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Coupons
// =============================================================================

#[instrument(skip(state, _admin))]
pub async fn list_coupons(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<Vec<Coupon>>> {
    Ok(Json(CouponRepository::new(state.pool()).list_all().await?))
}

#[instrument(skip(state, _admin, input))]
pub async fn create_coupon(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Json(input): Json<CouponInput>,
) -> Result<(StatusCode, Json<Coupon>)> {
    let input = input.normalize().map_err(AppError::BadRequest)?;
    let coupon = CouponRepository::new(state.pool()).create(&input).await?;
    Ok((StatusCode::CREATED, Json(coupon)))
}

#[instrument(skip(state, _admin, input))]
pub async fn update_coupon(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<CouponId>,
    Json(input): Json<CouponInput>,
) -> Result<Json<Coupon>> {
    let input = input.normalize().map_err(AppError::BadRequest)?;
    Ok(Json(CouponRepository::new(state.pool()).update(id, &input).await?))
}

/// Redeemed coupons are deactivated instead of deleted.
#[instrument(skip(state, _admin))]
pub async fn delete_coupon(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<CouponId>,
) -> Result<StatusCode> {
    CouponRepository::new(state.pool()).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Sliders
// =============================================================================

/// Read the slider JSON and store the uploaded image, if any.
async fn slider_form(state: &AppState, multipart: Multipart) -> Result<(SliderInput, Option<String>)> {
    let mut form = UploadForm::read(multipart).await?;
    let input = form
        .json::<SliderInput>()?
        .normalize()
        .map_err(AppError::BadRequest)?;
    let uploaded = match form.files.pop() {
        Some(file) => Some(
            state
                .images()
                .upload("sliders", file.bytes, file.content_type.as_deref())
                .await?,
        ),
        None => None,
    };
    Ok((input, uploaded))
}

#[instrument(skip(state, _admin))]
pub async fn list_sliders(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<Vec<Slider>>> {
    Ok(Json(SliderRepository::new(state.pool()).list_all().await?))
}

/// Multipart: a `data` JSON part plus an `image` file, or an `image_url`
/// inside `data`.
#[instrument(skip(state, _admin, multipart))]
pub async fn create_slider(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Slider>)> {
    let (input, uploaded) = slider_form(&state, multipart).await?;
    let image_url = uploaded
        .or_else(|| input.image_url.clone())
        .ok_or_else(|| AppError::BadRequest("A slider needs an image".to_owned()))?;
    let slider = SliderRepository::new(state.pool())
        .create(&input, &image_url)
        .await?;
    Ok((StatusCode::CREATED, Json(slider)))
}

/// Without a new image the current one is kept.
#[instrument(skip(state, _admin, multipart))]
pub async fn update_slider(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<SliderId>,
    multipart: Multipart,
) -> Result<Json<Slider>> {
    let (input, uploaded) = slider_form(&state, multipart).await?;
    let image_url = uploaded.or_else(|| input.image_url.clone());
    Ok(Json(
        SliderRepository::new(state.pool())
            .update(id, &input, image_url.as_deref())
            .await?,
    ))
}

#[instrument(skip(state, _admin))]
pub async fn delete_slider(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<SliderId>,
) -> Result<StatusCode> {
    SliderRepository::new(state.pool()).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
