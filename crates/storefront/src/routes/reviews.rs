//! Product reviews by verified buyers.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, post},
};
use tracing::instrument;

use aurum_core::ReviewId;

use crate::db::{ProductRepository, ReviewRepository};
use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::{Review, ReviewInput};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(upsert))
        .route("/{id}", delete(remove))
}

/// Create or replace the caller's review of a product they received.
#[instrument(skip(state, user, input), fields(user_id = %user.id, product_id = %input.product_id))]
pub async fn upsert(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Json(input): Json<ReviewInput>,
) -> Result<Json<Review>> {
    let input = input.normalize().map_err(AppError::BadRequest)?;
    if ProductRepository::new(state.pool())
        .get_by_id(input.product_id)
        .await?
        .is_none()
    {
        return Err(AppError::NotFound("Product".to_owned()));
    }

    let reviews = ReviewRepository::new(state.pool());
    if !reviews
        .has_delivered_purchase(user.id, input.product_id)
        .await?
    {
        return Err(AppError::Forbidden(
            "You can review products from your delivered orders".to_owned(),
        ));
    }

    Ok(Json(reviews.upsert(user.id, &input).await?))
}

/// Delete one of the caller's reviews.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn remove(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<ReviewId>,
) -> Result<StatusCode> {
    ReviewRepository::new(state.pool()).delete(user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
