//! Product catalog route handlers.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use serde::Serialize;
use tracing::instrument;

use crate::db::{Page, ProductRepository, RepositoryError, ReviewRepository};
use crate::error::Result;
use crate::middleware::OptionalAuth;
use crate::models::{Facets, ProductCard, Review};
use crate::services::catalog::{CatalogQuery, CatalogService, ProductDetail, ProductFilter};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/facets", get(facets))
        .route("/{slug}", get(show))
        .route("/{slug}/reviews", get(reviews))
}

/// Filtered, sorted, paginated product listing.
#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<CatalogQuery>,
) -> Result<Json<Page<ProductCard>>> {
    let filter = ProductFilter::from_query(query)?;
    Ok(Json(CatalogService::new(state.pool()).list(&filter).await?))
}

/// Distinct filter values for the listing sidebar.
#[instrument(skip(state))]
pub async fn facets(State(state): State<AppState>) -> Result<Json<Facets>> {
    Ok(Json(CatalogService::new(state.pool()).facets().await?))
}

/// Product detail plus whether the visitor may review it.
#[derive(Debug, Serialize)]
pub struct ProductPage {
    #[serde(flatten)]
    pub detail: ProductDetail,
    pub can_review: bool,
}

/// Product detail by slug or numeric id.
#[instrument(skip(state, user))]
pub async fn show(
    OptionalAuth(user): OptionalAuth,
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<ProductPage>> {
    let detail = CatalogService::new(state.pool()).detail(&slug).await?;
    let can_review = match user {
        Some(user) => {
            ReviewRepository::new(state.pool())
                .has_delivered_purchase(user.id, detail.card.product.id)
                .await?
        }
        None => false,
    };
    Ok(Json(ProductPage { detail, can_review }))
}

/// Reviews of a product, newest first.
#[instrument(skip(state))]
pub async fn reviews(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Vec<Review>>> {
    let product = ProductRepository::new(state.pool())
        .get_by_key(&slug)
        .await?
        .filter(|p| p.is_active)
        .ok_or(RepositoryError::NotFound)?;
    Ok(Json(
        ReviewRepository::new(state.pool())
            .list_for_product(product.id)
            .await?,
    ))
}
