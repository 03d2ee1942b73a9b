//! Product management.

use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;
use tracing::instrument;

use aurum_core::ProductId;

use super::UploadForm;
use crate::db::{Page, ProductRepository, RepositoryError};
use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::models::{Product, ProductInput};
use crate::services::catalog::{CatalogQuery, ProductFilter};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index).post(create))
        .route("/{id}", get(show).put(update).delete(deactivate))
        .route("/{id}/active", post(set_active))
        .route("/{id}/stock", post(set_stock))
        .route("/{id}/images", post(upload_images))
}

#[derive(Debug, Deserialize)]
pub struct ActiveRequest {
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct StockRequest {
    pub stock: u32,
}

/// Catalog listing including inactive products.
#[instrument(skip(state, _admin))]
pub async fn index(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Query(query): Query<CatalogQuery>,
) -> Result<Json<Page<Product>>> {
    let mut filter = ProductFilter::from_query(query)?;
    filter.include_inactive = true;
    Ok(Json(ProductRepository::new(state.pool()).search(&filter).await?))
}

#[instrument(skip(state, _admin))]
pub async fn show(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<Product>> {
    ProductRepository::new(state.pool())
        .get_by_id(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Product".to_owned()))
}

#[instrument(skip(state, admin, input), fields(admin_id = %admin.id))]
pub async fn create(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Json(input): Json<ProductInput>,
) -> Result<(StatusCode, Json<Product>)> {
    let input = input.normalize().map_err(AppError::BadRequest)?;
    let product = ProductRepository::new(state.pool()).create(&input).await?;
    tracing::info!(product_id = %product.id, "Product created");
    Ok((StatusCode::CREATED, Json(product)))
}

#[instrument(skip(state, admin, input), fields(admin_id = %admin.id))]
pub async fn update(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    Json(input): Json<ProductInput>,
) -> Result<Json<Product>> {
    let input = input.normalize().map_err(AppError::BadRequest)?;
    Ok(Json(
        ProductRepository::new(state.pool()).update(id, &input).await?,
    ))
}

/// Products are never removed; deleting one hides it from the catalog.
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn deactivate(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<StatusCode> {
    ProductRepository::new(state.pool())
        .set_active(id, false)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, admin, body), fields(admin_id = %admin.id))]
pub async fn set_active(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    Json(body): Json<ActiveRequest>,
) -> Result<Json<Product>> {
    Ok(Json(
        ProductRepository::new(state.pool())
            .set_active(id, body.is_active)
            .await?,
    ))
}

#[instrument(skip(state, admin, body), fields(admin_id = %admin.id))]
pub async fn set_stock(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    Json(body): Json<StockRequest>,
) -> Result<Json<Product>> {
    Ok(Json(
        ProductRepository::new(state.pool())
            .set_stock(id, body.stock)
            .await?,
    ))
}

/// Store every `image`/`images` part and append the URLs to the product.
#[instrument(skip(state, admin, multipart), fields(admin_id = %admin.id))]
pub async fn upload_images(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    multipart: Multipart,
) -> Result<Json<Product>> {
    let products = ProductRepository::new(state.pool());
    if products.get_by_id(id).await?.is_none() {
        return Err(RepositoryError::NotFound.into());
    }

    let form = UploadForm::read(multipart).await?;
    if form.files.is_empty() {
        return Err(AppError::BadRequest("No images uploaded".to_owned()));
    }

    let mut urls = Vec::with_capacity(form.files.len());
    for file in form.files {
        urls.push(
            state
                .images()
                .upload("products", file.bytes, file.content_type.as_deref())
                .await?,
        );
    }

    Ok(Json(products.append_images(id, &urls).await?))
}
