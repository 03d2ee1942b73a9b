//! Order management.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use serde::Deserialize;
use tracing::instrument;

use aurum_core::{OrderId, OrderStatus};

use crate::db::{OrderRepository, Page, Pagination};
use crate::error::Result;
use crate::middleware::RequireAdmin;
use crate::models::{Order, OrderDetail};
use crate::routes::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/{id}", get(show))
        .route("/{id}/status", post(update_status))
        .route("/{id}/retry-shipment", post(retry_shipment))
}

#[derive(Debug, Deserialize)]
pub struct OrdersQuery {
    pub status: Option<OrderStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: OrderStatus,
    pub reason: Option<String>,
}

#[instrument(skip(state, _admin))]
pub async fn index(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Query(query): Query<OrdersQuery>,
) -> Result<Json<Page<Order>>> {
    let pagination = Pagination::new(query.page, query.per_page, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE);
    Ok(Json(
        OrderRepository::new(state.pool())
            .list(query.status, pagination)
            .await?,
    ))
}

#[instrument(skip(state, _admin))]
pub async fn show(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
) -> Result<Json<OrderDetail>> {
    Ok(Json(state.checkout().detail(id, None).await?))
}

/// Move an order through its lifecycle.
///
/// Shipping, cancellation and return side effects run from here.
#[instrument(skip(state, admin, body), fields(admin_id = %admin.id, to = %body.status))]
pub async fn update_status(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    Json(body): Json<StatusRequest>,
) -> Result<Json<Order>> {
    let order = state
        .checkout()
        .admin_set_status(id, body.status, body.reason.as_deref())
        .await?;
    tracing::info!(order_id = %order.id, status = %order.status, "Order status changed");
    Ok(Json(order))
}

/// Book the Shiprocket shipment again after an earlier failure.
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn retry_shipment(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>> {
    Ok(Json(state.checkout().retry_shipment(id).await?))
}
