//! Contact form inbox.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use serde::Deserialize;
use tracing::instrument;

use aurum_core::ContactMessageId;

use crate::db::{ContactRepository, Page, Pagination};
use crate::error::Result;
use crate::middleware::RequireAdmin;
use crate::models::ContactMessage;
use crate::routes::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/{id}/resolve", post(resolve))
        .route("/{id}/reopen", post(reopen))
}

#[derive(Debug, Deserialize)]
pub struct ContactsQuery {
    #[serde(default)]
    pub unresolved: bool,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[instrument(skip(state, _admin))]
pub async fn index(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Query(query): Query<ContactsQuery>,
) -> Result<Json<Page<ContactMessage>>> {
    let pagination = Pagination::new(query.page, query.per_page, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE);
    Ok(Json(
        ContactRepository::new(state.pool())
            .list(query.unresolved, pagination)
            .await?,
    ))
}

#[instrument(skip(state, _admin))]
pub async fn resolve(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<ContactMessageId>,
) -> Result<Json<ContactMessage>> {
    Ok(Json(
        ContactRepository::new(state.pool())
            .set_resolved(id, true)
            .await?,
    ))
}

#[instrument(skip(state, _admin))]
pub async fn reopen(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<ContactMessageId>,
) -> Result<Json<ContactMessage>> {
    Ok(Json(
        ContactRepository::new(state.pool())
            .set_resolved(id, false)
            .await?,
    ))
}
