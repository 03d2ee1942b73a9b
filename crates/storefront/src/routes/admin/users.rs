//! Customer accounts.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use serde::Deserialize;
use tracing::instrument;

use aurum_core::UserId;

use crate::db::{Page, Pagination, UserRepository};
use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::models::User;
use crate::routes::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/{id}/block", post(block))
        .route("/{id}/unblock", post(unblock))
}

#[derive(Debug, Deserialize)]
pub struct UsersQuery {
    /// Matches name or email.
    pub q: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[instrument(skip(state, _admin))]
pub async fn index(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Query(query): Query<UsersQuery>,
) -> Result<Json<Page<User>>> {
    let pagination = Pagination::new(query.page, query.per_page, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE);
    Ok(Json(
        UserRepository::new(state.pool())
            .list(query.q.as_deref(), pagination)
            .await?,
    ))
}

#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn block(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<UserId>,
) -> Result<Json<User>> {
    if id == admin.id {
        return Err(AppError::BadRequest("You cannot block yourself".to_owned()));
    }
    let user = UserRepository::new(state.pool()).set_blocked(id, true).await?;
    tracing::info!(user_id = %user.id, "User blocked");
    Ok(Json(user))
}

#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn unblock(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<UserId>,
) -> Result<Json<User>> {
    Ok(Json(
        UserRepository::new(state.pool())
            .set_blocked(id, false)
            .await?,
    ))
}
