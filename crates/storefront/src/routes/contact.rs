//! Contact form route handler.

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use tracing::instrument;

use crate::db::ContactRepository;
use crate::error::{AppError, Result};
use crate::models::{ContactInput, ContactMessage};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/contact", post(submit))
}

/// Store a contact form submission and notify the store inbox.
///
/// The notification is sent in the background; a mail failure never
/// loses the stored message.
#[instrument(skip(state, input), fields(email = %input.email))]
pub async fn submit(
    State(state): State<AppState>,
    Json(input): Json<ContactInput>,
) -> Result<(StatusCode, Json<ContactMessage>)> {
    let input = input.normalize().map_err(AppError::BadRequest)?;
    let message = ContactRepository::new(state.pool()).create(&input).await?;
    tracing::info!(contact_id = %message.id, "Contact message received");

    if let Some(admin) = state.config().admin_email.clone() {
        let email = state.email().clone();
        let stored = message.clone();
        tokio::spawn(async move {
            if let Err(e) = email
                .send_contact_notification(admin.as_str(), &stored)
                .await
            {
                tracing::warn!(contact_id = %stored.id, error = %e, "Contact notification failed");
            }
        });
    }

    Ok((StatusCode::CREATED, Json(message)))
}
