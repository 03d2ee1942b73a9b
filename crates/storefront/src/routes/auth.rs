//! Authentication route handlers.
//!
//! Email + password accounts. New accounts and password resets are
//! confirmed with a six-digit code sent by email.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_sessions::Session;
use tracing::instrument;

use crate::error::{Result, clear_sentry_user, set_sentry_user};
use crate::middleware::{RequireAuth, clear_current_user, set_current_user};
use crate::models::User;
use crate::services::auth::RegisterInput;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/verify-otp", post(verify_otp))
        .route("/resend-otp", post(resend_otp))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password", post(reset_password))
        .route("/me", get(me))
}

// =============================================================================
// Payloads
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub otp: String,
    pub password: String,
}

/// A user plus a note for the client.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: User,
    pub message: &'static str,
}

// =============================================================================
// Handlers
// =============================================================================

/// Create an unverified account and email a verification code.
#[instrument(skip(state, input), fields(email = %input.email))]
pub async fn register(
    State(state): State<AppState>,
    Json(input): Json<RegisterInput>,
) -> Result<impl IntoResponse> {
    let user = state.auth().register(&input).await?;
    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            user,
            message: "Account created, check your email for the verification code",
        }),
    ))
}

/// Verify the emailed code and log the user in.
#[instrument(skip(state, session, body), fields(email = %body.email))]
pub async fn verify_otp(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<VerifyOtpRequest>,
) -> Result<Json<UserResponse>> {
    let user = state.auth().verify_email(&body.email, &body.otp).await?;
    start_session(&session, &user).await?;
    Ok(Json(UserResponse {
        user,
        message: "Email verified",
    }))
}

/// Send a new verification code.
#[instrument(skip(state, body), fields(email = %body.email))]
pub async fn resend_otp(
    State(state): State<AppState>,
    Json(body): Json<EmailRequest>,
) -> Result<Json<serde_json::Value>> {
    state.auth().resend_verification(&body.email).await?;
    Ok(Json(json!({ "message": "If the account needs verification, a new code is on its way" })))
}

/// Log in with email and password.
#[instrument(skip(state, session, body), fields(email = %body.email))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<LoginRequest>,
) -> Result<Json<UserResponse>> {
    let user = state.auth().login(&body.email, &body.password).await?;
    start_session(&session, &user).await?;
    tracing::info!(user_id = %user.id, "User logged in");
    Ok(Json(UserResponse {
        user,
        message: "Logged in",
    }))
}

/// Log out and drop the session.
#[instrument(skip(session))]
pub async fn logout(session: Session) -> Result<StatusCode> {
    clear_current_user(&session).await?;
    clear_sentry_user();
    Ok(StatusCode::NO_CONTENT)
}

/// Email a password reset code.
#[instrument(skip(state, body), fields(email = %body.email))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(body): Json<EmailRequest>,
) -> Result<Json<serde_json::Value>> {
    state.auth().forgot_password(&body.email).await?;
    Ok(Json(json!({ "message": "If an account exists, a reset code has been sent" })))
}

/// Set a new password with the emailed code.
#[instrument(skip(state, body), fields(email = %body.email))]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(body): Json<ResetPasswordRequest>,
) -> Result<Json<serde_json::Value>> {
    state
        .auth()
        .reset_password(&body.email, &body.otp, &body.password)
        .await?;
    Ok(Json(json!({ "message": "Password updated, you can log in now" })))
}

/// The logged-in user.
pub async fn me(RequireAuth(user): RequireAuth) -> Json<User> {
    Json(user)
}

async fn start_session(session: &Session, user: &User) -> Result<()> {
    set_current_user(session, user).await?;
    set_sentry_user(&user.id, Some(user.email.as_str()));
    Ok(())
}
