//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers return `Result<T, AppError>`;
//! the body is always `{"error": "<message>"}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::auth::{AuthError, OtpError};
use crate::services::cart::CartError;
use crate::services::catalog::FilterError;
use crate::services::checkout::CheckoutError;
use crate::services::images::ImageError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Cart or wishlist change rejected.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// Checkout, payment or order change failed.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// Catalog filter rejected.
    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),

    /// Image upload failed.
    #[error("Image error: {0}")]
    Image(#[from] ImageError),

    /// Session store failure.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// User is authenticated but not allowed.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Database(err) => repository_status(err),
            Self::Auth(err) => auth_status(err),
            Self::Cart(err) => match err {
                CartError::ProductNotFound | CartError::NotInCart => StatusCode::NOT_FOUND,
                CartError::InvalidQuantity
                | CartError::ProductUnavailable(_)
                | CartError::InsufficientStock { .. } => StatusCode::BAD_REQUEST,
                CartError::Repository(err) => repository_status(err),
            },
            Self::Checkout(err) => checkout_status(err),
            Self::Filter(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Image(err) => match err {
                ImageError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                ImageError::UnsupportedType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                ImageError::Empty => StatusCode::BAD_REQUEST,
                ImageError::Http(_) | ImageError::Upload(_) => StatusCode::BAD_GATEWAY,
                ImageError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Session(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// Message safe to show the client.
    fn public_message(&self, status: StatusCode) -> String {
        if status == StatusCode::BAD_GATEWAY {
            return "External service error".to_owned();
        }
        if status.is_server_error() {
            return "Internal server error".to_owned();
        }
        match self {
            Self::Database(err) => err.to_string(),
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials => "Invalid email or password".to_owned(),
                AuthError::UserAlreadyExists => {
                    "An account with this email already exists".to_owned()
                }
                AuthError::EmailNotVerified => {
                    "Please verify your email, we sent you a new code".to_owned()
                }
                AuthError::Blocked => "This account has been blocked".to_owned(),
                other => other.to_string(),
            },
            Self::Cart(err) => err.to_string(),
            Self::Checkout(err) => err.to_string(),
            Self::Filter(err) => err.to_string(),
            Self::Image(err) => err.to_string(),
            Self::NotFound(what) => format!("{what} not found"),
            Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::BadRequest(msg)
            | Self::Internal(msg) => msg.clone(),
            Self::RateLimited => "Too many requests, slow down".to_owned(),
            Self::Session(_) => "Session error".to_owned(),
        }
    }
}

fn repository_status(err: &RepositoryError) -> StatusCode {
    match err {
        RepositoryError::NotFound => StatusCode::NOT_FOUND,
        RepositoryError::Conflict(_)
        | RepositoryError::InsufficientStock(_)
        | RepositoryError::CouponRedeemed(_)
        | RepositoryError::CouponExhausted(_) => StatusCode::CONFLICT,
        RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn auth_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        AuthError::UserAlreadyExists => StatusCode::CONFLICT,
        AuthError::EmailNotVerified | AuthError::Blocked => StatusCode::FORBIDDEN,
        AuthError::InvalidEmail(_)
        | AuthError::InvalidPhone(_)
        | AuthError::InvalidName(_)
        | AuthError::WeakPassword(_) => StatusCode::BAD_REQUEST,
        AuthError::Otp(OtpError::Cooldown { .. }) => StatusCode::TOO_MANY_REQUESTS,
        AuthError::Otp(_) => StatusCode::BAD_REQUEST,
        AuthError::Repository(err) => repository_status(err),
        AuthError::PasswordHash => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn checkout_status(err: &CheckoutError) -> StatusCode {
    match err {
        CheckoutError::EmptyCart
        | CheckoutError::Coupon(_)
        | CheckoutError::ReasonRequired
        | CheckoutError::ReturnWindowClosed => StatusCode::BAD_REQUEST,
        CheckoutError::AddressNotFound
        | CheckoutError::OrderNotFound
        | CheckoutError::PaymentNotFound => StatusCode::NOT_FOUND,
        CheckoutError::OutOfStock(_)
        | CheckoutError::NotCancellable(_)
        | CheckoutError::Conflict(_) => StatusCode::CONFLICT,
        CheckoutError::Payment(err) => {
            use crate::payments::PaymentError;
            match err {
                PaymentError::InvalidSignature => StatusCode::BAD_REQUEST,
                PaymentError::NotCompleted(_) => StatusCode::PAYMENT_REQUIRED,
                PaymentError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
                PaymentError::Amount(_) => StatusCode::INTERNAL_SERVER_ERROR,
                PaymentError::Http(_)
                | PaymentError::Api { .. }
                | PaymentError::UnexpectedResponse { .. } => StatusCode::BAD_GATEWAY,
            }
        }
        CheckoutError::ShippingNotConfigured => StatusCode::SERVICE_UNAVAILABLE,
        CheckoutError::Shipping(_) => StatusCode::BAD_GATEWAY,
        CheckoutError::Repository(err) => repository_status(err),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server and upstream errors to Sentry
        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                status = status.as_u16(),
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let message = self.public_message(status);
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::PaymentError;
    use crate::services::pricing::CouponError;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("product-123".to_string());
        assert_eq!(err.to_string(), "Not found: product-123");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            get_status(AppError::NotFound("test".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::Unauthorized("test".to_string())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::Forbidden("test".to_string())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(AppError::RateLimited),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_domain_errors_map_to_statuses() {
        assert_eq!(
            get_status(AuthError::Blocked.into()),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(AuthError::Otp(OtpError::Cooldown { retry_after_secs: 30 }).into()),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            get_status(CartError::InvalidQuantity.into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(CheckoutError::Coupon(CouponError::Expired).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(CheckoutError::OutOfStock("Ring".into()).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(RepositoryError::Conflict("dup".into()).into()),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_upstream_failures_are_bad_gateway() {
        let err: AppError = CheckoutError::Payment(PaymentError::Api {
            gateway: "razorpay",
            status: 500,
            body: "boom".into(),
        })
        .into();
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.public_message(StatusCode::BAD_GATEWAY), "External service error");

        let err: AppError = CheckoutError::Payment(PaymentError::InvalidSignature).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let err = AppError::Database(RepositoryError::DataCorruption("bad row 7".into()));
        let status = err.status();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(status), "Internal server error");
    }
}
