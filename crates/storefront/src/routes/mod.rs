//! HTTP route handlers for the storefront.
//!
//! Every endpoint speaks JSON. Errors come back as `{"error": "..."}` with a
//! matching status code (see [`crate::error::AppError`]).
//!
//! # Route Structure
//!
//! ```text
//! GET  /health, /health/ready
//!
//! # Auth (rate limited)
//! POST /auth/register | verify-otp | resend-otp | login | logout
//! POST /auth/forgot-password | reset-password
//! GET  /auth/me
//!
//! # Catalog
//! GET  /product                 - Filtered listing
//! GET  /product/facets          - Filter values
//! GET  /product/{slug}          - Detail (slug or id) with reviews
//! GET  /product/{slug}/reviews  - Reviews only
//!
//! # Cart and wishlist (login required)
//! GET  /cart  GET /cart/count  POST /cart/add | update | remove  DELETE /cart
//! GET  /wishlist  POST /wishlist/add | remove | move-to-cart
//!
//! # Account (login required)
//! GET/POST /address  PUT/DELETE /address/{id}  POST /address/{id}/default
//! POST /review  DELETE /review/{id}
//!
//! # Orders (login required)
//! GET  /order  GET /order/{id}  GET /order/{id}/track
//! POST /order/quote | checkout
//! POST /order/razorpay/verify | paypal/capture | stripe/confirm
//! POST /order/{id}/cancel | return
//!
//! # Public content
//! POST /contact  GET /slider  GET /offers  POST /offers/coupon/validate
//!
//! # Gateways
//! POST /webhooks/razorpay | stripe
//!
//! # Back-office (admin only)
//! /admin/dashboard, products, orders, users, offers, coupons, sliders, contacts
//! ```

pub mod addresses;
pub mod admin;
pub mod auth;
pub mod cart;
pub mod contact;
pub mod health;
pub mod orders;
pub mod products;
pub mod promotions;
pub mod reviews;
pub mod webhooks;

use axum::Router;
use serde::Deserialize;

use crate::db::Pagination;
use crate::middleware::auth_rate_limiter;
use crate::state::AppState;

/// Default page size for account and admin listings.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Largest page size for account and admin listings.
pub const MAX_PAGE_SIZE: u32 = 100;

/// `?page=&per_page=` query parameters.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PageQuery {
    #[must_use]
    pub fn pagination(self) -> Pagination {
        Pagination::new(self.page, self.per_page, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE)
    }
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .nest("/auth", auth::router().layer(auth_rate_limiter()))
        .nest("/product", products::router())
        .nest("/cart", cart::cart_router())
        .nest("/wishlist", cart::wishlist_router())
        .nest("/address", addresses::router())
        .nest("/review", reviews::router())
        .nest("/order", orders::router())
        .nest("/webhooks", webhooks::router())
        .nest("/admin", admin::router())
        .merge(contact::router())
        .merge(promotions::router())
}
