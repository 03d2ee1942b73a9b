//! Database operations for the storefront `PostgreSQL` database.
//!
//! ## Tables
//!
//! - `users` - Customer and admin accounts
//! - `tower_sessions.session` - Tower-sessions storage
//! - `products`, `reviews` - Catalog
//! - `cart_items`, `wishlist_items` - One row per (user, product)
//! - `addresses` - Saved shipping addresses
//! - `orders`, `order_items` - Placed orders
//! - `order_temps` - Cart snapshots awaiting a gateway capture
//! - `offers`, `coupons`, `coupon_redemptions`, `sliders` - Promotions
//! - `contact_messages` - Contact form submissions
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p aurum-cli -- migrate
//! ```

pub mod addresses;
pub mod cart;
pub mod contacts;
pub mod orders;
pub mod products;
pub mod promotions;
pub mod reports;
pub mod reviews;
pub mod users;

use std::time::Duration;

use secrecy::ExposeSecret;
use serde::Serialize;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use aurum_core::{CouponId, ProductId};

pub use addresses::AddressRepository;
pub use cart::{CartRepository, WishlistRepository};
pub use contacts::ContactRepository;
pub use orders::{OrderRepository, OrderTempRepository};
pub use products::ProductRepository;
pub use promotions::{CouponRepository, OfferRepository, SliderRepository};
pub use reports::ReportRepository;
pub use reviews::ReviewRepository;
pub use users::UserRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// A conditional stock decrement matched no row.
    #[error("insufficient stock for product {0}")]
    InsufficientStock(ProductId),

    /// The shopper redeemed this coupon on another order first.
    #[error("coupon {0} already redeemed")]
    CouponRedeemed(CouponId),

    /// The coupon reached its usage limit.
    #[error("coupon {0} has no uses left")]
    CouponExhausted(CouponId),
}

impl RepositoryError {
    /// Map a unique-violation into `Conflict`, leaving other errors as they are.
    pub(crate) fn conflict_on_unique(err: sqlx::Error, message: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = err
            && db_err.is_unique_violation()
        {
            return Self::Conflict(message.to_owned());
        }
        Self::Database(err)
    }
}

/// One page of a listing.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

impl<T> Page<T> {
    /// Assemble a page from its rows and the unpaged row count.
    #[must_use]
    pub fn new(items: Vec<T>, total: i64, page: u32, per_page: u32) -> Self {
        let per_page = per_page.max(1);
        let total_pages = u32::try_from(total.max(0))
            .unwrap_or(u32::MAX)
            .div_ceil(per_page);
        Self {
            items,
            total,
            page,
            per_page,
            total_pages,
        }
    }

    /// Transform the items, keeping the paging metadata.
    #[must_use]
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
            total_pages: self.total_pages,
        }
    }
}

/// Page number and size, clamped to sane bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Pagination {
    /// Build from optional query values.
    #[must_use]
    pub fn new(page: Option<u32>, per_page: Option<u32>, default: u32, max: u32) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(default).clamp(1, max),
        }
    }

    /// `LIMIT` value.
    #[must_use]
    pub fn limit(self) -> i64 {
        i64::from(self.per_page)
    }

    /// `OFFSET` value.
    #[must_use]
    pub fn offset(self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.per_page)
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Convert a stored `INTEGER` quantity that the schema keeps positive.
pub(crate) fn positive_u32(value: i32, column: &str) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::DataCorruption(format!("negative {column}: {value}")))
}

/// Escape `%`, `_` and `\` so user input matches literally under `LIKE ... ESCAPE '\'`.
pub(crate) fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("gold"), "gold");
        assert_eq!(escape_like("50%_off"), r"50\%\_off");
        assert_eq!(escape_like(r"a\b"), r"a\\b");
    }

    #[test]
    fn test_page_total_pages_rounds_up() {
        let page = Page::new(vec![1, 2, 3], 25, 1, 10);
        assert_eq!(page.total_pages, 3);
        let empty: Page<u8> = Page::new(vec![], 0, 1, 10);
        assert_eq!(empty.total_pages, 0);
    }

    #[test]
    fn test_pagination_clamps() {
        let p = Pagination::new(Some(0), Some(500), 24, 60);
        assert_eq!(
            p,
            Pagination {
                page: 1,
                per_page: 60
            }
        );
        assert_eq!(p.offset(), 0);

        let p = Pagination::new(Some(3), None, 24, 60);
        assert_eq!(p.limit(), 24);
        assert_eq!(p.offset(), 48);
    }

    #[test]
    fn test_page_map_keeps_metadata() {
        let page = Page::new(vec![1, 2], 12, 2, 2).map(|n| n * 10);
        assert_eq!(page.items, vec![10, 20]);
        assert_eq!(page.total_pages, 6);
    }
}
