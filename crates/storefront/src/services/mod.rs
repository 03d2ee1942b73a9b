//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `auth` - Registration, login, one-time codes and password resets
//! - `cart` - Cart and wishlist mutations with stock checks
//! - `catalog` - Product listing, filters and detail pages
//! - `checkout` - Quotes, order placement, payment confirmation, cancellation
//! - `email` - Transactional email (codes, order updates, contact form)
//! - `images` - Product and slider image uploads
//! - `pricing` - Pure offer, coupon and shipping arithmetic

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod email;
pub mod images;
pub mod pricing;
