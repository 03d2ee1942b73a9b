//! Domain models for the storefront.
//!
//! These are validated domain types, separate from the row structs the
//! repositories decode into.

pub mod address;
pub mod cart;
pub mod contact;
pub mod order;
pub mod product;
pub mod promotion;
pub mod review;
pub mod session;
pub mod user;

pub use address::{Address, AddressInput, ShippingAddress};
pub use cart::{CartLine, WishlistItem};
pub use contact::{ContactInput, ContactMessage};
pub use order::{NewOrder, Order, OrderDetail, OrderItem, OrderLine, OrderTemp};
pub use product::{Facets, Product, ProductCard, ProductInput};
pub use promotion::{Coupon, CouponInput, Offer, OfferInput, Slider, SliderInput};
pub use review::{Review, ReviewInput};
pub use session::{CurrentUser, keys as session_keys};
pub use user::User;
