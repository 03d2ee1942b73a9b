//! Cart and wishlist types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use aurum_core::Money;

use super::Product;

/// One cart line joined with its product.
#[derive(Debug, Clone, Serialize)]
pub struct CartLine {
    pub product: Product,
    pub quantity: u32,
    pub added_at: DateTime<Utc>,
}

impl CartLine {
    /// Undiscounted line total.
    #[must_use]
    pub fn line_total(&self) -> Money {
        self.product.price * self.quantity
    }

    /// Whether the product can still be sold in this quantity.
    #[must_use]
    pub const fn is_available(&self) -> bool {
        self.product.can_sell(self.quantity)
    }
}

/// A product saved to a wishlist.
#[derive(Debug, Clone, Serialize)]
pub struct WishlistItem {
    pub product: Product,
    pub added_at: DateTime<Utc>,
}
