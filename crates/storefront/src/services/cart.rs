//! Cart and wishlist mutations.
//!
//! Every write re-reads the product so quantities are checked against the
//! current stock, not whatever the shopper saw when the page loaded.

use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;

use aurum_core::{Money, PaymentMethod, ProductId, UserId};

use crate::config::PricingConfig;
use crate::db::{
    CartRepository, OfferRepository, ProductRepository, RepositoryError, WishlistRepository,
};
use crate::models::{CartLine, Product, WishlistItem};
use crate::services::pricing::{self, PricedLine, Quote};

/// Most units of one product a cart line may hold.
pub const MAX_LINE_QUANTITY: u32 = 10;

/// Errors from cart and wishlist operations.
#[derive(Debug, Error)]
pub enum CartError {
    #[error("quantity must be between 1 and {MAX_LINE_QUANTITY}")]
    InvalidQuantity,

    #[error("product not found")]
    ProductNotFound,

    #[error("{0} is not available right now")]
    ProductUnavailable(String),

    #[error("only {available} of {name} left in stock")]
    InsufficientStock { name: String, available: u32 },

    #[error("product is not in the cart")]
    NotInCart,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// One cart line with its offer discount.
#[derive(Debug, Clone, Serialize)]
pub struct CartLineView {
    #[serde(flatten)]
    pub line: CartLine,
    pub offer_discount: Money,
    pub line_total: Money,
    pub available: bool,
}

/// The cart as the shopper sees it.
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub lines: Vec<CartLineView>,
    pub item_count: u32,
    pub quote: Quote,
}

/// Cart and wishlist operations for one shopper at a time.
pub struct CartService<'a> {
    pool: &'a PgPool,
    pricing: &'a PricingConfig,
}

impl<'a> CartService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, pricing: &'a PricingConfig) -> Self {
        Self { pool, pricing }
    }

    /// The priced cart. The COD surcharge is left out until checkout, where
    /// the payment method is known.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if a query fails.
    pub async fn view(&self, user_id: UserId) -> Result<CartView, CartError> {
        let lines = CartRepository::new(self.pool).lines(user_id).await?;
        let offers = OfferRepository::new(self.pool).list_running().await?;
        let now = Utc::now();

        let priced: Vec<PricedLine> = lines.iter().map(PricedLine::from).collect();
        let quote = pricing::quote(
            &priced,
            &offers,
            None,
            PaymentMethod::Razorpay,
            self.pricing,
            now,
        )
        .unwrap_or_default();

        let lines = lines
            .into_iter()
            .zip(&priced)
            .map(|(line, p)| {
                let offer_discount = pricing::line_offer_discount(p, &offers, now);
                CartLineView {
                    line_total: line.line_total().saturating_sub(offer_discount),
                    available: line.is_available(),
                    offer_discount,
                    line,
                }
            })
            .collect::<Vec<_>>();
        let item_count = lines.iter().map(|l| l.line.quantity).sum();

        Ok(CartView {
            lines,
            item_count,
            quote,
        })
    }

    /// Add units of a product, merging with any existing line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::InvalidQuantity` when the merged quantity leaves
    /// 1..=10, `ProductUnavailable` for inactive products and
    /// `InsufficientStock` when stock is short.
    #[tracing::instrument(skip(self))]
    pub async fn add(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartView, CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity);
        }
        let product = self.product(product_id).await?;
        let carts = CartRepository::new(self.pool);
        let existing = carts.quantity_of(user_id, product_id).await?.unwrap_or(0);
        let total = existing.saturating_add(quantity);
        check_quantity(&product, total)?;

        carts.set_quantity(user_id, product_id, total).await?;
        tracing::debug!(quantity = total, "Cart line updated");
        self.view(user_id).await
    }

    /// Replace a line's quantity; zero removes the line.
    ///
    /// # Errors
    ///
    /// Same as [`Self::add`], plus `NotInCart` when removing an absent line.
    #[tracing::instrument(skip(self))]
    pub async fn set_quantity(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartView, CartError> {
        if quantity == 0 {
            return self.remove(user_id, product_id).await;
        }
        let product = self.product(product_id).await?;
        check_quantity(&product, quantity)?;
        CartRepository::new(self.pool)
            .set_quantity(user_id, product_id, quantity)
            .await?;
        self.view(user_id).await
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::NotInCart` if the product was not in the cart.
    pub async fn remove(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<CartView, CartError> {
        if !CartRepository::new(self.pool)
            .remove(user_id, product_id)
            .await?
        {
            return Err(CartError::NotInCart);
        }
        self.view(user_id).await
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the delete fails.
    pub async fn clear(&self, user_id: UserId) -> Result<(), CartError> {
        CartRepository::new(self.pool).clear(user_id).await?;
        Ok(())
    }

    /// Units in the cart, for the header badge.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the query fails.
    pub async fn count(&self, user_id: UserId) -> Result<i64, CartError> {
        Ok(CartRepository::new(self.pool).count(user_id).await?)
    }

    // =========================================================================
    // Wishlist
    // =========================================================================

    /// Saved products, newest first.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the query fails.
    pub async fn wishlist(&self, user_id: UserId) -> Result<Vec<WishlistItem>, CartError> {
        Ok(WishlistRepository::new(self.pool).list(user_id).await?)
    }

    /// Save a product. Saving it again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `CartError::ProductNotFound` for unknown products.
    pub async fn add_to_wishlist(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Vec<WishlistItem>, CartError> {
        self.product(product_id).await?;
        let wishlist = WishlistRepository::new(self.pool);
        wishlist.add(user_id, product_id).await?;
        Ok(wishlist.list(user_id).await?)
    }

    /// Forget a saved product. Removing an absent product is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the delete fails.
    pub async fn remove_from_wishlist(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Vec<WishlistItem>, CartError> {
        let wishlist = WishlistRepository::new(self.pool);
        wishlist.remove(user_id, product_id).await?;
        Ok(wishlist.list(user_id).await?)
    }

    /// Put one unit of a saved product in the cart and drop it from the
    /// wishlist. The wishlist entry stays if the cart rejects the product.
    ///
    /// # Errors
    ///
    /// Same as [`Self::add`].
    pub async fn move_to_cart(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<CartView, CartError> {
        let view = self.add(user_id, product_id, 1).await?;
        WishlistRepository::new(self.pool)
            .remove(user_id, product_id)
            .await?;
        Ok(view)
    }

    async fn product(&self, product_id: ProductId) -> Result<Product, CartError> {
        ProductRepository::new(self.pool)
            .get_by_id(product_id)
            .await?
            .ok_or(CartError::ProductNotFound)
    }
}

/// Check a line quantity against the per-line cap and the product's stock.
fn check_quantity(product: &Product, quantity: u32) -> Result<(), CartError> {
    if !(1..=MAX_LINE_QUANTITY).contains(&quantity) {
        return Err(CartError::InvalidQuantity);
    }
    if !product.is_active || product.stock == 0 {
        return Err(CartError::ProductUnavailable(product.name.clone()));
    }
    if product.stock < quantity {
        return Err(CartError::InsufficientStock {
            name: product.name.clone(),
            available: product.stock,
        });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use rust_decimal_macros::dec;

    use super::*;

    fn product(stock: u32, is_active: bool) -> Product {
        Product {
            id: ProductId::new(1),
            name: "Temple Jhumka".to_owned(),
            slug: "temple-jhumka".to_owned(),
            description: String::new(),
            category: "Earrings".to_owned(),
            brand: None,
            material: Some("Gold".to_owned()),
            color: None,
            price: Money::from_rupees(4500),
            compare_at_price: None,
            stock,
            weight_grams: 12,
            images: vec![],
            is_active,
            avg_rating: dec!(0),
            review_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_quantity_bounds() {
        let p = product(50, true);
        assert!(matches!(check_quantity(&p, 0), Err(CartError::InvalidQuantity)));
        assert!(check_quantity(&p, 1).is_ok());
        assert!(check_quantity(&p, MAX_LINE_QUANTITY).is_ok());
        assert!(matches!(
            check_quantity(&p, MAX_LINE_QUANTITY + 1),
            Err(CartError::InvalidQuantity)
        ));
    }

    #[test]
    fn test_quantity_never_exceeds_stock() {
        let p = product(3, true);
        assert!(check_quantity(&p, 3).is_ok());
        match check_quantity(&p, 4) {
            Err(CartError::InsufficientStock { available, .. }) => assert_eq!(available, 3),
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
    }

    #[test]
    fn test_inactive_or_sold_out_rejected() {
        assert!(matches!(
            check_quantity(&product(10, false), 1),
            Err(CartError::ProductUnavailable(_))
        ));
        assert!(matches!(
            check_quantity(&product(0, true), 1),
            Err(CartError::ProductUnavailable(_))
        ));
    }
}
