//! Cart pricing: offers, coupons, shipping and the final quote.
//!
//! Everything here is pure. Callers load the cart, running offers and the
//! coupon, then hand them over together with "now" so results are
//! reproducible in tests.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use aurum_core::{DiscountKind, Money, PaymentMethod, ProductId};

use crate::config::PricingConfig;
use crate::models::{CartLine, Coupon, Offer, OrderLine, Product, ProductCard};

/// The input to pricing: what is being bought, at what list price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLine {
    pub product_id: ProductId,
    pub category: String,
    pub unit_price: Money,
    pub quantity: u32,
}

impl From<&CartLine> for PricedLine {
    fn from(line: &CartLine) -> Self {
        Self {
            product_id: line.product.id,
            category: line.product.category.clone(),
            unit_price: line.product.price,
            quantity: line.quantity,
        }
    }
}

impl From<&OrderLine> for PricedLine {
    fn from(line: &OrderLine) -> Self {
        Self {
            product_id: line.product_id,
            category: line.category.clone(),
            unit_price: line.unit_price,
            quantity: line.quantity,
        }
    }
}

/// Priced breakdown of a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Quote {
    pub subtotal: Money,
    pub offer_discount: Money,
    pub coupon_discount: Money,
    pub shipping: Money,
    pub cod_charge: Money,
    pub total: Money,
}

impl Quote {
    /// Subtotal after offer and coupon discounts, before shipping.
    #[must_use]
    pub fn discounted_subtotal(&self) -> Money {
        self.subtotal
            .saturating_sub(self.offer_discount)
            .saturating_sub(self.coupon_discount)
    }
}

/// Why a coupon cannot be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponError {
    #[error("coupon code not recognised")]
    Unknown,
    #[error("coupon is no longer active")]
    Inactive,
    #[error("coupon has expired")]
    Expired,
    #[error("order must be at least {0} to use this coupon")]
    MinimumNotMet(Money),
    #[error("coupon usage limit reached")]
    UsageLimitReached,
    #[error("you have already used this coupon")]
    AlreadyRedeemed,
}

/// A coupon together with whether the shopper already redeemed it.
#[derive(Debug, Clone, Copy)]
pub struct AppliedCoupon<'a> {
    pub coupon: &'a Coupon,
    pub already_redeemed: bool,
}

/// The best running offer for a product; the largest percentage wins.
#[must_use]
pub fn best_offer<'a>(
    offers: &'a [Offer],
    product_id: ProductId,
    category: &str,
    now: DateTime<Utc>,
) -> Option<&'a Offer> {
    offers
        .iter()
        .filter(|o| o.is_running(now) && o.applies_to(product_id, category))
        .max_by(|a, b| a.discount_percent.cmp(&b.discount_percent))
}

/// Offer discount for a whole line.
#[must_use]
pub fn line_offer_discount(line: &PricedLine, offers: &[Offer], now: DateTime<Utc>) -> Money {
    best_offer(offers, line.product_id, &line.category, now).map_or(Money::ZERO, |offer| {
        (line.unit_price * line.quantity).percent_of(offer.discount_percent)
    })
}

/// Discount a coupon gives on `subtotal` (already net of offers).
///
/// # Errors
///
/// Returns a [`CouponError`] when the coupon cannot be used.
pub fn coupon_discount(
    applied: AppliedCoupon<'_>,
    subtotal: Money,
    now: DateTime<Utc>,
) -> Result<Money, CouponError> {
    let coupon = applied.coupon;
    if !coupon.is_active {
        return Err(CouponError::Inactive);
    }
    if coupon.expires_at.is_some_and(|at| at <= now) {
        return Err(CouponError::Expired);
    }
    if subtotal < coupon.min_order {
        return Err(CouponError::MinimumNotMet(coupon.min_order));
    }
    if coupon
        .usage_limit
        .is_some_and(|limit| coupon.used_count >= limit)
    {
        return Err(CouponError::UsageLimitReached);
    }
    if applied.already_redeemed {
        return Err(CouponError::AlreadyRedeemed);
    }

    let raw = match coupon.kind {
        DiscountKind::Percent => {
            let amount = subtotal.percent_of(coupon.value);
            coupon.max_discount.map_or(amount, |cap| amount.min(cap))
        }
        DiscountKind::Flat => Money::new(coupon.value).unwrap_or(Money::ZERO),
    };
    Ok(raw.min(subtotal))
}

/// Flat shipping below the free-shipping threshold.
#[must_use]
pub fn shipping_charge(config: &PricingConfig, discounted_subtotal: Money) -> Money {
    if discounted_subtotal >= config.free_shipping_threshold {
        Money::ZERO
    } else {
        config.shipping_charge
    }
}

/// Price a cart.
///
/// # Errors
///
/// Returns a [`CouponError`] when a coupon is supplied but cannot be used.
pub fn quote(
    lines: &[PricedLine],
    offers: &[Offer],
    coupon: Option<AppliedCoupon<'_>>,
    method: PaymentMethod,
    config: &PricingConfig,
    now: DateTime<Utc>,
) -> Result<Quote, CouponError> {
    let subtotal: Money = lines.iter().map(|l| l.unit_price * l.quantity).sum();
    let offer_discount: Money = lines
        .iter()
        .map(|l| line_offer_discount(l, offers, now))
        .sum();
    let after_offers = subtotal.saturating_sub(offer_discount);

    let coupon_discount = match coupon {
        Some(applied) => coupon_discount(applied, after_offers, now)?,
        None => Money::ZERO,
    };
    let discounted = after_offers.saturating_sub(coupon_discount);

    let shipping = if lines.is_empty() {
        Money::ZERO
    } else {
        shipping_charge(config, discounted)
    };
    let cod_charge = if method == PaymentMethod::Cod && !lines.is_empty() {
        config.cod_charge
    } else {
        Money::ZERO
    };

    Ok(Quote {
        subtotal,
        offer_discount,
        coupon_discount,
        shipping,
        cod_charge,
        total: discounted + shipping + cod_charge,
    })
}

/// Snapshot cart lines into order lines with their offer discounts.
#[must_use]
pub fn order_lines(cart: &[CartLine], offers: &[Offer], now: DateTime<Utc>) -> Vec<OrderLine> {
    cart.iter()
        .map(|line| OrderLine {
            product_id: line.product.id,
            name: line.product.name.clone(),
            category: line.product.category.clone(),
            image: line.product.primary_image().map(str::to_owned),
            unit_price: line.product.price,
            discount: line_offer_discount(&PricedLine::from(line), offers, now),
            quantity: line.quantity,
            weight_grams: line.product.weight_grams,
        })
        .collect()
}

/// A listing card with the best running offer applied.
#[must_use]
pub fn product_card(product: Product, offers: &[Offer], now: DateTime<Utc>) -> ProductCard {
    let offer_percent: Option<Decimal> =
        best_offer(offers, product.id, &product.category, now).map(|o| o.discount_percent);
    let offer_price = offer_percent.map(|p| product.price.saturating_sub(product.price.percent_of(p)));
    ProductCard {
        product,
        offer_percent,
        offer_price,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;
    use rust_decimal_macros::dec;

    use aurum_core::{CouponId, OfferId};

    use super::*;

    fn config() -> PricingConfig {
        PricingConfig {
            free_shipping_threshold: Money::from_rupees(999),
            shipping_charge: Money::from_rupees(79),
            cod_charge: Money::from_rupees(49),
        }
    }

    fn line(id: i32, category: &str, price: u32, quantity: u32) -> PricedLine {
        PricedLine {
            product_id: ProductId::new(id),
            category: category.to_owned(),
            unit_price: Money::from_rupees(price),
            quantity,
        }
    }

    fn offer(percent: Decimal, product_id: Option<i32>, category: Option<&str>) -> Offer {
        let now = Utc::now();
        Offer {
            id: OfferId::new(1),
            title: "Sale".to_owned(),
            description: String::new(),
            discount_percent: percent,
            product_id: product_id.map(ProductId::new),
            category: category.map(str::to_owned),
            starts_at: now - Duration::hours(1),
            ends_at: now + Duration::hours(1),
            is_active: true,
            created_at: now,
        }
    }

    fn coupon(kind: DiscountKind, value: Decimal) -> Coupon {
        Coupon {
            id: CouponId::new(1),
            code: "WELCOME".to_owned(),
            description: String::new(),
            kind,
            value,
            min_order: Money::from_rupees(500),
            max_discount: None,
            usage_limit: None,
            used_count: 0,
            expires_at: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_largest_offer_wins() {
        let offers = vec![
            offer(dec!(10), None, None),
            offer(dec!(25), None, Some("Rings")),
            offer(dec!(15), Some(1), None),
        ];
        let now = Utc::now();
        let best = best_offer(&offers, ProductId::new(1), "Rings", now).unwrap();
        assert_eq!(best.discount_percent, dec!(25));
        let best = best_offer(&offers, ProductId::new(1), "Bangles", now).unwrap();
        assert_eq!(best.discount_percent, dec!(15));
    }

    #[test]
    fn test_expired_offer_ignored() {
        let mut expired = offer(dec!(50), None, None);
        expired.ends_at = Utc::now() - Duration::minutes(1);
        let offers = vec![expired];
        assert!(best_offer(&offers, ProductId::new(1), "Rings", Utc::now()).is_none());
    }

    #[test]
    fn test_quote_without_discounts_adds_shipping() {
        let q = quote(
            &[line(1, "Rings", 400, 1)],
            &[],
            None,
            PaymentMethod::Razorpay,
            &config(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(q.subtotal, Money::from_rupees(400));
        assert_eq!(q.shipping, Money::from_rupees(79));
        assert_eq!(q.cod_charge, Money::ZERO);
        assert_eq!(q.total, Money::from_rupees(479));
    }

    #[test]
    fn test_quote_free_shipping_and_cod_charge() {
        let q = quote(
            &[line(1, "Rings", 600, 2)],
            &[],
            None,
            PaymentMethod::Cod,
            &config(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(q.shipping, Money::ZERO);
        assert_eq!(q.cod_charge, Money::from_rupees(49));
        assert_eq!(q.total, Money::from_rupees(1249));
    }

    #[test]
    fn test_shipping_uses_post_discount_subtotal() {
        let offers = vec![offer(dec!(20), None, None)];
        let q = quote(
            &[line(1, "Rings", 1000, 1)],
            &offers,
            None,
            PaymentMethod::Stripe,
            &config(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(q.offer_discount, Money::from_rupees(200));
        assert_eq!(q.shipping, Money::from_rupees(79));
        assert_eq!(q.total, Money::from_rupees(879));
    }

    #[test]
    fn test_percent_coupon_capped() {
        let mut c = coupon(DiscountKind::Percent, dec!(50));
        c.max_discount = Some(Money::from_rupees(300));
        let applied = AppliedCoupon {
            coupon: &c,
            already_redeemed: false,
        };
        let discount = coupon_discount(applied, Money::from_rupees(2000), Utc::now()).unwrap();
        assert_eq!(discount, Money::from_rupees(300));
    }

    #[test]
    fn test_flat_coupon_never_exceeds_subtotal() {
        let mut c = coupon(DiscountKind::Flat, dec!(1000));
        c.min_order = Money::ZERO;
        let applied = AppliedCoupon {
            coupon: &c,
            already_redeemed: false,
        };
        let discount = coupon_discount(applied, Money::from_rupees(600), Utc::now()).unwrap();
        assert_eq!(discount, Money::from_rupees(600));
    }

    #[test]
    fn test_coupon_rejections() {
        let now = Utc::now();
        let subtotal = Money::from_rupees(1000);

        let mut c = coupon(DiscountKind::Flat, dec!(100));
        c.is_active = false;
        let applied = AppliedCoupon {
            coupon: &c,
            already_redeemed: false,
        };
        assert_eq!(coupon_discount(applied, subtotal, now), Err(CouponError::Inactive));

        let mut c = coupon(DiscountKind::Flat, dec!(100));
        c.expires_at = Some(now - Duration::days(1));
        let applied = AppliedCoupon {
            coupon: &c,
            already_redeemed: false,
        };
        assert_eq!(coupon_discount(applied, subtotal, now), Err(CouponError::Expired));

        let c = coupon(DiscountKind::Flat, dec!(100));
        let applied = AppliedCoupon {
            coupon: &c,
            already_redeemed: false,
        };
        assert_eq!(
            coupon_discount(applied, Money::from_rupees(100), now),
            Err(CouponError::MinimumNotMet(Money::from_rupees(500)))
        );

        let mut c = coupon(DiscountKind::Flat, dec!(100));
        c.usage_limit = Some(3);
        c.used_count = 3;
        let applied = AppliedCoupon {
            coupon: &c,
            already_redeemed: false,
        };
        assert_eq!(coupon_discount(applied, subtotal, now), Err(CouponError::UsageLimitReached));

        let c = coupon(DiscountKind::Flat, dec!(100));
        let applied = AppliedCoupon {
            coupon: &c,
            already_redeemed: true,
        };
        assert_eq!(coupon_discount(applied, subtotal, now), Err(CouponError::AlreadyRedeemed));
    }

    #[test]
    fn test_coupon_minimum_checked_after_offers() {
        let offers = vec![offer(dec!(50), None, None)];
        let c = coupon(DiscountKind::Flat, dec!(100));
        let result = quote(
            &[line(1, "Rings", 800, 1)],
            &offers,
            Some(AppliedCoupon {
                coupon: &c,
                already_redeemed: false,
            }),
            PaymentMethod::Razorpay,
            &config(),
            Utc::now(),
        );
        assert!(matches!(result, Err(CouponError::MinimumNotMet(_))));
    }

    #[test]
    fn test_empty_cart_quotes_zero() {
        let q = quote(&[], &[], None, PaymentMethod::Cod, &config(), Utc::now()).unwrap();
        assert_eq!(q, Quote::default());
    }
}
