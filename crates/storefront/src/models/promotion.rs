//! Offers, coupons and homepage sliders.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use aurum_core::{CouponId, DiscountKind, Money, OfferId, ProductId, SliderId};

/// Largest percentage an offer may take off.
pub const MAX_OFFER_PERCENT: u32 = 90;

/// A time-boxed percentage discount.
///
/// Scope is the product when `product_id` is set, otherwise the category
/// when set, otherwise the whole store.
#[derive(Debug, Clone, Serialize)]
pub struct Offer {
    pub id: OfferId,
    pub title: String,
    pub description: String,
    pub discount_percent: Decimal,
    pub product_id: Option<ProductId>,
    pub category: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Offer {
    /// Whether the offer is enabled and `now` falls inside its window.
    #[must_use]
    pub fn is_running(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.starts_at <= now && now < self.ends_at
    }

    /// Whether the offer covers a product in `category`.
    #[must_use]
    pub fn applies_to(&self, product_id: ProductId, category: &str) -> bool {
        match (self.product_id, &self.category) {
            (Some(id), _) => id == product_id,
            (None, Some(c)) => c.eq_ignore_ascii_case(category),
            (None, None) => true,
        }
    }
}

/// Admin payload for an offer.
#[derive(Debug, Clone, Deserialize)]
pub struct OfferInput {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub discount_percent: Decimal,
    pub product_id: Option<ProductId>,
    pub category: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl OfferInput {
    /// Check the percentage range and date window.
    ///
    /// # Errors
    ///
    /// Returns a message describing the first invalid field.
    pub fn normalize(mut self) -> Result<Self, String> {
        self.title = self.title.trim().to_owned();
        if self.title.is_empty() {
            return Err("title is required".to_owned());
        }
        if self.discount_percent <= Decimal::ZERO
            || self.discount_percent > Decimal::from(MAX_OFFER_PERCENT)
        {
            return Err(format!(
                "discount_percent must be above 0 and at most {MAX_OFFER_PERCENT}"
            ));
        }
        if self.ends_at <= self.starts_at {
            return Err("ends_at must be after starts_at".to_owned());
        }
        self.category = self
            .category
            .map(|c| c.trim().to_owned())
            .filter(|c| !c.is_empty());
        Ok(self)
    }
}

/// A redeemable discount code.
#[derive(Debug, Clone, Serialize)]
pub struct Coupon {
    pub id: CouponId,
    pub code: String,
    pub description: String,
    pub kind: DiscountKind,
    pub value: Decimal,
    pub min_order: Money,
    pub max_discount: Option<Money>,
    pub usage_limit: Option<u32>,
    pub used_count: u32,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Admin payload for a coupon.
#[derive(Debug, Clone, Deserialize)]
pub struct CouponInput {
    pub code: String,
    #[serde(default)]
    pub description: String,
    pub kind: DiscountKind,
    pub value: Decimal,
    #[serde(default)]
    pub min_order: Money,
    pub max_discount: Option<Money>,
    pub usage_limit: Option<u32>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl CouponInput {
    /// Upper-case the code and check the value against its kind.
    ///
    /// # Errors
    ///
    /// Returns a message describing the first invalid field.
    pub fn normalize(mut self) -> Result<Self, String> {
        self.code = normalize_code(&self.code);
        if self.code.is_empty() {
            return Err("code is required".to_owned());
        }
        if !self
            .code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err("code may only contain letters, digits, '-' and '_'".to_owned());
        }
        if self.value <= Decimal::ZERO {
            return Err("value must be positive".to_owned());
        }
        if self.kind == DiscountKind::Percent && self.value > Decimal::ONE_HUNDRED {
            return Err("percent coupons cannot exceed 100".to_owned());
        }
        if self.usage_limit == Some(0) {
            return Err("usage_limit must be positive when set".to_owned());
        }
        Ok(self)
    }
}

/// Coupon codes compare case-insensitively and are stored upper-case.
#[must_use]
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// A homepage banner.
#[derive(Debug, Clone, Serialize)]
pub struct Slider {
    pub id: SliderId,
    pub title: String,
    pub subtitle: String,
    pub image_url: String,
    pub link_url: Option<String>,
    pub position: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Admin payload for a slider. The image arrives separately as an upload.
#[derive(Debug, Clone, Deserialize)]
pub struct SliderInput {
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    pub image_url: Option<String>,
    pub link_url: Option<String>,
    #[serde(default)]
    pub position: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl SliderInput {
    /// Trim text fields; blank optional URLs become `None`.
    ///
    /// # Errors
    ///
    /// Returns a message describing the first invalid field.
    pub fn normalize(mut self) -> Result<Self, String> {
        self.title = self.title.trim().to_owned();
        self.subtitle = self.subtitle.trim().to_owned();
        if self.title.is_empty() {
            return Err("title is required".to_owned());
        }
        self.image_url = self
            .image_url
            .map(|u| u.trim().to_owned())
            .filter(|u| !u.is_empty());
        self.link_url = self
            .link_url
            .map(|u| u.trim().to_owned())
            .filter(|u| !u.is_empty());
        Ok(self)
    }
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;
    use rust_decimal_macros::dec;

    use super::*;

    fn offer(product_id: Option<i32>, category: Option<&str>) -> Offer {
        let now = Utc::now();
        Offer {
            id: OfferId::new(1),
            title: "Festive".to_owned(),
            description: String::new(),
            discount_percent: dec!(10),
            product_id: product_id.map(ProductId::new),
            category: category.map(str::to_owned),
            starts_at: now - Duration::days(1),
            ends_at: now + Duration::days(1),
            is_active: true,
            created_at: now,
        }
    }

    #[test]
    fn test_offer_scope() {
        let sitewide = offer(None, None);
        assert!(sitewide.applies_to(ProductId::new(9), "Rings"));

        let category = offer(None, Some("rings"));
        assert!(category.applies_to(ProductId::new(9), "Rings"));
        assert!(!category.applies_to(ProductId::new(9), "Earrings"));

        let product = offer(Some(3), Some("Rings"));
        assert!(product.applies_to(ProductId::new(3), "Bangles"));
        assert!(!product.applies_to(ProductId::new(9), "Rings"));
    }

    #[test]
    fn test_offer_window() {
        let mut o = offer(None, None);
        assert!(o.is_running(Utc::now()));
        assert!(!o.is_running(o.ends_at));
        o.is_active = false;
        assert!(!o.is_running(Utc::now()));
    }

    #[test]
    fn test_coupon_code_is_uppercased() {
        let input = CouponInput {
            code: " diwali-10 ".to_owned(),
            description: String::new(),
            kind: DiscountKind::Percent,
            value: dec!(10),
            min_order: Money::ZERO,
            max_discount: None,
            usage_limit: None,
            expires_at: None,
            is_active: true,
        };
        assert_eq!(input.normalize().unwrap().code, "DIWALI-10");
    }

    #[test]
    fn test_coupon_rejects_percent_over_100() {
        let input = CouponInput {
            code: "BIG".to_owned(),
            description: String::new(),
            kind: DiscountKind::Percent,
            value: dec!(150),
            min_order: Money::ZERO,
            max_discount: None,
            usage_limit: None,
            expires_at: None,
            is_active: true,
        };
        assert!(input.normalize().is_err());
    }
}
