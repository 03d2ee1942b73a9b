//! Catalog product types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use aurum_core::{Money, ProductId};

/// A catalog product.
#[derive(Debug, Clone, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub category: String,
    pub brand: Option<String>,
    pub material: Option<String>,
    pub color: Option<String>,
    pub price: Money,
    pub compare_at_price: Option<Money>,
    pub stock: u32,
    pub weight_grams: u32,
    pub images: Vec<String>,
    pub is_active: bool,
    pub avg_rating: Decimal,
    pub review_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Whether at least `quantity` units can be sold right now.
    #[must_use]
    pub const fn can_sell(&self, quantity: u32) -> bool {
        self.is_active && self.stock >= quantity
    }

    /// First image, used for thumbnails and order snapshots.
    #[must_use]
    pub fn primary_image(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }
}

/// A product as shown in listings, with its best running offer applied.
#[derive(Debug, Clone, Serialize)]
pub struct ProductCard {
    #[serde(flatten)]
    pub product: Product,
    pub offer_percent: Option<Decimal>,
    pub offer_price: Option<Money>,
}

/// Distinct filter values across active products.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Facets {
    pub categories: Vec<String>,
    pub brands: Vec<String>,
    pub materials: Vec<String>,
    pub colors: Vec<String>,
    pub min_price: Option<Money>,
    pub max_price: Option<Money>,
}

/// Admin input for creating or replacing a product.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductInput {
    pub name: String,
    /// Derived from `name` when absent.
    pub slug: Option<String>,
    #[serde(default)]
    pub description: String,
    pub category: String,
    pub brand: Option<String>,
    pub material: Option<String>,
    pub color: Option<String>,
    pub price: Money,
    pub compare_at_price: Option<Money>,
    #[serde(default)]
    pub stock: u32,
    #[serde(default = "default_weight_grams")]
    pub weight_grams: u32,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

const fn default_weight_grams() -> u32 {
    50
}

const fn default_true() -> bool {
    true
}

impl ProductInput {
    /// Trim text fields and check required values.
    ///
    /// # Errors
    ///
    /// Returns a message describing the first invalid field.
    pub fn normalize(mut self) -> Result<Self, String> {
        self.name = self.name.trim().to_owned();
        self.category = self.category.trim().to_owned();
        if self.name.is_empty() {
            return Err("name is required".to_owned());
        }
        if self.category.is_empty() {
            return Err("category is required".to_owned());
        }
        if self.weight_grams == 0 {
            return Err("weight_grams must be positive".to_owned());
        }
        if let Some(compare_at) = self.compare_at_price
            && compare_at < self.price
        {
            return Err("compare_at_price cannot be below price".to_owned());
        }

        let slug = slugify(self.slug.as_deref().unwrap_or(&self.name));
        if slug.is_empty() {
            return Err("slug must contain letters or digits".to_owned());
        }
        self.slug = Some(slug);
        self.brand = non_empty(self.brand);
        self.material = non_empty(self.material);
        self.color = non_empty(self.color);
        Ok(self)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// Lowercase, ASCII alphanumerics separated by single dashes.
#[must_use]
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn input() -> ProductInput {
        ProductInput {
            name: "  Kundan Choker Set ".to_owned(),
            slug: None,
            description: String::new(),
            category: "Necklaces".to_owned(),
            brand: Some("  ".to_owned()),
            material: Some("Gold Plated".to_owned()),
            color: None,
            price: Money::from_rupees(4999),
            compare_at_price: Some(Money::from_rupees(6999)),
            stock: 4,
            weight_grams: 120,
            images: vec![],
            is_active: true,
        }
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Kundan Choker Set"), "kundan-choker-set");
        assert_eq!(slugify("  22K -- Gold!! Ring "), "22k-gold-ring");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_normalize_derives_slug_and_drops_blank_fields() {
        let product = input().normalize().unwrap();
        assert_eq!(product.name, "Kundan Choker Set");
        assert_eq!(product.slug.as_deref(), Some("kundan-choker-set"));
        assert_eq!(product.brand, None);
        assert_eq!(product.material.as_deref(), Some("Gold Plated"));
    }

    #[test]
    fn test_normalize_rejects_compare_at_below_price() {
        let mut bad = input();
        bad.compare_at_price = Some(Money::from_rupees(100));
        assert!(bad.normalize().is_err());
    }
}
