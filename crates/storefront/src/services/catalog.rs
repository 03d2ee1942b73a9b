//! Catalog browsing: query-string filters and the listing/detail views.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;

use aurum_core::{Money, Rating};

use crate::db::{OfferRepository, Page, Pagination, ProductRepository, RepositoryError, ReviewRepository};
use crate::models::{Facets, ProductCard, Review};
use crate::services::pricing;

/// Default page size for product listings.
pub const DEFAULT_PER_PAGE: u32 = 24;

/// Largest page size a client may ask for.
pub const MAX_PER_PAGE: u32 = 60;

/// Raw catalog query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogQuery {
    pub category: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub brand: Option<String>,
    pub material: Option<String>,
    pub color: Option<String>,
    pub rating: Option<i64>,
    pub q: Option<String>,
    pub sort: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Rejected catalog filters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("prices cannot be negative")]
    NegativePrice,
    #[error("min_price cannot exceed max_price")]
    InvertedPriceRange,
    #[error("rating must be between 1 and 5")]
    InvalidRating,
    #[error("unknown sort order: {0}")]
    UnknownSort(String),
}

/// Listing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    Rating,
    Name,
}

impl ProductSort {
    /// `ORDER BY` clause. `id` breaks ties so paging is stable.
    #[must_use]
    pub const fn order_by(self) -> &'static str {
        match self {
            Self::Newest => "created_at DESC, id DESC",
            Self::PriceAsc => "price ASC, id ASC",
            Self::PriceDesc => "price DESC, id DESC",
            Self::Rating => "avg_rating DESC, review_count DESC, id DESC",
            Self::Name => "name ASC, id ASC",
        }
    }
}

impl std::str::FromStr for ProductSort {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "newest" => Ok(Self::Newest),
            "price_asc" => Ok(Self::PriceAsc),
            "price_desc" => Ok(Self::PriceDesc),
            "rating" => Ok(Self::Rating),
            "name" => Ok(Self::Name),
            other => Err(FilterError::UnknownSort(other.to_owned())),
        }
    }
}

/// Validated product filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub min_price: Option<Money>,
    pub max_price: Option<Money>,
    /// Lower-cased; matches any.
    pub brands: Vec<String>,
    pub materials: Vec<String>,
    pub colors: Vec<String>,
    pub min_rating: Option<Rating>,
    pub q: Option<String>,
    pub sort: ProductSort,
    pub pagination: Pagination,
    /// Admin listings also show inactive products.
    pub include_inactive: bool,
}

impl ProductFilter {
    /// Validate a raw query.
    ///
    /// # Errors
    ///
    /// Returns a [`FilterError`] for negative or inverted prices, a rating
    /// outside 1..=5 or an unknown sort key.
    pub fn from_query(query: CatalogQuery) -> Result<Self, FilterError> {
        let min_price = query.min_price.map(to_money).transpose()?;
        let max_price = query.max_price.map(to_money).transpose()?;
        if let (Some(min), Some(max)) = (min_price, max_price)
            && min > max
        {
            return Err(FilterError::InvertedPriceRange);
        }

        let min_rating = query
            .rating
            .map(Rating::new)
            .transpose()
            .map_err(|_| FilterError::InvalidRating)?;

        let sort = query.sort.as_deref().unwrap_or_default().parse()?;

        Ok(Self {
            category: trimmed(query.category),
            min_price,
            max_price,
            brands: split_list(query.brand.as_deref()),
            materials: split_list(query.material.as_deref()),
            colors: split_list(query.color.as_deref()),
            min_rating,
            q: trimmed(query.q),
            sort,
            pagination: Pagination::new(query.page, query.per_page, DEFAULT_PER_PAGE, MAX_PER_PAGE),
            include_inactive: false,
        })
    }
}

fn to_money(value: Decimal) -> Result<Money, FilterError> {
    Money::new(value).map_err(|_| FilterError::NegativePrice)
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// Split `a, b ,c` into lower-cased, de-duplicated entries.
fn split_list(value: Option<&str>) -> Vec<String> {
    let mut items: Vec<String> = value
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    items.sort_unstable();
    items.dedup();
    items
}

/// Product detail page payload.
#[derive(Debug, Clone, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub card: ProductCard,
    pub reviews: Vec<Review>,
}

/// Read-side catalog operations.
pub struct CatalogService<'a> {
    pool: &'a PgPool,
}

impl<'a> CatalogService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Filtered product listing with offer prices.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if a query fails.
    pub async fn list(&self, filter: &ProductFilter) -> Result<Page<ProductCard>, RepositoryError> {
        let page = ProductRepository::new(self.pool).search(filter).await?;
        let offers = OfferRepository::new(self.pool).list_running().await?;
        let now = Utc::now();
        Ok(page.map(|p| pricing::product_card(p, &offers, now)))
    }

    /// Distinct filter values.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the query fails.
    pub async fn facets(&self) -> Result<Facets, RepositoryError> {
        ProductRepository::new(self.pool).facets().await
    }

    /// An active product by slug or numeric id, with reviews and its offer price.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` for unknown or inactive products.
    pub async fn detail(&self, key: &str) -> Result<ProductDetail, RepositoryError> {
        let product = ProductRepository::new(self.pool)
            .get_by_key(key)
            .await?
            .filter(|p| p.is_active)
            .ok_or(RepositoryError::NotFound)?;
        let reviews = ReviewRepository::new(self.pool)
            .list_for_product(product.id)
            .await?;
        let offers = OfferRepository::new(self.pool).list_running().await?;
        Ok(ProductDetail {
            card: pricing::product_card(product, &offers, Utc::now()),
            reviews,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn test_defaults() {
        let filter = ProductFilter::from_query(CatalogQuery::default()).unwrap();
        assert_eq!(filter.sort, ProductSort::Newest);
        assert_eq!(filter.pagination.page, 1);
        assert_eq!(filter.pagination.per_page, DEFAULT_PER_PAGE);
        assert!(!filter.include_inactive);
    }

    #[test]
    fn test_lists_are_split_and_lowercased() {
        let filter = ProductFilter::from_query(CatalogQuery {
            brand: Some("Tanishq, kalyan ,,TANISHQ".to_owned()),
            color: Some("  ".to_owned()),
            ..CatalogQuery::default()
        })
        .unwrap();
        assert_eq!(filter.brands, vec!["kalyan", "tanishq"]);
        assert!(filter.colors.is_empty());
    }

    #[test]
    fn test_rejects_bad_prices() {
        let err = ProductFilter::from_query(CatalogQuery {
            min_price: Some(dec!(-1)),
            ..CatalogQuery::default()
        });
        assert_eq!(err, Err(FilterError::NegativePrice));

        let err = ProductFilter::from_query(CatalogQuery {
            min_price: Some(dec!(5000)),
            max_price: Some(dec!(1000)),
            ..CatalogQuery::default()
        });
        assert_eq!(err, Err(FilterError::InvertedPriceRange));
    }

    #[test]
    fn test_rejects_bad_rating_and_sort() {
        let err = ProductFilter::from_query(CatalogQuery {
            rating: Some(6),
            ..CatalogQuery::default()
        });
        assert_eq!(err, Err(FilterError::InvalidRating));

        let err = ProductFilter::from_query(CatalogQuery {
            sort: Some("cheapest".to_owned()),
            ..CatalogQuery::default()
        });
        assert_eq!(err, Err(FilterError::UnknownSort("cheapest".to_owned())));
    }

    #[test]
    fn test_per_page_is_capped() {
        let filter = ProductFilter::from_query(CatalogQuery {
            page: Some(0),
            per_page: Some(500),
            ..CatalogQuery::default()
        })
        .unwrap();
        assert_eq!(filter.pagination.page, 1);
        assert_eq!(filter.pagination.per_page, MAX_PER_PAGE);
    }
}
