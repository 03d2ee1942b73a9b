//! Product repository: catalog search, facets and admin writes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder};

use aurum_core::{Money, ProductId};

use super::{Page, RepositoryError, escape_like, positive_u32};
use crate::models::{Facets, Product, ProductInput};
use crate::services::catalog::ProductFilter;

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ProductRow {
    id: i32,
    name: String,
    slug: String,
    description: String,
    category: String,
    brand: Option<String>,
    material: Option<String>,
    color: Option<String>,
    price: Money,
    compare_at_price: Option<Money>,
    stock: i32,
    weight_grams: i32,
    images: Vec<String>,
    is_active: bool,
    avg_rating: Decimal,
    review_count: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ProductId::new(row.id),
            name: row.name,
            slug: row.slug,
            description: row.description,
            category: row.category,
            brand: row.brand,
            material: row.material,
            color: row.color,
            price: row.price,
            compare_at_price: row.compare_at_price,
            stock: positive_u32(row.stock, "stock")?,
            weight_grams: positive_u32(row.weight_grams, "weight_grams")?,
            images: row.images,
            is_active: row.is_active,
            avg_rating: row.avg_rating,
            review_count: positive_u32(row.review_count, "review_count")?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SearchRow {
    #[sqlx(flatten)]
    product: ProductRow,
    total_count: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct FacetsRow {
    categories: Vec<String>,
    brands: Vec<String>,
    materials: Vec<String>,
    colors: Vec<String>,
    min_price: Option<Money>,
    max_price: Option<Money>,
}

/// Column list shared by every product query; `p` is the table alias.
pub(crate) const PRODUCT_COLUMNS: &str = "p.id, p.name, p.slug, p.description, p.category, \
     p.brand, p.material, p.color, p.price, p.compare_at_price, p.stock, p.weight_grams, \
     p.images, p.is_active, p.avg_rating, p.review_count, p.created_at, p.updated_at";

fn to_i32(value: u32, column: &str) -> Result<i32, RepositoryError> {
    i32::try_from(value).map_err(|_| RepositoryError::Conflict(format!("{column} is too large")))
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for product database operations.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Filtered, sorted, paged product listing.
    ///
    /// The total row count comes back with every row through a window
    /// function, so a page is one round trip.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn search(&self, filter: &ProductFilter) -> Result<Page<Product>, RepositoryError> {
        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {PRODUCT_COLUMNS}, COUNT(*) OVER () AS total_count FROM products p WHERE TRUE"
        ));
        push_filter(&mut query, filter);
        query
            .push(" ORDER BY ")
            .push(filter.sort.order_by())
            .push(" LIMIT ")
            .push_bind(filter.pagination.limit())
            .push(" OFFSET ")
            .push_bind(filter.pagination.offset());

        let rows: Vec<SearchRow> = query.build_query_as().fetch_all(self.pool).await?;

        let total = match rows.first() {
            Some(row) => row.total_count,
            // Past the last page the window has no rows to report on.
            None if filter.pagination.page > 1 => self.count(filter).await?,
            None => 0,
        };

        let products = rows
            .into_iter()
            .map(|r| r.product.try_into())
            .collect::<Result<Vec<Product>, _>>()?;
        Ok(Page::new(
            products,
            total,
            filter.pagination.page,
            filter.pagination.per_page,
        ))
    }

    async fn count(&self, filter: &ProductFilter) -> Result<i64, RepositoryError> {
        let mut query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products p WHERE TRUE");
        push_filter(&mut query, filter);
        Ok(query.build_query_scalar().fetch_one(self.pool).await?)
    }

    /// Distinct filter values and the price range of active products.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn facets(&self) -> Result<Facets, RepositoryError> {
        let row = sqlx::query_as::<_, FacetsRow>(
            r"
            SELECT
                COALESCE(array_agg(DISTINCT category ORDER BY category), '{}') AS categories,
                COALESCE(array_agg(DISTINCT brand ORDER BY brand) FILTER (WHERE brand IS NOT NULL), '{}') AS brands,
                COALESCE(array_agg(DISTINCT material ORDER BY material) FILTER (WHERE material IS NOT NULL), '{}') AS materials,
                COALESCE(array_agg(DISTINCT color ORDER BY color) FILTER (WHERE color IS NOT NULL), '{}') AS colors,
                MIN(price) AS min_price,
                MAX(price) AS max_price
            FROM products
            WHERE is_active
            ",
        )
        .fetch_one(self.pool)
        .await?;

        Ok(Facets {
            categories: row.categories,
            brands: row.brands,
            materials: row.materials,
            colors: row.colors,
            min_price: row.min_price,
            max_price: row.max_price,
        })
    }

    /// Get a product by ID, active or not.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products p WHERE p.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Get a product by slug, active or not.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products p WHERE p.slug = $1"
        ))
        .bind(slug)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Look up by numeric id when `key` parses as one, otherwise by slug.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_key(&self, key: &str) -> Result<Option<Product>, RepositoryError> {
        match key.parse::<i32>() {
            Ok(id) => self.get_by_id(ProductId::new(id)).await,
            Err(_) => self.get_by_slug(key).await,
        }
    }

    /// Create a product from normalized input.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the slug is taken.
    pub async fn create(&self, input: &ProductInput) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r"
            INSERT INTO products AS p (name, slug, description, category, brand, material, color,
                                       price, compare_at_price, stock, weight_grams, images, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {PRODUCT_COLUMNS}
            "
        ))
        .bind(&input.name)
        .bind(input.slug.as_deref().unwrap_or_default())
        .bind(&input.description)
        .bind(&input.category)
        .bind(&input.brand)
        .bind(&input.material)
        .bind(&input.color)
        .bind(input.price)
        .bind(input.compare_at_price)
        .bind(to_i32(input.stock, "stock")?)
        .bind(to_i32(input.weight_grams, "weight_grams")?)
        .bind(&input.images)
        .bind(input.is_active)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::conflict_on_unique(e, "slug already exists"))?;

        row.try_into()
    }

    /// Replace a product's editable fields.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product doesn't exist.
    /// Returns `RepositoryError::Conflict` if the slug is taken.
    pub async fn update(
        &self,
        id: ProductId,
        input: &ProductInput,
    ) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r"
            UPDATE products AS p
            SET name = $2, slug = $3, description = $4, category = $5, brand = $6,
                material = $7, color = $8, price = $9, compare_at_price = $10, stock = $11,
                weight_grams = $12, images = $13, is_active = $14, updated_at = NOW()
            WHERE p.id = $1
            RETURNING {PRODUCT_COLUMNS}
            "
        ))
        .bind(id)
        .bind(&input.name)
        .bind(input.slug.as_deref().unwrap_or_default())
        .bind(&input.description)
        .bind(&input.category)
        .bind(&input.brand)
        .bind(&input.material)
        .bind(&input.color)
        .bind(input.price)
        .bind(input.compare_at_price)
        .bind(to_i32(input.stock, "stock")?)
        .bind(to_i32(input.weight_grams, "weight_grams")?)
        .bind(&input.images)
        .bind(input.is_active)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::conflict_on_unique(e, "slug already exists"))?
        .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    /// Show or hide a product. Hiding is how products are deleted, since
    /// orders keep referencing them.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product doesn't exist.
    pub async fn set_active(&self, id: ProductId, active: bool) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "UPDATE products AS p SET is_active = $2, updated_at = NOW() WHERE p.id = $1 RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(id)
        .bind(active)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    /// Set the stock level.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product doesn't exist.
    pub async fn set_stock(&self, id: ProductId, stock: u32) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "UPDATE products AS p SET stock = $2, updated_at = NOW() WHERE p.id = $1 RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(id)
        .bind(to_i32(stock, "stock")?)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    /// Append uploaded image URLs.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product doesn't exist.
    pub async fn append_images(
        &self,
        id: ProductId,
        urls: &[String],
    ) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "UPDATE products AS p SET images = p.images || $2, updated_at = NOW() WHERE p.id = $1 RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(id)
        .bind(urls)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }
}

/// Append the `WHERE` conditions for `filter` after a `WHERE TRUE`.
fn push_filter(query: &mut QueryBuilder<'_, Postgres>, filter: &ProductFilter) {
    if !filter.include_inactive {
        query.push(" AND p.is_active");
    }
    if let Some(category) = &filter.category {
        query
            .push(" AND lower(p.category) = lower(")
            .push_bind(category.clone())
            .push(")");
    }
    if let Some(min) = filter.min_price {
        query.push(" AND p.price >= ").push_bind(min);
    }
    if let Some(max) = filter.max_price {
        query.push(" AND p.price <= ").push_bind(max);
    }
    for (column, values) in [
        ("brand", &filter.brands),
        ("material", &filter.materials),
        ("color", &filter.colors),
    ] {
        if !values.is_empty() {
            query
                .push(format!(" AND lower(p.{column}) = ANY("))
                .push_bind(values.clone())
                .push(")");
        }
    }
    if let Some(rating) = filter.min_rating {
        query
            .push(" AND p.avg_rating >= ")
            .push_bind(Decimal::from(rating.value()));
    }
    if let Some(q) = &filter.q {
        let pattern = format!("%{}%", escape_like(q));
        query.push(" AND (");
        for (i, column) in ["p.name", "p.description", "p.brand", "p.category"]
            .iter()
            .enumerate()
        {
            if i > 0 {
                query.push(" OR ");
            }
            query
                .push(format!("{column} ILIKE "))
                .push_bind(pattern.clone())
                .push(r" ESCAPE '\'");
        }
        query.push(")");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::services::catalog::{CatalogQuery, ProductSort};

    fn sql_for(query: CatalogQuery) -> String {
        let filter = ProductFilter::from_query(query).unwrap();
        let mut builder = QueryBuilder::<Postgres>::new("SELECT 1 FROM products p WHERE TRUE");
        push_filter(&mut builder, &filter);
        builder.sql().to_owned()
    }

    #[test]
    fn test_default_filter_lists_only_active() {
        assert_eq!(
            sql_for(CatalogQuery::default()),
            "SELECT 1 FROM products p WHERE TRUE AND p.is_active"
        );
    }

    #[test]
    fn test_filters_are_bound_not_interpolated() {
        let sql = sql_for(CatalogQuery {
            category: Some("Rings'; DROP TABLE products; --".to_owned()),
            min_price: Some(dec!(100)),
            brand: Some("a,b".to_owned()),
            q: Some("50%".to_owned()),
            rating: Some(4),
            ..CatalogQuery::default()
        });
        assert!(!sql.contains("DROP TABLE"));
        assert!(!sql.contains("50%"));
        assert!(sql.contains("lower(p.category) = lower($1)"));
        assert!(sql.contains("p.price >= $2"));
        assert!(sql.contains("lower(p.brand) = ANY($3)"));
        assert!(sql.contains("p.avg_rating >= $4"));
        assert!(sql.contains(r"p.name ILIKE $5 ESCAPE '\'"));
        assert!(sql.contains(r"p.category ILIKE $8 ESCAPE '\'"));
    }

    #[test]
    fn test_sort_orders_are_stable() {
        for sort in [
            ProductSort::Newest,
            ProductSort::PriceAsc,
            ProductSort::PriceDesc,
            ProductSort::Rating,
            ProductSort::Name,
        ] {
            assert!(sort.order_by().contains("id"), "{sort:?}");
        }
    }
}
