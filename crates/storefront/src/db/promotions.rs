//! Offer, coupon and slider repositories.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use aurum_core::{CouponId, DiscountKind, Money, OfferId, ProductId, SliderId, UserId};

use super::RepositoryError;
use crate::models::{Coupon, CouponInput, Offer, OfferInput, Slider, SliderInput};

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct OfferRow {
    id: i32,
    title: String,
    description: String,
    discount_percent: Decimal,
    product_id: Option<i32>,
    category: Option<String>,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<OfferRow> for Offer {
    fn from(row: OfferRow) -> Self {
        Self {
            id: OfferId::new(row.id),
            title: row.title,
            description: row.description,
            discount_percent: row.discount_percent,
            product_id: row.product_id.map(ProductId::new),
            category: row.category,
            starts_at: row.starts_at,
            ends_at: row.ends_at,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CouponRow {
    id: i32,
    code: String,
    description: String,
    kind: DiscountKind,
    value: Decimal,
    min_order: Money,
    max_discount: Option<Money>,
    usage_limit: Option<i32>,
    used_count: i32,
    expires_at: Option<DateTime<Utc>>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<CouponRow> for Coupon {
    type Error = RepositoryError;

    fn try_from(row: CouponRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: CouponId::new(row.id),
            code: row.code,
            description: row.description,
            kind: row.kind,
            value: row.value,
            min_order: row.min_order,
            max_discount: row.max_discount,
            usage_limit: row
                .usage_limit
                .map(|l| super::positive_u32(l, "usage_limit"))
                .transpose()?,
            used_count: super::positive_u32(row.used_count, "used_count")?,
            expires_at: row.expires_at,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SliderRow {
    id: i32,
    title: String,
    subtitle: String,
    image_url: String,
    link_url: Option<String>,
    position: i32,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<SliderRow> for Slider {
    fn from(row: SliderRow) -> Self {
        Self {
            id: SliderId::new(row.id),
            title: row.title,
            subtitle: row.subtitle,
            image_url: row.image_url,
            link_url: row.link_url,
            position: row.position,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

const OFFER_COLUMNS: &str = "id, title, description, discount_percent, product_id, category, \
     starts_at, ends_at, is_active, created_at";
const COUPON_COLUMNS: &str = "id, code, description, kind, value, min_order, max_discount, \
     usage_limit, used_count, expires_at, is_active, created_at";
const SLIDER_COLUMNS: &str =
    "id, title, subtitle, image_url, link_url, position, is_active, created_at";

fn usage_limit(input: &CouponInput) -> Result<Option<i32>, RepositoryError> {
    input
        .usage_limit
        .map(|l| {
            i32::try_from(l).map_err(|_| RepositoryError::Conflict("usage_limit is too large".to_owned()))
        })
        .transpose()
}

// =============================================================================
// Offers
// =============================================================================

/// Repository for offers.
pub struct OfferRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OfferRepository<'a> {
    /// Create a new offer repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Offers that are enabled and inside their date window right now.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_running(&self) -> Result<Vec<Offer>, RepositoryError> {
        let rows = sqlx::query_as::<_, OfferRow>(&format!(
            r"
            SELECT {OFFER_COLUMNS} FROM offers
            WHERE is_active AND starts_at <= NOW() AND ends_at > NOW()
            ORDER BY discount_percent DESC, id
            "
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Every offer, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_all(&self) -> Result<Vec<Offer>, RepositoryError> {
        let rows = sqlx::query_as::<_, OfferRow>(&format!(
            "SELECT {OFFER_COLUMNS} FROM offers ORDER BY created_at DESC"
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Create an offer.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create(&self, input: &OfferInput) -> Result<Offer, RepositoryError> {
        let row = sqlx::query_as::<_, OfferRow>(&format!(
            r"
            INSERT INTO offers (title, description, discount_percent, product_id, category, starts_at, ends_at, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {OFFER_COLUMNS}
            "
        ))
        .bind(&input.title)
        .bind(&input.description)
        .bind(input.discount_percent)
        .bind(input.product_id)
        .bind(&input.category)
        .bind(input.starts_at)
        .bind(input.ends_at)
        .bind(input.is_active)
        .fetch_one(self.pool)
        .await?;

        Ok(row.into())
    }

    /// Replace an offer.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the offer doesn't exist.
    pub async fn update(&self, id: OfferId, input: &OfferInput) -> Result<Offer, RepositoryError> {
        let row = sqlx::query_as::<_, OfferRow>(&format!(
            r"
            UPDATE offers
            SET title = $2, description = $3, discount_percent = $4, product_id = $5,
                category = $6, starts_at = $7, ends_at = $8, is_active = $9
            WHERE id = $1
            RETURNING {OFFER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(&input.title)
        .bind(&input.description)
        .bind(input.discount_percent)
        .bind(input.product_id)
        .bind(&input.category)
        .bind(input.starts_at)
        .bind(input.ends_at)
        .bind(input.is_active)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        Ok(row.into())
    }

    /// Delete an offer.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the offer doesn't exist.
    pub async fn delete(&self, id: OfferId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM offers WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

// =============================================================================
// Coupons
// =============================================================================

/// Repository for coupons and their redemptions.
pub struct CouponRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CouponRepository<'a> {
    /// Create a new coupon repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Look up a coupon by its (already upper-cased) code.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_code(&self, code: &str) -> Result<Option<Coupon>, RepositoryError> {
        let row = sqlx::query_as::<_, CouponRow>(&format!(
            "SELECT {COUPON_COLUMNS} FROM coupons WHERE code = $1"
        ))
        .bind(code)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Whether a user already redeemed a coupon.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn has_redeemed(
        &self,
        coupon_id: CouponId,
        user_id: UserId,
    ) -> Result<bool, RepositoryError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM coupon_redemptions WHERE coupon_id = $1 AND user_id = $2)",
        )
        .bind(coupon_id)
        .bind(user_id)
        .fetch_one(self.pool)
        .await?;
        Ok(exists)
    }

    /// Every coupon, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_all(&self) -> Result<Vec<Coupon>, RepositoryError> {
        let rows = sqlx::query_as::<_, CouponRow>(&format!(
            "SELECT {COUPON_COLUMNS} FROM coupons ORDER BY created_at DESC"
        ))
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Create a coupon.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the code is taken.
    pub async fn create(&self, input: &CouponInput) -> Result<Coupon, RepositoryError> {
        let row = sqlx::query_as::<_, CouponRow>(&format!(
            r"
            INSERT INTO coupons (code, description, kind, value, min_order, max_discount, usage_limit, expires_at, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {COUPON_COLUMNS}
            "
        ))
        .bind(&input.code)
        .bind(&input.description)
        .bind(input.kind)
        .bind(input.value)
        .bind(input.min_order)
        .bind(input.max_discount)
        .bind(usage_limit(input)?)
        .bind(input.expires_at)
        .bind(input.is_active)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::conflict_on_unique(e, "coupon code already exists"))?;

        row.try_into()
    }

    /// Replace a coupon. The redemption count is kept.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the coupon doesn't exist.
    /// Returns `RepositoryError::Conflict` if the code is taken.
    pub async fn update(
        &self,
        id: CouponId,
        input: &CouponInput,
    ) -> Result<Coupon, RepositoryError> {
        let row = sqlx::query_as::<_, CouponRow>(&format!(
            r"
            UPDATE coupons
            SET code = $2, description = $3, kind = $4, value = $5, min_order = $6,
                max_discount = $7, usage_limit = $8, expires_at = $9, is_active = $10
            WHERE id = $1
            RETURNING {COUPON_COLUMNS}
            "
        ))
        .bind(id)
        .bind(&input.code)
        .bind(&input.description)
        .bind(input.kind)
        .bind(input.value)
        .bind(input.min_order)
        .bind(input.max_discount)
        .bind(usage_limit(input)?)
        .bind(input.expires_at)
        .bind(input.is_active)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::conflict_on_unique(e, "coupon code already exists"))?
        .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    /// Delete a coupon that has never been redeemed; deactivate it otherwise.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the coupon doesn't exist.
    pub async fn delete(&self, id: CouponId) -> Result<(), RepositoryError> {
        let deleted = sqlx::query(
            r"
            DELETE FROM coupons
            WHERE id = $1 AND NOT EXISTS (SELECT 1 FROM coupon_redemptions WHERE coupon_id = $1)
            ",
        )
        .bind(id)
        .execute(self.pool)
        .await?;
        if deleted.rows_affected() > 0 {
            return Ok(());
        }

        let deactivated = sqlx::query("UPDATE coupons SET is_active = FALSE WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        if deactivated.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

// =============================================================================
// Sliders
// =============================================================================

/// Repository for homepage sliders.
pub struct SliderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> SliderRepository<'a> {
    /// Create a new slider repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Active sliders in display order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_active(&self) -> Result<Vec<Slider>, RepositoryError> {
        let rows = sqlx::query_as::<_, SliderRow>(&format!(
            "SELECT {SLIDER_COLUMNS} FROM sliders WHERE is_active ORDER BY position, id"
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Every slider in display order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_all(&self) -> Result<Vec<Slider>, RepositoryError> {
        let rows = sqlx::query_as::<_, SliderRow>(&format!(
            "SELECT {SLIDER_COLUMNS} FROM sliders ORDER BY position, id"
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Create a slider with an already-uploaded image.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create(
        &self,
        input: &SliderInput,
        image_url: &str,
    ) -> Result<Slider, RepositoryError> {
        let row = sqlx::query_as::<_, SliderRow>(&format!(
            r"
            INSERT INTO sliders (title, subtitle, image_url, link_url, position, is_active)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {SLIDER_COLUMNS}
            "
        ))
        .bind(&input.title)
        .bind(&input.subtitle)
        .bind(image_url)
        .bind(&input.link_url)
        .bind(input.position)
        .bind(input.is_active)
        .fetch_one(self.pool)
        .await?;

        Ok(row.into())
    }

    /// Replace a slider. `image_url` of `None` keeps the current image.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the slider doesn't exist.
    pub async fn update(
        &self,
        id: SliderId,
        input: &SliderInput,
        image_url: Option<&str>,
    ) -> Result<Slider, RepositoryError> {
        let row = sqlx::query_as::<_, SliderRow>(&format!(
            r"
            UPDATE sliders
            SET title = $2, subtitle = $3, image_url = COALESCE($4, image_url), link_url = $5,
                position = $6, is_active = $7
            WHERE id = $1
            RETURNING {SLIDER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(&input.title)
        .bind(&input.subtitle)
        .bind(image_url)
        .bind(&input.link_url)
        .bind(input.position)
        .bind(input.is_active)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        Ok(row.into())
    }

    /// Delete a slider.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the slider doesn't exist.
    pub async fn delete(&self, id: SliderId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM sliders WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
