//! Review repository.
//!
//! Writes recompute the product's `avg_rating` and `review_count` in the
//! same transaction, so the denormalized columns never drift.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use aurum_core::{OrderStatus, ProductId, Rating, ReviewId, UserId};

use super::RepositoryError;
use crate::models::{Review, ReviewInput};

#[derive(Debug, sqlx::FromRow)]
struct ReviewRow {
    id: i32,
    user_id: i32,
    user_name: String,
    product_id: i32,
    rating: Rating,
    comment: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ReviewRow> for Review {
    fn from(row: ReviewRow) -> Self {
        Self {
            id: ReviewId::new(row.id),
            user_id: UserId::new(row.user_id),
            user_name: row.user_name,
            product_id: ProductId::new(row.product_id),
            rating: row.rating,
            comment: row.comment,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Repository for product reviews.
pub struct ReviewRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ReviewRepository<'a> {
    /// Create a new review repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Reviews for a product, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<Review>, RepositoryError> {
        let rows = sqlx::query_as::<_, ReviewRow>(
            r"
            SELECT r.id, r.user_id, u.name AS user_name, r.product_id, r.rating, r.comment,
                   r.created_at, r.updated_at
            FROM reviews r
            JOIN users u ON u.id = r.user_id
            WHERE r.product_id = $1
            ORDER BY r.created_at DESC, r.id DESC
            ",
        )
        .bind(product_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Whether the user has a delivered order containing the product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn has_delivered_purchase(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<bool, RepositoryError> {
        let exists: bool = sqlx::query_scalar(
            r"
            SELECT EXISTS(
                SELECT 1 FROM orders o
                JOIN order_items i ON i.order_id = o.id
                WHERE o.user_id = $1 AND i.product_id = $2 AND o.status IN ($3, $4, $5)
            )
            ",
        )
        .bind(user_id)
        .bind(product_id)
        .bind(OrderStatus::Delivered)
        .bind(OrderStatus::ReturnRequested)
        .bind(OrderStatus::Returned)
        .fetch_one(self.pool)
        .await?;
        Ok(exists)
    }

    /// Create the user's review of a product, or replace their existing one.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn upsert(
        &self,
        user_id: UserId,
        input: &ReviewInput,
    ) -> Result<Review, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, ReviewRow>(
            r"
            WITH saved AS (
                INSERT INTO reviews (user_id, product_id, rating, comment)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (user_id, product_id)
                DO UPDATE SET rating = EXCLUDED.rating, comment = EXCLUDED.comment, updated_at = NOW()
                RETURNING *
            )
            SELECT s.id, s.user_id, u.name AS user_name, s.product_id, s.rating, s.comment,
                   s.created_at, s.updated_at
            FROM saved s
            JOIN users u ON u.id = s.user_id
            ",
        )
        .bind(user_id)
        .bind(input.product_id)
        .bind(input.rating)
        .bind(&input.comment)
        .fetch_one(&mut *tx)
        .await?;

        refresh_rating(&mut tx, input.product_id).await?;
        tx.commit().await?;
        Ok(row.into())
    }

    /// Delete one of the user's own reviews.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the review isn't the user's.
    pub async fn delete(&self, user_id: UserId, id: ReviewId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let product_id: ProductId = sqlx::query_scalar(
            "DELETE FROM reviews WHERE id = $1 AND user_id = $2 RETURNING product_id",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        refresh_rating(&mut tx, product_id).await?;
        tx.commit().await?;
        Ok(())
    }
}

async fn refresh_rating(
    conn: &mut PgConnection,
    product_id: ProductId,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        UPDATE products SET
            avg_rating = COALESCE((SELECT ROUND(AVG(rating)::NUMERIC, 2) FROM reviews WHERE product_id = $1), 0),
            review_count = (SELECT COUNT(*) FROM reviews WHERE product_id = $1),
            updated_at = NOW()
        WHERE id = $1
        ",
    )
    .bind(product_id)
    .execute(conn)
    .await?;
    Ok(())
}
