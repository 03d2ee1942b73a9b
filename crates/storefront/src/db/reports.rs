//! Aggregate queries behind the admin dashboard.
//!
//! Days and months are bucketed in India Standard Time. Cancelled and
//! returned orders never count as sales.

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::PgPool;

use aurum_core::{Money, OrderStatus};

use super::RepositoryError;

/// Products at or below this stock level show up as low stock.
pub const LOW_STOCK_THRESHOLD: i32 = 5;

/// Predicate for orders whose money the store has actually collected.
const COLLECTED: &str = "(payment_status = 'paid' OR (payment_method = 'cod' AND status = 'delivered')) \
     AND status NOT IN ('cancelled', 'returned')";

/// Headline numbers.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DashboardTotals {
    pub revenue: Money,
    pub order_count: i64,
    pub customer_count: i64,
    pub product_count: i64,
    pub low_stock_count: i64,
}

/// Orders and revenue in one period.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SalesPoint {
    pub period: NaiveDate,
    pub orders: i64,
    pub revenue: Money,
}

/// Units and revenue per category.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CategorySales {
    pub category: String,
    pub units: i64,
    pub revenue: Money,
}

/// Number of orders in a status.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StatusCount {
    pub status: OrderStatus,
    pub count: i64,
}

/// Repository for dashboard reports.
pub struct ReportRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ReportRepository<'a> {
    /// Create a new report repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Headline totals.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn totals(&self) -> Result<DashboardTotals, RepositoryError> {
        let totals = sqlx::query_as::<_, DashboardTotals>(&format!(
            r"
            SELECT
                (SELECT COALESCE(SUM(total), 0) FROM orders WHERE {COLLECTED}) AS revenue,
                (SELECT COUNT(*) FROM orders) AS order_count,
                (SELECT COUNT(*) FROM users WHERE role = 'customer') AS customer_count,
                (SELECT COUNT(*) FROM products WHERE is_active) AS product_count,
                (SELECT COUNT(*) FROM products WHERE is_active AND stock <= $1) AS low_stock_count
            "
        ))
        .bind(LOW_STOCK_THRESHOLD)
        .fetch_one(self.pool)
        .await?;
        Ok(totals)
    }

    /// One point per day for the last `days` days, including empty days.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn sales_by_day(&self, days: u32) -> Result<Vec<SalesPoint>, RepositoryError> {
        let days = i32::try_from(days.clamp(1, 366)).unwrap_or(30);
        let points = sqlx::query_as::<_, SalesPoint>(
            r"
            WITH periods AS (
                SELECT generate_series(
                    (NOW() AT TIME ZONE 'Asia/Kolkata')::date - ($1 - 1),
                    (NOW() AT TIME ZONE 'Asia/Kolkata')::date,
                    INTERVAL '1 day'
                )::date AS period
            )
            SELECT p.period,
                   COUNT(o.id) AS orders,
                   COALESCE(SUM(o.total), 0) AS revenue
            FROM periods p
            LEFT JOIN orders o
                ON (o.created_at AT TIME ZONE 'Asia/Kolkata')::date = p.period
               AND o.status NOT IN ('cancelled', 'returned')
            GROUP BY p.period
            ORDER BY p.period
            ",
        )
        .bind(days)
        .fetch_all(self.pool)
        .await?;
        Ok(points)
    }

    /// One point per month for the last `months` months; `period` is the
    /// first day of the month.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn sales_by_month(&self, months: u32) -> Result<Vec<SalesPoint>, RepositoryError> {
        let months = i32::try_from(months.clamp(1, 60)).unwrap_or(12);
        let points = sqlx::query_as::<_, SalesPoint>(
            r"
            WITH periods AS (
                SELECT generate_series(
                    date_trunc('month', NOW() AT TIME ZONE 'Asia/Kolkata') - make_interval(months => $1 - 1),
                    date_trunc('month', NOW() AT TIME ZONE 'Asia/Kolkata'),
                    INTERVAL '1 month'
                )::date AS period
            )
            SELECT p.period,
                   COUNT(o.id) AS orders,
                   COALESCE(SUM(o.total), 0) AS revenue
            FROM periods p
            LEFT JOIN orders o
                ON date_trunc('month', o.created_at AT TIME ZONE 'Asia/Kolkata')::date = p.period
               AND o.status NOT IN ('cancelled', 'returned')
            GROUP BY p.period
            ORDER BY p.period
            ",
        )
        .bind(months)
        .fetch_all(self.pool)
        .await?;
        Ok(points)
    }

    /// Units and net revenue per product category, best sellers first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn sales_by_category(&self) -> Result<Vec<CategorySales>, RepositoryError> {
        let rows = sqlx::query_as::<_, CategorySales>(
            r"
            SELECT i.category,
                   SUM(i.quantity)::BIGINT AS units,
                   COALESCE(SUM(i.unit_price * i.quantity - i.discount), 0) AS revenue
            FROM order_items i
            JOIN orders o ON o.id = i.order_id
            WHERE o.status NOT IN ('cancelled', 'returned')
            GROUP BY i.category
            ORDER BY revenue DESC, i.category
            ",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Order count for every status, zeros included.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn orders_by_status(&self) -> Result<Vec<StatusCount>, RepositoryError> {
        let rows = sqlx::query_as::<_, StatusCount>(
            "SELECT status, COUNT(*) AS count FROM orders GROUP BY status",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(OrderStatus::ALL
            .iter()
            .map(|&status| StatusCount {
                status,
                count: rows
                    .iter()
                    .find(|r| r.status == status)
                    .map_or(0, |r| r.count),
            })
            .collect())
    }
}
