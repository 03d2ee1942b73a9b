//! Dashboard aggregates.

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::db::ReportRepository;
use crate::db::reports::{CategorySales, DashboardTotals, SalesPoint, StatusCount};
use crate::error::Result;
use crate::middleware::RequireAdmin;
use crate::state::AppState;

const DEFAULT_DAYS: u32 = 30;
const MAX_DAYS: u32 = 365;
const MONTHS: u32 = 12;

pub fn router() -> Router<AppState> {
    Router::new().route("/dashboard", get(index))
}

#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    pub days: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct Dashboard {
    pub totals: DashboardTotals,
    pub sales_by_day: Vec<SalesPoint>,
    pub sales_by_month: Vec<SalesPoint>,
    pub sales_by_category: Vec<CategorySales>,
    pub orders_by_status: Vec<StatusCount>,
}

/// Headline totals plus the chart series.
#[instrument(skip(state, _admin))]
pub async fn index(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<Dashboard>> {
    let days = query.days.unwrap_or(DEFAULT_DAYS).clamp(1, MAX_DAYS);
    let reports = ReportRepository::new(state.pool());

    let (totals, sales_by_day, sales_by_month, sales_by_category, orders_by_status) = tokio::try_join!(
        reports.totals(),
        reports.sales_by_day(days),
        reports.sales_by_month(MONTHS),
        reports.sales_by_category(),
        reports.orders_by_status(),
    )?;

    Ok(Json(Dashboard {
        totals,
        sales_by_day,
        sales_by_month,
        sales_by_category,
        orders_by_status,
    }))
}
