//! Order maintenance commands.

use aurum_storefront::db::OrderTempRepository;

use super::{CommandError, connect};

/// Delete checkout staging rows whose payment window has passed.
///
/// Run periodically (cron) to clear carts abandoned at the gateway.
///
/// # Errors
///
/// Returns an error if the database is unreachable.
pub async fn purge_temp() -> Result<u64, CommandError> {
    let pool = connect().await?;
    let purged = OrderTempRepository::new(&pool).purge_expired().await?;
    tracing::info!(purged, "Expired order staging rows deleted");
    Ok(purged)
}
