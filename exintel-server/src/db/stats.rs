//! Dashboard totals

use exintel_common::Result;
use serde::Serialize;
use sqlx::{Row, SqliteConnection};

/// Dashboard figures
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    /// Exchanges with at least one matrix cell
    pub total_exchanges: i64,
    pub turkish_exchanges: i64,
    pub global_exchanges: i64,
    pub total_features: i64,
    pub total_categories: i64,
    pub total_screenshots: i64,
    pub classified_screenshots: i64,
    pub unclassified_screenshots: i64,
    pub pending_suggestions: i64,
    pub total_cells: i64,
    pub available_cells: i64,
    /// `round(cells / (exchanges × features) × 100)`
    pub coverage_percentage: i64,
}

/// Collect dashboard totals in one round trip
pub async fn dashboard_stats(conn: &mut SqliteConnection) -> Result<DashboardStats> {
    let row = sqlx::query(
        r#"
        SELECT
            (SELECT COUNT(*) FROM exchanges e
              WHERE EXISTS (SELECT 1 FROM exchange_features ef WHERE ef.exchange_id = e.id)) AS total_exchanges,
            (SELECT COUNT(*) FROM exchanges e WHERE e.market_type = 'turkish'
              AND EXISTS (SELECT 1 FROM exchange_features ef WHERE ef.exchange_id = e.id)) AS turkish_exchanges,
            (SELECT COUNT(*) FROM exchanges e WHERE e.market_type = 'global'
              AND EXISTS (SELECT 1 FROM exchange_features ef WHERE ef.exchange_id = e.id)) AS global_exchanges,
            (SELECT COUNT(*) FROM features) AS total_features,
            (SELECT COUNT(*) FROM feature_categories) AS total_categories,
            (SELECT COUNT(*) FROM screenshots) AS total_screenshots,
            (SELECT COUNT(*) FROM screenshots WHERE classified_at IS NOT NULL) AS classified_screenshots,
            (SELECT COUNT(*) FROM feature_update_suggestions WHERE status = 'pending') AS pending_suggestions,
            (SELECT COUNT(*) FROM exchange_features) AS total_cells,
            (SELECT COUNT(*) FROM exchange_features WHERE has_feature = 1) AS available_cells
        "#,
    )
    .fetch_one(&mut *conn)
    .await?;

    let total_exchanges: i64 = row.try_get("total_exchanges")?;
    let total_features: i64 = row.try_get("total_features")?;
    let total_screenshots: i64 = row.try_get("total_screenshots")?;
    let classified_screenshots: i64 = row.try_get("classified_screenshots")?;
    let total_cells: i64 = row.try_get("total_cells")?;

    let possible = total_exchanges * total_features;
    let coverage_percentage = if possible > 0 {
        (total_cells as f64 / possible as f64 * 100.0).round() as i64
    } else {
        0
    };

    Ok(DashboardStats {
        total_exchanges,
        turkish_exchanges: row.try_get("turkish_exchanges")?,
        global_exchanges: row.try_get("global_exchanges")?,
        total_features,
        total_categories: row.try_get("total_categories")?,
        total_screenshots,
        classified_screenshots,
        unclassified_screenshots: total_screenshots - classified_screenshots,
        pending_suggestions: row.try_get("pending_suggestions")?,
        total_cells,
        available_cells: row.try_get("available_cells")?,
        coverage_percentage,
    })
}
