//! Matrix cell (exchange_features) persistence
//!
//! Raw row access only. Status changes must go through
//! `services::reconciler` so the audit log stays complete.

use exintel_common::db::{ExchangeFeature, FeatureStatus};
use exintel_common::{time, uuid_utils, Result};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::parse_text;

/// Cell joined with its feature and category, for detail views
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellDetail {
    #[serde(flatten)]
    pub cell: ExchangeFeature,
    pub exchange_name: String,
    pub feature_name: String,
    pub feature_slug: String,
    pub category_id: String,
    pub category_name: String,
}

const SELECT_CELL: &str = r#"
    SELECT ef.id, ef.exchange_id, ef.feature_id, ef.has_feature, ef.feature_status,
           ef.notes, ef.created_at, ef.updated_at
    FROM exchange_features ef
"#;

pub(crate) fn cell_from_row(row: &SqliteRow) -> Result<ExchangeFeature> {
    let status: String = row.try_get("feature_status")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(ExchangeFeature {
        id: row.try_get("id")?,
        exchange_id: row.try_get("exchange_id")?,
        feature_id: row.try_get("feature_id")?,
        has_feature: row.try_get("has_feature")?,
        feature_status: parse_text(&status, "feature_status")?,
        notes: row.try_get("notes")?,
        created_at: time::from_db(&created_at)?,
        updated_at: time::from_db(&updated_at)?,
    })
}

/// Load cell by its composite key
pub async fn get_cell(
    conn: &mut SqliteConnection,
    exchange_id: &str,
    feature_id: &str,
) -> Result<Option<ExchangeFeature>> {
    let row = sqlx::query(&format!(
        "{} WHERE ef.exchange_id = ? AND ef.feature_id = ?",
        SELECT_CELL
    ))
    .bind(exchange_id)
    .bind(feature_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(cell_from_row).transpose()
}

/// Insert a cell, or overwrite the existing one for the same pair
///
/// The conflict clause makes a racing insert for the same pair collapse into
/// one row (last write wins). `has_feature` is always derived from the status.
pub async fn upsert_cell(
    conn: &mut SqliteConnection,
    exchange_id: &str,
    feature_id: &str,
    status: FeatureStatus,
    notes: Option<&str>,
) -> Result<ExchangeFeature> {
    let now = time::now();
    let now_db = time::to_db(&now);

    let row = sqlx::query(
        r#"
        INSERT INTO exchange_features (
            id, exchange_id, feature_id, has_feature, feature_status, notes, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (exchange_id, feature_id) DO UPDATE SET
            has_feature = excluded.has_feature,
            feature_status = excluded.feature_status,
            notes = COALESCE(excluded.notes, exchange_features.notes),
            updated_at = excluded.updated_at
        RETURNING id, exchange_id, feature_id, has_feature, feature_status, notes, created_at, updated_at
        "#,
    )
    .bind(uuid_utils::new_id())
    .bind(exchange_id)
    .bind(feature_id)
    .bind(status.has_feature())
    .bind(status.as_str())
    .bind(notes)
    .bind(&now_db)
    .bind(&now_db)
    .fetch_one(&mut *conn)
    .await?;

    cell_from_row(&row)
}

/// Replace the notes of an existing cell without touching its status
pub async fn update_cell_notes(
    conn: &mut SqliteConnection,
    cell_id: &str,
    notes: &str,
) -> Result<()> {
    sqlx::query("UPDATE exchange_features SET notes = ?, updated_at = ? WHERE id = ?")
        .bind(notes)
        .bind(time::to_db(&time::now()))
        .bind(cell_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Every cell, optionally restricted to exchanges of one market type
pub async fn list_cells(
    conn: &mut SqliteConnection,
    market_type: Option<&str>,
) -> Result<Vec<ExchangeFeature>> {
    let rows = sqlx::query(&format!(
        r#"{}
        JOIN exchanges e ON e.id = ef.exchange_id
        WHERE (? IS NULL OR e.market_type = ?)
        "#,
        SELECT_CELL
    ))
    .bind(market_type)
    .bind(market_type)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(cell_from_row).collect()
}

const SELECT_CELL_DETAIL: &str = r#"
    SELECT ef.id, ef.exchange_id, ef.feature_id, ef.has_feature, ef.feature_status,
           ef.notes, ef.created_at, ef.updated_at,
           e.name AS exchange_name, f.name AS feature_name, f.slug AS feature_slug,
           c.id AS category_id, c.name AS category_name
    FROM exchange_features ef
    JOIN exchanges e ON e.id = ef.exchange_id
    JOIN features f ON f.id = ef.feature_id
    JOIN feature_categories c ON c.id = f.category_id
"#;

fn cell_detail_from_row(row: &SqliteRow) -> Result<CellDetail> {
    Ok(CellDetail {
        cell: cell_from_row(row)?,
        exchange_name: row.try_get("exchange_name")?,
        feature_name: row.try_get("feature_name")?,
        feature_slug: row.try_get("feature_slug")?,
        category_id: row.try_get("category_id")?,
        category_name: row.try_get("category_name")?,
    })
}

/// Cells of one exchange with feature and category, in display order
pub async fn list_cells_for_exchange(
    conn: &mut SqliteConnection,
    exchange_id: &str,
) -> Result<Vec<CellDetail>> {
    let rows = sqlx::query(&format!(
        "{} WHERE ef.exchange_id = ? ORDER BY c.sort_order, f.sort_order, f.name",
        SELECT_CELL_DETAIL
    ))
    .bind(exchange_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(cell_detail_from_row).collect()
}

/// Cells of one feature across exchanges, ordered by exchange name
pub async fn list_cells_for_feature(
    conn: &mut SqliteConnection,
    feature_id: &str,
) -> Result<Vec<CellDetail>> {
    let rows = sqlx::query(&format!(
        "{} WHERE ef.feature_id = ? ORDER BY e.name_key",
        SELECT_CELL_DETAIL
    ))
    .bind(feature_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(cell_detail_from_row).collect()
}
