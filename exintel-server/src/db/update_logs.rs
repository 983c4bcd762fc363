//! Audit log persistence (append-only)

use chrono::{DateTime, Utc};
use exintel_common::db::{FeatureStatus, FeatureUpdateLog, UpdateSource};
use exintel_common::{time, uuid_utils, Result};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::parse_text;

/// Log entry with exchange and feature names
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLogEntry {
    #[serde(flatten)]
    pub log: FeatureUpdateLog,
    pub exchange_name: String,
    pub feature_name: String,
}

/// Filter for the update log listing
#[derive(Debug, Clone, Default)]
pub struct UpdateLogFilter {
    pub exchange_id: Option<String>,
    pub feature_id: Option<String>,
    pub limit: i64,
}

fn log_from_row(row: &SqliteRow) -> Result<FeatureUpdateLog> {
    let old_status: String = row.try_get("old_status")?;
    let new_status: String = row.try_get("new_status")?;
    let source: String = row.try_get("update_source")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(FeatureUpdateLog {
        id: row.try_get("id")?,
        exchange_id: row.try_get("exchange_id")?,
        feature_id: row.try_get("feature_id")?,
        old_status: parse_text(&old_status, "old_status")?,
        new_status: parse_text(&new_status, "new_status")?,
        update_source: parse_text(&source, "update_source")?,
        updated_by: row.try_get("updated_by")?,
        created_at: time::from_db(&created_at)?,
    })
}

/// Append one audit entry
pub async fn insert_log(
    conn: &mut SqliteConnection,
    exchange_id: &str,
    feature_id: &str,
    old_status: FeatureStatus,
    new_status: FeatureStatus,
    source: UpdateSource,
    updated_by: Option<&str>,
) -> Result<FeatureUpdateLog> {
    let log = FeatureUpdateLog {
        id: uuid_utils::new_id(),
        exchange_id: exchange_id.to_string(),
        feature_id: feature_id.to_string(),
        old_status,
        new_status,
        update_source: source,
        updated_by: updated_by.map(str::to_string),
        created_at: time::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO feature_update_logs (
            id, exchange_id, feature_id, old_status, new_status, update_source, updated_by, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&log.id)
    .bind(&log.exchange_id)
    .bind(&log.feature_id)
    .bind(log.old_status.as_str())
    .bind(log.new_status.as_str())
    .bind(log.update_source.as_str())
    .bind(&log.updated_by)
    .bind(time::to_db(&log.created_at))
    .execute(&mut *conn)
    .await?;

    Ok(log)
}

/// Most recent entries first
pub async fn list_logs(
    conn: &mut SqliteConnection,
    filter: &UpdateLogFilter,
) -> Result<Vec<UpdateLogEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT l.id, l.exchange_id, l.feature_id, l.old_status, l.new_status, l.update_source,
               l.updated_by, l.created_at, e.name AS exchange_name, f.name AS feature_name
        FROM feature_update_logs l
        JOIN exchanges e ON e.id = l.exchange_id
        JOIN features f ON f.id = l.feature_id
        WHERE (? IS NULL OR l.exchange_id = ?)
          AND (? IS NULL OR l.feature_id = ?)
        ORDER BY l.created_at DESC, l.rowid DESC
        LIMIT ?
        "#,
    )
    .bind(&filter.exchange_id)
    .bind(&filter.exchange_id)
    .bind(&filter.feature_id)
    .bind(&filter.feature_id)
    .bind(filter.limit)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(UpdateLogEntry {
                log: log_from_row(row)?,
                exchange_name: row.try_get("exchange_name")?,
                feature_name: row.try_get("feature_name")?,
            })
        })
        .collect()
}

/// Entries for one cell in append order
pub async fn list_logs_for_cell(
    conn: &mut SqliteConnection,
    exchange_id: &str,
    feature_id: &str,
) -> Result<Vec<FeatureUpdateLog>> {
    let rows = sqlx::query(
        r#"
        SELECT id, exchange_id, feature_id, old_status, new_status, update_source, updated_by, created_at
        FROM feature_update_logs
        WHERE exchange_id = ? AND feature_id = ?
        ORDER BY created_at, rowid
        "#,
    )
    .bind(exchange_id)
    .bind(feature_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(log_from_row).collect()
}

/// Total number of audit entries
pub async fn count_logs(conn: &mut SqliteConnection) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM feature_update_logs")
        .fetch_one(&mut *conn)
        .await?;

    Ok(count)
}

/// Timestamp of the newest entry, the matrix "last updated" signal
pub async fn latest_log_time(conn: &mut SqliteConnection) -> Result<Option<DateTime<Utc>>> {
    let latest: Option<String> = sqlx::query_scalar("SELECT MAX(created_at) FROM feature_update_logs")
        .fetch_one(&mut *conn)
        .await?;

    time::from_db_opt(latest)
}
