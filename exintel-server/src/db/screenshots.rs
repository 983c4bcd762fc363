//! Screenshot persistence

use chrono::{DateTime, Utc};
use exintel_common::db::Screenshot;
use exintel_common::{time, uuid_utils, Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

/// Listing cap
pub const MAX_LIST: i64 = 100;

/// Fields accepted when registering a screenshot
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewScreenshot {
    pub exchange_id: String,
    pub storage_key: String,
    #[serde(default)]
    pub feature_id: Option<String>,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Screenshot with exchange name and tag names
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotView {
    #[serde(flatten)]
    pub screenshot: Screenshot,
    pub exchange_name: String,
    pub feature_name: Option<String>,
    pub category_name: Option<String>,
}

/// Listing filter
#[derive(Debug, Clone, Default)]
pub struct ScreenshotFilter {
    pub exchange_id: Option<String>,
    pub feature_id: Option<String>,
    pub category_id: Option<String>,
    /// `Some(true)` classified only, `Some(false)` unclassified only
    pub classified: Option<bool>,
}

/// Model output persisted on a screenshot
#[derive(Debug, Clone)]
pub struct ClassificationRecord {
    pub raw: serde_json::Value,
    pub confidence: f64,
    pub feature_id: Option<String>,
    pub category_id: Option<String>,
    pub classified_at: DateTime<Utc>,
}

const SELECT_SCREENSHOT: &str = r#"
    SELECT id, exchange_id, storage_key, feature_id, category_id, notes,
           ai_classification, ai_confidence, classified_at, uploaded_at
    FROM screenshots
"#;

fn screenshot_from_row(row: &SqliteRow) -> Result<Screenshot> {
    let classification: Option<String> = row.try_get("ai_classification")?;
    let ai_classification = classification
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|e| Error::Internal(format!("Corrupt ai_classification column: {}", e)))?;
    let uploaded_at: String = row.try_get("uploaded_at")?;

    Ok(Screenshot {
        id: row.try_get("id")?,
        exchange_id: row.try_get("exchange_id")?,
        storage_key: row.try_get("storage_key")?,
        feature_id: row.try_get("feature_id")?,
        category_id: row.try_get("category_id")?,
        notes: row.try_get("notes")?,
        ai_classification,
        ai_confidence: row.try_get("ai_confidence")?,
        classified_at: time::from_db_opt(row.try_get("classified_at")?)?,
        uploaded_at: time::from_db(&uploaded_at)?,
    })
}

/// Register a screenshot
///
/// A storage key that is already registered fails with `Error::Conflict`.
pub async fn insert_screenshot(
    conn: &mut SqliteConnection,
    new: &NewScreenshot,
) -> Result<Screenshot> {
    if new.storage_key.trim().is_empty() {
        return Err(Error::InvalidInput("storage key is required".to_string()));
    }

    let screenshot = Screenshot {
        id: uuid_utils::new_id(),
        exchange_id: new.exchange_id.clone(),
        storage_key: new.storage_key.trim().to_string(),
        feature_id: new.feature_id.clone(),
        category_id: new.category_id.clone(),
        notes: new.notes.clone(),
        ai_classification: None,
        ai_confidence: None,
        classified_at: None,
        uploaded_at: time::now(),
    };

    let result = sqlx::query(
        r#"
        INSERT INTO screenshots (id, exchange_id, storage_key, feature_id, category_id, notes, uploaded_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&screenshot.id)
    .bind(&screenshot.exchange_id)
    .bind(&screenshot.storage_key)
    .bind(&screenshot.feature_id)
    .bind(&screenshot.category_id)
    .bind(&screenshot.notes)
    .bind(time::to_db(&screenshot.uploaded_at))
    .execute(&mut *conn)
    .await;

    match result.map_err(Error::from) {
        Ok(_) => Ok(screenshot),
        Err(e) if e.is_unique_violation() => Err(Error::Conflict(format!(
            "screenshot '{}' already registered",
            screenshot.storage_key
        ))),
        Err(e) => Err(e),
    }
}

/// Load screenshot by id
pub async fn get_screenshot(conn: &mut SqliteConnection, id: &str) -> Result<Option<Screenshot>> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_SCREENSHOT))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(screenshot_from_row).transpose()
}

/// Load screenshot by storage key
pub async fn find_screenshot_by_key(
    conn: &mut SqliteConnection,
    storage_key: &str,
) -> Result<Option<Screenshot>> {
    let row = sqlx::query(&format!("{} WHERE storage_key = ?", SELECT_SCREENSHOT))
        .bind(storage_key)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(screenshot_from_row).transpose()
}

/// Ids of the oldest screenshots without a classification
pub async fn oldest_unclassified_ids(conn: &mut SqliteConnection, limit: i64) -> Result<Vec<String>> {
    let ids = sqlx::query_scalar(
        r#"
        SELECT id FROM screenshots
        WHERE classified_at IS NULL
        ORDER BY uploaded_at, rowid
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(&mut *conn)
    .await?;

    Ok(ids)
}

/// Persist a classification result
///
/// Tags are overwritten with the matched ids, which may be null when the
/// model named something unknown.
pub async fn save_classification(
    conn: &mut SqliteConnection,
    id: &str,
    record: &ClassificationRecord,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE screenshots
        SET ai_classification = ?, ai_confidence = ?, feature_id = ?, category_id = ?, classified_at = ?
        WHERE id = ?
        "#,
    )
    .bind(record.raw.to_string())
    .bind(record.confidence)
    .bind(&record.feature_id)
    .bind(&record.category_id)
    .bind(time::to_db(&record.classified_at))
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Newest first, capped at `MAX_LIST`
pub async fn list_screenshots(
    conn: &mut SqliteConnection,
    filter: &ScreenshotFilter,
) -> Result<Vec<ScreenshotView>> {
    let rows = sqlx::query(
        r#"
        SELECT s.id, s.exchange_id, s.storage_key, s.feature_id, s.category_id, s.notes,
               s.ai_classification, s.ai_confidence, s.classified_at, s.uploaded_at,
               e.name AS exchange_name, f.name AS feature_name, c.name AS category_name
        FROM screenshots s
        JOIN exchanges e ON e.id = s.exchange_id
        LEFT JOIN features f ON f.id = s.feature_id
        LEFT JOIN feature_categories c ON c.id = s.category_id
        WHERE (? IS NULL OR s.exchange_id = ?)
          AND (? IS NULL OR s.feature_id = ?)
          AND (? IS NULL OR s.category_id = ?)
          AND (? IS NULL OR (s.classified_at IS NOT NULL) = ?)
        ORDER BY s.uploaded_at DESC, s.rowid DESC
        LIMIT ?
        "#,
    )
    .bind(&filter.exchange_id)
    .bind(&filter.exchange_id)
    .bind(&filter.feature_id)
    .bind(&filter.feature_id)
    .bind(&filter.category_id)
    .bind(&filter.category_id)
    .bind(filter.classified)
    .bind(filter.classified)
    .bind(MAX_LIST)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(ScreenshotView {
                screenshot: screenshot_from_row(row)?,
                exchange_name: row.try_get("exchange_name")?,
                feature_name: row.try_get("feature_name")?,
                category_name: row.try_get("category_name")?,
            })
        })
        .collect()
}
