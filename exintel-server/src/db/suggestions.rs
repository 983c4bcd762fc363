//! Suggestion persistence

use chrono::{DateTime, Utc};
use exintel_common::db::{FeatureStatus, FeatureUpdateSuggestion, SuggestionStatus};
use exintel_common::{time, uuid_utils, Result};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::parse_text;

/// Values for a new pending suggestion
#[derive(Debug, Clone)]
pub struct SuggestionDraft {
    pub exchange_id: String,
    pub feature_id: String,
    pub old_status: FeatureStatus,
    pub suggested_status: FeatureStatus,
    pub ai_confidence: f64,
    pub evidence: Option<String>,
    pub source_url: Option<String>,
}

/// Suggestion with exchange and feature names for review screens
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionView {
    #[serde(flatten)]
    pub suggestion: FeatureUpdateSuggestion,
    pub exchange_name: String,
    pub feature_name: String,
    pub category_name: String,
}

/// Filter for the review queue
#[derive(Debug, Clone, Default)]
pub struct SuggestionFilter {
    /// `None` lists every state
    pub status: Option<SuggestionStatus>,
    pub exchange_id: Option<String>,
    pub min_confidence: Option<f64>,
}

const SELECT_SUGGESTION: &str = r#"
    SELECT id, exchange_id, feature_id, old_status, suggested_status, ai_confidence,
           evidence, source_url, status, created_at, reviewed_at, reviewed_by
    FROM feature_update_suggestions
"#;

fn suggestion_from_row(row: &SqliteRow) -> Result<FeatureUpdateSuggestion> {
    let old_status: String = row.try_get("old_status")?;
    let suggested_status: String = row.try_get("suggested_status")?;
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(FeatureUpdateSuggestion {
        id: row.try_get("id")?,
        exchange_id: row.try_get("exchange_id")?,
        feature_id: row.try_get("feature_id")?,
        old_status: parse_text(&old_status, "old_status")?,
        suggested_status: parse_text(&suggested_status, "suggested_status")?,
        ai_confidence: row.try_get("ai_confidence")?,
        evidence: row.try_get("evidence")?,
        source_url: row.try_get("source_url")?,
        status: parse_text(&status, "status")?,
        created_at: time::from_db(&created_at)?,
        reviewed_at: time::from_db_opt(row.try_get("reviewed_at")?)?,
        reviewed_by: row.try_get("reviewed_by")?,
    })
}

/// Insert a pending suggestion
pub async fn insert_suggestion(
    conn: &mut SqliteConnection,
    draft: &SuggestionDraft,
) -> Result<FeatureUpdateSuggestion> {
    let suggestion = FeatureUpdateSuggestion {
        id: uuid_utils::new_id(),
        exchange_id: draft.exchange_id.clone(),
        feature_id: draft.feature_id.clone(),
        old_status: draft.old_status,
        suggested_status: draft.suggested_status,
        ai_confidence: draft.ai_confidence,
        evidence: draft.evidence.clone(),
        source_url: draft.source_url.clone(),
        status: SuggestionStatus::Pending,
        created_at: time::now(),
        reviewed_at: None,
        reviewed_by: None,
    };

    sqlx::query(
        r#"
        INSERT INTO feature_update_suggestions (
            id, exchange_id, feature_id, old_status, suggested_status, ai_confidence,
            evidence, source_url, status, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&suggestion.id)
    .bind(&suggestion.exchange_id)
    .bind(&suggestion.feature_id)
    .bind(suggestion.old_status.as_str())
    .bind(suggestion.suggested_status.as_str())
    .bind(suggestion.ai_confidence)
    .bind(&suggestion.evidence)
    .bind(&suggestion.source_url)
    .bind(suggestion.status.as_str())
    .bind(time::to_db(&suggestion.created_at))
    .execute(&mut *conn)
    .await?;

    Ok(suggestion)
}

/// Load suggestion by id
pub async fn get_suggestion(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<FeatureUpdateSuggestion>> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_SUGGESTION))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(suggestion_from_row).transpose()
}

/// Move a pending suggestion to a terminal state
///
/// Guarded on `status = 'pending'`; returns false when another reviewer got
/// there first.
pub async fn mark_reviewed(
    conn: &mut SqliteConnection,
    id: &str,
    status: SuggestionStatus,
    reviewed_by: &str,
    reviewed_at: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE feature_update_suggestions
        SET status = ?, reviewed_at = ?, reviewed_by = ?
        WHERE id = ? AND status = 'pending'
        "#,
    )
    .bind(status.as_str())
    .bind(time::to_db(&reviewed_at))
    .bind(reviewed_by)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Review queue, most confident first
pub async fn list_suggestions(
    conn: &mut SqliteConnection,
    filter: &SuggestionFilter,
) -> Result<Vec<SuggestionView>> {
    let status = filter.status.map(|s| s.as_str());
    let rows = sqlx::query(
        r#"
        SELECT s.id, s.exchange_id, s.feature_id, s.old_status, s.suggested_status, s.ai_confidence,
               s.evidence, s.source_url, s.status, s.created_at, s.reviewed_at, s.reviewed_by,
               e.name AS exchange_name, f.name AS feature_name, c.name AS category_name
        FROM feature_update_suggestions s
        JOIN exchanges e ON e.id = s.exchange_id
        JOIN features f ON f.id = s.feature_id
        JOIN feature_categories c ON c.id = f.category_id
        WHERE (? IS NULL OR s.status = ?)
          AND (? IS NULL OR s.exchange_id = ?)
          AND (? IS NULL OR s.ai_confidence >= ?)
        ORDER BY s.ai_confidence DESC, s.created_at DESC
        "#,
    )
    .bind(status)
    .bind(status)
    .bind(&filter.exchange_id)
    .bind(&filter.exchange_id)
    .bind(filter.min_confidence)
    .bind(filter.min_confidence)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(SuggestionView {
                suggestion: suggestion_from_row(row)?,
                exchange_name: row.try_get("exchange_name")?,
                feature_name: row.try_get("feature_name")?,
                category_name: row.try_get("category_name")?,
            })
        })
        .collect()
}

/// Number of suggestions awaiting review
pub async fn count_pending(conn: &mut SqliteConnection) -> Result<i64> {
    let count = sqlx::query_scalar(
        "SELECT COUNT(*) FROM feature_update_suggestions WHERE status = 'pending'",
    )
    .fetch_one(&mut *conn)
    .await?;

    Ok(count)
}
