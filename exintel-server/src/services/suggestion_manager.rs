//! Suggestion lifecycle
//!
//! Suggestions start `pending` and move to `approved` or `rejected` exactly
//! once. Approval applies the suggested status through the reconciler with
//! source `ai_approved`.
//!
//! Resolution is per id: each id gets its own transaction, so one failure
//! never rolls back the others and the caller always gets one result per id,
//! in request order.

use exintel_common::db::{FeatureStatus, FeatureUpdateSuggestion, SuggestionStatus, UpdateSource};
use exintel_common::{time, Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{info, warn};

use crate::db::suggestions::{self, SuggestionDraft};
use crate::db::{cells, exchanges, features};
use crate::services::reconciler::{reconcile, CellChange};

/// Suggestion intake
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSuggestion {
    pub exchange_id: String,
    pub feature_id: String,
    /// Defaults to the cell's current status (`unknown` without a cell)
    #[serde(default)]
    pub old_status: Option<FeatureStatus>,
    pub suggested_status: FeatureStatus,
    pub ai_confidence: f64,
    #[serde(default)]
    pub evidence: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
}

/// Review decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolveAction {
    Approve,
    Reject,
}

/// Per-id outcome of a resolve call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolveStatus {
    Approved,
    Rejected,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolveResult {
    pub id: String,
    pub status: ResolveStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ResolveResult {
    fn skipped(id: &str, reason: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            status: ResolveStatus::Skipped,
            reason: Some(reason.into()),
        }
    }
}

/// Create a pending suggestion
///
/// No deduplication: several pending suggestions may target the same cell.
pub async fn create_suggestion(
    conn: &mut SqliteConnection,
    new: &NewSuggestion,
) -> Result<FeatureUpdateSuggestion> {
    if !new.ai_confidence.is_finite() || !(0.0..=1.0).contains(&new.ai_confidence) {
        return Err(Error::InvalidInput(format!(
            "aiConfidence must be between 0 and 1, got {}",
            new.ai_confidence
        )));
    }

    if exchanges::get_exchange(conn, &new.exchange_id).await?.is_none() {
        return Err(Error::NotFound(format!("exchange {}", new.exchange_id)));
    }
    if features::get_feature(conn, &new.feature_id).await?.is_none() {
        return Err(Error::NotFound(format!("feature {}", new.feature_id)));
    }

    let old_status = match new.old_status {
        Some(status) => status,
        None => cells::get_cell(conn, &new.exchange_id, &new.feature_id)
            .await?
            .map(|cell| cell.feature_status)
            .unwrap_or(FeatureStatus::Unknown),
    };

    let suggestion = suggestions::insert_suggestion(
        conn,
        &SuggestionDraft {
            exchange_id: new.exchange_id.clone(),
            feature_id: new.feature_id.clone(),
            old_status,
            suggested_status: new.suggested_status,
            ai_confidence: new.ai_confidence,
            evidence: new.evidence.clone(),
            source_url: new.source_url.clone(),
        },
    )
    .await?;

    info!(
        suggestion_id = %suggestion.id,
        exchange_id = %suggestion.exchange_id,
        feature_id = %suggestion.feature_id,
        suggested_status = %suggestion.suggested_status,
        "Suggestion created"
    );

    Ok(suggestion)
}

/// Approve or reject suggestions in the given order
///
/// Unknown ids, already resolved ids and ids whose write failed come back as
/// `skipped` with a reason.
pub async fn resolve_suggestions(
    pool: &SqlitePool,
    ids: &[String],
    action: ResolveAction,
    reviewer: &str,
) -> Vec<ResolveResult> {
    let mut results = Vec::with_capacity(ids.len());

    for id in ids {
        let result = match resolve_one(pool, id, action, reviewer).await {
            Ok(result) => result,
            Err(e) => {
                warn!(suggestion_id = %id, error = %e, "Suggestion resolution failed");
                ResolveResult::skipped(id, format!("failed: {}", e))
            }
        };
        results.push(result);
    }

    let resolved = results
        .iter()
        .filter(|r| r.status != ResolveStatus::Skipped)
        .count();
    info!(
        action = ?action,
        requested = ids.len(),
        resolved,
        skipped = ids.len() - resolved,
        "Suggestions resolved"
    );

    results
}

async fn resolve_one(
    pool: &SqlitePool,
    id: &str,
    action: ResolveAction,
    reviewer: &str,
) -> Result<ResolveResult> {
    let mut tx = pool.begin().await?;

    let Some(suggestion) = suggestions::get_suggestion(&mut tx, id).await? else {
        return Ok(ResolveResult::skipped(id, "not found"));
    };
    if suggestion.status.is_terminal() {
        return Ok(ResolveResult::skipped(
            id,
            format!("already {}", suggestion.status),
        ));
    }

    let (new_state, status) = match action {
        ResolveAction::Approve => (SuggestionStatus::Approved, ResolveStatus::Approved),
        ResolveAction::Reject => (SuggestionStatus::Rejected, ResolveStatus::Rejected),
    };

    if !suggestions::mark_reviewed(&mut tx, id, new_state, reviewer, time::now()).await? {
        return Ok(ResolveResult::skipped(id, "already resolved"));
    }

    if action == ResolveAction::Approve {
        reconcile(
            &mut tx,
            &CellChange {
                exchange_id: &suggestion.exchange_id,
                feature_id: &suggestion.feature_id,
                status: suggestion.suggested_status,
                notes: None,
                source: UpdateSource::AiApproved,
                updated_by: Some(reviewer),
            },
        )
        .await?;
    }

    tx.commit().await?;

    Ok(ResolveResult {
        id: id.to_string(),
        status,
        reason: None,
    })
}
