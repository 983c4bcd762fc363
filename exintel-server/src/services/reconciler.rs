//! Matrix reconciler
//!
//! The single write primitive for matrix cells. Spreadsheet import, suggestion
//! approval and manual edits all land here, so every status change leaves
//! exactly one audit entry and re-applying a value leaves none.
//!
//! `has_feature` is never taken from callers; it is derived from the status.

use exintel_common::db::{ExchangeFeature, FeatureStatus, UpdateSource};
use exintel_common::Result;
use sqlx::SqliteConnection;
use tracing::debug;

use crate::db::{cells, update_logs};

/// Requested cell value and where it came from
#[derive(Debug, Clone)]
pub struct CellChange<'a> {
    pub exchange_id: &'a str,
    pub feature_id: &'a str,
    pub status: FeatureStatus,
    /// Replaces the stored notes when present
    pub notes: Option<&'a str>,
    pub source: UpdateSource,
    pub updated_by: Option<&'a str>,
}

/// What happened to the cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// No cell existed; created without an audit entry
    Created,
    /// Status changed; one audit entry appended
    Updated { old_status: FeatureStatus },
    /// Status already matched; notes may have been replaced
    Unchanged,
}

impl ReconcileOutcome {
    pub fn status_changed(&self) -> bool {
        matches!(self, ReconcileOutcome::Updated { .. })
    }
}

/// Reconciled cell and outcome
#[derive(Debug, Clone)]
pub struct Reconciled {
    pub cell: ExchangeFeature,
    pub outcome: ReconcileOutcome,
}

/// Upsert one cell, logging only a real status transition
///
/// Runs on whatever connection the caller holds; callers that need the cell
/// write and their own bookkeeping to commit together pass a transaction.
pub async fn reconcile(conn: &mut SqliteConnection, change: &CellChange<'_>) -> Result<Reconciled> {
    let existing = cells::get_cell(conn, change.exchange_id, change.feature_id).await?;

    let Some(existing) = existing else {
        let cell = cells::upsert_cell(
            conn,
            change.exchange_id,
            change.feature_id,
            change.status,
            change.notes,
        )
        .await?;
        debug!(
            exchange_id = %change.exchange_id,
            feature_id = %change.feature_id,
            status = %change.status,
            "Matrix cell created"
        );
        return Ok(Reconciled {
            cell,
            outcome: ReconcileOutcome::Created,
        });
    };

    if existing.feature_status == change.status {
        let mut cell = existing;
        if let Some(notes) = change.notes {
            if cell.notes.as_deref() != Some(notes) {
                cells::update_cell_notes(conn, &cell.id, notes).await?;
                cell.notes = Some(notes.to_string());
            }
        }
        return Ok(Reconciled {
            cell,
            outcome: ReconcileOutcome::Unchanged,
        });
    }

    let old_status = existing.feature_status;
    let cell = cells::upsert_cell(
        conn,
        change.exchange_id,
        change.feature_id,
        change.status,
        change.notes,
    )
    .await?;

    update_logs::insert_log(
        conn,
        change.exchange_id,
        change.feature_id,
        old_status,
        change.status,
        change.source,
        change.updated_by,
    )
    .await?;

    debug!(
        exchange_id = %change.exchange_id,
        feature_id = %change.feature_id,
        old_status = %old_status,
        new_status = %change.status,
        source = %change.source,
        "Matrix cell status changed"
    );

    Ok(Reconciled {
        cell,
        outcome: ReconcileOutcome::Updated { old_status },
    })
}
