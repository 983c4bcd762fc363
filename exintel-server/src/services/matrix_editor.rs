//! Manual matrix cell edits
//!
//! Fills in omitted fields (from the stored cell on update, from defaults on
//! create) and hands the result to the reconciler with source `manual`.

use exintel_common::db::{ExchangeFeature, FeatureStatus, UpdateSource};
use exintel_common::{Error, Result};
use serde::Deserialize;
use sqlx::SqliteConnection;
use tracing::info;

use crate::db::{cells, exchanges, features};
use crate::services::reconciler::{reconcile, CellChange, Reconciled};

/// Cell edit request body
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellEdit {
    #[serde(default)]
    pub exchange_id: Option<String>,
    #[serde(default)]
    pub feature_id: Option<String>,
    #[serde(default)]
    pub has_feature: Option<bool>,
    #[serde(default)]
    pub feature_status: Option<FeatureStatus>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub updated_by: Option<String>,
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::InvalidInput(format!("{} is required", field)))
}

/// Status to store for an edit
///
/// An explicit status wins. A bare `hasFeature` keeps the stored status when
/// it already agrees, otherwise maps to `available`/`not_available`. With
/// neither, the stored status is kept (`unknown` for a new cell).
pub fn resolve_status(edit: &CellEdit, existing: Option<&ExchangeFeature>) -> FeatureStatus {
    if let Some(status) = edit.feature_status {
        return status;
    }

    match (edit.has_feature, existing) {
        (Some(has), Some(cell)) if cell.has_feature == has => cell.feature_status,
        (Some(true), _) => FeatureStatus::Available,
        (Some(false), _) => FeatureStatus::NotAvailable,
        (None, Some(cell)) => cell.feature_status,
        (None, None) => FeatureStatus::Unknown,
    }
}

/// Apply a manual edit to one cell
///
/// Callers pass a transaction so the cell write and its audit entry commit
/// together.
pub async fn edit_cell(conn: &mut SqliteConnection, edit: &CellEdit) -> Result<Reconciled> {
    let exchange_id = required(&edit.exchange_id, "exchangeId")?;
    let feature_id = required(&edit.feature_id, "featureId")?;

    if exchanges::get_exchange(conn, exchange_id).await?.is_none() {
        return Err(Error::NotFound(format!("exchange {}", exchange_id)));
    }
    if features::get_feature(conn, feature_id).await?.is_none() {
        return Err(Error::NotFound(format!("feature {}", feature_id)));
    }

    let existing = cells::get_cell(conn, exchange_id, feature_id).await?;
    let status = resolve_status(edit, existing.as_ref());

    let reconciled = reconcile(
        conn,
        &CellChange {
            exchange_id,
            feature_id,
            status,
            notes: edit.notes.as_deref(),
            source: UpdateSource::Manual,
            updated_by: edit.updated_by.as_deref(),
        },
    )
    .await?;

    info!(
        exchange_id = %exchange_id,
        feature_id = %feature_id,
        status = %reconciled.cell.feature_status,
        outcome = ?reconciled.outcome,
        "Matrix cell edited"
    );

    Ok(reconciled)
}
