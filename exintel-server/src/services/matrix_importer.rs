//! Spreadsheet import
//!
//! Applies a parsed sheet to the store. Categories, features and exchanges
//! are resolved by natural key (exact category name, feature slug,
//! case-insensitive exchange name), so re-importing the same file creates
//! nothing and logs nothing.
//!
//! Feature columns are resolved in one transaction before any row is
//! touched. Each data row then commits on its own: a row that fails to store
//! is rolled back and reported as a `Row N: ...` warning while the rows
//! around it still land.

use exintel_common::naming::exchange_name_key;
use exintel_common::db::UpdateSource;
use serde::Serialize;
use sqlx::{Connection, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{info, warn};

use crate::db::{categories, exchanges, features};
use crate::services::feature_category_map::{canonical_category, category_for_feature};
use crate::services::reconciler::{reconcile, CellChange, ReconcileOutcome};
use crate::services::spreadsheet::{parse_spreadsheet, ParsedSheet, SheetRow, SpreadsheetError};

/// Import failure; structural failures write nothing
#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Spreadsheet(#[from] SpreadsheetError),

    /// Every data row was rejected
    #[error("no importable rows")]
    NoRows(Vec<String>),

    #[error(transparent)]
    Store(#[from] exintel_common::Error),
}

impl From<sqlx::Error> for ImportError {
    fn from(err: sqlx::Error) -> Self {
        ImportError::Store(err.into())
    }
}

/// Import response
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub success: bool,
    /// Accepted data rows
    pub exchanges: usize,
    /// Accepted feature columns
    pub features: usize,
    pub cells_created: usize,
    /// Cells whose status changed
    pub cells_updated: usize,
    pub exchanges_created: usize,
    pub features_created: usize,
    pub categories_created: usize,
    /// Skipped rows and ignored columns
    pub warnings: Vec<String>,
}

/// Parse `bytes` and apply them
pub async fn import_spreadsheet(pool: &SqlitePool, bytes: &[u8]) -> Result<ImportSummary, ImportError> {
    let parsed = parse_spreadsheet(bytes)?;
    if parsed.rows.is_empty() && !parsed.errors.is_empty() {
        return Err(ImportError::NoRows(parsed.errors));
    }

    let mut conn = pool.acquire().await?;
    let summary = apply_sheet(&mut conn, &parsed).await?;

    info!(
        rows = summary.exchanges,
        features = summary.features,
        cells_created = summary.cells_created,
        cells_updated = summary.cells_updated,
        warnings = summary.warnings.len(),
        "Spreadsheet import complete"
    );

    Ok(summary)
}

/// Apply an already parsed sheet on `conn`
///
/// Rows are processed in file order, every cell of a row is written. Only a
/// failure while resolving the feature columns is returned as an error.
pub async fn apply_sheet(
    conn: &mut SqliteConnection,
    parsed: &ParsedSheet,
) -> exintel_common::Result<ImportSummary> {
    let mut summary = ImportSummary {
        success: true,
        exchanges: parsed.rows.len(),
        features: parsed.feature_columns.len(),
        warnings: parsed.errors.clone(),
        ..ImportSummary::default()
    };

    let mut tx = conn.begin().await?;
    let feature_ids = resolve_feature_columns(&mut tx, parsed, &mut summary).await?;
    tx.commit().await?;

    let mut exchange_ids: HashMap<String, String> = HashMap::new();

    for row in &parsed.rows {
        let key = exchange_name_key(&row.exchange_name);
        let cached = exchange_ids.get(&key).map(String::as_str);

        let mut tx = conn.begin().await?;
        match apply_row(&mut tx, row, cached, &feature_ids).await {
            Ok(applied) => {
                tx.commit().await?;
                if applied.exchange_created {
                    summary.exchanges_created += 1;
                }
                summary.cells_created += applied.cells_created;
                summary.cells_updated += applied.cells_updated;
                exchange_ids.insert(key, applied.exchange_id);
            }
            Err(e) => {
                tx.rollback().await?;
                warn!(line = row.line, exchange = %row.exchange_name, error = %e, "Import row failed");
                summary.warnings.push(format!("Row {}: {}", row.line, e));
            }
        }
    }

    summary.warnings.extend(parsed.warnings.iter().cloned());

    Ok(summary)
}

/// Find or create the category and feature behind every column
async fn resolve_feature_columns(
    conn: &mut SqliteConnection,
    parsed: &ParsedSheet,
    summary: &mut ImportSummary,
) -> exintel_common::Result<Vec<String>> {
    let mut category_ids: HashMap<&'static str, String> = HashMap::new();
    let mut feature_ids = Vec::with_capacity(parsed.feature_columns.len());

    for column in &parsed.feature_columns {
        let category_name = category_for_feature(&column.name);

        let category_id = match category_ids.get(category_name) {
            Some(id) => id.clone(),
            None => {
                let canonical = canonical_category(category_name);
                let (category, created) = categories::find_or_create_category(
                    conn,
                    category_name,
                    canonical.map(|c| c.icon),
                    canonical.map(|c| c.sort_order),
                )
                .await?;
                if created {
                    summary.categories_created += 1;
                }
                category_ids.insert(category_name, category.id.clone());
                category.id
            }
        };

        let (feature, created) = features::find_or_create_feature(
            conn,
            &features::NewFeature {
                name: column.name.clone(),
                category_id,
                sort_order: column.position as i64,
                description: None,
            },
        )
        .await?;
        if created {
            summary.features_created += 1;
        }
        feature_ids.push(feature.id);
    }

    Ok(feature_ids)
}

struct AppliedRow {
    exchange_id: String,
    exchange_created: bool,
    cells_created: usize,
    cells_updated: usize,
}

async fn apply_row(
    conn: &mut SqliteConnection,
    row: &SheetRow,
    cached_exchange: Option<&str>,
    feature_ids: &[String],
) -> exintel_common::Result<AppliedRow> {
    let mut applied = match cached_exchange {
        Some(id) => AppliedRow {
            exchange_id: id.to_string(),
            exchange_created: false,
            cells_created: 0,
            cells_updated: 0,
        },
        None => {
            let (exchange, created) =
                exchanges::find_or_create_exchange(conn, &row.exchange_name, row.market_type).await?;
            if !created && exchange.market_type != row.market_type {
                warn!(
                    exchange = %exchange.name,
                    stored = %exchange.market_type,
                    sheet = %row.market_type,
                    "Existing exchange keeps its market type"
                );
            }
            AppliedRow {
                exchange_id: exchange.id,
                exchange_created: created,
                cells_created: 0,
                cells_updated: 0,
            }
        }
    };

    for (feature_id, status) in feature_ids.iter().zip(&row.values) {
        let result = reconcile(
            conn,
            &CellChange {
                exchange_id: &applied.exchange_id,
                feature_id,
                status: *status,
                notes: None,
                source: UpdateSource::ExcelImport,
                updated_by: None,
            },
        )
        .await?;

        match result.outcome {
            ReconcileOutcome::Created => applied.cells_created += 1,
            ReconcileOutcome::Updated { .. } => applied.cells_updated += 1,
            ReconcileOutcome::Unchanged => {}
        }
    }

    Ok(applied)
}
