//! Matrix read model and export
//!
//! The matrix view lists exchanges that have at least one cell; the export
//! lists every exchange of the selected market so empty rows can be filled in
//! a spreadsheet and re-imported.

use chrono::{DateTime, NaiveDate, Utc};
use exintel_common::db::{Exchange, ExchangeFeature, Feature, FeatureCategory, FeatureStatus, MarketType};
use exintel_common::{Error, Result};
use serde::Serialize;
use sqlx::SqliteConnection;
use std::collections::{BTreeMap, HashSet};

use crate::db::{categories, cells, exchanges, features, update_logs};
use crate::services::spreadsheet::{MARKET_HEADER, NAME_HEADER};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixExchange {
    pub id: String,
    pub name: String,
    pub market_type: MarketType,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatrixFeature {
    pub id: String,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixCategory {
    pub id: String,
    pub name: String,
    pub icon: Option<String>,
    pub sort_order: i64,
    pub features: Vec<MatrixFeature>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixCell {
    pub exchange_id: String,
    pub feature_id: String,
    pub has_feature: bool,
    pub feature_status: FeatureStatus,
    pub notes: Option<String>,
}

impl From<ExchangeFeature> for MatrixCell {
    fn from(cell: ExchangeFeature) -> Self {
        Self {
            exchange_id: cell.exchange_id,
            feature_id: cell.feature_id,
            has_feature: cell.has_feature,
            feature_status: cell.feature_status,
            notes: cell.notes,
        }
    }
}

/// `cells[exchange_id][feature_id]`
pub type CellMap<T> = BTreeMap<String, BTreeMap<String, T>>;

/// Matrix read model
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixView {
    pub exchanges: Vec<MatrixExchange>,
    pub categories: Vec<MatrixCategory>,
    pub cells: CellMap<MatrixCell>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Categories in display order with their features nested
fn group_features(all_categories: Vec<FeatureCategory>, all_features: &[Feature]) -> Vec<MatrixCategory> {
    all_categories
        .into_iter()
        .map(|category| {
            let features = all_features
                .iter()
                .filter(|f| f.category_id == category.id)
                .map(|f| MatrixFeature {
                    id: f.id.clone(),
                    name: f.name.clone(),
                    slug: f.slug.clone(),
                })
                .collect();
            MatrixCategory {
                id: category.id,
                name: category.name,
                icon: category.icon,
                sort_order: category.sort_order,
                features,
            }
        })
        .collect()
}

fn in_market(exchange: &Exchange, market_type: Option<MarketType>) -> bool {
    market_type.map_or(true, |m| exchange.market_type == m)
}

/// Load the matrix, optionally for one market
pub async fn load_matrix(
    conn: &mut SqliteConnection,
    market_type: Option<MarketType>,
) -> Result<MatrixView> {
    let all_exchanges = exchanges::list_all_exchanges(conn).await?;
    let all_categories = categories::list_categories(conn).await?;
    let all_features = features::list_features(conn).await?;
    let all_cells = cells::list_cells(conn, market_type.map(|m| m.as_str())).await?;
    let last_updated = update_logs::latest_log_time(conn).await?;

    let with_data: HashSet<&str> = all_cells.iter().map(|c| c.exchange_id.as_str()).collect();
    let exchanges = all_exchanges
        .iter()
        .filter(|e| in_market(e, market_type) && with_data.contains(e.id.as_str()))
        .map(|e| MatrixExchange {
            id: e.id.clone(),
            name: e.name.clone(),
            market_type: e.market_type,
        })
        .collect();

    let mut cell_map: CellMap<MatrixCell> = BTreeMap::new();
    for cell in all_cells {
        cell_map
            .entry(cell.exchange_id.clone())
            .or_default()
            .insert(cell.feature_id.clone(), cell.into());
    }

    Ok(MatrixView {
        exchanges,
        categories: group_features(all_categories, &all_features),
        cells: cell_map,
        last_updated,
    })
}

/// Export rendering of a cell: `VAR` when the feature is offered, empty for
/// unknown, `YOK` otherwise
pub fn export_value(cell: &ExchangeFeature) -> &'static str {
    if cell.has_feature {
        "VAR"
    } else if cell.feature_status == FeatureStatus::Unknown {
        ""
    } else {
        "YOK"
    }
}

/// Spreadsheet rendering of a market type
pub fn export_market(market_type: MarketType) -> &'static str {
    match market_type {
        MarketType::Turkish => "TR",
        MarketType::Global => "Global",
    }
}

/// Export data, also served as JSON for client-side workbook generation
#[derive(Debug, Clone, Serialize)]
pub struct MatrixExport {
    pub exchanges: Vec<Exchange>,
    pub features: Vec<Feature>,
    pub categories: Vec<MatrixCategory>,
    pub cells: CellMap<&'static str>,
}

pub async fn load_export(
    conn: &mut SqliteConnection,
    market_type: Option<MarketType>,
) -> Result<MatrixExport> {
    let all_exchanges = exchanges::list_all_exchanges(conn).await?;
    let all_categories = categories::list_categories(conn).await?;
    let all_features = features::list_features(conn).await?;
    let all_cells = cells::list_cells(conn, market_type.map(|m| m.as_str())).await?;

    let mut cell_map: CellMap<&'static str> = BTreeMap::new();
    for cell in &all_cells {
        cell_map
            .entry(cell.exchange_id.clone())
            .or_default()
            .insert(cell.feature_id.clone(), export_value(cell));
    }

    Ok(MatrixExport {
        exchanges: all_exchanges
            .into_iter()
            .filter(|e| in_market(e, market_type))
            .collect(),
        categories: group_features(all_categories, &all_features),
        features: all_features,
        cells: cell_map,
    })
}

/// Render the export as CSV with every field quoted
///
/// Column layout matches what the importer reads back.
pub fn render_csv(export: &MatrixExport) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(Vec::new());

    let mut header = vec![NAME_HEADER, MARKET_HEADER];
    header.extend(export.features.iter().map(|f| f.name.as_str()));
    writer.write_record(&header).map_err(csv_error)?;

    for exchange in &export.exchanges {
        let row_cells = export.cells.get(&exchange.id);
        let mut record = vec![exchange.name.as_str(), export_market(exchange.market_type)];
        record.extend(export.features.iter().map(|f| {
            row_cells
                .and_then(|cells| cells.get(&f.id))
                .copied()
                .unwrap_or("")
        }));
        writer.write_record(&record).map_err(csv_error)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| Error::Internal(format!("CSV export failed: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| Error::Internal(format!("CSV export failed: {}", e)))
}

fn csv_error(err: csv::Error) -> Error {
    Error::Internal(format!("CSV export failed: {}", err))
}

/// `feature-matrix-YYYY-MM-DD.csv`
pub fn export_filename(date: NaiveDate) -> String {
    format!("feature-matrix-{}.csv", date.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use exintel_common::time;

    fn cell(status: FeatureStatus) -> ExchangeFeature {
        ExchangeFeature {
            id: "c".to_string(),
            exchange_id: "e".to_string(),
            feature_id: "f".to_string(),
            has_feature: status.has_feature(),
            feature_status: status,
            notes: None,
            created_at: time::now(),
            updated_at: time::now(),
        }
    }

    #[test]
    fn test_export_values() {
        assert_eq!(export_value(&cell(FeatureStatus::Available)), "VAR");
        assert_eq!(export_value(&cell(FeatureStatus::Beta)), "VAR");
        assert_eq!(export_value(&cell(FeatureStatus::NotAvailable)), "YOK");
        assert_eq!(export_value(&cell(FeatureStatus::ComingSoon)), "YOK");
        assert_eq!(export_value(&cell(FeatureStatus::Unknown)), "");
    }

    #[test]
    fn test_export_filename() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        assert_eq!(export_filename(date), "feature-matrix-2025-03-07.csv");
    }

    #[test]
    fn test_render_csv_quotes_everything() {
        let now = time::now();
        let exchange = |id: &str, name: &str, market_type| Exchange {
            id: id.to_string(),
            name: name.to_string(),
            market_type,
            website_url: None,
            announcement_url: None,
            twitter_handle: None,
            logo_url: None,
            description: None,
            created_at: now,
            updated_at: now,
        };
        let feature = Feature {
            id: "f-1".to_string(),
            name: "convert".to_string(),
            slug: "convert".to_string(),
            category_id: "c-1".to_string(),
            sort_order: 1,
            description: None,
        };
        let mut cells: CellMap<&'static str> = BTreeMap::new();
        cells.entry("e-1".to_string()).or_default().insert("f-1".to_string(), "VAR");

        let export = MatrixExport {
            exchanges: vec![
                exchange("e-1", "Binance", MarketType::Global),
                exchange("e-2", "Say \"Hi\" Exchange", MarketType::Turkish),
            ],
            features: vec![feature],
            categories: Vec::new(),
            cells,
        };

        let csv = render_csv(&export).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], r#""competitor name","local/global","convert""#);
        assert_eq!(lines[1], r#""Binance","Global","VAR""#);
        assert_eq!(lines[2], r#""Say ""Hi"" Exchange","TR","""#);
    }
}
