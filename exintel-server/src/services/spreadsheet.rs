//! Spreadsheet intake
//!
//! Turns uploaded bytes into normalized matrix rows. Workbooks (xlsx, xls,
//! ods) are read with calamine, anything else as CSV. The first non-blank row
//! is the header row; one header must be `competitor name`, an optional
//! `local/global` column carries the market, every other column is a feature.
//!
//! Structural problems fail the whole parse; a bad data row only adds an
//! entry to `errors`.

use calamine::Reader;
use exintel_common::db::{FeatureStatus, MarketType};
use exintel_common::naming::{normalize_header, slugify};
use std::collections::HashSet;
use std::io::Cursor;
use thiserror::Error;
use tracing::warn;

pub const NAME_HEADER: &str = "competitor name";
pub const MARKET_HEADER: &str = "local/global";

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0];
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Structural failure; nothing from the file may be applied
#[derive(Debug, Error)]
pub enum SpreadsheetError {
    #[error("spreadsheet is empty")]
    Empty,

    #[error("required column \"competitor name\" missing")]
    MissingNameColumn,

    #[error("could not read workbook: {0}")]
    Workbook(String),

    #[error("could not read CSV: {0}")]
    Csv(String),
}

/// One feature column of the sheet
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureColumn {
    /// Normalized header text (`lowercase + trim`)
    pub name: String,
    pub slug: String,
    /// 1-based position among the accepted feature columns
    pub position: usize,
    column_index: usize,
}

/// One accepted data row
#[derive(Debug, Clone, PartialEq)]
pub struct SheetRow {
    /// 1-based row number in the file
    pub line: usize,
    pub exchange_name: String,
    pub market_type: MarketType,
    /// Aligned with `ParsedSheet::feature_columns`
    pub values: Vec<FeatureStatus>,
}

/// Parse outcome with per-row problems collected
#[derive(Debug, Clone, Default)]
pub struct ParsedSheet {
    pub rows: Vec<SheetRow>,
    pub feature_columns: Vec<FeatureColumn>,
    /// Rows that were skipped
    pub errors: Vec<String>,
    /// Columns that were ignored
    pub warnings: Vec<String>,
}

/// Map a cell's text to a status
///
/// Exact case-insensitive match on `VAR`, `YOK`, `BETA`; anything else,
/// an empty cell included, is `unknown`.
pub fn map_cell_value(raw: &str) -> FeatureStatus {
    match raw.trim().to_uppercase().as_str() {
        "VAR" => FeatureStatus::Available,
        "YOK" => FeatureStatus::NotAvailable,
        "BETA" => FeatureStatus::Beta,
        _ => FeatureStatus::Unknown,
    }
}

/// `TR` marks a Turkish exchange, anything else is global
pub fn map_market_type(raw: &str) -> MarketType {
    if raw.trim().eq_ignore_ascii_case("TR") {
        MarketType::Turkish
    } else {
        MarketType::Global
    }
}

/// Parse raw upload bytes
pub fn parse_spreadsheet(bytes: &[u8]) -> Result<ParsedSheet, SpreadsheetError> {
    let table = read_table(bytes)?;
    parse_table(table)
}

/// Decode bytes into a grid of trimmed cell strings, blank rows removed
///
/// Each row keeps its 1-based line number in the file.
fn read_table(bytes: &[u8]) -> Result<Vec<(usize, Vec<String>)>, SpreadsheetError> {
    let rows = if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(OLE_MAGIC) {
        read_workbook(bytes)?
    } else {
        read_csv(bytes)?
    };

    Ok(rows
        .into_iter()
        .filter(|(_, row)| row.iter().any(|cell| !cell.is_empty()))
        .collect())
}

fn read_workbook(bytes: &[u8]) -> Result<Vec<(usize, Vec<String>)>, SpreadsheetError> {
    let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| SpreadsheetError::Workbook(e.to_string()))?;

    let range = match workbook.worksheet_range_at(0) {
        Some(range) => range.map_err(|e| SpreadsheetError::Workbook(e.to_string()))?,
        None => return Err(SpreadsheetError::Empty),
    };

    // The range begins at the first used cell, not at A1
    let first_row = range.start().map(|(row, _)| row as usize).unwrap_or(0);

    Ok(range
        .rows()
        .enumerate()
        .map(|(index, row)| {
            let cells = row
                .iter()
                .map(|cell| cell.to_string().trim().to_string())
                .collect();
            (first_row + index + 1, cells)
        })
        .collect())
}

fn read_csv(bytes: &[u8]) -> Result<Vec<(usize, Vec<String>)>, SpreadsheetError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|e| SpreadsheetError::Csv(e.to_string()))?;
        // The reader skips blank lines without counting them, so the file
        // line comes from the record's byte offset
        let line = record
            .position()
            .map(|pos| line_at(bytes, pos.byte() as usize))
            .unwrap_or(index + 1);
        rows.push((line, record.iter().map(|cell| cell.trim().to_string()).collect()));
    }
    Ok(rows)
}

/// 1-based line number of the byte at `offset`
fn line_at(bytes: &[u8], offset: usize) -> usize {
    let end = offset.min(bytes.len());
    bytes[..end].iter().filter(|b| **b == b'\n').count() + 1
}

fn cell(row: &[String], index: usize) -> &str {
    row.get(index).map(String::as_str).unwrap_or("")
}

fn parse_table(table: Vec<(usize, Vec<String>)>) -> Result<ParsedSheet, SpreadsheetError> {
    let mut lines = table.into_iter();
    let Some((_, headers)) = lines.next() else {
        return Err(SpreadsheetError::Empty);
    };

    let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
    let name_index = normalized
        .iter()
        .position(|h| h == NAME_HEADER)
        .ok_or(SpreadsheetError::MissingNameColumn)?;
    let market_index = normalized.iter().position(|h| h == MARKET_HEADER);

    let mut parsed = ParsedSheet::default();
    let mut seen_slugs = HashSet::new();

    for (column_index, header) in normalized.iter().enumerate() {
        if column_index == name_index || Some(column_index) == market_index {
            continue;
        }

        let slug = slugify(header);
        if slug.is_empty() {
            if !header.is_empty() {
                let message = format!("Column {}: header \"{}\" ignored", column_index + 1, header);
                warn!("{}", message);
                parsed.warnings.push(message);
            }
            continue;
        }
        if !seen_slugs.insert(slug.clone()) {
            let message = format!(
                "Column {}: header \"{}\" duplicates an earlier column and was ignored",
                column_index + 1,
                header
            );
            warn!("{}", message);
            parsed.warnings.push(message);
            continue;
        }

        parsed.feature_columns.push(FeatureColumn {
            name: header.clone(),
            slug,
            position: parsed.feature_columns.len() + 1,
            column_index,
        });
    }

    for (line, row) in lines {
        let exchange_name = cell(&row, name_index);
        if exchange_name.is_empty() {
            parsed.errors.push(format!("Row {}: exchange name is empty", line));
            continue;
        }

        let market_type = market_index
            .map(|index| map_market_type(cell(&row, index)))
            .unwrap_or(MarketType::Global);

        let values = parsed
            .feature_columns
            .iter()
            .map(|column| map_cell_value(cell(&row, column.column_index)))
            .collect();

        parsed.rows.push(SheetRow {
            line,
            exchange_name: exchange_name.to_string(),
            market_type,
            values,
        });
    }

    Ok(parsed)
}
