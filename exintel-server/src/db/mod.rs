//! Entity store access for exintel-server
//!
//! One module per table. Functions take a `&mut SqliteConnection` so the same
//! primitive runs on a pooled connection or inside a transaction.

pub mod categories;
pub mod cells;
pub mod exchanges;
pub mod features;
pub mod screenshots;
pub mod stats;
pub mod suggestions;
pub mod update_logs;

use exintel_common::{Error, Result};
use std::str::FromStr;

/// Parse a TEXT column into one of the stored vocabularies
pub(crate) fn parse_text<T>(value: &str, column: &str) -> Result<T>
where
    T: FromStr<Err = Error>,
{
    value
        .parse()
        .map_err(|e| Error::Internal(format!("Corrupt {} column: {}", column, e)))
}
