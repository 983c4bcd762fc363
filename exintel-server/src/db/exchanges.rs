//! Exchange persistence
//!
//! Exchanges are matched on `name_key` (trimmed, lowercased name), never on
//! the display name.

use exintel_common::db::{Exchange, MarketType};
use exintel_common::naming::exchange_name_key;
use exintel_common::{time, uuid_utils, Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::parse_text;

/// Fields accepted when creating an exchange
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewExchange {
    pub name: String,
    pub market_type: MarketType,
    #[serde(default)]
    pub website_url: Option<String>,
    #[serde(default)]
    pub announcement_url: Option<String>,
    #[serde(default)]
    pub twitter_handle: Option<String>,
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewExchange {
    pub fn named(name: &str, market_type: MarketType) -> Self {
        Self {
            name: name.trim().to_string(),
            market_type,
            website_url: None,
            announcement_url: None,
            twitter_handle: None,
            logo_url: None,
            description: None,
        }
    }
}

/// Partial update; omitted fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangePatch {
    pub name: Option<String>,
    pub market_type: Option<MarketType>,
    pub website_url: Option<String>,
    pub announcement_url: Option<String>,
    pub twitter_handle: Option<String>,
    pub logo_url: Option<String>,
    pub description: Option<String>,
}

/// Exchange with matrix coverage counts
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeSummary {
    #[serde(flatten)]
    pub exchange: Exchange,
    /// Cells with `has_feature` set
    pub feature_count: i64,
    /// Cells of any status
    pub cell_count: i64,
    pub total_features: i64,
    /// `feature_count / total_features`, 0 when no features exist
    pub coverage: f64,
}

/// Filter for the exchange list
#[derive(Debug, Clone, Default)]
pub struct ExchangeFilter {
    pub market_type: Option<MarketType>,
    /// Include exchanges without any matrix cell
    pub include_empty: bool,
}

const SELECT_EXCHANGE: &str = r#"
    SELECT id, name, market_type, website_url, announcement_url, twitter_handle,
           logo_url, description, created_at, updated_at
    FROM exchanges
"#;

pub(crate) fn exchange_from_row(row: &SqliteRow) -> Result<Exchange> {
    let market_type: String = row.try_get("market_type")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Exchange {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        market_type: parse_text(&market_type, "market_type")?,
        website_url: row.try_get("website_url")?,
        announcement_url: row.try_get("announcement_url")?,
        twitter_handle: row.try_get("twitter_handle")?,
        logo_url: row.try_get("logo_url")?,
        description: row.try_get("description")?,
        created_at: time::from_db(&created_at)?,
        updated_at: time::from_db(&updated_at)?,
    })
}

/// Insert a new exchange
///
/// A case-insensitive duplicate name fails with `Error::Conflict`.
pub async fn insert_exchange(conn: &mut SqliteConnection, new: &NewExchange) -> Result<Exchange> {
    let name = new.name.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput("exchange name is required".to_string()));
    }

    let now = time::now();
    let exchange = Exchange {
        id: uuid_utils::new_id(),
        name: name.to_string(),
        market_type: new.market_type,
        website_url: new.website_url.clone(),
        announcement_url: new.announcement_url.clone(),
        twitter_handle: new.twitter_handle.clone(),
        logo_url: new.logo_url.clone(),
        description: new.description.clone(),
        created_at: now,
        updated_at: now,
    };

    let result = sqlx::query(
        r#"
        INSERT INTO exchanges (
            id, name, name_key, market_type, website_url, announcement_url,
            twitter_handle, logo_url, description, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&exchange.id)
    .bind(&exchange.name)
    .bind(exchange_name_key(&exchange.name))
    .bind(exchange.market_type.as_str())
    .bind(&exchange.website_url)
    .bind(&exchange.announcement_url)
    .bind(&exchange.twitter_handle)
    .bind(&exchange.logo_url)
    .bind(&exchange.description)
    .bind(time::to_db(&now))
    .bind(time::to_db(&now))
    .execute(&mut *conn)
    .await;

    match result.map_err(Error::from) {
        Ok(_) => Ok(exchange),
        Err(e) if e.is_unique_violation() => Err(Error::Conflict(format!(
            "exchange '{}' already exists",
            exchange.name
        ))),
        Err(e) => Err(e),
    }
}

/// Load exchange by id
pub async fn get_exchange(conn: &mut SqliteConnection, id: &str) -> Result<Option<Exchange>> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_EXCHANGE))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(exchange_from_row).transpose()
}

/// Load exchange by case-insensitive name
pub async fn find_exchange_by_name(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<Option<Exchange>> {
    let row = sqlx::query(&format!("{} WHERE name_key = ?", SELECT_EXCHANGE))
        .bind(exchange_name_key(name))
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(exchange_from_row).transpose()
}

/// Find an exchange by case-insensitive name, creating it when absent
///
/// Returns the exchange and whether this call created it. An existing
/// exchange keeps its stored market type.
pub async fn find_or_create_exchange(
    conn: &mut SqliteConnection,
    name: &str,
    market_type: MarketType,
) -> Result<(Exchange, bool)> {
    if let Some(existing) = find_exchange_by_name(conn, name).await? {
        return Ok((existing, false));
    }

    match insert_exchange(conn, &NewExchange::named(name, market_type)).await {
        Ok(exchange) => Ok((exchange, true)),
        // Lost a race against another writer: the unique index already has it
        Err(Error::Conflict(_)) => {
            let existing = find_exchange_by_name(conn, name)
                .await?
                .ok_or_else(|| Error::Internal(format!("exchange '{}' vanished", name)))?;
            Ok((existing, false))
        }
        Err(e) => Err(e),
    }
}

/// Apply a partial update
pub async fn update_exchange(
    conn: &mut SqliteConnection,
    id: &str,
    patch: &ExchangePatch,
) -> Result<Option<Exchange>> {
    let Some(mut exchange) = get_exchange(conn, id).await? else {
        return Ok(None);
    };

    if let Some(name) = &patch.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("exchange name cannot be empty".to_string()));
        }
        exchange.name = name.to_string();
    }
    if let Some(market_type) = patch.market_type {
        exchange.market_type = market_type;
    }
    if patch.website_url.is_some() {
        exchange.website_url = patch.website_url.clone();
    }
    if patch.announcement_url.is_some() {
        exchange.announcement_url = patch.announcement_url.clone();
    }
    if patch.twitter_handle.is_some() {
        exchange.twitter_handle = patch.twitter_handle.clone();
    }
    if patch.logo_url.is_some() {
        exchange.logo_url = patch.logo_url.clone();
    }
    if patch.description.is_some() {
        exchange.description = patch.description.clone();
    }
    exchange.updated_at = time::now();

    let result = sqlx::query(
        r#"
        UPDATE exchanges SET
            name = ?, name_key = ?, market_type = ?, website_url = ?, announcement_url = ?,
            twitter_handle = ?, logo_url = ?, description = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&exchange.name)
    .bind(exchange_name_key(&exchange.name))
    .bind(exchange.market_type.as_str())
    .bind(&exchange.website_url)
    .bind(&exchange.announcement_url)
    .bind(&exchange.twitter_handle)
    .bind(&exchange.logo_url)
    .bind(&exchange.description)
    .bind(time::to_db(&exchange.updated_at))
    .bind(id)
    .execute(&mut *conn)
    .await;

    match result.map_err(Error::from) {
        Ok(_) => Ok(Some(exchange)),
        Err(e) if e.is_unique_violation() => Err(Error::Conflict(format!(
            "exchange '{}' already exists",
            exchange.name
        ))),
        Err(e) => Err(e),
    }
}

/// Delete exchange; cells, logs, suggestions and screenshots cascade
pub async fn delete_exchange(conn: &mut SqliteConnection, id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM exchanges WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// All exchanges ordered by name (used by the sweep and the matrix views)
pub async fn list_all_exchanges(conn: &mut SqliteConnection) -> Result<Vec<Exchange>> {
    let rows = sqlx::query(&format!("{} ORDER BY name_key", SELECT_EXCHANGE))
        .fetch_all(&mut *conn)
        .await?;

    rows.iter().map(exchange_from_row).collect()
}

/// Exchange list with coverage figures
pub async fn list_exchange_summaries(
    conn: &mut SqliteConnection,
    filter: &ExchangeFilter,
) -> Result<Vec<ExchangeSummary>> {
    let total_features: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM features")
        .fetch_one(&mut *conn)
        .await?;

    let market_type = filter.market_type.map(|m| m.as_str());
    let rows = sqlx::query(
        r#"
        SELECT e.id, e.name, e.market_type, e.website_url, e.announcement_url, e.twitter_handle,
               e.logo_url, e.description, e.created_at, e.updated_at,
               (SELECT COUNT(*) FROM exchange_features ef
                 WHERE ef.exchange_id = e.id AND ef.has_feature = 1) AS feature_count,
               (SELECT COUNT(*) FROM exchange_features ef
                 WHERE ef.exchange_id = e.id) AS cell_count
        FROM exchanges e
        WHERE (? IS NULL OR e.market_type = ?)
        ORDER BY e.name_key
        "#,
    )
    .bind(market_type)
    .bind(market_type)
    .fetch_all(&mut *conn)
    .await?;

    let mut summaries = Vec::with_capacity(rows.len());
    for row in &rows {
        let cell_count: i64 = row.try_get("cell_count")?;
        if cell_count == 0 && !filter.include_empty {
            continue;
        }

        let feature_count: i64 = row.try_get("feature_count")?;
        let coverage = if total_features > 0 {
            feature_count as f64 / total_features as f64
        } else {
            0.0
        };

        summaries.push(ExchangeSummary {
            exchange: exchange_from_row(row)?,
            feature_count,
            cell_count,
            total_features,
            coverage,
        });
    }

    Ok(summaries)
}
