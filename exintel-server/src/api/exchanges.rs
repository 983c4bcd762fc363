//! Exchange administration endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use exintel_common::db::{Exchange, MarketType};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::db::cells::{self, CellDetail};
use crate::db::exchanges::{self, ExchangeFilter, ExchangePatch, ExchangeSummary, NewExchange};
use crate::db::screenshots::{self, ScreenshotFilter, ScreenshotView};
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeListQuery {
    pub market_type: Option<MarketType>,
    #[serde(default)]
    pub include_empty: bool,
}

/// GET /api/exchanges
///
/// Only exchanges with matrix data unless `includeEmpty=true`.
pub async fn list_exchanges(
    State(state): State<AppState>,
    Query(query): Query<ExchangeListQuery>,
) -> ApiResult<Json<Vec<ExchangeSummary>>> {
    let filter = ExchangeFilter {
        market_type: query.market_type,
        include_empty: query.include_empty,
    };

    let mut conn = state.db.acquire().await?;
    Ok(Json(exchanges::list_exchange_summaries(&mut conn, &filter).await?))
}

/// POST /api/exchanges
pub async fn create_exchange(
    State(state): State<AppState>,
    Json(new): Json<NewExchange>,
) -> ApiResult<(StatusCode, Json<Exchange>)> {
    let mut conn = state.db.acquire().await?;
    let exchange = exchanges::insert_exchange(&mut conn, &new).await?;

    info!(exchange_id = %exchange.id, name = %exchange.name, "Exchange created");
    Ok((StatusCode::CREATED, Json(exchange)))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeDetail {
    #[serde(flatten)]
    pub exchange: Exchange,
    pub features: Vec<CellDetail>,
    pub screenshots: Vec<ScreenshotView>,
}

/// GET /api/exchanges/:id
pub async fn get_exchange(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ExchangeDetail>> {
    let mut conn = state.db.acquire().await?;
    let exchange = exchanges::get_exchange(&mut conn, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Exchange {}", id)))?;

    let features = cells::list_cells_for_exchange(&mut conn, &id).await?;
    let screenshots = screenshots::list_screenshots(
        &mut conn,
        &ScreenshotFilter {
            exchange_id: Some(id),
            ..ScreenshotFilter::default()
        },
    )
    .await?;

    Ok(Json(ExchangeDetail {
        exchange,
        features,
        screenshots,
    }))
}

/// PUT /api/exchanges/:id
pub async fn update_exchange(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<ExchangePatch>,
) -> ApiResult<Json<Exchange>> {
    let mut conn = state.db.acquire().await?;
    let exchange = exchanges::update_exchange(&mut conn, &id, &patch)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Exchange {}", id)))?;

    Ok(Json(exchange))
}

/// DELETE /api/exchanges/:id
///
/// Cells, audit entries, suggestions and screenshots go with it.
pub async fn delete_exchange(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let mut conn = state.db.acquire().await?;
    if !exchanges::delete_exchange(&mut conn, &id).await? {
        return Err(ApiError::NotFound(format!("Exchange {}", id)));
    }

    info!(exchange_id = %id, "Exchange deleted");
    Ok(Json(json!({ "success": true })))
}

/// Build exchange routes
pub fn exchange_routes() -> Router<AppState> {
    Router::new()
        .route("/api/exchanges", get(list_exchanges).post(create_exchange))
        .route(
            "/api/exchanges/:id",
            get(get_exchange).put(update_exchange).delete(delete_exchange),
        )
}
