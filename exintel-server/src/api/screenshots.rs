//! Screenshot registration endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use exintel_common::db::{MarketType, Screenshot};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db::exchanges;
use crate::db::screenshots::{self, NewScreenshot, ScreenshotFilter, ScreenshotView};
use crate::services::screenshot_store::exchange_folder;
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotListQuery {
    pub exchange_id: Option<String>,
    pub feature_id: Option<String>,
    pub category_id: Option<String>,
    pub classified: Option<bool>,
}

/// GET /api/screenshots
pub async fn list_screenshots(
    State(state): State<AppState>,
    Query(query): Query<ScreenshotListQuery>,
) -> ApiResult<Json<Vec<ScreenshotView>>> {
    let filter = ScreenshotFilter {
        exchange_id: query.exchange_id,
        feature_id: query.feature_id,
        category_id: query.category_id,
        classified: query.classified,
    };

    let mut conn = state.db.acquire().await?;
    Ok(Json(screenshots::list_screenshots(&mut conn, &filter).await?))
}

/// POST /api/screenshots
pub async fn create_screenshot(
    State(state): State<AppState>,
    Json(new): Json<NewScreenshot>,
) -> ApiResult<(StatusCode, Json<Screenshot>)> {
    let mut conn = state.db.acquire().await?;
    if exchanges::get_exchange(&mut conn, &new.exchange_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Exchange {}", new.exchange_id)));
    }

    let screenshot = screenshots::insert_screenshot(&mut conn, &new).await?;
    Ok((StatusCode::CREATED, Json(screenshot)))
}

/// GET /api/screenshots/:id
pub async fn get_screenshot(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Screenshot>> {
    let mut conn = state.db.acquire().await?;
    let screenshot = screenshots::get_screenshot(&mut conn, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Screenshot {}", id)))?;
    Ok(Json(screenshot))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    pub storage_key: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub screenshot: Screenshot,
    pub exchange_created: bool,
}

/// POST /api/screenshots/ingest
///
/// Registers a blob by storage key `screenshots/{ExchangeFolder}/.../file`.
/// The folder names the exchange; an unknown one is created as `global`.
pub async fn ingest_screenshot(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> ApiResult<(StatusCode, Json<IngestResponse>)> {
    let storage_key = request.storage_key.trim();
    let folder = exchange_folder(storage_key).ok_or_else(|| {
        ApiError::BadRequest(format!(
            "Storage key '{}' does not name an exchange folder",
            storage_key
        ))
    })?;

    let mut tx = state.db.begin().await?;
    let (exchange, exchange_created) =
        exchanges::find_or_create_exchange(&mut tx, folder, MarketType::Global).await?;
    let screenshot = screenshots::insert_screenshot(
        &mut tx,
        &NewScreenshot {
            exchange_id: exchange.id.clone(),
            storage_key: storage_key.to_string(),
            feature_id: None,
            category_id: None,
            notes: request.notes,
        },
    )
    .await?;
    tx.commit().await?;

    info!(
        screenshot_id = %screenshot.id,
        exchange_id = %exchange.id,
        exchange_created,
        "Screenshot ingested"
    );

    Ok((
        StatusCode::CREATED,
        Json(IngestResponse {
            screenshot,
            exchange_created,
        }),
    ))
}

/// Build screenshot routes
pub fn screenshot_routes() -> Router<AppState> {
    Router::new()
        .route("/api/screenshots", get(list_screenshots).post(create_screenshot))
        .route("/api/screenshots/ingest", post(ingest_screenshot))
        .route("/api/screenshots/:id", get(get_screenshot))
}
