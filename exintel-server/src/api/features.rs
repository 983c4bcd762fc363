//! Feature catalog endpoints (features and their categories)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use exintel_common::db::{Feature, FeatureCategory};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::SqliteConnection;
use tracing::info;

use crate::db::categories;
use crate::db::cells::{self, CellDetail};
use crate::db::features::{self, FeaturePatch, FeatureSummary, NewFeature};
use crate::db::screenshots::{self, ScreenshotFilter, ScreenshotView};
use crate::{ApiError, ApiResult, AppState};

/// GET /api/categories
pub async fn list_categories(State(state): State<AppState>) -> ApiResult<Json<Vec<FeatureCategory>>> {
    let mut conn = state.db.acquire().await?;
    Ok(Json(categories::list_categories(&mut conn).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCategoryRequest {
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    /// Defaults to after the last category
    #[serde(default)]
    pub sort_order: Option<i64>,
}

/// POST /api/categories
pub async fn create_category(
    State(state): State<AppState>,
    Json(request): Json<NewCategoryRequest>,
) -> ApiResult<(StatusCode, Json<FeatureCategory>)> {
    let mut conn = state.db.acquire().await?;
    let sort_order = match request.sort_order {
        Some(order) => order,
        None => categories::next_sort_order(&mut conn).await?,
    };

    let category =
        categories::insert_category(&mut conn, &request.name, request.icon.as_deref(), sort_order)
            .await?;

    info!(category_id = %category.id, name = %category.name, "Category created");
    Ok((StatusCode::CREATED, Json(category)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureListQuery {
    pub category_id: Option<String>,
}

/// GET /api/features
pub async fn list_features(
    State(state): State<AppState>,
    Query(query): Query<FeatureListQuery>,
) -> ApiResult<Json<Vec<FeatureSummary>>> {
    let mut conn = state.db.acquire().await?;
    let summaries = features::list_feature_summaries(&mut conn, query.category_id.as_deref()).await?;
    Ok(Json(summaries))
}

async fn ensure_category(conn: &mut SqliteConnection, category_id: &str) -> ApiResult<()> {
    match categories::get_category(conn, category_id).await? {
        Some(_) => Ok(()),
        None => Err(ApiError::NotFound(format!("Category {}", category_id))),
    }
}

/// POST /api/features
///
/// The slug is derived from the name; a colliding slug answers 409.
pub async fn create_feature(
    State(state): State<AppState>,
    Json(new): Json<NewFeature>,
) -> ApiResult<(StatusCode, Json<Feature>)> {
    let mut conn = state.db.acquire().await?;
    ensure_category(&mut conn, &new.category_id).await?;

    let feature = features::insert_feature(&mut conn, &new).await?;

    info!(feature_id = %feature.id, slug = %feature.slug, "Feature created");
    Ok((StatusCode::CREATED, Json(feature)))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureDetail {
    #[serde(flatten)]
    pub feature: Feature,
    pub category: Option<FeatureCategory>,
    pub exchanges: Vec<CellDetail>,
    pub screenshots: Vec<ScreenshotView>,
}

/// GET /api/features/:id
pub async fn get_feature(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<FeatureDetail>> {
    let mut conn = state.db.acquire().await?;
    let feature = features::get_feature(&mut conn, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Feature {}", id)))?;

    let category = categories::get_category(&mut conn, &feature.category_id).await?;
    let exchanges = cells::list_cells_for_feature(&mut conn, &id).await?;
    let screenshots = screenshots::list_screenshots(
        &mut conn,
        &ScreenshotFilter {
            feature_id: Some(id),
            ..ScreenshotFilter::default()
        },
    )
    .await?;

    Ok(Json(FeatureDetail {
        feature,
        category,
        exchanges,
        screenshots,
    }))
}

/// PUT /api/features/:id
///
/// The slug never changes, so renaming keeps every cell attached.
pub async fn update_feature(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<FeaturePatch>,
) -> ApiResult<Json<Feature>> {
    let mut conn = state.db.acquire().await?;
    if let Some(category_id) = &patch.category_id {
        ensure_category(&mut conn, category_id).await?;
    }

    let feature = features::update_feature(&mut conn, &id, &patch)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Feature {}", id)))?;

    Ok(Json(feature))
}

/// DELETE /api/features/:id
pub async fn delete_feature(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let mut conn = state.db.acquire().await?;
    if !features::delete_feature(&mut conn, &id).await? {
        return Err(ApiError::NotFound(format!("Feature {}", id)));
    }

    info!(feature_id = %id, "Feature deleted");
    Ok(Json(json!({ "success": true })))
}

/// Build feature and category routes
pub fn feature_routes() -> Router<AppState> {
    Router::new()
        .route("/api/categories", get(list_categories).post(create_category))
        .route("/api/features", get(list_features).post(create_feature))
        .route(
            "/api/features/:id",
            get(get_feature).put(update_feature).delete(delete_feature),
        )
}
