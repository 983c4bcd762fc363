//! Suggestion review endpoints

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use exintel_common::db::{FeatureUpdateSuggestion, SuggestionStatus};
use serde::{Deserialize, Serialize};

use crate::db::suggestions::{self, SuggestionFilter, SuggestionView};
use crate::services::suggestion_manager::{
    create_suggestion, resolve_suggestions, NewSuggestion, ResolveAction, ResolveResult,
};
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionListQuery {
    /// `pending` (default), `approved`, `rejected` or `all`
    pub status: Option<String>,
    pub exchange_id: Option<String>,
    pub min_confidence: Option<f64>,
}

fn status_filter(raw: Option<&str>) -> ApiResult<Option<SuggestionStatus>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(Some(SuggestionStatus::Pending)),
        Some("all") => Ok(None),
        Some(other) => other
            .parse()
            .map(Some)
            .map_err(|_| ApiError::BadRequest(format!("Unknown suggestion status '{}'", other))),
    }
}

/// GET /api/suggestions
///
/// Highest confidence first, newest first within equal confidence.
pub async fn list_suggestions(
    State(state): State<AppState>,
    Query(query): Query<SuggestionListQuery>,
) -> ApiResult<Json<Vec<SuggestionView>>> {
    let filter = SuggestionFilter {
        status: status_filter(query.status.as_deref())?,
        exchange_id: query.exchange_id,
        min_confidence: query.min_confidence,
    };

    let mut conn = state.db.acquire().await?;
    Ok(Json(suggestions::list_suggestions(&mut conn, &filter).await?))
}

/// POST /api/suggestions
pub async fn post_suggestion(
    State(state): State<AppState>,
    Json(new): Json<NewSuggestion>,
) -> ApiResult<(StatusCode, Json<FeatureUpdateSuggestion>)> {
    let mut conn = state.db.acquire().await?;
    let suggestion = create_suggestion(&mut conn, &new).await?;
    Ok((StatusCode::CREATED, Json(suggestion)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    pub suggestion_ids: Vec<String>,
    pub action: ResolveAction,
    #[serde(default)]
    pub reviewed_by: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResolveResponse {
    pub results: Vec<ResolveResult>,
}

/// POST /api/suggestions/resolve
///
/// **Request:** `{"suggestionIds": [...], "action": "approve" | "reject"}`
///
/// Always 200 once the request is well formed; per-id problems come back as
/// `skipped` entries.
pub async fn resolve(
    State(state): State<AppState>,
    Json(request): Json<ResolveRequest>,
) -> ApiResult<Json<ResolveResponse>> {
    if request.suggestion_ids.is_empty() {
        return Err(ApiError::BadRequest("suggestionIds must not be empty".to_string()));
    }

    let reviewer = request
        .reviewed_by
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(state.config.reviewer.as_str());

    let results =
        resolve_suggestions(&state.db, &request.suggestion_ids, request.action, reviewer).await;
    Ok(Json(ResolveResponse { results }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingCount {
    pub pending_count: i64,
}

/// GET /api/suggestions/pending
pub async fn pending_count(State(state): State<AppState>) -> ApiResult<Json<PendingCount>> {
    let mut conn = state.db.acquire().await?;
    Ok(Json(PendingCount {
        pending_count: suggestions::count_pending(&mut conn).await?,
    }))
}

/// Build suggestion routes
pub fn suggestion_routes() -> Router<AppState> {
    Router::new()
        .route("/api/suggestions", get(list_suggestions).post(post_suggestion))
        .route("/api/suggestions/resolve", post(resolve))
        .route("/api/suggestions/pending", get(pending_count))
}
