//! Screenshot classification endpoints
//!
//! Both endpoints answer 503 when no model is configured.

use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;

use crate::services::classification::{
    BatchReport, BatchSelection, ClassificationContext, Classifier, ClassifyError,
    ClassifyOutcome, DEFAULT_BATCH_LIMIT,
};
use crate::services::screenshot_store::StoreError;
use crate::{ApiError, ApiResult, AppState};

const MAX_BATCH_LIMIT: i64 = 100;

impl From<ClassifyError> for ApiError {
    fn from(err: ClassifyError) -> Self {
        match err {
            ClassifyError::ScreenshotNotFound(id) => ApiError::NotFound(format!("Screenshot {}", id)),
            ClassifyError::Store(StoreError::NotFound(key)) => {
                ApiError::NotFound(format!("Screenshot image {}", key))
            }
            ClassifyError::Store(e) => ApiError::Internal(e.to_string()),
            ClassifyError::Ai(e) => ApiError::from(e),
            ClassifyError::Parse(e) => ApiError::ExternalService(e.to_string()),
            ClassifyError::Database(e) => ApiError::Common(e),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifyRequest {
    #[serde(default)]
    pub screenshot_id: Option<String>,
}

/// POST /api/classify
///
/// **Request:** `{"screenshotId": "..."}`
pub async fn classify_one(
    State(state): State<AppState>,
    Json(request): Json<ClassifyRequest>,
) -> ApiResult<Json<ClassifyOutcome>> {
    let screenshot_id = request
        .screenshot_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("screenshotId is required".to_string()))?;
    let model = state.require_ai()?;

    let classifier = Classifier {
        pool: &state.db,
        model: model.as_ref(),
        store: state.screenshots.as_ref(),
        vision_model: &state.config.vision_model,
    };
    let context = ClassificationContext::load(&state.db).await?;
    let outcome = classifier.classify(&context, &screenshot_id).await?;

    Ok(Json(outcome))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    #[serde(default)]
    pub screenshot_ids: Option<Vec<String>>,
    #[serde(default)]
    pub limit: Option<i64>,
}

impl BatchRequest {
    fn selection(self) -> BatchSelection {
        match self.screenshot_ids {
            Some(ids) if !ids.is_empty() => BatchSelection::Ids(ids),
            _ => BatchSelection::OldestUnclassified(
                self.limit.unwrap_or(DEFAULT_BATCH_LIMIT).clamp(1, MAX_BATCH_LIMIT),
            ),
        }
    }
}

/// POST /api/classify/batch
///
/// **Request:** `{"screenshotIds"?: [...], "limit"?: n}`; without ids the
/// oldest unclassified screenshots are taken. Per-item failures are reported
/// in `results` and never fail the request.
pub async fn classify_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> ApiResult<Json<BatchReport>> {
    let model = state.require_ai()?;

    let classifier = Classifier {
        pool: &state.db,
        model: model.as_ref(),
        store: state.screenshots.as_ref(),
        vision_model: &state.config.vision_model,
    };
    let report = classifier
        .classify_batch(request.selection(), state.config.classify_delay)
        .await?;

    Ok(Json(report))
}

/// Build classification routes
pub fn classify_routes() -> Router<AppState> {
    Router::new()
        .route("/api/classify", post(classify_one))
        .route("/api/classify/batch", post(classify_batch))
}
