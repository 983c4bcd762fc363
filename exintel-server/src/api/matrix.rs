//! Feature matrix endpoints
//!
//! Read, manual cell edit, spreadsheet import, export and the audit history.

use axum::{
    body::Bytes,
    extract::{FromRequest, Multipart, Query, Request, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use exintel_common::db::{ExchangeFeature, MarketType};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db::update_logs::{self, UpdateLogEntry, UpdateLogFilter};
use crate::services::matrix_editor::{edit_cell, CellEdit};
use crate::services::matrix_importer::{import_spreadsheet, ImportSummary};
use crate::services::matrix_view::{self, MatrixView};
use crate::{ApiError, ApiResult, AppState};

const DEFAULT_HISTORY_LIMIT: i64 = 50;
const MAX_HISTORY_LIMIT: i64 = 500;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixQuery {
    pub market_type: Option<MarketType>,
}

/// GET /api/matrix
pub async fn get_matrix(
    State(state): State<AppState>,
    Query(query): Query<MatrixQuery>,
) -> ApiResult<Json<MatrixView>> {
    let mut conn = state.db.acquire().await?;
    let view = matrix_view::load_matrix(&mut conn, query.market_type).await?;
    Ok(Json(view))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellEditResponse {
    #[serde(flatten)]
    pub cell: ExchangeFeature,
    pub status_changed: bool,
}

/// PUT /api/matrix
///
/// **Request:** `{"exchangeId", "featureId", "hasFeature"?, "featureStatus"?, "notes"?, "updatedBy"?}`
pub async fn put_cell(
    State(state): State<AppState>,
    Json(edit): Json<CellEdit>,
) -> ApiResult<Json<CellEditResponse>> {
    let mut tx = state.db.begin().await?;
    let reconciled = edit_cell(&mut tx, &edit).await?;
    tx.commit().await?;

    Ok(Json(CellEditResponse {
        status_changed: reconciled.outcome.status_changed(),
        cell: reconciled.cell,
    }))
}

/// Upload field carrying the spreadsheet
const FILE_FIELD: &str = "file";

async fn read_upload(state: &AppState, request: Request) -> ApiResult<Bytes> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map_or(false, |value| value.starts_with("multipart/form-data"));

    if !is_multipart {
        return axum::body::to_bytes(request.into_body(), state.config.max_upload_bytes)
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {}", e)));
    }

    let mut multipart = Multipart::from_request(request, state)
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        if field.name() == Some(FILE_FIELD) {
            return field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()));
        }
    }

    Ok(Bytes::new())
}

/// POST /api/matrix/import
///
/// Accepts a multipart form with a `file` field or the raw file as body.
/// Structural failures answer 400 with `{"errors": [...]}`.
pub async fn import_matrix(
    State(state): State<AppState>,
    request: Request,
) -> ApiResult<Json<ImportSummary>> {
    let bytes = read_upload(&state, request).await?;
    if bytes.is_empty() {
        return Err(ApiError::Validation(vec!["No file uploaded".to_string()]));
    }

    info!(bytes = bytes.len(), "Spreadsheet upload received");
    let summary = import_spreadsheet(&state.db, &bytes).await?;
    Ok(Json(summary))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportQuery {
    #[serde(default)]
    pub format: ExportFormat,
    pub market_type: Option<MarketType>,
}

/// GET /api/matrix/export
pub async fn export_matrix(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> ApiResult<Response> {
    let export = {
        let mut conn = state.db.acquire().await?;
        matrix_view::load_export(&mut conn, query.market_type).await?
    };

    if query.format == ExportFormat::Json {
        return Ok(Json(export).into_response());
    }

    let csv = matrix_view::render_csv(&export)?;
    let filename = matrix_view::export_filename(exintel_common::time::now().date_naive());
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename))
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/csv; charset=utf-8"),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    )
        .into_response())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub exchange_id: Option<String>,
    pub feature_id: Option<String>,
    pub limit: Option<i64>,
}

/// GET /api/matrix/history
pub async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<UpdateLogEntry>>> {
    let filter = UpdateLogFilter {
        exchange_id: query.exchange_id,
        feature_id: query.feature_id,
        limit: query
            .limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT),
    };

    let mut conn = state.db.acquire().await?;
    Ok(Json(update_logs::list_logs(&mut conn, &filter).await?))
}

/// Build matrix routes
pub fn matrix_routes() -> Router<AppState> {
    Router::new()
        .route("/api/matrix", get(get_matrix).put(put_cell))
        .route("/api/matrix/import", post(import_matrix))
        .route("/api/matrix/export", get(export_matrix))
        .route("/api/matrix/history", get(get_history))
}
