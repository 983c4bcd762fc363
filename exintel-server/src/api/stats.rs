//! Dashboard statistics

use axum::{extract::State, routing::get, Json, Router};

use crate::db::stats::{self, DashboardStats};
use crate::{ApiResult, AppState};

/// GET /api/stats
pub async fn get_stats(State(state): State<AppState>) -> ApiResult<Json<DashboardStats>> {
    let mut conn = state.db.acquire().await?;
    Ok(Json(stats::dashboard_stats(&mut conn).await?))
}

pub fn stats_routes() -> Router<AppState> {
    Router::new().route("/api/stats", get(get_stats))
}
