//! exintel-server library interface
//!
//! Exposes the router, state and services for integration testing

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::ServiceConfig;
use crate::services::ai_client::ChatModel;
use crate::services::screenshot_store::ScreenshotStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    pub config: Arc<ServiceConfig>,
    /// Completion model; `None` when no API key is configured
    pub ai: Option<Arc<dyn ChatModel>>,
    /// Screenshot blob store
    pub screenshots: Arc<dyn ScreenshotStore>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        config: ServiceConfig,
        ai: Option<Arc<dyn ChatModel>>,
        screenshots: Arc<dyn ScreenshotStore>,
    ) -> Self {
        Self {
            db,
            config: Arc::new(config),
            ai,
            screenshots,
            startup_time: Utc::now(),
        }
    }

    /// Model handle, or 503 when AI features are not configured
    pub fn require_ai(&self) -> ApiResult<Arc<dyn ChatModel>> {
        self.ai.clone().ok_or_else(|| {
            ApiError::ServiceUnavailable("AI model is not configured (set XAI_API_KEY)".to_string())
        })
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_bytes;

    Router::new()
        .merge(api::health_routes())
        .merge(api::matrix_routes())
        .merge(api::exchange_routes())
        .merge(api::feature_routes())
        .merge(api::suggestion_routes())
        .merge(api::screenshot_routes())
        .merge(api::classify_routes())
        .merge(api::stats_routes())
        .merge(api::cron_routes(state.clone()))
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
