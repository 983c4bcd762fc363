//! Bearer-secret middleware for externally triggered jobs
//!
//! Applied to the cron routes only. Without a configured secret the routes
//! are disabled (503) instead of open.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::{ApiError, AppState};

/// Token of an `Authorization: Bearer <token>` header
pub fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|token| !token.is_empty())
}

/// Reject requests whose bearer token is not the cron secret
pub async fn require_cron_secret(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(secret) = state.config.cron_secret.as_deref() else {
        return Err(ApiError::ServiceUnavailable(
            "Cron secret is not configured".to_string(),
        ));
    };

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token);

    if provided != Some(secret) {
        warn!(path = %request.uri().path(), "Rejected cron request with missing or wrong secret");
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(request).await)
}
