//! Externally triggered jobs

use axum::{extract::State, middleware, routing::get, Json, Router};

use crate::api::auth::require_cron_secret;
use crate::services::suggestion_sweep::{SuggestionSweep, SweepReport};
use crate::{ApiResult, AppState};

/// POST /api/cron/update-matrix
///
/// Runs the suggestion sweep over every exchange. Schedulers that can only
/// issue GET requests may use that method too.
pub async fn update_matrix(State(state): State<AppState>) -> ApiResult<Json<SweepReport>> {
    let model = state.require_ai()?;

    let sweep = SuggestionSweep {
        pool: &state.db,
        model: model.as_ref(),
        text_model: &state.config.text_model,
        delay: state.config.sweep_delay,
    };
    Ok(Json(sweep.run().await?))
}

/// Build cron routes behind the bearer-secret check
pub fn cron_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/cron/update-matrix", get(update_matrix).post(update_matrix))
        .route_layer(middleware::from_fn_with_state(state, require_cron_secret))
}
