pub mod extract;
pub mod jobs;
pub mod matches;
pub mod rulesets;
pub mod score;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};

use crate::auth::require_api_token;
use crate::routes::AppState;

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/extract", post(extract::extract))
        .route("/score", post(score::score))
        .route("/match", post(matches::find))
        // Rulesets
        .route("/rulesets", get(rulesets::list).post(rulesets::create))
        .route("/rulesets/{id}", get(rulesets::get))
        // Jobs
        .route("/jobs", get(jobs::list))
        .route("/jobs/{id}", get(jobs::get))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_token,
        ))
        .with_state(state);

    Router::new().nest("/api/v1", protected)
}
