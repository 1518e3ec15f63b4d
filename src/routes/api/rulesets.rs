use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use sqlx::PgPool;

use crate::error::AppError;
use crate::models::ruleset::{NewRuleset, Ruleset, RulesetView};
use crate::pipeline;

pub async fn list(State(pool): State<PgPool>) -> Result<Json<Vec<RulesetView>>, AppError> {
    let configs = Ruleset::list_candidates(&pool).await?;
    Ok(Json(configs.iter().map(RulesetView::from).collect()))
}

pub async fn get(
    State(pool): State<PgPool>,
    Path(id): Path<i32>,
) -> Result<Json<RulesetView>, AppError> {
    let config = Ruleset::get(&pool, id).await?;
    Ok(Json(RulesetView::from(&config)))
}

/// Store a hand-written ruleset. Its match hash is computed here, and an
/// existing hash gets a new version rather than an overwrite.
pub async fn create(
    State(pool): State<PgPool>,
    Json(input): Json<NewRuleset>,
) -> Result<(StatusCode, Json<RulesetView>), AppError> {
    if input.match_patterns.is_empty() {
        return Err(AppError::BadRequest(
            "A ruleset needs at least one match pattern".to_string(),
        ));
    }
    let saved = pipeline::save_next_version(&pool, &input.into_config()).await?;
    Ok((StatusCode::CREATED, Json(RulesetView::from(&saved))))
}
