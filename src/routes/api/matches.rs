use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::error::AppError;
use crate::extraction;
use crate::models::ruleset::Ruleset;

#[derive(Debug, Deserialize)]
pub struct MatchRequest {
    pub url: String,
    pub html: String,
}

#[derive(Debug, Serialize)]
pub struct MatchView {
    pub ruleset_id: Option<i32>,
    pub name: String,
    pub version: i32,
    pub matched: usize,
    pub total: usize,
}

/// Which stored rulesets would claim this page, without extracting anything.
pub async fn find(
    State(pool): State<PgPool>,
    Json(input): Json<MatchRequest>,
) -> Result<Json<Vec<MatchView>>, AppError> {
    let candidates = Ruleset::list_candidates(&pool).await?;
    let matches = extraction::find_all(&input.html, &input.url, &candidates)
        .into_iter()
        .map(|m| MatchView {
            ruleset_id: m.config.id,
            name: m.config.name.clone(),
            version: m.config.version,
            matched: m.matched,
            total: m.total,
        })
        .collect();
    Ok(Json(matches))
}
