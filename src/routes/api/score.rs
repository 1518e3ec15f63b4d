use std::collections::HashMap;

use axum::Json;
use serde::Deserialize;

use crate::extraction::ScoringResult;
use crate::extraction::scoring;

#[derive(Debug, Deserialize)]
pub struct ScoreRequest {
    pub fields: HashMap<String, Option<String>>,
}

pub async fn score(Json(input): Json<ScoreRequest>) -> Json<ScoringResult> {
    let fields: HashMap<&str, Option<String>> = input
        .fields
        .iter()
        .map(|(name, value)| (name.as_str(), value.clone()))
        .collect();
    Json(scoring::score(&fields))
}
