pub mod api;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::extraction::RulesetGenerator;
use crate::pipeline::IngestSettings;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    /// `None` when no model is configured; unmatched pages then fail.
    pub generator: Option<RulesetGenerator>,
    pub settings: IngestSettings,
    pub api_token_hash: Option<String>,
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}
