use axum::Json;
use axum::extract::State;
use serde::Deserialize;

use crate::error::AppError;
use crate::pipeline::{self, IngestReport};
use crate::routes::AppState;

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    pub url: String,
    pub html: String,
    #[serde(default = "default_true")]
    pub generate: bool,
    #[serde(default = "default_true")]
    pub persist: bool,
}

pub async fn extract(
    State(state): State<AppState>,
    Json(input): Json<ExtractRequest>,
) -> Result<Json<IngestReport>, AppError> {
    if url::Url::parse(&input.url).is_err() {
        return Err(AppError::BadRequest(format!("Invalid url: {}", input.url)));
    }
    if input.html.trim().is_empty() {
        return Err(AppError::BadRequest("html is empty".to_string()));
    }

    let mut settings = state.settings.clone();
    settings.generate &= input.generate;

    let outcome = pipeline::ingest(
        &state.pool,
        state.generator.as_ref(),
        &settings,
        &input.html,
        &input.url,
    )
    .await?;

    let job_id = if input.persist {
        pipeline::persist_job(&state.pool, &input.url, &outcome).await?
    } else {
        None
    };

    Ok(Json(IngestReport::new(outcome, job_id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_default_on() {
        let req: ExtractRequest =
            serde_json::from_str(r#"{"url": "https://a.example/j/1", "html": "<p>x</p>"}"#)
                .unwrap();
        assert!(req.generate);
        assert!(req.persist);

        let req: ExtractRequest = serde_json::from_str(
            r#"{"url": "https://a.example/j/1", "html": "<p>x</p>", "generate": false}"#,
        )
        .unwrap();
        assert!(!req.generate);
    }
}
