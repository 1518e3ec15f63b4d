//! Generative model boundary used by the ruleset generator.

pub mod openai;

use async_trait::async_trait;

/// Errors from talking to a generative model.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("upstream returned error: status={status} message={message}")]
    Upstream {
        status: reqwest::StatusCode,
        message: String,
    },

    #[error("invalid model response: {0}")]
    InvalidResponse(String),
}

/// Anything that can turn a prompt into a candidate ruleset.
///
/// Implementations own transport, auth and any retry policy. The response
/// is the model's JSON object as-is; the generator does its own parsing.
#[async_trait]
pub trait RulesetModel: Send + Sync {
    async fn propose(&self, prompt: &str) -> Result<serde_json::Value, ModelError>;
}
