//! Synthesizes new rulesets with a generative model, retrying with feedback.
//!
//! Attempts run strictly in sequence: each prompt carries the scored
//! failures of the previous attempt. The best result seen so far is threaded
//! through the loop as a value and returned when the loop stops, when the
//! model fails, or when the deadline elapses.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use crate::extraction::candidate::CandidateRuleset;
use crate::extraction::extractor::{self, ExtractionResult};
use crate::extraction::prompt::{self, Feedback, PageContext};
use crate::extraction::rules::ExtractionConfig;
use crate::llm::{ModelError, RulesetModel};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("model call failed: {0}")]
    Model(#[from] ModelError),

    #[error("model response is not a ruleset: {0}")]
    Schema(#[from] serde_json::Error),

    #[error("generation deadline elapsed before any attempt finished")]
    TimedOut,

    #[error("no generation attempts allowed")]
    NoAttempts,
}

/// A generated config together with what it extracted from the page.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub config: ExtractionConfig,
    pub extraction: ExtractionResult,
    /// 1-based attempt that produced this result.
    pub best_attempt: u32,
    /// Model calls made, counting one that failed or ran out of time.
    pub attempts: u32,
}

#[derive(Clone)]
pub struct RulesetGenerator {
    model: Arc<dyn RulesetModel>,
}

impl RulesetGenerator {
    pub fn new(model: Arc<dyn RulesetModel>) -> Self {
        Self { model }
    }

    pub async fn generate(
        &self,
        html: &str,
        url: &str,
        max_attempts: u32,
    ) -> Result<GenerationResult, GenerationError> {
        self.run(html, url, max_attempts, None).await
    }

    /// Like [`generate`](Self::generate), but every model call is bounded by
    /// what is left of `deadline`. Progress made before it elapses is kept.
    pub async fn generate_within(
        &self,
        html: &str,
        url: &str,
        max_attempts: u32,
        deadline: Duration,
    ) -> Result<GenerationResult, GenerationError> {
        self.run(html, url, max_attempts, Some(Instant::now() + deadline))
            .await
    }

    async fn run(
        &self,
        html: &str,
        url: &str,
        max_attempts: u32,
        deadline: Option<Instant>,
    ) -> Result<GenerationResult, GenerationError> {
        let page = PageContext::prepare(html);
        let default_name = default_name(url);

        let mut best: Option<GenerationResult> = None;
        let mut feedback: Option<Feedback> = None;
        let mut ran = 0;

        for attempt in 1..=max_attempts {
            ran = attempt;
            let prompt = prompt::build_prompt(url, &page, feedback.as_ref());

            let outcome = match self.call_model(&prompt, deadline).await {
                Ok(response) => evaluate(response, html, url, &default_name, attempt),
                Err(e) => Err(e),
            };
            let current = match outcome {
                Ok(current) => current,
                Err(e) => {
                    tracing::warn!(attempt, url, error = %e, "Ruleset generation attempt failed");
                    return with_attempts(best, ran).ok_or(e);
                }
            };

            let state = current.extraction.scoring.state;
            tracing::info!(
                attempt,
                url,
                state = %state,
                score = current.extraction.scoring.score,
                "Evaluated generated ruleset"
            );

            feedback = Some(Feedback::from_result(&current.extraction));
            best = Some(keep_better(best, current));

            if state.is_acceptable() {
                break;
            }
        }

        with_attempts(best, ran).ok_or(GenerationError::NoAttempts)
    }

    async fn call_model(
        &self,
        prompt: &str,
        deadline: Option<Instant>,
    ) -> Result<Value, GenerationError> {
        let response = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, self.model.propose(prompt))
                .await
                .map_err(|_| GenerationError::TimedOut)?,
            None => self.model.propose(prompt).await,
        };
        Ok(response?)
    }
}

/// Normalize a raw model response and run it against the page.
fn evaluate(
    response: Value,
    html: &str,
    url: &str,
    default_name: &str,
    attempt: u32,
) -> Result<GenerationResult, GenerationError> {
    let candidate: CandidateRuleset = serde_json::from_value(response)?;
    let config = candidate.normalize(default_name);
    let extraction = extractor::extract(html, url, &config);
    Ok(GenerationResult {
        config,
        extraction,
        best_attempt: attempt,
        attempts: attempt,
    })
}

fn with_attempts(best: Option<GenerationResult>, attempts: u32) -> Option<GenerationResult> {
    best.map(|best| GenerationResult { attempts, ..best })
}

/// A strictly higher score replaces the current best; ties keep the earlier.
fn keep_better(best: Option<GenerationResult>, current: GenerationResult) -> GenerationResult {
    match best {
        Some(best)
            if best.extraction.scoring.earned_points >= current.extraction.scoring.earned_points =>
        {
            best
        }
        _ => current,
    }
}

fn default_name(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| format!("generated:{h}")))
        .unwrap_or_else(|| "generated".to_string())
}
