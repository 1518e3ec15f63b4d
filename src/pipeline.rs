//! Page ingest: match a stored ruleset or learn a new one, then extract.
//!
//! The store sits behind [`RulesetStore`] so the flow can run against
//! Postgres in production and an in-memory list in tests.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::PgPool;

use crate::error::AppError;
use crate::extraction::generator::DEFAULT_MAX_ATTEMPTS;
use crate::extraction::{
    self, CompletionState, ExtractedData, ExtractionConfig, ExtractionResult, RulesetGenerator,
};
use crate::models::company::Company;
use crate::models::job::{Job, UpsertJob};

#[async_trait]
pub trait RulesetStore: Send + Sync {
    /// Latest version of every stored ruleset, in listing order.
    async fn list_candidates(&self) -> Result<Vec<ExtractionConfig>, AppError>;

    async fn list_by_hash(&self, match_hash: &str) -> Result<Vec<ExtractionConfig>, AppError>;

    async fn save(&self, config: &ExtractionConfig) -> Result<ExtractionConfig, AppError>;
}

#[derive(Debug, Clone)]
pub struct IngestSettings {
    /// Whether an unmatched page may trigger generation.
    pub generate: bool,
    pub max_attempts: u32,
    pub deadline: Option<Duration>,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            generate: true,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            deadline: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RulesetOrigin {
    Matched,
    Generated,
    None,
}

#[derive(Debug, Clone)]
pub struct PageOutcome {
    pub extraction: ExtractionResult,
    /// The ruleset used. Generated rulesets that scored `Failed` are
    /// returned unsaved, with no id.
    pub ruleset: Option<ExtractionConfig>,
    pub origin: RulesetOrigin,
    /// Generation attempts made for this page, and which one won.
    pub attempts: u32,
    pub best_attempt: u32,
}

impl PageOutcome {
    fn unmatched(html: &str, url: &str) -> Self {
        let empty = ExtractionConfig::new("unmatched", Vec::new(), BTreeMap::new());
        Self {
            extraction: extraction::extract(html, url, &empty),
            ruleset: None,
            origin: RulesetOrigin::None,
            attempts: 0,
            best_attempt: 0,
        }
    }
}

pub async fn ingest(
    store: &dyn RulesetStore,
    generator: Option<&RulesetGenerator>,
    settings: &IngestSettings,
    html: &str,
    url: &str,
) -> Result<PageOutcome, AppError> {
    let candidates = store.list_candidates().await?;

    if let Some(config) = extraction::find_best(html, url, &candidates) {
        tracing::info!(
            url,
            ruleset = %config.name,
            version = config.version,
            "Matched stored ruleset"
        );
        return Ok(PageOutcome {
            extraction: extraction::extract(html, url, config),
            ruleset: Some(config.clone()),
            origin: RulesetOrigin::Matched,
            attempts: 0,
            best_attempt: 0,
        });
    }

    let generator = match generator {
        Some(generator) if settings.generate => generator,
        _ => {
            tracing::info!(url, "No stored ruleset matched and generation is off");
            return Ok(PageOutcome::unmatched(html, url));
        }
    };

    let generated = match settings.deadline {
        Some(deadline) => {
            generator
                .generate_within(html, url, settings.max_attempts, deadline)
                .await
        }
        None => generator.generate(html, url, settings.max_attempts).await,
    };
    let generated = match generated {
        Ok(generated) => generated,
        Err(e) => {
            tracing::warn!(url, error = %e, "Ruleset generation failed");
            return Ok(PageOutcome::unmatched(html, url));
        }
    };

    let state = generated.extraction.scoring.state;
    let ruleset = if state == CompletionState::Failed {
        tracing::info!(url, "Generated ruleset scored failed, not storing it");
        generated.config
    } else {
        save_next_version(store, &generated.config).await?
    };

    Ok(PageOutcome {
        extraction: generated.extraction,
        ruleset: Some(ruleset),
        origin: RulesetOrigin::Generated,
        attempts: generated.attempts,
        best_attempt: generated.best_attempt,
    })
}

/// Store `config` as the next version for its match hash.
pub async fn save_next_version(
    store: &dyn RulesetStore,
    config: &ExtractionConfig,
) -> Result<ExtractionConfig, AppError> {
    let existing = store.list_by_hash(&config.match_hash).await?;
    let version = existing.iter().map(|c| c.version).max().map_or(1, |v| v + 1);
    let saved = store.save(&config.next_version(version)).await?;
    tracing::info!(
        ruleset = %saved.name,
        match_hash = %saved.match_hash,
        version = saved.version,
        "Stored ruleset"
    );
    Ok(saved)
}

/// Upsert the extracted job. Failed extractions and postings without a
/// company are skipped and yield `None`.
pub async fn persist_job(
    pool: &PgPool,
    url: &str,
    outcome: &PageOutcome,
) -> Result<Option<i32>, AppError> {
    let scoring = &outcome.extraction.scoring;
    if scoring.state == CompletionState::Failed {
        return Ok(None);
    }
    let data = &outcome.extraction.data;
    let Some(company_name) = data.company_name.as_deref() else {
        tracing::warn!(url, "Extracted job has no company, skipping persistence");
        return Ok(None);
    };

    let company = Company::find_or_create(pool, company_name).await?;
    let (id, inserted) = Job::upsert(
        pool,
        UpsertJob {
            company_id: Some(company.id),
            ruleset_id: outcome.ruleset.as_ref().and_then(|r| r.id),
            source_url: url,
            data,
            scoring,
        },
    )
    .await?;
    tracing::info!(url, job_id = id, inserted, "Persisted job");
    Ok(Some(id))
}

/// Result of one ingest as returned by the API and the CLI.
#[derive(Debug, Serialize)]
pub struct IngestReport {
    pub state: CompletionState,
    pub score: f64,
    pub data: ExtractedData,
    pub diagnostics: BTreeMap<String, Vec<String>>,
    pub ruleset_id: Option<i32>,
    pub origin: RulesetOrigin,
    pub attempts: u32,
    pub best_attempt: u32,
    pub job_id: Option<i32>,
}

impl IngestReport {
    pub fn new(outcome: PageOutcome, job_id: Option<i32>) -> Self {
        Self {
            state: outcome.extraction.scoring.state,
            score: outcome.extraction.scoring.score,
            data: outcome.extraction.data,
            diagnostics: outcome.extraction.diagnostics,
            ruleset_id: outcome.ruleset.and_then(|r| r.id),
            origin: outcome.origin,
            attempts: outcome.attempts,
            best_attempt: outcome.best_attempt,
            job_id,
        }
    }
}
