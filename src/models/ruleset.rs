use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;

use crate::error::AppError;
use crate::extraction::rules::{ExtractionConfig, ExtractionRule, MatchPattern, RuleSource, Transform};
use crate::pipeline::RulesetStore;

/// Persisted shape of a match pattern inside `match_patterns`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PatternRecord {
    CssExists {
        selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content_filter: Option<String>,
    },
    UrlPattern {
        pattern: String,
    },
    ContentContains {
        text: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum SourceRecord {
    JsonLd { path: String },
    Css { selector: String },
    Meta { name: String },
    Regex { selector: String, pattern: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformRecord {
    HtmlDecode,
    InnerText,
    ParseNumber,
}

/// Persisted shape of one rule inside `extract_rules`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleRecord {
    #[serde(flatten)]
    pub source: SourceRecord,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transforms: Vec<TransformRecord>,
}

impl From<&MatchPattern> for PatternRecord {
    fn from(pattern: &MatchPattern) -> Self {
        match pattern.clone() {
            MatchPattern::CssExists {
                selector,
                content_filter,
            } => PatternRecord::CssExists {
                selector,
                content_filter,
            },
            MatchPattern::UrlPattern { regex } => PatternRecord::UrlPattern { pattern: regex },
            MatchPattern::ContentContains { text } => PatternRecord::ContentContains { text },
        }
    }
}

impl From<PatternRecord> for MatchPattern {
    fn from(record: PatternRecord) -> Self {
        match record {
            PatternRecord::CssExists {
                selector,
                content_filter,
            } => MatchPattern::CssExists {
                selector,
                content_filter,
            },
            PatternRecord::UrlPattern { pattern } => MatchPattern::UrlPattern { regex: pattern },
            PatternRecord::ContentContains { text } => MatchPattern::ContentContains { text },
        }
    }
}

impl From<Transform> for TransformRecord {
    fn from(transform: Transform) -> Self {
        match transform {
            Transform::HtmlDecode => TransformRecord::HtmlDecode,
            Transform::InnerText => TransformRecord::InnerText,
            Transform::ParseNumber => TransformRecord::ParseNumber,
        }
    }
}

impl From<TransformRecord> for Transform {
    fn from(record: TransformRecord) -> Self {
        match record {
            TransformRecord::HtmlDecode => Transform::HtmlDecode,
            TransformRecord::InnerText => Transform::InnerText,
            TransformRecord::ParseNumber => Transform::ParseNumber,
        }
    }
}

impl From<&ExtractionRule> for RuleRecord {
    fn from(rule: &ExtractionRule) -> Self {
        let source = match rule.source.clone() {
            RuleSource::JsonLd { path } => SourceRecord::JsonLd { path },
            RuleSource::Css { selector } => SourceRecord::Css { selector },
            RuleSource::Meta { name } => SourceRecord::Meta { name },
            RuleSource::Regex { selector, pattern } => SourceRecord::Regex { selector, pattern },
        };
        RuleRecord {
            source,
            transforms: rule.transforms.iter().copied().map(Into::into).collect(),
        }
    }
}

impl From<RuleRecord> for ExtractionRule {
    fn from(record: RuleRecord) -> Self {
        let source = match record.source {
            SourceRecord::JsonLd { path } => RuleSource::JsonLd { path },
            SourceRecord::Css { selector } => RuleSource::Css { selector },
            SourceRecord::Meta { name } => RuleSource::Meta { name },
            SourceRecord::Regex { selector, pattern } => RuleSource::Regex { selector, pattern },
        };
        ExtractionRule {
            source,
            transforms: record.transforms.into_iter().map(Into::into).collect(),
        }
    }
}

pub fn patterns_to_json(patterns: &[MatchPattern]) -> Value {
    let records: Vec<PatternRecord> = patterns.iter().map(Into::into).collect();
    serde_json::to_value(records).unwrap_or(Value::Array(Vec::new()))
}

pub fn rules_to_json(rules: &BTreeMap<String, Vec<ExtractionRule>>) -> Value {
    let records: BTreeMap<&str, Vec<RuleRecord>> = rules
        .iter()
        .map(|(field, rules)| (field.as_str(), rules.iter().map(Into::into).collect()))
        .collect();
    serde_json::to_value(records).unwrap_or(Value::Object(Default::default()))
}

/// Entries that do not parse are skipped, so one bad row element never
/// hides the rest of a ruleset.
pub fn patterns_from_json(value: &Value) -> Vec<MatchPattern> {
    let Some(items) = value.as_array() else {
        tracing::warn!("match_patterns is not an array");
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match serde_json::from_value::<PatternRecord>(item.clone()) {
            Ok(record) => Some(MatchPattern::from(record)),
            Err(e) => {
                tracing::warn!("Skipping unreadable match pattern {item}: {e}");
                None
            }
        })
        .collect()
}

pub fn rules_from_json(value: &Value) -> BTreeMap<String, Vec<ExtractionRule>> {
    let Some(fields) = value.as_object() else {
        tracing::warn!("extract_rules is not an object");
        return BTreeMap::new();
    };
    fields
        .iter()
        .map(|(field, rules)| {
            let rules: Vec<ExtractionRule> = rules
                .as_array()
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|item| match serde_json::from_value::<RuleRecord>(item.clone()) {
                            Ok(record) => Some(ExtractionRule::from(record)),
                            Err(e) => {
                                tracing::warn!("Skipping unreadable rule for '{field}': {e}");
                                None
                            }
                        })
                        .collect()
                })
                .unwrap_or_default();
            (field.clone(), rules)
        })
        .collect()
}

/// Row in `extraction_configs`.
#[derive(Debug, sqlx::FromRow)]
pub struct Ruleset {
    pub id: i32,
    pub name: String,
    pub version: i32,
    pub match_patterns: Value,
    pub match_hash: String,
    pub extract_rules: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Ruleset> for ExtractionConfig {
    fn from(row: Ruleset) -> Self {
        ExtractionConfig {
            id: Some(row.id),
            name: row.name,
            version: row.version,
            match_patterns: patterns_from_json(&row.match_patterns),
            match_hash: row.match_hash,
            rules: rules_from_json(&row.extract_rules),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Body for seeding a ruleset by hand.
#[derive(Debug, Deserialize)]
pub struct NewRuleset {
    pub name: String,
    pub match_patterns: Vec<PatternRecord>,
    pub extract_rules: BTreeMap<String, Vec<RuleRecord>>,
}

impl NewRuleset {
    pub fn into_config(self) -> ExtractionConfig {
        ExtractionConfig::new(
            self.name,
            self.match_patterns.into_iter().map(Into::into).collect(),
            self.extract_rules
                .into_iter()
                .map(|(field, rules)| (field, rules.into_iter().map(Into::into).collect()))
                .collect(),
        )
    }
}

/// API view of a stored ruleset, in the persisted field names.
#[derive(Debug, Serialize)]
pub struct RulesetView {
    pub id: Option<i32>,
    pub name: String,
    pub version: i32,
    pub match_patterns: Vec<PatternRecord>,
    pub match_hash: String,
    pub extract_rules: BTreeMap<String, Vec<RuleRecord>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&ExtractionConfig> for RulesetView {
    fn from(config: &ExtractionConfig) -> Self {
        RulesetView {
            id: config.id,
            name: config.name.clone(),
            version: config.version,
            match_patterns: config.match_patterns.iter().map(Into::into).collect(),
            match_hash: config.match_hash.clone(),
            extract_rules: config
                .rules
                .iter()
                .map(|(field, rules)| (field.clone(), rules.iter().map(Into::into).collect()))
                .collect(),
            created_at: config.created_at,
            updated_at: config.updated_at,
        }
    }
}

impl Ruleset {
    /// Latest version of every ruleset, oldest first.
    pub async fn list_candidates(pool: &PgPool) -> Result<Vec<ExtractionConfig>, AppError> {
        let rows = sqlx::query_as::<_, Ruleset>(
            "SELECT * FROM (
                 SELECT DISTINCT ON (match_hash) * FROM extraction_configs
                 ORDER BY match_hash, version DESC
             ) latest
             ORDER BY id",
        )
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(ExtractionConfig::from).collect())
    }

    pub async fn list_by_hash(
        pool: &PgPool,
        match_hash: &str,
    ) -> Result<Vec<ExtractionConfig>, AppError> {
        let rows = sqlx::query_as::<_, Ruleset>(
            "SELECT * FROM extraction_configs WHERE match_hash = $1 ORDER BY version DESC",
        )
        .bind(match_hash)
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(ExtractionConfig::from).collect())
    }

    pub async fn get(pool: &PgPool, id: i32) -> Result<ExtractionConfig, AppError> {
        sqlx::query_as::<_, Ruleset>("SELECT * FROM extraction_configs WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .map(ExtractionConfig::from)
            .ok_or_else(|| AppError::NotFound(format!("Ruleset {id} not found")))
    }

    /// Insert `config`. Idempotent per `(match_hash, version)`: if another
    /// worker stored the same version first, that row is returned instead.
    pub async fn create(pool: &PgPool, config: &ExtractionConfig) -> Result<ExtractionConfig, AppError> {
        let inserted = sqlx::query_as::<_, Ruleset>(
            "INSERT INTO extraction_configs (name, version, match_patterns, match_hash, extract_rules, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (match_hash, version) DO NOTHING
             RETURNING *",
        )
        .bind(&config.name)
        .bind(config.version)
        .bind(patterns_to_json(&config.match_patterns))
        .bind(&config.match_hash)
        .bind(rules_to_json(&config.rules))
        .bind(config.created_at)
        .bind(config.updated_at)
        .fetch_optional(pool)
        .await?;

        if let Some(row) = inserted {
            return Ok(ExtractionConfig::from(row));
        }

        tracing::info!(
            "Ruleset {} v{} already stored, reusing existing row",
            config.match_hash,
            config.version
        );
        sqlx::query_as::<_, Ruleset>(
            "SELECT * FROM extraction_configs WHERE match_hash = $1 AND version = $2",
        )
        .bind(&config.match_hash)
        .bind(config.version)
        .fetch_one(pool)
        .await
        .map(ExtractionConfig::from)
        .map_err(AppError::from)
    }
}

#[async_trait]
impl RulesetStore for PgPool {
    async fn list_candidates(&self) -> Result<Vec<ExtractionConfig>, AppError> {
        Ruleset::list_candidates(self).await
    }

    async fn list_by_hash(&self, match_hash: &str) -> Result<Vec<ExtractionConfig>, AppError> {
        Ruleset::list_by_hash(self, match_hash).await
    }

    async fn save(&self, config: &ExtractionConfig) -> Result<ExtractionConfig, AppError> {
        Ruleset::create(self, config).await
    }
}
