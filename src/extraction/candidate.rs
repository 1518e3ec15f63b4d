//! Loose ruleset proposals from the generative model and their
//! normalization into strict [`ExtractionConfig`]s.
//!
//! The model is free to spell tags however it likes (`CSS_EXISTS`,
//! `cssExists`, `css-exists`); everything is compared on a lowercase,
//! alphanumeric-only key. A list may also arrive as a single item. Entries
//! that don't parse, and unrecognized patterns, sources, transforms or
//! field names, are dropped one at a time so loose strings never reach the
//! domain model.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::extraction::extractor::FIELDS;
use crate::extraction::rules::{ExtractionConfig, ExtractionRule, MatchPattern, Transform};

/// Pattern used when a proposal has no usable match patterns.
pub const FALLBACK_PATTERN_TEXT: &str = "job";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CandidateRuleset {
    pub name: Option<String>,
    /// One pattern object or a list of them.
    #[serde(alias = "matchPatterns", alias = "patterns")]
    pub match_patterns: Value,
    /// Per field, one rule object or a list of them.
    #[serde(alias = "extractRules", alias = "rules", alias = "fields")]
    pub extract_rules: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CandidatePattern {
    #[serde(rename = "type", alias = "kind")]
    pub kind: String,
    pub selector: Option<String>,
    #[serde(alias = "regex")]
    pub pattern: Option<String>,
    #[serde(alias = "contentFilter")]
    pub content_filter: Option<String>,
    #[serde(alias = "value")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CandidateRule {
    #[serde(alias = "type", alias = "kind")]
    pub source: String,
    #[serde(alias = "jsonPath", alias = "json_path")]
    pub path: Option<String>,
    pub selector: Option<String>,
    #[serde(alias = "property")]
    pub name: Option<String>,
    #[serde(alias = "regex")]
    pub pattern: Option<String>,
    pub transforms: Option<Transforms>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Transforms {
    One(String),
    Many(Vec<String>),
}

impl Transforms {
    fn tags(&self) -> &[String] {
        match self {
            Transforms::One(tag) => std::slice::from_ref(tag),
            Transforms::Many(tags) => tags,
        }
    }
}

/// Items of a value holding one entry or a list of them. Entries that don't
/// deserialize as `T` are skipped.
fn one_or_many<T: DeserializeOwned>(value: &Value, what: &str) -> Vec<T> {
    let items: &[Value] = match value {
        Value::Null => &[],
        Value::Array(items) => items,
        single => std::slice::from_ref(single),
    };
    items
        .iter()
        .filter_map(|item| match T::deserialize(item) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::debug!("Dropping malformed {what}: {e}");
                None
            }
        })
        .collect()
}

fn tag_key(tag: &str) -> String {
    tag.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn normalize_pattern(candidate: &CandidatePattern) -> Option<MatchPattern> {
    match tag_key(&candidate.kind).as_str() {
        "cssexists" | "css" | "cssselector" | "selector" | "selectorexists" => {
            Some(MatchPattern::CssExists {
                selector: non_empty(&candidate.selector)?,
                content_filter: non_empty(&candidate.content_filter),
            })
        }
        "urlpattern" | "url" | "urlregex" | "urlmatches" => Some(MatchPattern::UrlPattern {
            regex: non_empty(&candidate.pattern)?,
        }),
        "contentcontains" | "content" | "contains" | "text" | "textcontains" => {
            Some(MatchPattern::ContentContains {
                text: non_empty(&candidate.text).or_else(|| non_empty(&candidate.pattern))?,
            })
        }
        _ => None,
    }
}

fn normalize_transform(tag: &str) -> Option<Transform> {
    match tag_key(tag).as_str() {
        "htmldecode" | "decodehtml" | "unescape" | "htmlunescape" => Some(Transform::HtmlDecode),
        "innertext" | "text" | "striphtml" | "striptags" => Some(Transform::InnerText),
        "parsenumber" | "number" | "tonumber" | "numeric" => Some(Transform::ParseNumber),
        _ => None,
    }
}

fn normalize_rule(candidate: &CandidateRule) -> Option<ExtractionRule> {
    let rule = match tag_key(&candidate.source).as_str() {
        "jsonld" | "ldjson" | "json" | "jsonpath" => {
            ExtractionRule::json_ld(non_empty(&candidate.path)?)
        }
        "css" | "cssselector" | "selector" => ExtractionRule::css(non_empty(&candidate.selector)?),
        "meta" | "metatag" | "opengraph" | "og" => ExtractionRule::meta(non_empty(&candidate.name)?),
        "regex" | "regexp" => ExtractionRule::regex(
            non_empty(&candidate.selector).unwrap_or_else(|| "body".to_string()),
            non_empty(&candidate.pattern)?,
        ),
        _ => return None,
    };

    let rule = candidate
        .transforms
        .iter()
        .flat_map(Transforms::tags)
        .filter_map(|t| normalize_transform(t))
        .fold(rule, ExtractionRule::with_transform);
    Some(rule)
}

/// Map `companyName`, `Company-Name` and friends onto the field catalogue.
fn normalize_field(field: &str) -> Option<&'static str> {
    let key = tag_key(field);
    FIELDS.iter().copied().find(|known| tag_key(known) == key)
}

impl CandidateRuleset {
    /// Strict config for this proposal. Never returns a config without
    /// match patterns.
    pub fn normalize(&self, default_name: &str) -> ExtractionConfig {
        let mut patterns: Vec<MatchPattern> =
            one_or_many::<CandidatePattern>(&self.match_patterns, "match pattern")
                .iter()
                .filter_map(normalize_pattern)
                .collect();
        if patterns.is_empty() {
            patterns.push(MatchPattern::ContentContains {
                text: FALLBACK_PATTERN_TEXT.to_string(),
            });
        }

        let mut rules: BTreeMap<String, Vec<ExtractionRule>> = BTreeMap::new();
        for (field, candidates) in &self.extract_rules {
            let Some(field) = normalize_field(field) else {
                tracing::debug!("Dropping rules for unknown field '{field}'");
                continue;
            };
            let normalized: Vec<ExtractionRule> =
                one_or_many::<CandidateRule>(candidates, "extraction rule")
                    .iter()
                    .filter_map(normalize_rule)
                    .collect();
            if !normalized.is_empty() {
                rules.entry(field.to_string()).or_default().extend(normalized);
            }
        }

        let name = non_empty(&self.name).unwrap_or_else(|| default_name.to_string());
        ExtractionConfig::new(name, patterns, rules)
    }
}
