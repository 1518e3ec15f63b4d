//! Ruleset data model: match patterns, extraction rules and transforms.
//!
//! These are plain domain types. The persisted (snake_case JSON) shape lives
//! in `models::ruleset` and converts to and from these.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// A single page-applicability test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchPattern {
    CssExists {
        selector: String,
        content_filter: Option<String>,
    },
    UrlPattern {
        regex: String,
    },
    ContentContains {
        text: String,
    },
}

impl MatchPattern {
    pub fn kind(&self) -> &'static str {
        match self {
            MatchPattern::CssExists { .. } => "css_exists",
            MatchPattern::UrlPattern { .. } => "url_pattern",
            MatchPattern::ContentContains { .. } => "content_contains",
        }
    }

    /// `(type, selector, pattern, content_filter)` with empty strings for
    /// absent slots. A content-contains pattern puts its text in the
    /// pattern slot so that distinct patterns never share a key.
    fn sort_key(&self) -> (&'static str, &str, &str, &str) {
        match self {
            MatchPattern::CssExists {
                selector,
                content_filter,
            } => (
                self.kind(),
                selector,
                "",
                content_filter.as_deref().unwrap_or(""),
            ),
            MatchPattern::UrlPattern { regex } => (self.kind(), "", regex, ""),
            MatchPattern::ContentContains { text } => (self.kind(), "", text, ""),
        }
    }
}

/// Where a rule pulls its raw value from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleSource {
    JsonLd { path: String },
    Css { selector: String },
    Meta { name: String },
    Regex { selector: String, pattern: String },
}

impl RuleSource {
    pub fn kind(&self) -> &'static str {
        match self {
            RuleSource::JsonLd { .. } => "json_ld",
            RuleSource::Css { .. } => "css",
            RuleSource::Meta { .. } => "meta",
            RuleSource::Regex { .. } => "regex",
        }
    }
}

impl fmt::Display for RuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleSource::JsonLd { path } => write!(f, "json_ld({path})"),
            RuleSource::Css { selector } => write!(f, "css({selector})"),
            RuleSource::Meta { name } => write!(f, "meta({name})"),
            RuleSource::Regex { selector, pattern } => write!(f, "regex({selector}, /{pattern}/)"),
        }
    }
}

/// Post-extraction value transform, applied in declared order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    HtmlDecode,
    InnerText,
    ParseNumber,
}

impl Transform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transform::HtmlDecode => "html_decode",
            Transform::InnerText => "inner_text",
            Transform::ParseNumber => "parse_number",
        }
    }
}

/// One way to obtain a field's value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRule {
    pub source: RuleSource,
    pub transforms: Vec<Transform>,
}

impl ExtractionRule {
    pub fn new(source: RuleSource) -> Self {
        Self {
            source,
            transforms: Vec::new(),
        }
    }

    pub fn json_ld(path: impl Into<String>) -> Self {
        Self::new(RuleSource::JsonLd { path: path.into() })
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Self::new(RuleSource::Css {
            selector: selector.into(),
        })
    }

    pub fn meta(name: impl Into<String>) -> Self {
        Self::new(RuleSource::Meta { name: name.into() })
    }

    pub fn regex(selector: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(RuleSource::Regex {
            selector: selector.into(),
            pattern: pattern.into(),
        })
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }
}

/// A named, versioned ruleset. Never mutated once persisted; a change
/// produces a new version via [`ExtractionConfig::next_version`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionConfig {
    pub id: Option<i32>,
    pub name: String,
    pub version: i32,
    pub match_patterns: Vec<MatchPattern>,
    pub match_hash: String,
    pub rules: BTreeMap<String, Vec<ExtractionRule>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExtractionConfig {
    /// Build an unsaved version-1 config, computing its match hash.
    pub fn new(
        name: impl Into<String>,
        match_patterns: Vec<MatchPattern>,
        rules: BTreeMap<String, Vec<ExtractionRule>>,
    ) -> Self {
        let now = Utc::now();
        let match_hash = compute_hash(&match_patterns);
        Self {
            id: None,
            name: name.into(),
            version: 1,
            match_patterns,
            match_hash,
            rules,
            created_at: now,
            updated_at: now,
        }
    }

    /// Copy of this config as a new, unsaved version.
    pub fn next_version(&self, version: i32) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            version,
            created_at: now,
            updated_at: now,
            ..self.clone()
        }
    }
}

/// Canonical hash of a pattern set. Patterns are sorted by
/// `(type, selector, pattern, content_filter)` before hashing, so the
/// result does not depend on input order.
pub fn compute_hash(patterns: &[MatchPattern]) -> String {
    let mut keys: Vec<_> = patterns.iter().map(MatchPattern::sort_key).collect();
    keys.sort_unstable();

    let canonical: Vec<[&str; 4]> = keys.into_iter().map(|(a, b, c, d)| [a, b, c, d]).collect();
    let serialized = serde_json::to_string(&canonical).unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns() -> Vec<MatchPattern> {
        vec![
            MatchPattern::UrlPattern {
                regex: r"boards\.greenhouse\.io".to_string(),
            },
            MatchPattern::CssExists {
                selector: "#app_body".to_string(),
                content_filter: None,
            },
            MatchPattern::ContentContains {
                text: "Apply for this job".to_string(),
            },
            MatchPattern::ContentContains {
                text: "greenhouse".to_string(),
            },
            MatchPattern::CssExists {
                selector: "div.opening".to_string(),
                content_filter: Some("Engineer".to_string()),
            },
        ]
    }

    #[test]
    fn hash_is_order_independent() {
        let original = patterns();
        let expected = compute_hash(&original);

        let mut reversed = original.clone();
        reversed.reverse();
        assert_eq!(compute_hash(&reversed), expected);

        // every rotation of the list hashes the same
        for shift in 1..original.len() {
            let mut rotated = original.clone();
            rotated.rotate_left(shift);
            assert_eq!(compute_hash(&rotated), expected);
        }
    }

    #[test]
    fn hash_distinguishes_pattern_sets() {
        let a = patterns();
        let mut b = patterns();
        b.pop();
        assert_ne!(compute_hash(&a), compute_hash(&b));

        let x = vec![MatchPattern::ContentContains {
            text: "job".to_string(),
        }];
        let y = vec![MatchPattern::ContentContains {
            text: "jobs".to_string(),
        }];
        assert_ne!(compute_hash(&x), compute_hash(&y));
        assert_eq!(compute_hash(&x).len(), 64);
    }

    #[test]
    fn filter_is_part_of_the_hash() {
        let bare = vec![MatchPattern::CssExists {
            selector: "h1".to_string(),
            content_filter: None,
        }];
        let filtered = vec![MatchPattern::CssExists {
            selector: "h1".to_string(),
            content_filter: Some("Engineer".to_string()),
        }];
        assert_ne!(compute_hash(&bare), compute_hash(&filtered));
    }

    #[test]
    fn next_version_keeps_content() {
        let mut rules = BTreeMap::new();
        rules.insert("title".to_string(), vec![ExtractionRule::css("h1")]);
        let mut v1 = ExtractionConfig::new("greenhouse", patterns(), rules);
        v1.id = Some(7);

        let v2 = v1.next_version(2);
        assert_eq!(v2.id, None);
        assert_eq!(v2.version, 2);
        assert_eq!(v2.match_hash, v1.match_hash);
        assert_eq!(v2.rules, v1.rules);
    }
}
