//! Applies a ruleset to a page and produces structured job data.

use std::collections::{BTreeMap, HashMap};

use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use serde_json::Value;

use crate::extraction::jsonld;
use crate::extraction::path;
use crate::extraction::rules::{ExtractionConfig, ExtractionRule, RuleSource, Transform};
use crate::extraction::scoring::{self, ScoringResult};

pub const DEFAULT_TITLE: &str = "Unknown Title";

/// Fields whose value must read as a number for a rule to count.
const NUMERIC_FIELDS: &[&str] = &["salary_min", "salary_max"];

/// Elements whose text never renders.
const HIDDEN_TAGS: &[&str] = &["script", "style", "noscript", "template"];

lazy_static! {
    static ref NUMBER: Regex = Regex::new(r"\d[\d,]*(?:\.\d+)?").unwrap();
}

/// Every field a ruleset may map.
pub const FIELDS: &[&str] = &[
    "title",
    "company_name",
    "description",
    "location",
    "job_type",
    "experience_level",
    "education_level",
    "salary_min",
    "salary_max",
    "salary_currency",
    "qualifications",
    "responsibilities",
    "benefits",
    "category",
    "application_url",
    "is_remote",
    "date_posted",
    "valid_through",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractedData {
    pub title: String,
    pub company_name: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub job_type: Option<String>,
    pub experience_level: Option<String>,
    pub education_level: Option<String>,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub salary_currency: Option<String>,
    pub qualifications: Vec<String>,
    pub responsibilities: Vec<String>,
    pub benefits: Vec<String>,
    pub category: Option<String>,
    pub application_url: Option<String>,
    pub is_remote: bool,
    pub date_posted: Option<String>,
    pub valid_through: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    pub data: ExtractedData,
    pub scoring: ScoringResult,
    /// Per-field failure reasons, one entry per failed rule attempt.
    pub diagnostics: BTreeMap<String, Vec<String>>,
}

/// Run `config` against a page. Never fails: fields no rule could fill are
/// left empty and the reasons end up in `diagnostics`.
pub fn extract(html: &str, url: &str, config: &ExtractionConfig) -> ExtractionResult {
    let document = Html::parse_document(html);
    let json_ld = jsonld::locate(&document);

    let mut values: HashMap<&str, String> = HashMap::new();
    let mut diagnostics: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for (field, rules) in &config.rules {
        for rule in rules {
            let attempt = apply_rule(&document, json_ld.as_ref(), rule).and_then(|value| {
                if NUMERIC_FIELDS.contains(&field.as_str()) && parse_integer(&value).is_none() {
                    Err(format!("not a number: {value:?}"))
                } else {
                    Ok(value)
                }
            });
            match attempt {
                Ok(value) => {
                    values.insert(field.as_str(), value);
                    break;
                }
                Err(reason) => {
                    tracing::debug!(
                        field = %field,
                        source = rule.source.kind(),
                        "Rule {} failed: {reason}",
                        rule.source
                    );
                    diagnostics
                        .entry(field.clone())
                        .or_default()
                        .push(format!("{}: {reason}", rule.source));
                }
            }
        }
    }

    let data = to_extracted_data(&values, url);
    let scoring = scoring::score(&score_projection(&data, values.contains_key("title")));

    tracing::debug!(
        url,
        config = %config.name,
        state = %scoring.state,
        score = scoring.score,
        "Extraction finished"
    );

    ExtractionResult {
        data,
        scoring,
        diagnostics,
    }
}

fn apply_rule(
    document: &Html,
    json_ld: Option<&Value>,
    rule: &ExtractionRule,
) -> Result<String, String> {
    let mut value = raw_value(document, json_ld, &rule.source)?;
    for transform in &rule.transforms {
        value = apply_transform(*transform, &value)
            .map_err(|e| format!("{} failed: {e}", transform.as_str()))?;
    }
    if value.trim().is_empty() {
        return Err("empty value".to_string());
    }
    Ok(value)
}

fn raw_value(document: &Html, json_ld: Option<&Value>, source: &RuleSource) -> Result<String, String> {
    match source {
        RuleSource::JsonLd { path } => {
            let block = json_ld.ok_or("no JSON-LD block on page")?;
            let resolved = path::get(block, path).ok_or("path not found")?;
            json_to_string(resolved).ok_or_else(|| "null value".to_string())
        }
        RuleSource::Css { selector } => {
            let element = first_match(document, selector)?;
            Ok(visible_text(element))
        }
        RuleSource::Meta { name } => meta_content(document, name).ok_or_else(|| "meta tag not found".to_string()),
        RuleSource::Regex { selector, pattern } => {
            let element = first_match(document, selector)?;
            let re = Regex::new(pattern).map_err(|e| format!("invalid regex: {e}"))?;
            let text = visible_text(element);
            let captures = re.captures(&text).ok_or("regex did not match")?;
            // the whole match stands in when the pattern has no group
            let found = captures.get(1).or_else(|| captures.get(0)).ok_or("regex did not match")?;
            Ok(found.as_str().to_string())
        }
    }
}

fn first_match<'a>(document: &'a Html, selector: &str) -> Result<ElementRef<'a>, String> {
    let parsed = Selector::parse(selector).map_err(|e| format!("invalid selector: {e}"))?;
    document
        .select(&parsed)
        .next()
        .ok_or_else(|| "selector matched nothing".to_string())
}

/// Rendered text of `element`, skipping script, style and similar
/// subtrees below it.
pub(crate) fn visible_text(element: ElementRef<'_>) -> String {
    let root = element.id();
    let parts: Vec<&str> = element
        .descendants()
        .filter(|node| {
            !node.ancestors().take_while(|a| a.id() != root).any(|a| {
                a.value()
                    .as_element()
                    .is_some_and(|el| HIDDEN_TAGS.contains(&el.name()))
            })
        })
        .filter_map(|node| node.value().as_text().map(|text| &**text))
        .collect();
    collapse_whitespace(&parts.join(" "))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn meta_content(document: &Html, name: &str) -> Option<String> {
    let selector = Selector::parse("meta").ok()?;
    document
        .select(&selector)
        .find(|el| {
            let attrs = el.value();
            attrs.attr("name") == Some(name) || attrs.attr("property") == Some(name)
        })
        .and_then(|el| el.value().attr("content"))
        .map(str::to_string)
}

fn json_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(json_to_string)
                .collect::<Vec<_>>()
                .join(", "),
        ),
        Value::Object(_) => Some(value.to_string()),
    }
}

pub(crate) fn apply_transform(transform: Transform, value: &str) -> Result<String, String> {
    match transform {
        Transform::HtmlDecode => {
            // textarea content is RCDATA: entities decode, tags stay literal.
            // Escaping `<` keeps a literal `</textarea>` from closing it early.
            let escaped = value.replace('<', "&lt;");
            let fragment = Html::parse_fragment(&format!("<textarea>{escaped}</textarea>"));
            let selector = Selector::parse("textarea").map_err(|e| e.to_string())?;
            let decoded = fragment
                .select(&selector)
                .next()
                .map(|el| el.text().collect::<String>())
                .ok_or("could not decode HTML")?;
            Ok(decoded)
        }
        Transform::InnerText => Ok(visible_text(Html::parse_fragment(value).root_element())),
        Transform::ParseNumber => {
            let token = NUMBER
                .find(value)
                .ok_or_else(|| format!("no digits in {value:?}"))?;
            let number = token.as_str().replace(',', "");
            if number.parse::<f64>().is_err() {
                return Err(format!("unreadable number {:?}", token.as_str()));
            }
            Ok(number)
        }
    }
}

fn to_extracted_data(values: &HashMap<&str, String>, page_url: &str) -> ExtractedData {
    let text = |field: &str| values.get(field).map(|v| v.trim().to_string());

    ExtractedData {
        title: text("title").unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        company_name: text("company_name"),
        description: text("description"),
        location: text("location"),
        job_type: text("job_type"),
        experience_level: text("experience_level"),
        education_level: text("education_level"),
        salary_min: values.get("salary_min").and_then(|v| parse_integer(v)),
        salary_max: values.get("salary_max").and_then(|v| parse_integer(v)),
        salary_currency: text("salary_currency"),
        qualifications: values.get("qualifications").map(|v| split_list(v)).unwrap_or_default(),
        responsibilities: values.get("responsibilities").map(|v| split_list(v)).unwrap_or_default(),
        benefits: values.get("benefits").map(|v| split_list(v)).unwrap_or_default(),
        category: text("category"),
        application_url: text("application_url").map(|u| resolve_url(page_url, &u)),
        is_remote: values.get("is_remote").is_some_and(|v| is_remote(v)),
        date_posted: text("date_posted"),
        valid_through: text("valid_through"),
    }
}

/// Integer first, then a float truncated toward zero.
fn parse_integer(value: &str) -> Option<i64> {
    let value = value.trim();
    value.parse::<i64>().ok().or_else(|| {
        value
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(|f| f.trunc() as i64)
    })
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_remote(value: &str) -> bool {
    let value = value.trim();
    value.eq_ignore_ascii_case("true")
        || value.eq_ignore_ascii_case("TELECOMMUTE")
        || value.to_lowercase().contains("remote")
}

fn resolve_url(page_url: &str, found: &str) -> String {
    match url::Url::parse(found) {
        Ok(absolute) => absolute.to_string(),
        Err(_) => url::Url::parse(page_url)
            .and_then(|base| base.join(found))
            .map(|u| u.to_string())
            .unwrap_or_else(|_| found.to_string()),
    }
}

/// The fields the scorer grades. The title only counts when a rule found one.
fn score_projection(data: &ExtractedData, has_title: bool) -> HashMap<&'static str, Option<String>> {
    let list = |items: &[String]| (!items.is_empty()).then(|| items.join(", "));

    HashMap::from([
        ("title", has_title.then(|| data.title.clone())),
        ("company_name", data.company_name.clone()),
        ("description", data.description.clone()),
        ("location", data.location.clone()),
        ("salary_min", data.salary_min.map(|v| v.to_string())),
        ("salary_max", data.salary_max.map(|v| v.to_string())),
        ("qualifications", list(&data.qualifications)),
        ("responsibilities", list(&data.responsibilities)),
        ("benefits", list(&data.benefits)),
        ("job_type", data.job_type.clone()),
        ("experience_level", data.experience_level.clone()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::rules::MatchPattern;
    use crate::extraction::scoring::CompletionState;

    const JSON_LD_PAGE: &str = r#"
        <html><head>
        <meta property="og:title" content="Staff Engineer | Acme">
        <script type="application/ld+json">
        {
            "@context": "https://schema.org",
            "@type": "JobPosting",
            "title": "Staff Engineer",
            "description": "Build and operate the systems that power our platform.",
            "hiringOrganization": {"@type": "Organization", "name": "Acme Corp"},
            "baseSalary": {
                "@type": "MonetaryAmount",
                "currency": "USD",
                "value": {"@type": "QuantitativeValue", "minValue": 100000, "maxValue": 200000}
            },
            "jobLocationType": "TELECOMMUTE",
            "skills": ["Rust", "Postgres", "Kubernetes"]
        }
        </script>
        </head><body><h1>Staff Engineer</h1></body></html>
    "#;

    fn config(rules: Vec<(&str, Vec<ExtractionRule>)>) -> ExtractionConfig {
        ExtractionConfig::new(
            "test",
            vec![MatchPattern::ContentContains {
                text: "job".to_string(),
            }],
            rules
                .into_iter()
                .map(|(field, rules)| (field.to_string(), rules))
                .collect(),
        )
    }

    #[test]
    fn json_ld_happy_path() {
        let config = config(vec![
            ("title", vec![ExtractionRule::json_ld("$.title")]),
            ("description", vec![ExtractionRule::json_ld("$.description")]),
            ("company_name", vec![ExtractionRule::json_ld("$.hiringOrganization.name")]),
            ("salary_min", vec![ExtractionRule::json_ld("$.baseSalary.value.minValue")]),
            ("salary_max", vec![ExtractionRule::json_ld("$.baseSalary.value.maxValue")]),
        ]);

        let result = extract(JSON_LD_PAGE, "https://acme.example/jobs/1", &config);
        assert_eq!(result.data.title, "Staff Engineer");
        assert_eq!(result.data.company_name.as_deref(), Some("Acme Corp"));
        assert_eq!(result.data.salary_min, Some(100000));
        assert_eq!(result.data.salary_max, Some(200000));
        // 20 + 15 + 25 + 5 + 5
        assert_eq!(result.scoring.earned_points, 70);
        assert!(result.scoring.state.is_acceptable());
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn short_company_name_is_missing() {
        let html = r#"<script type="application/ld+json">
            {"@type": "JobPosting", "title": "Staff Engineer",
             "description": "Build and operate the systems that power our platform.",
             "hiringOrganization": {"name": "Acme"}}
        </script>"#;
        let config = config(vec![
            ("title", vec![ExtractionRule::json_ld("$.title")]),
            ("description", vec![ExtractionRule::json_ld("$.description")]),
            ("company_name", vec![ExtractionRule::json_ld("$.hiringOrganization.name")]),
        ]);
        let result = extract(html, "https://acme.example/jobs/1", &config);
        assert_eq!(result.data.company_name.as_deref(), Some("Acme"));
        assert_eq!(result.scoring.state, CompletionState::Failed);
        assert_eq!(result.scoring.missing_required_fields, vec!["company_name"]);
    }

    #[test]
    fn no_match_defaults_title_and_fails() {
        let html = "<html><body><p>Nothing structured here</p></body></html>";
        let config = config(vec![
            ("title", vec![ExtractionRule::css("h1.job-title"), ExtractionRule::json_ld("$.title")]),
            ("company_name", vec![ExtractionRule::meta("og:site_name")]),
        ]);

        let result = extract(html, "https://example.com/job", &config);
        assert_eq!(result.data.title, DEFAULT_TITLE);
        assert_eq!(result.scoring.state, CompletionState::Failed);
        assert!(result.scoring.missing_required_fields.contains(&"title".to_string()));

        let title_failures = &result.diagnostics["title"];
        assert_eq!(title_failures.len(), 2);
        assert!(title_failures[0].contains("selector matched nothing"));
        assert!(title_failures[1].contains("no JSON-LD block"));
        assert_eq!(result.diagnostics["company_name"], vec!["meta(og:site_name): meta tag not found"]);
    }

    #[test]
    fn falls_through_rules_in_order() {
        let config = config(vec![(
            "title",
            vec![
                ExtractionRule::json_ld("$.name"),
                ExtractionRule::css(".missing"),
                ExtractionRule::css("h1"),
                ExtractionRule::json_ld("$.title"),
            ],
        )]);
        let result = extract(JSON_LD_PAGE, "https://acme.example", &config);
        assert_eq!(result.data.title, "Staff Engineer");
        assert_eq!(result.diagnostics["title"].len(), 2);
    }

    #[test]
    fn meta_matches_name_or_property() {
        let html = r#"<html><head>
            <meta name="company" content="Initech Corp">
            <meta property="og:title" content="Backend Developer">
        </head></html>"#;
        let config = config(vec![
            ("title", vec![ExtractionRule::meta("og:title")]),
            ("company_name", vec![ExtractionRule::meta("company")]),
        ]);
        let result = extract(html, "https://initech.example", &config);
        assert_eq!(result.data.title, "Backend Developer");
        assert_eq!(result.data.company_name.as_deref(), Some("Initech Corp"));
    }

    #[test]
    fn regex_and_number_transform() {
        let html = r#"<html><body>
            <div class="salary">Compensation: $85,000 - $120,000 per year</div>
            <div class="empty">TBD</div>
        </body></html>"#;
        let config = config(vec![
            (
                "salary_min",
                vec![
                    ExtractionRule::css(".empty").with_transform(Transform::ParseNumber),
                    ExtractionRule::regex(".salary", r"\$([\d,]+)").with_transform(Transform::ParseNumber),
                ],
            ),
            (
                "salary_max",
                vec![ExtractionRule::regex(".salary", r"- \$([\d,]+)").with_transform(Transform::ParseNumber)],
            ),
            ("location", vec![ExtractionRule::regex(".salary", r"Location: (\w+)")]),
        ]);
        let result = extract(html, "https://example.com", &config);
        assert_eq!(result.data.salary_min, Some(85000));
        assert_eq!(result.data.salary_max, Some(120000));
        assert!(result.diagnostics["salary_min"][0].contains("no digits"));
        assert_eq!(result.data.location, None);
        assert!(result.diagnostics["location"][0].contains("regex did not match"));
    }

    #[test]
    fn numeric_fields_fall_through_unreadable_values() {
        let html = r#"<html><body>
            <div class="pay">USD 120,000 p.a.</div>
            <div class="band">Competitive salary</div>
            <div class="pay2">95000</div>
        </body></html>"#;
        let config = config(vec![
            (
                "salary_min",
                vec![
                    ExtractionRule::css(".pay").with_transform(Transform::ParseNumber),
                    ExtractionRule::css(".pay2"),
                ],
            ),
            (
                "salary_max",
                vec![ExtractionRule::css(".band"), ExtractionRule::css(".pay2")],
            ),
        ]);
        let result = extract(html, "https://example.com", &config);
        assert_eq!(result.data.salary_min, Some(120000));
        assert!(!result.diagnostics.contains_key("salary_min"));
        assert_eq!(result.data.salary_max, Some(95000));
        assert_eq!(
            result.diagnostics["salary_max"],
            vec![r#"css(.band): not a number: "Competitive salary""#]
        );
    }

    #[test]
    fn scripts_and_styles_are_not_visible_text() {
        let html = r#"<html><head>
            <script type="application/ld+json">{"@type": "JobPosting", "baseSalary": "$999,999"}</script>
        </head><body>
            <div class="t"><script>var x = 1;</script><style>.t { color: red }</style>Senior Engineer</div>
            <p class="pay">Pay: $80,000</p>
        </body></html>"#;
        let config = config(vec![
            ("title", vec![ExtractionRule::css(".t")]),
            (
                "salary_min",
                vec![ExtractionRule::regex("html", r"\$([\d,]+)").with_transform(Transform::ParseNumber)],
            ),
        ]);
        let result = extract(html, "https://example.com", &config);
        assert_eq!(result.data.title, "Senior Engineer");
        assert_eq!(result.data.salary_min, Some(80000));

        assert_eq!(
            apply_transform(Transform::InnerText, "<p>Hi<script>track()</script> there</p>").unwrap(),
            "Hi there"
        );
    }

    #[test]
    fn json_ld_value_conversion() {
        let config = config(vec![
            ("qualifications", vec![ExtractionRule::json_ld("$.skills")]),
            ("is_remote", vec![ExtractionRule::json_ld("$.jobLocationType")]),
            ("category", vec![ExtractionRule::json_ld("$.baseSalary.value")]),
        ]);
        let result = extract(JSON_LD_PAGE, "https://acme.example", &config);
        assert_eq!(result.data.qualifications, vec!["Rust", "Postgres", "Kubernetes"]);
        assert!(result.data.is_remote);
        let category = result.data.category.unwrap();
        assert!(category.starts_with('{'));
        assert!(category.contains("\"minValue\":100000"));
    }

    #[test]
    fn html_transforms() {
        assert_eq!(
            apply_transform(Transform::HtmlDecode, "Tom &amp; Jerry &lt;3").unwrap(),
            "Tom & Jerry <3"
        );
        assert_eq!(
            apply_transform(Transform::InnerText, "<p>Hello <b>world</b></p>\n<p>again</p>").unwrap(),
            "Hello world again"
        );
        assert_eq!(
            apply_transform(Transform::HtmlDecode, "a &lt;b&gt; </textarea> c &amp; d").unwrap(),
            "a <b> </textarea> c & d"
        );
        assert_eq!(apply_transform(Transform::ParseNumber, "USD 1,250.50").unwrap(), "1250.50");
        assert_eq!(apply_transform(Transform::ParseNumber, "USD 120,000 p.a.").unwrap(), "120000");
        assert_eq!(apply_transform(Transform::ParseNumber, "v2.5 release").unwrap(), "2.5");
        assert!(apply_transform(Transform::ParseNumber, "n/a").is_err());
    }

    #[test]
    fn field_mapping_helpers() {
        assert_eq!(parse_integer("120000"), Some(120000));
        assert_eq!(parse_integer("99999.99"), Some(99999));
        assert_eq!(parse_integer("abc"), None);

        assert_eq!(split_list(" a, ,b ,, c"), vec!["a", "b", "c"]);

        assert!(is_remote("TRUE"));
        assert!(is_remote("telecommute"));
        assert!(is_remote("Fully Remote (EU)"));
        assert!(!is_remote("Berlin, Germany"));

        assert_eq!(
            resolve_url("https://acme.example/careers/42", "/apply/42"),
            "https://acme.example/apply/42"
        );
        assert_eq!(resolve_url("not a url", "/apply"), "/apply");
    }
}
