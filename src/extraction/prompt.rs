//! Prompt construction for ruleset generation.

use std::collections::BTreeMap;
use std::fmt::Write;

use scraper::{Html, Selector};
use serde_json::Value;

use crate::extraction::extractor::{self, ExtractionResult, FIELDS};
use crate::extraction::{jsonld, path};

const EXCERPT_CHARS: usize = 1500;
const JSON_LD_CHARS: usize = 8000;
const META_TAGS: usize = 12;

/// schema.org `JobPosting` paths worth pointing the model at when they
/// resolve on the page.
const KNOWN_PATHS: &[(&str, &str)] = &[
    ("title", "$.title"),
    ("company_name", "$.hiringOrganization.name"),
    ("description", "$.description"),
    ("location", "$.jobLocation.address.addressLocality"),
    ("location", "$.jobLocation[0].address.addressLocality"),
    ("job_type", "$.employmentType"),
    ("salary_min", "$.baseSalary.value.minValue"),
    ("salary_max", "$.baseSalary.value.maxValue"),
    ("salary_currency", "$.baseSalary.currency"),
    ("qualifications", "$.qualifications"),
    ("responsibilities", "$.responsibilities"),
    ("benefits", "$.jobBenefits"),
    ("category", "$.occupationalCategory"),
    ("application_url", "$.url"),
    ("is_remote", "$.jobLocationType"),
    ("date_posted", "$.datePosted"),
    ("valid_through", "$.validThrough"),
];

const INSTRUCTIONS: &str = r#"You write extraction rulesets for job posting pages.
A ruleset has match patterns that recognise pages from the same site or layout,
and per-field extraction rules that are tried in order until one yields a value.

Match pattern types:
- css_exists: {"type": "css_exists", "selector": "...", "content_filter": "optional literal text inside the element"}
- url_pattern: {"type": "url_pattern", "pattern": "regex searched anywhere in the URL"}
- content_contains: {"type": "content_contains", "text": "literal text in the raw HTML"}

Rule sources, in order of preference:
1. json_ld: {"source": "json_ld", "path": "$.hiringOrganization.name"} (dotted keys and [n] indices only)
2. css: {"source": "css", "selector": "h1.job-title"} (text of the first matching element)
3. meta: {"source": "meta", "name": "og:title"} (content of <meta name|property>)
4. regex: {"source": "regex", "selector": ".salary", "pattern": "\\$([\\d,]+)"} (first capture group)

Transforms, applied in order after extraction: html_decode, inner_text, parse_number.
List fields (qualifications, responsibilities, benefits) are split on commas.

Respond with a single JSON object:
{"name": "...", "match_patterns": [...], "extract_rules": {"field_name": [rule, ...]}}"#;

/// What the generator knows about a page before the first attempt. Owned
/// data only, so it can be held across awaits.
#[derive(Debug, Clone, Default)]
pub struct PageContext {
    pub title: Option<String>,
    pub meta: Vec<(String, String)>,
    pub has_json_ld: bool,
    pub job_posting: Option<Value>,
    /// `(field, path, json type)` for every known path that resolves.
    pub resolved_paths: Vec<(&'static str, &'static str, &'static str)>,
    pub excerpt: String,
}

impl PageContext {
    pub fn prepare(html: &str) -> Self {
        let document = Html::parse_document(html);

        let title = Selector::parse("title")
            .ok()
            .and_then(|s| document.select(&s).next().map(|el| el.text().collect::<String>()))
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        let meta = Selector::parse("meta")
            .map(|selector| {
                document
                    .select(&selector)
                    .filter_map(|el| {
                        let attrs = el.value();
                        let key = attrs.attr("name").or_else(|| attrs.attr("property"))?;
                        let content = attrs.attr("content")?;
                        Some((key.to_string(), truncate(content, 200)))
                    })
                    .take(META_TAGS)
                    .collect()
            })
            .unwrap_or_default();

        let excerpt = Selector::parse("body")
            .ok()
            .and_then(|s| document.select(&s).next())
            .map(|body| truncate(&extractor::visible_text(body), EXCERPT_CHARS))
            .unwrap_or_default();

        let job_posting = jsonld::job_posting(&document);
        let resolved_paths = job_posting
            .as_ref()
            .map(|posting| {
                KNOWN_PATHS
                    .iter()
                    .filter_map(|&(field, p)| Some((field, p, json_kind(posting, p)?)))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            title,
            meta,
            has_json_ld: jsonld::locate(&document).is_some(),
            job_posting,
            resolved_paths,
            excerpt,
        }
    }
}

fn json_kind(posting: &Value, p: &str) -> Option<&'static str> {
    if path::get_string(posting, p).is_some() {
        Some("string")
    } else if path::get_int(posting, p).is_some() {
        Some("integer")
    } else if path::get_number(posting, p).is_some() {
        Some("number")
    } else if path::get_bool(posting, p).is_some() {
        Some("boolean")
    } else if path::get_array(posting, p).is_some() {
        Some("array")
    } else {
        None
    }
}

/// What went wrong with the previous attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Feedback {
    pub missing_required: Vec<String>,
    pub missing_optional: Vec<String>,
    pub failures: BTreeMap<String, Vec<String>>,
}

impl Feedback {
    pub fn from_result(result: &ExtractionResult) -> Self {
        Self {
            missing_required: result.scoring.missing_required_fields.clone(),
            missing_optional: result.scoring.missing_optional_fields.clone(),
            failures: result.diagnostics.clone(),
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::from("## Previous attempt\n");
        if !self.missing_required.is_empty() {
            let _ = writeln!(out, "Missing required fields: {}", self.missing_required.join(", "));
        }
        if !self.missing_optional.is_empty() {
            let _ = writeln!(out, "Missing optional fields: {}", self.missing_optional.join(", "));
        }
        if !self.failures.is_empty() {
            out.push_str("Rule failures:\n");
            for (field, reasons) in &self.failures {
                for reason in reasons {
                    let _ = writeln!(out, "- {field}: {reason}");
                }
            }
        }
        out.push_str("Fix these problems. Prefer JSON-LD paths when the data is there.\n");
        out
    }
}

pub fn build_prompt(url: &str, page: &PageContext, feedback: Option<&Feedback>) -> String {
    let mut prompt = String::with_capacity(4096);
    prompt.push_str(INSTRUCTIONS);
    let _ = write!(prompt, "\n\nFields: {}\n", FIELDS.join(", "));
    prompt.push_str("Required: title, company_name, description\n\n");

    prompt.push_str("## Page\n");
    let _ = writeln!(prompt, "URL: {url}");
    if let Some(title) = &page.title {
        let _ = writeln!(prompt, "Title: {title}");
    }
    let _ = writeln!(prompt, "Has JSON-LD: {}", page.has_json_ld);
    if !page.meta.is_empty() {
        prompt.push_str("Meta tags:\n");
        for (name, content) in &page.meta {
            let _ = writeln!(prompt, "- {name}: {content}");
        }
    }
    if !page.excerpt.is_empty() {
        let _ = writeln!(prompt, "Content excerpt:\n{}", page.excerpt);
    }

    if let Some(posting) = &page.job_posting {
        let rendered = serde_json::to_string_pretty(posting).unwrap_or_default();
        let _ = write!(
            prompt,
            "\n## JobPosting JSON-LD\n{}\n",
            truncate(&rendered, JSON_LD_CHARS)
        );
    }

    if !page.resolved_paths.is_empty() {
        prompt.push_str("\n## Resolving JSON-LD paths\n");
        for (field, p, kind) in &page.resolved_paths {
            let _ = writeln!(prompt, "- {field}: {p} ({kind})");
        }
    }

    if let Some(feedback) = feedback {
        prompt.push('\n');
        prompt.push_str(&feedback.render());
    }

    prompt
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head>
        <title> Platform Engineer - Acme </title>
        <meta name="description" content="Join Acme as a platform engineer">
        <meta property="og:site_name" content="Acme Careers">
        <meta charset="utf-8">
        <script type="application/ld+json">{"@type": "JobPosting", "title": "Platform Engineer"}</script>
    </head><body>
        <h1>Platform   Engineer</h1>
        <p>We are hiring.</p>
    </body></html>"#;

    #[test]
    fn prepares_page_summary() {
        let page = PageContext::prepare(PAGE);
        assert_eq!(page.title.as_deref(), Some("Platform Engineer - Acme"));
        assert_eq!(page.meta.len(), 2);
        assert_eq!(page.meta[1], ("og:site_name".to_string(), "Acme Careers".to_string()));
        assert!(page.has_json_ld);
        assert_eq!(page.job_posting.as_ref().unwrap()["title"], "Platform Engineer");
        assert!(page.excerpt.starts_with("Platform Engineer We are hiring."));
    }

    #[test]
    fn first_prompt_has_no_feedback() {
        let page = PageContext::prepare(PAGE);
        let prompt = build_prompt("https://acme.example/jobs/9", &page, None);
        assert!(prompt.contains("URL: https://acme.example/jobs/9"));
        assert!(prompt.contains("## JobPosting JSON-LD"));
        assert!(prompt.contains("\"title\": \"Platform Engineer\""));
        assert!(!prompt.contains("## Previous attempt"));
    }

    #[test]
    fn feedback_lists_missing_fields_and_failures() {
        let mut failures = BTreeMap::new();
        failures.insert(
            "description".to_string(),
            vec!["css(.job-description): selector matched nothing".to_string()],
        );
        let feedback = Feedback {
            missing_required: vec!["description".to_string()],
            missing_optional: vec!["benefits".to_string()],
            failures,
        };

        let page = PageContext::prepare(PAGE);
        let prompt = build_prompt("https://acme.example/jobs/9", &page, Some(&feedback));
        assert!(prompt.contains("Missing required fields: description"));
        assert!(prompt.contains("Missing optional fields: benefits"));
        assert!(prompt.contains("- description: css(.job-description): selector matched nothing"));
    }

    #[test]
    fn lists_resolving_json_ld_paths() {
        let page = PageContext::prepare(
            r#"<script type="application/ld+json">{"@type": "JobPosting", "title": "SRE",
                "baseSalary": {"currency": "EUR", "value": {"minValue": 70000, "maxValue": 85000.5}},
                "jobLocationType": "TELECOMMUTE", "qualifications": ["Linux", "Go"]}</script>"#,
        );
        assert_eq!(
            page.resolved_paths,
            vec![
                ("title", "$.title", "string"),
                ("salary_min", "$.baseSalary.value.minValue", "integer"),
                ("salary_max", "$.baseSalary.value.maxValue", "number"),
                ("salary_currency", "$.baseSalary.currency", "string"),
                ("qualifications", "$.qualifications", "array"),
                ("is_remote", "$.jobLocationType", "string"),
            ]
        );

        let prompt = build_prompt("https://sre.example/j", &page, None);
        assert!(prompt.contains("- salary_min: $.baseSalary.value.minValue (integer)"));
        assert!(PageContext::prepare(PAGE).resolved_paths.len() == 1);
    }

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate("héllo wörld", 5), "héllo...");
        assert_eq!(truncate("short", 10), "short");
    }
}
