//! JSON-LD discovery in parsed pages.
//!
//! Reads every `<script type="application/ld+json">` body. Top-level arrays
//! and `@graph` containers are searched for `JobPosting` nodes too.

use scraper::{Html, Selector};
use serde_json::Value;

use crate::extraction::path;

const JOB_POSTING: &str = "JobPosting";

fn blocks(document: &Html) -> Vec<Value> {
    let Ok(selector) = Selector::parse(r#"script[type="application/ld+json"]"#) else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|element| {
            let content = element.inner_html();
            let trimmed = content.trim();
            if trimmed.is_empty() {
                return None;
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(json) => Some(json),
                Err(e) => {
                    tracing::debug!("Skipping unparseable JSON-LD block: {e}");
                    None
                }
            }
        })
        .collect()
}

/// `@type` equals `JobPosting`, or contains it when `@type` is an array.
pub fn is_job_posting(value: &Value) -> bool {
    if let Some(kind) = path::get_string(value, "@type") {
        return kind == JOB_POSTING;
    }
    path::get_array(value, "@type")
        .is_some_and(|types| types.iter().any(|t| t.as_str() == Some(JOB_POSTING)))
}

fn find_posting_in(block: &Value) -> Option<&Value> {
    if is_job_posting(block) {
        return Some(block);
    }
    let nested = match block {
        Value::Array(items) => items,
        Value::Object(_) => path::get_array(block, "@graph")?,
        _ => return None,
    };
    nested.iter().find(|item| is_job_posting(item))
}

/// The first `JobPosting` node on the page, if any.
pub fn job_posting(document: &Html) -> Option<Value> {
    blocks(document)
        .iter()
        .find_map(find_posting_in)
        .cloned()
}

/// The `JobPosting` node if present, else the first JSON-LD block.
pub fn locate(document: &Html) -> Option<Value> {
    let mut blocks = blocks(document);
    if let Some(posting) = blocks.iter().find_map(find_posting_in) {
        return Some(posting.clone());
    }
    if blocks.is_empty() {
        None
    } else {
        Some(blocks.swap_remove(0))
    }
}
