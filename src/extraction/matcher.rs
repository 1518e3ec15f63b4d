//! Selects which stored ruleset applies to a page.

use regex::Regex;
use scraper::{Html, Selector};

use crate::extraction::rules::{ExtractionConfig, MatchPattern};

/// A fully matching config and how many of its patterns were satisfied.
#[derive(Debug, Clone, Copy)]
pub struct PatternMatch<'a> {
    pub config: &'a ExtractionConfig,
    pub matched: usize,
    pub total: usize,
}

/// Every config whose patterns all match, most specific first. Configs with
/// the same specificity keep their input order.
pub fn find_all<'a>(
    html: &str,
    url: &str,
    configs: &'a [ExtractionConfig],
) -> Vec<PatternMatch<'a>> {
    let document = Html::parse_document(html);

    let mut matches: Vec<PatternMatch<'a>> = configs
        .iter()
        .filter_map(|config| {
            let total = config.match_patterns.len();
            // evaluate every pattern so the count is exact
            let matched = config
                .match_patterns
                .iter()
                .filter(|pattern| evaluate(&document, html, url, pattern))
                .count();
            tracing::debug!(
                config = %config.name,
                matched,
                total,
                "Evaluated ruleset patterns"
            );
            (total > 0 && matched == total).then_some(PatternMatch {
                config,
                matched,
                total,
            })
        })
        .collect();

    // stable sort: ties stay in input order
    matches.sort_by(|a, b| b.matched.cmp(&a.matched));
    matches
}

/// The most specific fully matching config; the first listed wins ties.
pub fn find_best<'a>(
    html: &str,
    url: &str,
    configs: &'a [ExtractionConfig],
) -> Option<&'a ExtractionConfig> {
    find_all(html, url, configs).first().map(|m| m.config)
}

fn evaluate(document: &Html, html: &str, url: &str, pattern: &MatchPattern) -> bool {
    match pattern {
        MatchPattern::CssExists {
            selector,
            content_filter,
        } => {
            let Ok(selector) = Selector::parse(selector) else {
                tracing::debug!("Invalid CSS selector in pattern: {selector}");
                return false;
            };
            let mut elements = document.select(&selector);
            match content_filter {
                Some(filter) => elements.any(|el| el.inner_html().contains(filter.as_str())),
                None => elements.next().is_some(),
            }
        }
        MatchPattern::UrlPattern { regex } => match Regex::new(regex) {
            Ok(re) => re.is_match(url),
            Err(e) => {
                tracing::debug!("Invalid URL pattern {regex}: {e}");
                false
            }
        },
        MatchPattern::ContentContains { text } => html.contains(text.as_str()),
    }
}
