//! Item 1 (Business) and Item 1A (Risk Factors) section extraction.
//!
//! Sections are located either through TOC anchors (`href="#item1..."` /
//! matching element ids) or by heading regexes over the visible text. The
//! regex path considers every candidate start and keeps the longest span,
//! which naturally skips the table-of-contents mentions near the top.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use company_graph_core::error::AppResult;

use super::{visible_text, ExtractionInput, FieldExtractor, FieldValue};

/// Sections shorter than this are TOC fragments, not content.
const MIN_SECTION_CHARS: usize = 200;

static ITEM1_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)item\s+1\s*[.:\-–—]?\s*business").unwrap());
static ITEM1A_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)item\s+1a\s*[.:\-–—]?\s*risk\s+factors").unwrap());
static ITEM2_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)item\s+2\s*[.:\-–—]?\s*propert").unwrap());

static ANCHOR_LINKS: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());

/// Normalize an anchor id for matching: lowercase, separators removed.
fn squash_id(id: &str) -> String {
    id.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

fn id_matches(id: &str, keys: &[&str]) -> bool {
    let squashed = squash_id(id);
    keys.iter().any(|key| squashed == *key)
}

const ITEM1_IDS: &[&str] = &["item1", "item1business"];
const ITEM1A_IDS: &[&str] = &["item1a", "item1ariskfactors", "item1ariskfactor"];
const ITEM2_IDS: &[&str] = &["item2", "item2properties"];

/// Find the target id a TOC anchor points at for a section, if any.
fn anchor_target(tree: &Html, keys: &[&str]) -> Option<String> {
    for link in tree.select(&ANCHOR_LINKS) {
        if let Some(href) = link.value().attr("href") {
            if let Some(target) = href.strip_prefix('#') {
                if id_matches(target, keys) {
                    return Some(target.to_string());
                }
            }
        }
    }
    None
}

/// Document-order text between the element with `start_id` and the first
/// of the `end_ids` targets.
fn text_between_ids(tree: &Html, start_id: &str, end_ids: &[&str]) -> Option<String> {
    let mut collecting = false;
    let mut out = String::new();

    let mut stack = vec![tree.tree.root()];
    // Manual DFS so the walk sees ids and text nodes in document order.
    while let Some(node) = stack.pop() {
        match node.value() {
            scraper::Node::Element(element) => {
                if matches!(element.name(), "script" | "style" | "noscript") {
                    continue;
                }
                if let Some(id) = element.id() {
                    if collecting && id_matches(id, end_ids) {
                        break;
                    }
                    if !collecting && id == start_id {
                        collecting = true;
                    }
                }
            }
            scraper::Node::Text(text) => {
                if collecting {
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        if !out.is_empty() {
                            out.push(' ');
                        }
                        out.push_str(trimmed);
                    }
                }
                continue;
            }
            _ => {}
        }
        let children: Vec<_> = node.children().collect();
        for child in children.into_iter().rev() {
            stack.push(child);
        }
    }

    if out.len() >= MIN_SECTION_CHARS {
        Some(out)
    } else {
        None
    }
}

/// Longest span between a start-heading match and the next end-heading
/// match. TOC rows produce short spans and lose to the real section.
fn section_via_regex(text: &str, start_re: &Regex, end_re: &Regex) -> Option<String> {
    let mut best: Option<&str> = None;
    for start in start_re.find_iter(text) {
        let tail = &text[start.end()..];
        let candidate = match end_re.find(tail) {
            Some(end) => &tail[..end.start()],
            None => tail,
        };
        if candidate.len() > best.map_or(0, str::len) {
            best = Some(candidate);
        }
    }
    best.map(str::trim)
        .filter(|s| s.len() >= MIN_SECTION_CHARS)
        .map(str::to_string)
}

fn extract_section(
    tree: &Html,
    start_ids: &[&str],
    end_ids: &[&str],
    start_re: &Regex,
    end_re: &Regex,
) -> Option<String> {
    if let Some(target) = anchor_target(tree, start_ids) {
        if let Some(section) = text_between_ids(tree, &target, end_ids) {
            return Some(section);
        }
    }
    let text = visible_text(tree, None);
    section_via_regex(&text, start_re, end_re)
}

/// Section lookup over already-flattened text, shared with the
/// relationship extractor (which works from the same parsed tree).
pub(crate) fn section_for_relationships(text: &str, business: bool) -> Option<String> {
    if business {
        section_via_regex(text, &ITEM1_RE, &ITEM1A_RE)
    } else {
        section_via_regex(text, &ITEM1A_RE, &ITEM2_RE)
    }
}

/// Item 1: Business, up to the start of Item 1A.
pub struct BusinessDescriptionExtractor;

impl FieldExtractor for BusinessDescriptionExtractor {
    fn field_name(&self) -> &'static str {
        "business_description"
    }

    fn extract(&self, input: &ExtractionInput<'_>) -> AppResult<Option<FieldValue>> {
        Ok(
            extract_section(input.tree, ITEM1_IDS, ITEM1A_IDS, &ITEM1_RE, &ITEM1A_RE)
                .map(FieldValue::Text),
        )
    }

    fn validate(&self, value: &FieldValue) -> bool {
        matches!(value, FieldValue::Text(text) if text.len() >= MIN_SECTION_CHARS)
    }
}

/// Item 1A: Risk Factors, up to the start of Item 2.
pub struct RiskFactorsExtractor;

impl FieldExtractor for RiskFactorsExtractor {
    fn field_name(&self) -> &'static str {
        "risk_factors"
    }

    fn extract(&self, input: &ExtractionInput<'_>) -> AppResult<Option<FieldValue>> {
        Ok(
            extract_section(input.tree, ITEM1A_IDS, ITEM2_IDS, &ITEM1A_RE, &ITEM2_RE)
                .map(FieldValue::Text),
        )
    }

    fn validate(&self, value: &FieldValue) -> bool {
        matches!(value, FieldValue::Text(text) if text.len() >= MIN_SECTION_CHARS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filing_html() -> String {
        let business = "We design, manufacture and market smartphones, personal computers, \
            tablets, wearables and accessories worldwide. ".repeat(5);
        let risks = "The Company's business, reputation, results of operations and financial \
            condition can be materially adversely affected by a number of factors. ".repeat(5);
        format!(
            r##"<html><body>
            <div class="toc">
                <a href="#item1-business">Item 1. Business</a>
                <a href="#item1a">Item 1A. Risk Factors</a>
                <a href="#item2">Item 2. Properties</a>
            </div>
            <h2 id="item1-business">Item 1. Business</h2>
            <p>{business}</p>
            <h2 id="item1a">Item 1A. Risk Factors</h2>
            <p>{risks}</p>
            <h2 id="item2">Item 2. Properties</h2>
            <p>We own our headquarters.</p>
            </body></html>"##
        )
    }

    #[test]
    fn business_description_stops_at_item_1a() {
        let tree = Html::parse_document(&filing_html());
        let section =
            extract_section(&tree, ITEM1_IDS, ITEM1A_IDS, &ITEM1_RE, &ITEM1A_RE).unwrap();
        assert!(section.contains("smartphones"));
        assert!(!section.contains("materially adversely affected"));
    }

    #[test]
    fn risk_factors_stop_at_item_2() {
        let tree = Html::parse_document(&filing_html());
        let section =
            extract_section(&tree, ITEM1A_IDS, ITEM2_IDS, &ITEM1A_RE, &ITEM2_RE).unwrap();
        assert!(section.contains("materially adversely affected"));
        assert!(!section.contains("own our headquarters"));
    }

    #[test]
    fn regex_path_skips_the_toc_mention() {
        let business = "Real business content here. ".repeat(20);
        let text = format!(
            "Item 1. Business 4 Item 1A. Risk Factors 12 Item 2. Properties 30 \
             Part I Item 1. Business {business} Item 1A. Risk Factors long risk text"
        );
        let section = section_via_regex(&text, &ITEM1_RE, &ITEM1A_RE).unwrap();
        assert!(section.contains("Real business content"));
        assert!(!section.starts_with('4'));
    }

    #[test]
    fn short_fragments_are_rejected() {
        let text = "Item 1. Business short Item 1A. Risk Factors";
        assert_eq!(section_via_regex(text, &ITEM1_RE, &ITEM1A_RE), None);
    }

    #[test]
    fn validation_enforces_minimum_length() {
        let extractor = BusinessDescriptionExtractor;
        assert!(!extractor.validate(&FieldValue::Text("tiny".to_string())));
        assert!(extractor.validate(&FieldValue::Text("x".repeat(500))));
    }
}
