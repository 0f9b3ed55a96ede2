//! Company website extraction from the 10-K cover page.
//!
//! Strategies in priority order, stopping at the first valid hit:
//! 1. The SEC-mandated `dei:EntityWebSite` iXBRL element
//! 2. `<companyWebsite>` elements in XML filings
//! 3. Heuristic mining of namespace declarations and visible text,
//!    scored by keyword proximity
//!
//! Every candidate funnels through the central domain validation.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use company_graph_core::domain::{is_infrastructure_domain, is_valid_domain, normalize_domain, root_domain};
use company_graph_core::error::AppResult;

use super::{visible_text, ExtractionInput, FieldExtractor, FieldValue};

/// Captures multi-label domains in free text.
static DOMAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b((?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+(?:[a-z]{2,63}))\b").unwrap()
});

/// xmlns:* declarations in the head of iXBRL documents; extension
/// namespaces usually carry the filer's own domain.
static XMLNS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\sxmlns:[a-zA-Z0-9_-]+="([^"]+)""#).unwrap());

static ALL_ELEMENTS: Lazy<Selector> = Lazy::new(|| Selector::parse("*").unwrap());

/// iXBRL attribute values are matched case-insensitively on this token.
const IXBRL_WEBSITE_TOKEN: &str = "entitywebsite";

const KEYWORDS: &[&str] = &["internet address", "our website", "website", "web site"];

/// Extract the website from the official `dei:EntityWebSite` element.
///
/// The concept shows up under several attribute spellings depending on the
/// filer's tagging tool: `name`, `id`, `data-ixbrl`, or `class`.
pub fn website_from_ixbrl(tree: &Html) -> Option<String> {
    for element in tree.select(&ALL_ELEMENTS) {
        let value = element.value();
        let tagged = ["name", "id", "data-ixbrl", "class"].iter().any(|attr| {
            value
                .attr(attr)
                .is_some_and(|v| v.to_ascii_lowercase().contains(IXBRL_WEBSITE_TOKEN))
        });
        if !tagged {
            continue;
        }
        let text: String = element.text().collect::<String>().trim().to_string();
        if text.is_empty() {
            continue;
        }
        if let Some(domain) = normalize_domain(&text) {
            if !is_infrastructure_domain(&domain) {
                return Some(domain);
            }
        }
    }
    None
}

/// Extract a `<companyWebsite>` element from an XML filing.
///
/// quick-xml never resolves external entities, so hostile DTDs in filings
/// cannot reach the filesystem or network.
pub fn website_from_xml(content: &str) -> Option<String> {
    let mut reader = quick_xml::Reader::from_str(content);
    reader.config_mut().trim_text(true);
    let mut in_website_element = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(start)) => {
                let name = String::from_utf8_lossy(start.local_name().as_ref()).to_lowercase();
                in_website_element = name.contains("website");
            }
            Ok(quick_xml::events::Event::Text(text)) if in_website_element => {
                if let Ok(value) = text.unescape() {
                    let value = value.trim();
                    if !value.is_empty() {
                        if let Some(domain) = normalize_domain(value) {
                            if !is_infrastructure_domain(&domain) {
                                return Some(domain);
                            }
                        }
                    }
                }
            }
            Ok(quick_xml::events::Event::End(_)) => in_website_element = false,
            Ok(quick_xml::events::Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    None
}

/// Candidate domains from xmlns declarations in the first 20 KB.
pub fn domains_from_namespaces(content: &str) -> Vec<String> {
    let head: String = content.chars().take(20_000).collect();
    let mut out = Vec::new();
    for captures in XMLNS_RE.captures_iter(&head) {
        let url = &captures[1];
        let host = if url.contains("://") {
            url.split("://").nth(1).unwrap_or("").split('/').next().unwrap_or("")
        } else {
            url.split('/').next().unwrap_or("")
        };
        if host.is_empty() {
            continue;
        }
        if let Some(domain) = root_domain(host) {
            if is_valid_domain(&domain) && !is_infrastructure_domain(&domain) && !out.contains(&domain)
            {
                out.push(domain);
            }
        }
    }
    out
}

/// Candidate domains mined from visible text.
pub fn domains_from_visible_text(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for captures in DOMAIN_RE.captures_iter(text) {
        if let Some(domain) = root_domain(&captures[1]) {
            if is_valid_domain(&domain) && !is_infrastructure_domain(&domain) && !out.contains(&domain)
            {
                out.push(domain);
            }
        }
    }
    out
}

/// Score candidates by occurrence count, keyword proximity, and a `.com`
/// bonus, and return the best scoring one.
pub fn choose_best_domain(content: &str, tree: &Html) -> Option<String> {
    let text = visible_text(tree, Some(200_000)).to_ascii_lowercase();

    let mut candidates = domains_from_namespaces(content);
    for candidate in domains_from_visible_text(&text) {
        if !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    }
    if candidates.is_empty() {
        return None;
    }

    let score = |domain: &str| -> i64 {
        let mut s = text.matches(domain).count() as i64;
        for (index, _) in text.match_indices(domain) {
            let start = index.saturating_sub(80);
            let end = (index + domain.len() + 80).min(text.len());
            let window = &text[start..end];
            if KEYWORDS.iter().any(|k| window.contains(k)) {
                s += 10;
                break;
            }
        }
        if domain.ends_with(".com") {
            s += 2;
        }
        s
    };

    let best = candidates.into_iter().max_by_key(|d| score(d))?;
    if score(&best) > 0 {
        Some(best)
    } else {
        None
    }
}

/// The website field extractor.
pub struct WebsiteExtractor;

impl FieldExtractor for WebsiteExtractor {
    fn field_name(&self) -> &'static str {
        "website"
    }

    fn extract(&self, input: &ExtractionInput<'_>) -> AppResult<Option<FieldValue>> {
        let is_xml = input.path.extension().is_some_and(|ext| ext == "xml");

        if !is_xml {
            if let Some(domain) = website_from_ixbrl(input.tree) {
                return Ok(Some(FieldValue::Text(domain)));
            }
        } else if let Some(domain) = website_from_xml(input.content) {
            return Ok(Some(FieldValue::Text(domain)));
        }

        Ok(choose_best_domain(input.content, input.tree).map(FieldValue::Text))
    }

    fn validate(&self, value: &FieldValue) -> bool {
        match value {
            FieldValue::Text(domain) => {
                is_valid_domain(domain) && !is_infrastructure_domain(domain)
            }
            _ => false,
        }
    }
}
