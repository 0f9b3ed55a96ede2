//! Domain validation and normalization against the Public Suffix List.
//!
//! Every externally sourced domain must pass through [`normalize_domain`]
//! before persistence. The function is idempotent: feeding its output back
//! in returns the same value.

use once_cell::sync::Lazy;
use regex::Regex;

/// Taxonomy hosts that show up in iXBRL filings but are never company
/// websites.
const KNOWN_TAXONOMY_ROOTS: &[&str] = &[
    "sec.gov", "xbrl.org", "fasb.org", "w3.org", "xbrl.us", "xbrl.sec.gov", "edgar", "html",
    "xml",
];

/// Data-provider domains that must never be returned as company domains.
const KNOWN_INFRASTRUCTURE: &[&str] = &["finviz.com", "yahoo.com", "google.com"];

static GAAP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)gaap\.org").unwrap());

/// Check if a domain is infrastructure (sec.gov, xbrl.org, data-provider
/// hosts, any `.gov`).
pub fn is_infrastructure_domain(domain: &str) -> bool {
    let lower = domain.to_ascii_lowercase();
    if KNOWN_TAXONOMY_ROOTS.contains(&lower.as_str()) {
        return true;
    }
    if lower.ends_with(".gov") || GAAP_RE.is_match(&lower) {
        return true;
    }
    KNOWN_INFRASTRUCTURE.contains(&lower.as_str())
}

/// Strip protocol, leading `www.`, and any path/query, lowercased.
fn clean_input(input: &str) -> String {
    let mut s = input.trim().to_ascii_lowercase();
    if let Some(rest) = s.strip_prefix("https://") {
        s = rest.to_string();
    } else if let Some(rest) = s.strip_prefix("http://") {
        s = rest.to_string();
    }
    if let Some(rest) = s.strip_prefix("www.") {
        s = rest.to_string();
    }
    let s = s.trim_matches('/');
    s.split(['/', '?', '#']).next().unwrap_or("").to_string()
}

/// Extract the registrable root domain (eTLD+1) from a raw string.
///
/// Handles compound suffixes (`example.co.uk`) via the Public Suffix List.
/// Returns `None` when the string has no known suffix.
pub fn root_domain(input: &str) -> Option<String> {
    if input.is_empty() {
        return None;
    }
    let clean = clean_input(input);
    if clean.is_empty() {
        return None;
    }
    let parsed = psl::domain(clean.as_bytes())?;
    if !parsed.suffix().is_known() {
        return None;
    }
    std::str::from_utf8(parsed.as_bytes()).ok().map(str::to_string)
}

/// Validate a domain string: known PSL suffix, domain label of at least
/// two characters, a suffix of sane length, and not an infrastructure host.
pub fn is_valid_domain(domain: &str) -> bool {
    if domain.is_empty() || domain.len() > 255 {
        return false;
    }
    let clean = clean_input(domain);
    let Some(parsed) = psl::domain(clean.as_bytes()) else {
        return false;
    };
    if !parsed.suffix().is_known() {
        return false;
    }
    let Ok(registrable) = std::str::from_utf8(parsed.as_bytes()) else {
        return false;
    };
    let Ok(suffix) = std::str::from_utf8(parsed.suffix().as_bytes()) else {
        return false;
    };
    // Label is what precedes ".{suffix}" in the registrable domain.
    let label_len = registrable.len().saturating_sub(suffix.len() + 1);
    if label_len < 2 {
        return false;
    }
    if suffix.len() < 2 || suffix.len() > 15 {
        // Very long suffixes are extraction artifacts, not real TLDs.
        return false;
    }
    if KNOWN_TAXONOMY_ROOTS.contains(&registrable.to_ascii_lowercase().as_str()) {
        return false;
    }
    true
}

/// Normalize a raw domain string to a validated root domain.
///
/// This is the single funnel for all externally sourced domains:
/// `"http://www.apple.com/about"` becomes `"apple.com"`, subdomains
/// collapse to the registrable root, and anything invalid returns `None`.
pub fn normalize_domain(input: &str) -> Option<String> {
    let normalized = root_domain(input)?;
    if is_valid_domain(&normalized) {
        Some(normalized)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_protocol_www_and_path() {
        assert_eq!(normalize_domain("http://www.apple.com"), Some("apple.com".into()));
        assert_eq!(
            normalize_domain("https://www.microsoft.com/en-us/"),
            Some("microsoft.com".into())
        );
        assert_eq!(normalize_domain("www.nvidia.com"), Some("nvidia.com".into()));
    }

    #[test]
    fn collapses_subdomains_to_root() {
        assert_eq!(normalize_domain("investor.apple.com"), Some("apple.com".into()));
        assert_eq!(normalize_domain("ir.shop.example.com"), Some("example.com".into()));
    }

    #[test]
    fn handles_compound_suffixes() {
        assert_eq!(normalize_domain("example.co.uk"), Some("example.co.uk".into()));
        assert_eq!(normalize_domain("www.shop.example.co.uk"), Some("example.co.uk".into()));
    }

    #[test]
    fn rejects_invalid_input() {
        assert_eq!(normalize_domain(""), None);
        assert_eq!(normalize_domain("not a domain"), None);
        assert_eq!(normalize_domain("localhost"), None);
        // Single-character labels are not company domains.
        assert_eq!(normalize_domain("a.com"), None);
    }

    #[test]
    fn normalize_is_idempotent() {
        for input in ["http://www.apple.com", "investor.apple.com", "example.co.uk"] {
            let once = normalize_domain(input).unwrap();
            assert_eq!(normalize_domain(&once), Some(once.clone()));
        }
    }

    #[test]
    fn infrastructure_domains_are_flagged() {
        assert!(is_infrastructure_domain("sec.gov"));
        assert!(is_infrastructure_domain("XBRL.ORG"));
        assert!(is_infrastructure_domain("fasb.org"));
        assert!(is_infrastructure_domain("finviz.com"));
        assert!(is_infrastructure_domain("yahoo.com"));
        assert!(is_infrastructure_domain("google.com"));
        assert!(is_infrastructure_domain("irs.gov"));
        assert!(is_infrastructure_domain("us-gaap.org"));
        assert!(!is_infrastructure_domain("apple.com"));
    }

    #[test]
    fn valid_domains_pass_validation() {
        assert!(is_valid_domain("apple.com"));
        assert!(is_valid_domain("example.co.uk"));
        assert!(!is_valid_domain("sec.gov"));
        assert!(!is_valid_domain(""));
        assert!(!is_valid_domain(&"x".repeat(300)));
    }
}
