//! Business relationship extraction from Item 1 and Item 1A.
//!
//! Context patterns identify competitive, supply-chain, customer, and
//! partnership language; a cascade of capitalization patterns pulls
//! candidate company names out of the matched spans; the stop-word list
//! and the entity-resolution lookup then decide what survives. Each
//! resolved mention becomes one labeled edge carrying confidence, the raw
//! mention, and a bounded context window.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use company_graph_core::error::AppResult;
use company_graph_core::models::{RelationshipKind, RelationshipMention};

use super::{ExtractionInput, FieldExtractor, FieldValue};
use crate::lookup::{is_false_positive, is_stop_word, CompanyLookup};

/// Context window stored on each relationship edge.
const MAX_CONTEXT_CHARS: usize = 200;

const MIN_RESOLUTION_CONFIDENCE: f64 = 0.8;

struct ContextPattern {
    kind: RelationshipKind,
    regex: Lazy<Regex>,
}

macro_rules! pattern {
    ($kind:expr, $re:expr) => {
        ContextPattern {
            kind: $kind,
            regex: Lazy::new(|| Regex::new($re).unwrap()),
        }
    };
}

/// Competitive-context patterns, most precise first. Every pattern
/// requires explicit compete/competitor language to bound false positives.
static CONTEXT_PATTERNS: Lazy<Vec<ContextPattern>> = Lazy::new(|| vec![
    pattern!(
        RelationshipKind::Competitor,
        r"(?is)our\s+(?:current\s+|primary\s+|principal\s+)?competitors?\s+include:?\s*(.{10,2000}?)(?:\.\s|$)"
    ),
    pattern!(
        RelationshipKind::Competitor,
        r"(?i)competitors?\s+such\s+as\s+([A-Z][^.;]{5,200})"
    ),
    pattern!(
        RelationshipKind::Competitor,
        r"(?i)(?:principal\s+|primary\s+)?competitor\s+(?:in\s+[\w\s]+\s+)?(?:is|are)\s+([A-Z][^.]{5,150})"
    ),
    pattern!(
        RelationshipKind::Competitor,
        r"(?i)compete\s+(?:directly\s+)?(?:with|against)\s+(?:products?\s+from\s+)?([A-Z][^.]{5,200})"
    ),
    pattern!(
        RelationshipKind::Competitor,
        r"(?i)competition\s+from\s+(?:our\s+)?([A-Z][^.]{5,200})"
    ),
    pattern!(
        RelationshipKind::Supplier,
        r"(?i)([A-Z][\w\s&.,-]{2,60}?)\s+is\s+our\s+sole\s+(?:source|supplier)"
    ),
    pattern!(
        RelationshipKind::Supplier,
        r"(?i)depend\s+(?:up)?on\s+([A-Z][^.]{4,150})\s+(?:for|to\s+(?:supply|manufacture|produce))"
    ),
    pattern!(
        RelationshipKind::Supplier,
        r"(?i)suppliers?\s+(?:include|such\s+as)\s+([A-Z][^.;]{5,200})"
    ),
    pattern!(
        RelationshipKind::Customer,
        r"(?i)([A-Z][\w\s&.,-]{2,60}?)\s+account(?:s|ed)?\s+for\s+(?:approximately\s+)?\d{1,3}%\s+of\s+(?:our\s+)?(?:total\s+)?(?:net\s+)?revenue"
    ),
    pattern!(
        RelationshipKind::Customer,
        r"(?i)customers?\s+include\s+([A-Z][^.;]{5,200})"
    ),
    pattern!(
        RelationshipKind::Partner,
        r"(?i)(?:partnership|strategic\s+alliance|collaboration)\s+with\s+([A-Z][^.;]{4,150})"
    ),
    pattern!(
        RelationshipKind::Partner,
        r"(?i)(?:partner|collaborate)\s+with\s+(?:companies\s+such\s+as\s+)?([A-Z][^.;]{4,150})"
    ),
]);

/// "such as X, Y, Z" clauses inside large captured blocks.
static SUCH_AS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)such\s+as\s+([^;\n]+)").unwrap());

/// Candidate company-name patterns, most specific first.
static NAME_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // Explicit corporate suffix: "Intel Corporation", "Lattice Semiconductor Corp."
        Regex::new(
            r"\b([A-Z][a-zA-Z0-9&.\-]+(?:\s+[A-Z][a-zA-Z0-9&.\-]+)*)\s+(?:Corporation|Corp\.?|Inc\.?|Ltd\.?|LLC|Company|Co\.)\b",
        )
        .unwrap(),
        // Multi-word capitalized names: "Advanced Micro Devices"
        Regex::new(r"\b([A-Z][a-z]+(?:\s+[A-Z][a-z]+){1,4})\b").unwrap(),
        // Single capitalized proper name (validated against the lookup)
        Regex::new(r"\b([A-Z][a-z]{4,15})\b").unwrap(),
        // All-caps names and tickers: "NVIDIA", "AMD"
        Regex::new(r"\b([A-Z]{3,8})\b").unwrap(),
    ]
});

/// An unresolved candidate pulled out of a context span.
#[derive(Debug)]
struct Candidate {
    kind: RelationshipKind,
    raw_text: String,
    context: String,
}

fn truncate_context(context: &str) -> String {
    context.chars().take(MAX_CONTEXT_CHARS).collect()
}

fn collect_names(
    kind: RelationshipKind,
    captured: &str,
    context: &str,
    seen: &mut HashSet<String>,
    out: &mut Vec<Candidate>,
) {
    for pattern in NAME_PATTERNS.iter() {
        for captures in pattern.captures_iter(captured) {
            let raw = captures[1].trim().to_string();
            if raw.len() < 2 || raw.len() > 50 {
                continue;
            }
            if is_stop_word(&raw) {
                continue;
            }
            let dedupe_key = raw.to_lowercase();
            if !seen.insert(dedupe_key) {
                continue;
            }
            out.push(Candidate {
                kind,
                raw_text: raw,
                context: truncate_context(context),
            });
        }
    }
}

/// Extract unresolved candidate mentions from the filing sections.
fn extract_candidates(sections: &[&str]) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for text in sections {
        for pattern in CONTEXT_PATTERNS.iter() {
            for captures in pattern.regex.captures_iter(text) {
                let context = captures.get(0).map(|m| m.as_str()).unwrap_or_default();
                let captured = captures
                    .get(1)
                    .map(|m| m.as_str())
                    .unwrap_or(context);

                // Bullet-list blocks hide names behind "such as" clauses.
                if captured.len() > 200 {
                    for such_as in SUCH_AS_RE.captures_iter(captured) {
                        collect_names(
                            pattern.kind,
                            &such_as[1],
                            context,
                            &mut seen,
                            &mut candidates,
                        );
                    }
                }
                collect_names(pattern.kind, captured, context, &mut seen, &mut candidates);
            }
        }
    }
    candidates
}

/// Extract and resolve relationship mentions from filing text.
pub fn extract_relationships(
    business_description: Option<&str>,
    risk_factors: Option<&str>,
    lookup: &CompanyLookup,
    self_cik: Option<&str>,
) -> Vec<RelationshipMention> {
    let sections: Vec<&str> = [business_description, risk_factors]
        .into_iter()
        .flatten()
        .collect();
    if sections.is_empty() {
        return Vec::new();
    }

    let candidates = extract_candidates(&sections);

    let mut seen_ciks: HashSet<(String, RelationshipKind)> = HashSet::new();
    let mut mentions = Vec::new();

    for candidate in candidates {
        let Some((cik, ticker, name, confidence)) =
            lookup.resolve(&candidate.raw_text, self_cik, MIN_RESOLUTION_CONFIDENCE)
        else {
            continue;
        };
        if is_false_positive(&candidate.raw_text, ticker.as_deref(), &candidate.context) {
            continue;
        }
        if !seen_ciks.insert((cik.clone(), candidate.kind)) {
            continue;
        }
        mentions.push(RelationshipMention {
            kind: candidate.kind,
            cik,
            ticker,
            name,
            confidence,
            raw_mention: candidate.raw_text,
            context: candidate.context,
        });
    }
    mentions
}

/// The relationship field extractor. Runs the section extractors' outputs
/// through candidate extraction and entity resolution; without a company
/// lookup it produces nothing.
pub struct RelationshipExtractor;

impl FieldExtractor for RelationshipExtractor {
    fn field_name(&self) -> &'static str {
        "relationships"
    }

    fn extract(&self, input: &ExtractionInput<'_>) -> AppResult<Option<FieldValue>> {
        let Some(lookup) = input.lookup else {
            return Ok(None);
        };

        // Re-derive the sections from the shared tree; the orchestrator
        // runs extractors independently, so nothing is assumed about
        // ordering relative to the section extractors.
        let text = super::visible_text(input.tree, None);
        let business = super::sections::section_for_relationships(&text, true);
        let risks = super::sections::section_for_relationships(&text, false);

        let mentions = extract_relationships(
            business.as_deref(),
            risks.as_deref(),
            lookup,
            Some(input.self_cik),
        );
        if mentions.is_empty() {
            return Ok(None);
        }
        Ok(Some(FieldValue::Relationships(mentions)))
    }

    fn validate(&self, value: &FieldValue) -> bool {
        match value {
            FieldValue::Relationships(mentions) => mentions
                .iter()
                .all(|m| (0.0..=1.0).contains(&m.confidence) && m.context.chars().count() <= MAX_CONTEXT_CHARS),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::CompanyRef;

    fn lookup() -> CompanyLookup {
        CompanyLookup::build(&[
            CompanyRef {
                cik: "0000050863".into(),
                ticker: Some("INTC".into()),
                name: "INTEL CORP".into(),
            },
            CompanyRef {
                cik: "0001045810".into(),
                ticker: Some("NVDA".into()),
                name: "NVIDIA CORPORATION".into(),
            },
            CompanyRef {
                cik: "0000027419".into(),
                ticker: Some("TGT".into()),
                name: "TARGET CORP".into(),
            },
            CompanyRef {
                cik: "0001137789".into(),
                ticker: Some("TSM".into()),
                name: "TAIWAN SEMICONDUCTOR MANUFACTURING CO LTD".into(),
            },
        ])
    }

    #[test]
    fn resolves_competitors_from_compete_with() {
        let business = "We compete with Intel Corporation and NVIDIA Corporation in the \
                        data center market.";
        let mentions = extract_relationships(Some(business), None, &lookup(), None);
        let ciks: Vec<&str> = mentions.iter().map(|m| m.cik.as_str()).collect();
        assert!(ciks.contains(&"0000050863"));
        assert!(ciks.contains(&"0001045810"));
        assert!(mentions
            .iter()
            .all(|m| m.kind == RelationshipKind::Competitor));
        assert!(mentions.iter().all(|m| m.confidence >= 0.8));
    }

    #[test]
    fn supplier_patterns_map_to_supplier_kind() {
        let risks = "Taiwan Semiconductor Manufacturing Co. is our sole source for advanced \
                     process nodes.";
        let mentions = extract_relationships(None, Some(risks), &lookup(), None);
        assert!(mentions
            .iter()
            .any(|m| m.cik == "0001137789" && m.kind == RelationshipKind::Supplier));
    }

    #[test]
    fn self_references_are_dropped() {
        let business = "We compete with Intel Corporation on every axis.";
        let mentions =
            extract_relationships(Some(business), None, &lookup(), Some("0000050863"));
        assert!(mentions.is_empty());
    }

    #[test]
    fn false_positive_blacklist_applies_in_context() {
        let business = "Our competitors include Target, to the extent we pursue a target \
                        business combination in retail. ";
        let mentions = extract_relationships(Some(business), None, &lookup(), None);
        assert!(
            !mentions.iter().any(|m| m.ticker.as_deref() == Some("TGT")),
            "Target in merger context must be filtered: {mentions:?}"
        );
    }

    #[test]
    fn contexts_are_bounded() {
        let long_tail = "x".repeat(500);
        let business = format!("We compete with Intel Corporation {long_tail}.");
        let mentions = extract_relationships(Some(&business), None, &lookup(), None);
        assert!(!mentions.is_empty());
        assert!(mentions.iter().all(|m| m.context.chars().count() <= 200));
    }

    #[test]
    fn plain_prose_without_context_yields_nothing() {
        let business = "Intel and NVIDIA make semiconductors. We admire their work.";
        let mentions = extract_relationships(Some(business), None, &lookup(), None);
        assert!(mentions.is_empty());
    }
}
