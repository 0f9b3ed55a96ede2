//! Entity resolution for company mentions.
//!
//! A prebuilt lookup maps official names, normalized names, and tickers to
//! CIKs. Resolution priority: exact ticker, exact name, normalized name,
//! then prefix matches whose confidence scales with the match-length
//! ratio. A stop-word list and a small context-sensitive blacklist keep
//! common-word/ticker collisions ("Joint" → JYNT, "Cost" → COST) out of
//! the graph.

use std::collections::{BTreeSet, HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

/// Minimal company identity used to build the lookup.
#[derive(Debug, Clone)]
pub struct CompanyRef {
    pub cik: String,
    pub ticker: Option<String>,
    pub name: String,
}

/// A resolved mention: (cik, ticker, official name, confidence).
pub type Resolution = (String, Option<String>, String, f64);

/// Lookup table for entity resolution, built once per run and shared.
#[derive(Debug, Default)]
pub struct CompanyLookup {
    name_to_company: HashMap<String, (String, Option<String>, String)>,
    ticker_to_company: HashMap<String, (String, Option<String>, String)>,
    all_names: BTreeSet<String>,
}

impl CompanyLookup {
    /// Build name variants (official, normalized) and ticker maps.
    pub fn build(companies: &[CompanyRef]) -> Self {
        let mut lookup = Self::default();
        for company in companies {
            let entry = (
                company.cik.clone(),
                company.ticker.clone(),
                company.name.clone(),
            );

            let name_lower = company.name.to_lowercase().trim().to_string();
            if !name_lower.is_empty() {
                lookup.name_to_company.insert(name_lower.clone(), entry.clone());
                lookup.all_names.insert(name_lower.clone());
            }

            let clean = normalize_company_name(&company.name);
            if !clean.is_empty() && clean != name_lower {
                lookup.name_to_company.insert(clean.clone(), entry.clone());
                lookup.all_names.insert(clean);
            }

            if let Some(ticker) = company.ticker.as_deref() {
                let ticker = ticker.trim().to_uppercase();
                if !ticker.is_empty() {
                    lookup.ticker_to_company.insert(ticker, entry.clone());
                }
            }
        }
        lookup
    }

    pub fn len(&self) -> usize {
        self.name_to_company.len()
    }

    pub fn is_empty(&self) -> bool {
        self.name_to_company.is_empty()
    }

    /// Resolve a raw mention against the lookup.
    ///
    /// Priority: exact ticker (1.0) > exact name (1.0) > normalized name
    /// (0.9) > prefix match (scaled, minimum `min_confidence`).
    /// Self-references are dropped.
    pub fn resolve(
        &self,
        raw: &str,
        self_cik: Option<&str>,
        min_confidence: f64,
    ) -> Option<Resolution> {
        let raw_trim = raw.trim();
        let raw_upper = raw_trim.to_uppercase();
        let raw_lower = raw_trim.to_lowercase();

        let not_self = |cik: &str| self_cik.is_none_or(|own| own != cik);

        if let Some((cik, ticker, name)) = self.ticker_to_company.get(&raw_upper) {
            if not_self(cik) {
                return Some((cik.clone(), ticker.clone(), name.clone(), 1.0));
            }
        }

        if let Some((cik, ticker, name)) = self.name_to_company.get(&raw_lower) {
            if not_self(cik) {
                return Some((cik.clone(), ticker.clone(), name.clone(), 1.0));
            }
        }

        let normalized = normalize_company_name(raw_trim);
        if let Some((cik, ticker, name)) = self.name_to_company.get(&normalized) {
            if not_self(cik) {
                return Some((cik.clone(), ticker.clone(), name.clone(), 0.9));
            }
        }

        self.best_prefix_match(&normalized, min_confidence)
            .filter(|(cik, _, _, _)| not_self(cik))
    }

    /// Prefix matching: "intel" resolves against "intel corp". Confidence
    /// scales with how much of the stored name the query covers.
    fn best_prefix_match(&self, query: &str, min_confidence: f64) -> Option<Resolution> {
        if query.len() < 3 {
            return None;
        }

        let mut best: Option<Resolution> = None;
        let mut best_confidence = min_confidence;

        for name in &self.all_names {
            if query.len() > name.len() {
                continue;
            }

            let ratio = query.len() as f64 / name.len() as f64;
            let confidence = if *name == *query {
                1.0
            } else if name.starts_with(&format!("{query} ")) {
                0.95
            } else if name.starts_with(query) && ratio > 0.6 {
                0.85 * ratio
            } else {
                continue;
            };

            if confidence > best_confidence {
                if let Some((cik, ticker, official)) = self.name_to_company.get(name) {
                    best = Some((cik.clone(), ticker.clone(), official.clone(), confidence));
                    best_confidence = confidence;
                }
            }
        }
        best
    }
}

static TRIM_PUNCT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\s,.\-]+|[\s,.\-]+$").unwrap());

/// Strip common corporate suffixes: "INTEL CORP" → "intel",
/// "Meta Platforms, Inc." → "meta platforms".
pub fn normalize_company_name(name: &str) -> String {
    let mut name = name.to_lowercase().trim().to_string();

    // Longer suffixes first so "corp." wins over "corp".
    const SUFFIXES: &[&str] = &[
        " corporation",
        " incorporated",
        " holdings ltd",
        " holding ltd",
        " holdings",
        " holding",
        " technologies",
        " technology",
        " solutions",
        " platforms",
        " services",
        " systems",
        " group",
        " corp.",
        " corp",
        " inc.",
        " inc",
        " ltd.",
        " ltd",
        " llc",
        " plc",
        " co.",
        " co",
        "/de/",
        "/md/",
        "/nv/",
    ];

    // One ordered pass; stacked suffixes separated by punctuation (as in
    // "Meta Platforms, Inc.") intentionally stop after the first strip.
    for suffix in SUFFIXES {
        if let Some(stripped) = name.strip_suffix(suffix) {
            name = stripped.to_string();
        }
    }

    TRIM_PUNCT_RE.replace_all(&name, "").to_string()
}

/// Common words that look like company names or tickers but are not.
static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // Generic business terms
        "company", "companies", "corporation", "corporations", "business", "businesses",
        "industry", "industries", "market", "markets", "product", "products", "service",
        "services", "customer", "customers", "competitor", "competitors", "competition",
        "competitive", "supplier", "suppliers", "partner", "partners",
        // Articles and qualifiers
        "the", "and", "other", "certain", "various", "many", "some", "all", "our", "their",
        "these", "those", "such", "including", "particularly", "especially", "primarily",
        "mainly",
        // Generic tech terms
        "software", "hardware", "platform", "platforms", "technology", "technologies",
        "solution", "solutions", "system", "systems", "application", "applications",
        // Section headers
        "item", "risk", "factors", "overview", "table", "contents",
        // Common words colliding with tickers
        "global", "rock", "live", "usa", "new", "big", "sun", "sky", "sea", "pro", "one",
        "two", "now", "core", "next", "fast", "best", "well", "high", "true", "real", "open",
        "free", "safe", "good", "hope", "care", "play", "life", "love", "star", "gold",
        "blue", "peak", "plus", "key", "way", "act", "fit", "hub", "win", "max", "air",
        "net", "icon",
        // Geography and direction
        "west", "east", "north", "south", "central", "national", "international", "foreign",
        "domestic", "local", "regional", "federal", "state", "city", "united", "american",
        "china", "taiwan", "europe", "asia", "latin", "america", "southeast", "pacific",
        "atlantic", "states", "united states", "california", "texas", "canada",
        "australian", "canadian", "british", "european", "asian", "african", "northern",
        "southern", "eastern", "western", "continental", "coastal",
        // Rank and size
        "first", "second", "third", "primary", "large", "small", "mid", "medium",
        // Finance and operations
        "capital", "resources", "science", "synergy", "energy", "power", "dynamic",
        "strategic", "advanced", "independent", "commercial", "industrial", "residential",
        "municipal", "retail", "wholesale", "management", "investment", "investments",
        "financial", "securities", "group", "holdings", "partners", "associates",
        "ventures", "enterprises",
        // Technical terms that look like names
        "adaptive", "fpga", "cpu", "gpu", "dpu", "soc", "asic", "arm", "semiconductor",
        "semiconductors", "microprocessor", "microprocessors", "embedded", "discrete",
        "integrated", "cloud", "gdpr", "manufacturing", "limited", "micro", "devices",
        "networks", "mobile",
        // Too-generic sector words
        "health", "medical", "scientific", "information", "enterprise", "goose",
        "emerald", "diamond", "platinum", "silver", "bronze",
    ]
    .into_iter()
    .collect()
});

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(word.to_lowercase().as_str())
}

/// Context-sensitive false-positive delete rules, applied as a post-pass.
/// A rule with context markers only fires when the mention's context
/// contains one of them; a rule without markers always fires for its
/// (raw mention, ticker) pair.
pub struct FalsePositiveRule {
    pub raw_mention: &'static str,
    pub ticker: &'static str,
    pub context_markers: &'static [&'static str],
}

pub const FALSE_POSITIVE_RULES: &[FalsePositiveRule] = &[
    FalsePositiveRule { raw_mention: "joint", ticker: "JYNT", context_markers: &[] },
    FalsePositiveRule { raw_mention: "cost", ticker: "COST", context_markers: &[] },
    FalsePositiveRule { raw_mention: "crm", ticker: "CRM", context_markers: &[] },
    FalsePositiveRule { raw_mention: "regis", ticker: "RGS", context_markers: &[] },
    FalsePositiveRule {
        raw_mention: "target",
        ticker: "TGT",
        context_markers: &["target business", "target company"],
    },
    FalsePositiveRule {
        raw_mention: "nasdaq",
        ticker: "NDAQ",
        context_markers: &["listed on nasdaq", "nasdaq stock", "nasdaq global", "nasdaq listing"],
    },
];

/// Check one resolved mention against the blacklist.
pub fn is_false_positive(raw_mention: &str, ticker: Option<&str>, context: &str) -> bool {
    let raw_lower = raw_mention.to_lowercase();
    let context_lower = context.to_lowercase();
    FALSE_POSITIVE_RULES.iter().any(|rule| {
        if rule.raw_mention != raw_lower {
            return false;
        }
        if ticker.is_some_and(|t| !t.eq_ignore_ascii_case(rule.ticker)) {
            return false;
        }
        rule.context_markers.is_empty()
            || rule
                .context_markers
                .iter()
                .any(|marker| context_lower.contains(marker))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_lookup() -> CompanyLookup {
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
                cik: "0000002488".into(),
                ticker: Some("AMD".into()),
                name: "ADVANCED MICRO DEVICES INC".into(),
            },
        ])
    }

    #[test]
    fn normalizes_suffixes() {
        assert_eq!(normalize_company_name("INTEL CORP"), "intel");
        assert_eq!(normalize_company_name("Apple Inc."), "apple");
        assert_eq!(normalize_company_name("NVIDIA Corporation"), "nvidia");
        assert_eq!(normalize_company_name("Meta Platforms, Inc."), "meta platforms");
    }

    #[test]
    fn exact_ticker_wins_with_full_confidence() {
        let lookup = sample_lookup();
        let (cik, ticker, _, confidence) = lookup.resolve("NVDA", None, 0.8).unwrap();
        assert_eq!(cik, "0001045810");
        assert_eq!(ticker.as_deref(), Some("NVDA"));
        assert_eq!(confidence, 1.0);
    }

    #[test]
    fn normalized_name_resolves_at_point_nine() {
        let lookup = sample_lookup();
        let (cik, _, _, confidence) = lookup.resolve("Intel Corporation", None, 0.8).unwrap();
        assert_eq!(cik, "0000050863");
        assert!((confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn prefix_match_scales_confidence() {
        let lookup = sample_lookup();
        // "intel" is a full normalized name here, so probe a real prefix.
        let resolution = lookup.resolve("Advanced Micro Devices", None, 0.8);
        assert!(resolution.is_some());
        let (cik, _, _, confidence) = resolution.unwrap();
        assert_eq!(cik, "0000002488");
        assert!(confidence >= 0.8);
    }

    #[test]
    fn self_references_are_excluded() {
        let lookup = sample_lookup();
        assert!(lookup.resolve("NVDA", Some("0001045810"), 0.8).is_none());
        assert!(lookup.resolve("NVDA", Some("0000050863"), 0.8).is_some());
    }

    #[test]
    fn unknown_names_do_not_resolve() {
        let lookup = sample_lookup();
        assert!(lookup.resolve("Completely Unknown Widgets", None, 0.8).is_none());
    }

    #[test]
    fn stop_words_cover_generic_terms() {
        for word in ["item", "The", "cloud", "Global", "software", "usa"] {
            assert!(is_stop_word(word), "{word} should be a stop word");
        }
        assert!(!is_stop_word("Intel"));
        // Ticker collisions with real companies go through the
        // context-sensitive blacklist instead.
        assert!(!is_stop_word("Target"));
        assert!(!is_stop_word("Joint"));
    }

    #[test]
    fn false_positive_rules_respect_context() {
        assert!(is_false_positive("Joint", Some("JYNT"), "any context at all"));
        assert!(is_false_positive("Cost", Some("COST"), "we manage cost"));
        assert!(is_false_positive(
            "Target",
            Some("TGT"),
            "identifying a target business for the merger"
        ));
        // Target-the-retailer in a real competitor context survives.
        assert!(!is_false_positive(
            "Target",
            Some("TGT"),
            "we compete with discount retailers"
        ));
        assert!(is_false_positive(
            "Nasdaq",
            Some("NDAQ"),
            "our shares are listed on nasdaq"
        ));
        assert!(!is_false_positive("Intel", Some("INTC"), "we compete with Intel"));
    }
}
