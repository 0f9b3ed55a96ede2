use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// **Per-source domain lookup outcome**
///
/// Every domain source returns one of these, whether or not it found a
/// domain. A missing domain with confidence 0.0 is a non-response for
/// consensus purposes, never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainResult {
    /// Normalized root domain, if the source found one
    pub domain: Option<String>,

    /// Source name ("yfinance", "finviz", "sec_edgar", "finnhub")
    pub source: String,

    /// Source-local confidence in [0, 1]
    pub confidence: f64,

    /// Business description, when the source carries one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Source-specific details (raw URL, field used, ...)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl DomainResult {
    pub fn found(domain: String, source: &str, confidence: f64) -> Self {
        Self {
            domain: Some(domain),
            source: source.to_string(),
            confidence,
            description: None,
            metadata: HashMap::new(),
        }
    }

    pub fn empty(source: &str) -> Self {
        Self {
            domain: None,
            source: source.to_string(),
            confidence: 0.0,
            description: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

/// **Consensus outcome for one company**
///
/// Aggregated result of the weighted multi-source vote. `no_domain` marks
/// the negative outcome that gets a short-TTL cache entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyResult {
    pub cik: String,
    pub ticker: String,
    pub name: String,

    /// Winning domain, or None when no source responded
    pub domain: Option<String>,

    /// Sources that voted for the winner
    pub sources: Vec<String>,

    /// winner_score / sum(weights of responding sources), clamped to [0, 1]
    pub confidence: f64,

    /// Number of sources that voted for the winner
    pub votes: usize,

    /// Every candidate domain and the sources that proposed it
    pub all_candidates: HashMap<String, Vec<String>>,

    /// Winning description from the independent description vote
    pub description: Option<String>,
    pub description_source: Option<String>,

    /// True when no source returned a domain
    #[serde(default)]
    pub no_domain: bool,
}

impl CompanyResult {
    /// The negative outcome: nothing found, confidence zero.
    pub fn no_domain(cik: &str, ticker: &str, name: &str) -> Self {
        Self {
            cik: cik.to_string(),
            ticker: ticker.to_string(),
            name: name.to_string(),
            domain: None,
            sources: Vec::new(),
            confidence: 0.0,
            votes: 0,
            all_candidates: HashMap::new(),
            description: None,
            description_source: None,
            no_domain: true,
        }
    }
}

/// One row of SEC EDGAR `company_tickers.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyListing {
    /// CIK, zero-padded to 10 digits
    pub cik: String,
    pub ticker: String,
    pub title: String,
}

impl CompanyListing {
    pub fn new(cik_number: u64, ticker: &str, title: &str) -> Self {
        Self {
            cik: format!("{cik_number:010}"),
            ticker: ticker.to_string(),
            title: title.to_string(),
        }
    }
}

/// **Merged company properties**
///
/// Built by the enrichment stage from SEC EDGAR and Yahoo Finance, with
/// SEC taking priority for industry classifiers. Cached per CIK.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompanyProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sic_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub naics_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revenue: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employees: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headquarters_city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headquarters_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headquarters_country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Comma-separated list of contributing sources
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_updated_at: Option<String>,
}

/// Kinds of company-to-company business relationships extracted from
/// filings. Each maps to one labeled edge type in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    Competitor,
    Supplier,
    Customer,
    Partner,
}

impl RelationshipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipKind::Competitor => "competitor",
            RelationshipKind::Supplier => "supplier",
            RelationshipKind::Customer => "customer",
            RelationshipKind::Partner => "partner",
        }
    }
}

/// A resolved company mention extracted from a filing section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipMention {
    pub kind: RelationshipKind,
    pub cik: String,
    pub ticker: Option<String>,
    pub name: String,
    /// Resolution confidence in [0, 1]; 1.0 for exact ticker/name matches
    pub confidence: f64,
    /// The raw text that was matched (e.g. "Intel Corporation")
    pub raw_mention: String,
    /// Surrounding context, capped at 200 characters
    pub context: String,
}

/// Metadata scanned from the head of a filing document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilingMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accession_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filing_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fiscal_year_end: Option<String>,
}

/// Everything one extraction pass pulls out of a 10-K primary document.
/// Cached under `10k_extracted` with a one-year TTL.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilingExtraction {
    pub cik: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_factors: Option<String>,
    #[serde(default)]
    pub metadata: FilingMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filing_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<RelationshipMention>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn company_listing_pads_cik() {
        let listing = CompanyListing::new(320193, "AAPL", "Apple Inc.");
        assert_eq!(listing.cik, "0000320193");
    }

    #[test]
    fn no_domain_result_has_zero_confidence() {
        let result = CompanyResult::no_domain("0000320193", "AAPL", "Apple Inc.");
        assert!(result.no_domain);
        assert_eq!(result.confidence, 0.0);
        assert!(result.domain.is_none());
        assert!(result.sources.is_empty());
    }

    #[test]
    fn filing_extraction_round_trips_through_json() {
        let extraction = FilingExtraction {
            cik: "0000320193".to_string(),
            website: Some("apple.com".to_string()),
            business_description: Some("Designs smartphones.".to_string()),
            risk_factors: None,
            metadata: FilingMetadata {
                accession_number: Some("0000320193-23-000106".to_string()),
                filing_date: NaiveDate::from_ymd_opt(2023, 11, 3),
                fiscal_year_end: Some("September".to_string()),
            },
            filing_year: Some(2023),
            relationships: vec![],
        };
        let json = serde_json::to_string(&extraction).unwrap();
        let restored: FilingExtraction = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.website.as_deref(), Some("apple.com"));
        assert_eq!(restored.metadata, extraction.metadata);
    }
}
