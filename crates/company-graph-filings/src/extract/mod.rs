//! Pluggable field extractors for 10-K primary documents.
//!
//! Each extractor declares its field name, pulls one value out of the
//! document, and validates it. The orchestrator reads the file and parses
//! the HTML tree exactly once, shares both with every extractor, isolates
//! per-extractor failures, and drops values that fail validation.

pub mod metadata;
pub mod relationships;
pub mod sections;
pub mod website;

use std::path::Path;

use scraper::{Html, Node};
use tracing::{debug, warn};

use company_graph_core::error::AppResult;
use company_graph_core::models::{
    FilingExtraction, FilingMetadata, RelationshipMention,
};

use crate::lookup::CompanyLookup;

/// Everything an extractor may need, prepared once per document.
pub struct ExtractionInput<'a> {
    pub path: &'a Path,
    pub content: &'a str,
    pub tree: &'a Html,
    /// Company lookup for relationship resolution, when available
    pub lookup: Option<&'a CompanyLookup>,
    /// CIK of the filer, to drop self-references
    pub self_cik: &'a str,
}

/// Value produced by one extractor.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Text(String),
    Metadata(FilingMetadata),
    Relationships(Vec<RelationshipMention>),
}

/// One pluggable extractor. Implementations must not panic on malformed
/// input; they return `Ok(None)` when the field is absent.
pub trait FieldExtractor {
    fn field_name(&self) -> &'static str;

    fn extract(&self, input: &ExtractionInput<'_>) -> AppResult<Option<FieldValue>>;

    /// Reject values that should not be persisted. Defaults to accepting.
    fn validate(&self, _value: &FieldValue) -> bool {
        true
    }
}

/// The standard extractor registry, in priority order.
pub fn default_extractors() -> Vec<Box<dyn FieldExtractor>> {
    vec![
        Box::new(website::WebsiteExtractor),
        Box::new(sections::BusinessDescriptionExtractor),
        Box::new(sections::RiskFactorsExtractor),
        Box::new(metadata::FilingMetadataExtractor),
        Box::new(relationships::RelationshipExtractor),
    ]
}

/// Run a registry of extractors against one document.
///
/// The file is read once and the tree parsed once; a failing extractor is
/// logged with the entity identifier and skipped, never propagated.
pub fn run_extractors(
    path: &Path,
    cik: &str,
    lookup: Option<&CompanyLookup>,
    extractors: &[Box<dyn FieldExtractor>],
) -> AppResult<FilingExtraction> {
    let bytes = std::fs::read(path)?;
    let content = String::from_utf8_lossy(&bytes).into_owned();
    let tree = Html::parse_document(&content);

    let input = ExtractionInput {
        path,
        content: &content,
        tree: &tree,
        lookup,
        self_cik: cik,
    };

    let mut extraction = FilingExtraction {
        cik: cik.to_string(),
        ..Default::default()
    };

    for extractor in extractors {
        let field = extractor.field_name();
        let value = match extractor.extract(&input) {
            Ok(Some(value)) => value,
            Ok(None) => continue,
            Err(e) => {
                warn!(cik, field, error = %e, "extractor failed, continuing");
                continue;
            }
        };
        if !extractor.validate(&value) {
            debug!(cik, field, "extracted value failed validation, dropped");
            continue;
        }
        apply_field(&mut extraction, field, value);
    }

    extraction.filing_year = extraction
        .metadata
        .filing_date
        .map(|d| chrono::Datelike::year(&d))
        .or(extraction.filing_year);

    Ok(extraction)
}

fn apply_field(extraction: &mut FilingExtraction, field: &str, value: FieldValue) {
    match (field, value) {
        ("website", FieldValue::Text(text)) => extraction.website = Some(text),
        ("business_description", FieldValue::Text(text)) => {
            extraction.business_description = Some(text)
        }
        ("risk_factors", FieldValue::Text(text)) => extraction.risk_factors = Some(text),
        ("filing_metadata", FieldValue::Metadata(metadata)) => extraction.metadata = metadata,
        ("relationships", FieldValue::Relationships(mentions)) => {
            extraction.relationships = mentions
        }
        (field, value) => {
            warn!(field, ?value, "extractor returned a value of the wrong shape")
        }
    }
}

/// Visible text of the document: every text node whose ancestors include
/// no script/style/noscript element, joined with single spaces.
pub(crate) fn visible_text(tree: &Html, max_chars: Option<usize>) -> String {
    let mut out = String::new();
    let mut stack = vec![tree.tree.root()];
    while let Some(node) = stack.pop() {
        if let Some(limit) = max_chars {
            if out.len() >= limit {
                break;
            }
        }
        match node.value() {
            Node::Element(element) => {
                if matches!(element.name(), "script" | "style" | "noscript") {
                    continue;
                }
            }
            Node::Text(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    if !out.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(trimmed);
                }
                continue;
            }
            _ => {}
        }
        // Depth-first in document order: push children reversed.
        let children: Vec<_> = node.children().collect();
        for child in children.into_iter().rev() {
            stack.push(child);
        }
    }
    out
}
