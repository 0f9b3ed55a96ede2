//! Allow-listed labels and relationship types.
//!
//! Cypher has no parameter syntax for labels or relationship types, so
//! these identifiers are interpolated into query text. Everything that
//! crosses that boundary is either a member of a closed enum or has
//! passed the corresponding identifier gate.

use once_cell::sync::Lazy;
use regex::Regex;

use company_graph_core::error::{AppError, AppResult};
use company_graph_core::models::RelationshipKind;

/// Node labels the loader may interpolate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeLabel {
    Domain,
    Company,
    Chunk,
    Document,
    Technology,
}

impl NodeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeLabel::Domain => "Domain",
            NodeLabel::Company => "Company",
            NodeLabel::Chunk => "Chunk",
            NodeLabel::Document => "Document",
            NodeLabel::Technology => "Technology",
        }
    }

    /// The uniquely-constrained key property for this label.
    pub fn key_property(&self) -> &'static str {
        match self {
            NodeLabel::Domain => "final_domain",
            NodeLabel::Company => "cik",
            NodeLabel::Chunk => "chunk_id",
            NodeLabel::Document => "doc_id",
            NodeLabel::Technology => "name",
        }
    }
}

/// Closed set of relationship types written by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationshipType {
    HasDomain,
    Has,
    PartOfDocument,
    NextChunk,
    Uses,
    HasCompetitor,
    HasSupplier,
    HasCustomer,
    HasPartner,
    SimilarDescription,
    SimilarRisk,
    SimilarIndustry,
    SimilarTechnology,
    SimilarSize,
    SimilarKeyword,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::HasDomain => "HAS_DOMAIN",
            RelationshipType::Has => "HAS",
            RelationshipType::PartOfDocument => "PART_OF_DOCUMENT",
            RelationshipType::NextChunk => "NEXT_CHUNK",
            RelationshipType::Uses => "USES",
            RelationshipType::HasCompetitor => "HAS_COMPETITOR",
            RelationshipType::HasSupplier => "HAS_SUPPLIER",
            RelationshipType::HasCustomer => "HAS_CUSTOMER",
            RelationshipType::HasPartner => "HAS_PARTNER",
            RelationshipType::SimilarDescription => "SIMILAR_DESCRIPTION",
            RelationshipType::SimilarRisk => "SIMILAR_RISK",
            RelationshipType::SimilarIndustry => "SIMILAR_INDUSTRY",
            RelationshipType::SimilarTechnology => "SIMILAR_TECHNOLOGY",
            RelationshipType::SimilarSize => "SIMILAR_SIZE",
            RelationshipType::SimilarKeyword => "SIMILAR_KEYWORD",
        }
    }

    /// Edge type for an extracted business relationship.
    pub fn for_kind(kind: RelationshipKind) -> Self {
        match kind {
            RelationshipKind::Competitor => RelationshipType::HasCompetitor,
            RelationshipKind::Supplier => RelationshipType::HasSupplier,
            RelationshipKind::Customer => RelationshipType::HasCustomer,
            RelationshipKind::Partner => RelationshipType::HasPartner,
        }
    }
}

static RELATIONSHIP_TYPE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z][A-Z0-9_]*$").unwrap());
static PROPERTY_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").unwrap());

/// Gate for relationship-type identifiers that arrive as strings.
pub fn is_valid_relationship_type(name: &str) -> bool {
    RELATIONSHIP_TYPE_RE.is_match(name)
}

/// Gate for property names interpolated into node-key or embedding
/// positions.
pub fn is_valid_property_name(name: &str) -> bool {
    PROPERTY_NAME_RE.is_match(name)
}

/// Property-name gate as a hard error for loader call sites.
pub fn require_property_name(name: &str) -> AppResult<()> {
    if is_valid_property_name(name) {
        Ok(())
    } else {
        Err(AppError::SecurityError(format!(
            "disallowed property name: {name:?}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_enum_type_passes_the_gate() {
        for rel in [
            RelationshipType::HasDomain,
            RelationshipType::Has,
            RelationshipType::PartOfDocument,
            RelationshipType::NextChunk,
            RelationshipType::Uses,
            RelationshipType::HasCompetitor,
            RelationshipType::HasSupplier,
            RelationshipType::HasCustomer,
            RelationshipType::HasPartner,
            RelationshipType::SimilarDescription,
            RelationshipType::SimilarRisk,
            RelationshipType::SimilarIndustry,
            RelationshipType::SimilarTechnology,
            RelationshipType::SimilarSize,
            RelationshipType::SimilarKeyword,
        ] {
            assert!(is_valid_relationship_type(rel.as_str()), "{rel:?}");
        }
    }

    #[test]
    fn injection_shaped_strings_fail_the_gate() {
        for bad in [
            "HAS_COMPETITOR]->(x) DELETE x//",
            "has_competitor",
            "1HAS",
            "",
            "HAS COMPETITOR",
            "HAS-COMPETITOR",
        ] {
            assert!(!is_valid_relationship_type(bad), "{bad:?}");
        }
    }

    #[test]
    fn property_gate_rejects_punctuation() {
        assert!(is_valid_property_name("embedding"));
        assert!(is_valid_property_name("_loaded_at"));
        assert!(is_valid_property_name("sic_code"));
        assert!(!is_valid_property_name("emb edding"));
        assert!(!is_valid_property_name("x}) DELETE (n"));
        assert!(!is_valid_property_name("9lives"));
        assert!(require_property_name("x}) RETURN 1//").is_err());
    }

    #[test]
    fn labels_map_to_their_key_properties() {
        assert_eq!(NodeLabel::Domain.key_property(), "final_domain");
        assert_eq!(NodeLabel::Company.key_property(), "cik");
        assert_eq!(NodeLabel::Chunk.key_property(), "chunk_id");
        assert_eq!(NodeLabel::Document.key_property(), "doc_id");
        assert_eq!(NodeLabel::Technology.key_property(), "name");
    }

    #[test]
    fn relationship_kinds_map_to_edge_types() {
        assert_eq!(
            RelationshipType::for_kind(RelationshipKind::Supplier).as_str(),
            "HAS_SUPPLIER"
        );
        assert_eq!(
            RelationshipType::for_kind(RelationshipKind::Competitor).as_str(),
            "HAS_COMPETITOR"
        );
    }
}
