//! Character-based chunking for the GraphRAG document layer.
//!
//! Deterministic by construction: fixed character windows, no sentence
//! heuristics, so re-runs produce byte-identical chunks and stable chunk
//! ids.

use serde::{Deserialize, Serialize};

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
const MIN_CHUNK_SIZE: usize = 100;

/// One chunk of a filing section, pre-graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub text: String,
    pub chunk_index: usize,
    /// "business_description" or "risk_factors"
    pub section_type: String,
    pub company_cik: String,
    pub company_ticker: Option<String>,
    pub company_name: Option<String>,
    pub filing_year: Option<i32>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Split text into overlapping character windows.
///
/// Pure in (text, chunk_size, chunk_overlap). Chunks shorter than the
/// minimum are dropped, except when the whole text is one short chunk.
pub fn chunk_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let chars: Vec<char> = text.chars().collect();
    if chars.len() < MIN_CHUNK_SIZE {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        let chunk: String = chars[start..end].iter().collect::<String>().trim().to_string();
        if chunk.len() >= MIN_CHUNK_SIZE {
            chunks.push(chunk);
        }

        if end >= chars.len() {
            break;
        }
        let next = end.saturating_sub(chunk_overlap);
        // Always move forward, even with a degenerate overlap.
        start = if next > start {
            next
        } else {
            start + chunk_size.saturating_sub(chunk_overlap).max(1)
        };
    }
    chunks
}

/// Chunk the extracted filing sections of one company.
pub fn chunk_filing_sections(
    business_description: Option<&str>,
    risk_factors: Option<&str>,
    company_cik: &str,
    company_ticker: Option<&str>,
    company_name: Option<&str>,
    filing_year: Option<i32>,
) -> Vec<DocumentChunk> {
    let mut chunks = Vec::new();
    let sections = [
        ("business_description", "Item 1: Business", business_description),
        ("risk_factors", "Item 1A: Risk Factors", risk_factors),
    ];

    for (section_type, section_title, text) in sections {
        let Some(text) = text else { continue };
        for (index, chunk) in chunk_text(text, DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
            .into_iter()
            .enumerate()
        {
            let mut metadata = serde_json::Map::new();
            metadata.insert("section".into(), serde_json::json!(section_title));
            chunks.push(DocumentChunk {
                text: chunk,
                chunk_index: index,
                section_type: section_type.to_string(),
                company_cik: company_cik.to_string(),
                company_ticker: company_ticker.map(str::to_string),
                company_name: company_name.map(str::to_string),
                filing_year,
                metadata,
            });
        }
    }
    chunks
}

/// Deterministic document id: `{cik}_{section_type}_{year}`.
pub fn doc_id(company_cik: &str, section_type: &str, filing_year: Option<i32>) -> String {
    match filing_year {
        Some(year) => format!("{company_cik}_{section_type}_{year}"),
        None => format!("{company_cik}_{section_type}_unknown"),
    }
}

/// Deterministic chunk id: `{doc_id}_chunk_{index}`.
pub fn chunk_id(doc_id: &str, chunk_index: usize) -> String {
    format!("{doc_id}_chunk_{chunk_index}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_text("", 1000, 200).is_empty());
    }

    #[test]
    fn short_text_is_kept_whole() {
        let chunks = chunk_text("short", 1000, 200);
        assert_eq!(chunks, vec!["short".to_string()]);
    }

    #[test]
    fn chunking_is_pure_in_its_inputs() {
        let text = "deterministic chunk boundaries matter for cache stability ".repeat(100);
        assert_eq!(chunk_text(&text, 1000, 200), chunk_text(&text, 1000, 200));
        assert_ne!(chunk_text(&text, 1000, 200), chunk_text(&text, 900, 200));
    }

    #[test]
    fn chunk_indexes_are_dense_per_section() {
        let business = "b".repeat(2500);
        let risks = "r".repeat(1500);
        let chunks = chunk_filing_sections(
            Some(&business),
            Some(&risks),
            "0000320193",
            Some("AAPL"),
            Some("Apple Inc."),
            Some(2024),
        );
        for section in ["business_description", "risk_factors"] {
            let indexes: Vec<usize> = chunks
                .iter()
                .filter(|c| c.section_type == section)
                .map(|c| c.chunk_index)
                .collect();
            let expected: Vec<usize> = (0..indexes.len()).collect();
            assert_eq!(indexes, expected, "{section} indexes not dense");
        }
    }

    #[test]
    fn ids_are_deterministic_composites() {
        let doc = doc_id("0000320193", "risk_factors", Some(2024));
        assert_eq!(doc, "0000320193_risk_factors_2024");
        assert_eq!(chunk_id(&doc, 3), "0000320193_risk_factors_2024_chunk_3");
        assert_eq!(doc_id("1", "business_description", None), "1_business_description_unknown");
    }

    #[test]
    fn consecutive_chunks_overlap() {
        let text: String = ('a'..='z').cycle().take(2500).collect();
        let chunks = chunk_text(&text, 1000, 200);
        assert!(chunks.len() >= 2);
        let first_tail: String = chunks[0].chars().rev().take(50).collect();
        let reversed_tail: String = first_tail.chars().rev().collect();
        assert!(chunks[1].contains(&reversed_tail));
    }
}
