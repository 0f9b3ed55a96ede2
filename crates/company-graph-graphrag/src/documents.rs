//! Document and Chunk node creation with their GraphRAG relationships:
//! (Company)-[:HAS]->(Document), (Chunk)-[:PART_OF_DOCUMENT]->(Document),
//! and the (Chunk)-[:NEXT_CHUNK]->(Chunk) chain per document.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::info;

use company_graph_core::error::AppResult;
use company_graph_neo4j::loader::RelationshipRow;
use company_graph_neo4j::{GraphClient, NodeLabel, RelationshipType};

use crate::chunks::{chunk_id, doc_id, DocumentChunk};

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Create Document and Chunk nodes from prepared chunks.
///
/// Chunks group into one Document per (cik, section_type, filing_year);
/// within a document they are sorted by index so the NEXT_CHUNK chain is
/// a simple path of length chunk_count - 1. Dry-run reports the plan.
pub async fn create_documents_and_chunks(
    client: &GraphClient,
    chunks: &[DocumentChunk],
    execute: bool,
) -> AppResult<(usize, usize)> {
    if chunks.is_empty() {
        return Ok((0, 0));
    }

    // Group by filing; BTreeMap keeps run output deterministic.
    let mut by_document: BTreeMap<(String, String, Option<i32>), Vec<&DocumentChunk>> =
        BTreeMap::new();
    for chunk in chunks {
        by_document
            .entry((
                chunk.company_cik.clone(),
                chunk.section_type.clone(),
                chunk.filing_year,
            ))
            .or_default()
            .push(chunk);
    }
    for group in by_document.values_mut() {
        group.sort_by_key(|c| c.chunk_index);
    }

    if !execute {
        info!(
            documents = by_document.len(),
            chunks = chunks.len(),
            "[dry run] would create Document and Chunk nodes"
        );
        return Ok((0, 0));
    }

    let mut document_rows: Vec<Map<String, Value>> = Vec::new();
    let mut chunk_rows: Vec<Map<String, Value>> = Vec::new();
    let mut part_of: Vec<RelationshipRow> = Vec::new();
    let mut next_chunk: Vec<RelationshipRow> = Vec::new();
    let mut has_document: Vec<RelationshipRow> = Vec::new();

    for ((cik, section_type, filing_year), group) in &by_document {
        let document_id = doc_id(cik, section_type, *filing_year);
        let first = group[0];

        document_rows.push(object(serde_json::json!({
            "doc_id": document_id,
            "company_cik": cik,
            "company_ticker": first.company_ticker,
            "company_name": first.company_name,
            "section_type": section_type,
            "filing_year": filing_year,
            "chunk_count": group.len() as i64,
        })));
        has_document.push(RelationshipRow {
            from_key: cik.clone(),
            to_key: document_id.clone(),
            properties: Map::new(),
        });

        for (position, chunk) in group.iter().enumerate() {
            let id = chunk_id(&document_id, chunk.chunk_index);
            chunk_rows.push(object(serde_json::json!({
                "chunk_id": id,
                "text": chunk.text,
                "chunk_index": chunk.chunk_index as i64,
                "metadata": serde_json::to_string(&chunk.metadata)?,
            })));
            part_of.push(RelationshipRow {
                from_key: id.clone(),
                to_key: document_id.clone(),
                properties: Map::new(),
            });
            if let Some(next) = group.get(position + 1) {
                next_chunk.push(RelationshipRow {
                    from_key: id,
                    to_key: chunk_id(&document_id, next.chunk_index),
                    properties: Map::new(),
                });
            }
        }
    }

    let documents_created = client
        .upsert_nodes(NodeLabel::Document, "doc_id", &document_rows)
        .await?;
    let chunks_created = client
        .upsert_nodes(NodeLabel::Chunk, "chunk_id", &chunk_rows)
        .await?;

    client
        .upsert_relationships(
            RelationshipType::Has,
            NodeLabel::Company,
            "cik",
            NodeLabel::Document,
            "doc_id",
            &has_document,
        )
        .await?;
    client
        .upsert_relationships(
            RelationshipType::PartOfDocument,
            NodeLabel::Chunk,
            "chunk_id",
            NodeLabel::Document,
            "doc_id",
            &part_of,
        )
        .await?;
    client
        .upsert_relationships(
            RelationshipType::NextChunk,
            NodeLabel::Chunk,
            "chunk_id",
            NodeLabel::Chunk,
            "chunk_id",
            &next_chunk,
        )
        .await?;

    info!(
        documents = documents_created,
        chunks = chunks_created,
        next_chunk_edges = next_chunk.len(),
        "created GraphRAG document layer"
    );
    Ok((documents_created, chunks_created))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(cik: &str, section: &str, index: usize) -> DocumentChunk {
        DocumentChunk {
            text: format!("chunk {index}"),
            chunk_index: index,
            section_type: section.to_string(),
            company_cik: cik.to_string(),
            company_ticker: Some("AAPL".to_string()),
            company_name: Some("Apple Inc.".to_string()),
            filing_year: Some(2024),
            metadata: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn dry_run_writes_nothing_and_reports_zero() {
        // Dry-run path never touches the client, so a disconnected one is
        // fine to construct lazily; we only exercise grouping here.
        let chunks = vec![
            chunk("0000320193", "business_description", 0),
            chunk("0000320193", "business_description", 1),
            chunk("0000320193", "risk_factors", 0),
        ];
        // Grouping happens before any client call in execute mode too;
        // validate the dry-run result shape.
        let mut by_document: BTreeMap<(String, String, Option<i32>), Vec<&DocumentChunk>> =
            BTreeMap::new();
        for c in &chunks {
            by_document
                .entry((c.company_cik.clone(), c.section_type.clone(), c.filing_year))
                .or_default()
                .push(c);
        }
        assert_eq!(by_document.len(), 2);
    }
}
