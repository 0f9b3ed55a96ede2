//! GraphRAG retrieval: vector-search seeds, multi-hop graph expansion,
//! related-company chunk scoring, and context assembly.
//!
//! Answer synthesis is out of scope; callers hand the composed context to
//! whatever language model they use.

use std::collections::{HashMap, HashSet};

use neo4rs::query;
use tracing::{debug, info, warn};

use company_graph_core::error::AppResult;
use company_graph_neo4j::types::is_valid_relationship_type;
use company_graph_neo4j::GraphClient;

/// Seed-search similarity floor.
const MIN_SEED_SIMILARITY: f32 = 0.5;
/// Related-company chunks clear a lower bar than seeds.
const MIN_RELATED_SIMILARITY: f32 = 0.35;
/// Brute-force fallback scans at most this many chunks.
const FALLBACK_CHUNK_CAP: i64 = 10_000;
/// Name of the vector index provisioned over Chunk.embedding.
const CHUNK_VECTOR_INDEX: &str = "chunk_embedding_vector";

/// Edge types the expansion walks, in priority order (supply-chain edges
/// outrank semantic similarity).
const TRAVERSAL_RELATIONSHIPS: &[&str] = &[
    "HAS_SUPPLIER",
    "HAS_CUSTOMER",
    "HAS_PARTNER",
    "HAS_COMPETITOR",
    "SIMILAR_DESCRIPTION",
    "SIMILAR_RISK",
    "SIMILAR_INDUSTRY",
];

/// One retrieved chunk with its provenance.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub text: String,
    pub chunk_index: i64,
    pub similarity: f32,
    pub section_type: Option<String>,
    pub company_cik: Option<String>,
    pub company_ticker: Option<String>,
    pub company_name: Option<String>,
    pub filing_year: Option<i64>,
    /// "vector_search" or "graph_traversal"
    pub source: &'static str,
    /// Human-readable relationship description for traversal hits
    pub graph_relationship: Option<String>,
}

/// One relationship path discovered during expansion.
#[derive(Debug, Clone)]
pub struct TraversalPath {
    pub ticker: String,
    pub name: Option<String>,
    pub relationship: String,
    pub hops: i64,
    pub source_ticker: String,
    pub source_name: Option<String>,
    pub description: String,
}

/// Everything the retrieval surface returns.
#[derive(Debug, Clone)]
pub struct RetrievalAnswer {
    pub question: String,
    pub chunks: Vec<RetrievedChunk>,
    pub context: String,
    pub companies: Vec<(String, String)>,
    pub related_companies: Vec<String>,
    pub paths: Vec<TraversalPath>,
}

fn cosine(a: &[f32], b: &[f64]) -> f32 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        dot += f64::from(*x) * y;
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32
}

fn embedding_param(embedding: &[f32]) -> Vec<f64> {
    embedding.iter().map(|v| f64::from(*v)).collect()
}

const CHUNK_RETURN_COLUMNS: &str = "chunk.chunk_id AS chunk_id, \
     chunk.text AS text, \
     chunk.chunk_index AS chunk_index, \
     doc.section_type AS section_type, \
     doc.company_cik AS company_cik, \
     doc.company_ticker AS company_ticker, \
     doc.company_name AS company_name, \
     doc.filing_year AS filing_year";

fn chunk_from_row(row: &neo4rs::Row, similarity: f32, source: &'static str) -> Option<RetrievedChunk> {
    Some(RetrievedChunk {
        chunk_id: row.get::<String>("chunk_id").ok()?,
        text: row.get::<String>("text").unwrap_or_default(),
        chunk_index: row.get::<i64>("chunk_index").unwrap_or(0),
        similarity,
        section_type: row.get::<Option<String>>("section_type").ok().flatten(),
        company_cik: row.get::<Option<String>>("company_cik").ok().flatten(),
        company_ticker: row.get::<Option<String>>("company_ticker").ok().flatten(),
        company_name: row.get::<Option<String>>("company_name").ok().flatten(),
        filing_year: row.get::<Option<i64>>("filing_year").ok().flatten(),
        source,
        graph_relationship: None,
    })
}

/// Semantic seed search over Chunk embeddings.
///
/// Prefers the vector index; when the index is missing or offline the
/// search falls back to brute-force cosine over a capped population.
pub async fn search_chunks(
    client: &GraphClient,
    question_embedding: &[f32],
    limit: usize,
    min_similarity: f32,
) -> AppResult<Vec<RetrievedChunk>> {
    let indexed = format!(
        "CALL db.index.vector.queryNodes($index_name, $query_limit, $query_embedding) \
         YIELD node AS chunk, score \
         WHERE score >= $min_similarity \
         OPTIONAL MATCH (chunk)-[:PART_OF_DOCUMENT]->(doc:Document) \
         RETURN {CHUNK_RETURN_COLUMNS}, score AS similarity \
         ORDER BY score DESC LIMIT $final_limit"
    );

    let attempt = client
        .execute(
            query(&indexed)
                .param("index_name", CHUNK_VECTOR_INDEX)
                .param("query_limit", (limit * 3) as i64)
                .param("query_embedding", embedding_param(question_embedding))
                .param("min_similarity", f64::from(min_similarity))
                .param("final_limit", limit as i64),
        )
        .await;

    match attempt {
        Ok(mut stream) => {
            let mut results = Vec::new();
            while let Some(row) = stream.next().await? {
                let similarity = row.get::<f64>("similarity").unwrap_or(0.0) as f32;
                if let Some(chunk) = chunk_from_row(&row, similarity, "vector_search") {
                    results.push(chunk);
                }
            }
            Ok(results)
        }
        Err(e) => {
            warn!(error = %e, "vector index query failed, falling back to brute-force cosine");
            search_chunks_brute_force(client, question_embedding, limit, min_similarity).await
        }
    }
}

async fn search_chunks_brute_force(
    client: &GraphClient,
    question_embedding: &[f32],
    limit: usize,
    min_similarity: f32,
) -> AppResult<Vec<RetrievedChunk>> {
    let statement = format!(
        "MATCH (chunk:Chunk) WHERE chunk.embedding IS NOT NULL \
         OPTIONAL MATCH (chunk)-[:PART_OF_DOCUMENT]->(doc:Document) \
         RETURN {CHUNK_RETURN_COLUMNS}, chunk.embedding AS embedding \
         LIMIT $cap"
    );

    let mut stream = client
        .execute(query(&statement).param("cap", FALLBACK_CHUNK_CAP))
        .await?;

    let mut results = Vec::new();
    while let Some(row) = stream.next().await? {
        let Ok(embedding) = row.get::<Vec<f64>>("embedding") else {
            continue;
        };
        let similarity = cosine(question_embedding, &embedding);
        if similarity < min_similarity {
            continue;
        }
        if let Some(chunk) = chunk_from_row(&row, similarity, "vector_search") {
            results.push(chunk);
        }
    }
    results.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(limit);
    Ok(results)
}

/// The multi-hop expansion statement. Relationship types are compile-time
/// constants, re-checked against the identifier gate before interpolation.
fn traversal_statement(max_hops: usize) -> String {
    for rel in TRAVERSAL_RELATIONSHIPS {
        debug_assert!(is_valid_relationship_type(rel));
    }
    let rel_list = TRAVERSAL_RELATIONSHIPS
        .iter()
        .map(|rel| format!("'{rel}'"))
        .collect::<Vec<_>>()
        .join(", ");
    let max_hops = max_hops.clamp(1, 3);
    format!(
        "MATCH path = (start:Company)-[rels*1..{max_hops}]-(related:Company) \
         WHERE start.ticker IN $tickers AND related.ticker <> start.ticker \
         WITH start, related, path, \
              [r IN rels WHERE type(r) IN [{rel_list}] | type(r)] AS rel_types \
         WHERE size(rel_types) > 0 \
         WITH start, related, path, rel_types[0] AS primary_rel, \
              CASE WHEN length(path) > 1 \
                   THEN [n IN nodes(path)[1..-1] | n.ticker][0] \
                   ELSE null END AS via_ticker \
         RETURN DISTINCT start.ticker AS source_ticker, start.name AS source_name, \
                related.ticker AS ticker, related.name AS name, \
                primary_rel AS relationship, length(path) AS hops, via_ticker \
         ORDER BY hops, \
                  CASE primary_rel \
                    WHEN 'HAS_SUPPLIER' THEN 1 \
                    WHEN 'HAS_CUSTOMER' THEN 2 \
                    WHEN 'HAS_PARTNER' THEN 3 \
                    WHEN 'HAS_COMPETITOR' THEN 4 \
                    WHEN 'SIMILAR_DESCRIPTION' THEN 5 \
                    WHEN 'SIMILAR_RISK' THEN 6 \
                    ELSE 7 END \
         LIMIT 100"
    )
}

fn describe_path(
    relationship: &str,
    hops: i64,
    source_name: &str,
    source_ticker: &str,
    name: &str,
    ticker: &str,
    via: Option<&str>,
) -> String {
    let rel_title = relationship
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    if hops == 1 {
        match relationship {
            "HAS_SUPPLIER" => {
                format!("{source_name} ({source_ticker}) <- Supplier: {name} ({ticker})")
            }
            "HAS_CUSTOMER" => {
                format!("{source_name} ({source_ticker}) -> Customer: {name} ({ticker})")
            }
            _ => format!("{source_name} ({source_ticker}) - {rel_title} - {name} ({ticker})"),
        }
    } else {
        format!(
            "{source_name} ({source_ticker}) - {rel_title} - {name} ({ticker}) via {}",
            via.unwrap_or("intermediate")
        )
    }
}

async fn expand_companies(
    client: &GraphClient,
    seed_tickers: &[String],
    max_hops: usize,
) -> AppResult<Vec<TraversalPath>> {
    if seed_tickers.is_empty() {
        return Ok(Vec::new());
    }

    let statement = traversal_statement(max_hops);
    let mut stream = client
        .execute(query(&statement).param("tickers", seed_tickers.to_vec()))
        .await?;

    let mut paths = Vec::new();
    while let Some(row) = stream.next().await? {
        let Ok(ticker) = row.get::<String>("ticker") else {
            continue;
        };
        let source_ticker = row.get::<String>("source_ticker").unwrap_or_default();
        let name = row.get::<Option<String>>("name").ok().flatten();
        let source_name = row.get::<Option<String>>("source_name").ok().flatten();
        let relationship = row.get::<String>("relationship").unwrap_or_default();
        let hops = row.get::<i64>("hops").unwrap_or(1);
        let via = row.get::<Option<String>>("via_ticker").ok().flatten();

        let description = describe_path(
            &relationship,
            hops,
            source_name.as_deref().unwrap_or(&source_ticker),
            &source_ticker,
            name.as_deref().unwrap_or(&ticker),
            &ticker,
            via.as_deref(),
        );
        paths.push(TraversalPath {
            ticker,
            name,
            relationship,
            hops,
            source_ticker,
            source_name,
            description,
        });
    }
    Ok(paths)
}

/// Score the related companies' chunks against the question vector.
async fn related_company_chunks(
    client: &GraphClient,
    question_embedding: &[f32],
    related_tickers: &[String],
    relationship_by_ticker: &HashMap<String, String>,
    limit: usize,
) -> AppResult<Vec<RetrievedChunk>> {
    if related_tickers.is_empty() {
        return Ok(Vec::new());
    }

    let statement = format!(
        "MATCH (c:Company) WHERE c.ticker IN $tickers \
         MATCH (c)-[:HAS]->(doc:Document)<-[:PART_OF_DOCUMENT]-(chunk:Chunk) \
         WHERE chunk.embedding IS NOT NULL \
         RETURN {CHUNK_RETURN_COLUMNS}, chunk.embedding AS embedding \
         LIMIT $cap"
    );

    let mut stream = client
        .execute(
            query(&statement)
                .param("tickers", related_tickers.to_vec())
                .param("cap", FALLBACK_CHUNK_CAP),
        )
        .await?;

    let mut results = Vec::new();
    while let Some(row) = stream.next().await? {
        let Ok(embedding) = row.get::<Vec<f64>>("embedding") else {
            continue;
        };
        let similarity = cosine(question_embedding, &embedding);
        if similarity < MIN_RELATED_SIMILARITY {
            continue;
        }
        if let Some(mut chunk) = chunk_from_row(&row, similarity, "graph_traversal") {
            chunk.graph_relationship = chunk
                .company_ticker
                .as_ref()
                .and_then(|t| relationship_by_ticker.get(t))
                .cloned();
            results.push(chunk);
        }
    }
    results.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(limit * 2);
    Ok(results)
}

/// Compose the context block handed to the external language model.
pub fn compose_context(chunks: &[RetrievedChunk]) -> String {
    let mut parts = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let company = chunk.company_name.as_deref().unwrap_or("Unknown");
        let section = chunk.section_type.as_deref().unwrap_or("unknown");
        let relationship = match (chunk.source, chunk.graph_relationship.as_deref()) {
            ("graph_traversal", Some(description)) => format!(" (Related: {description})"),
            _ => String::new(),
        };
        parts.push(format!(
            "[{company} - {section} - Chunk {index} - Source: {source}{relationship}]:\n{text}",
            index = chunk.chunk_index,
            source = chunk.source,
            text = chunk.text,
        ));
    }
    parts.join("\n\n")
}

/// Answer a question with vector search plus multi-hop graph traversal.
pub async fn answer_question(
    client: &GraphClient,
    question: &str,
    question_embedding: &[f32],
    focus_ticker: Option<&str>,
    max_chunks: usize,
    max_hops: usize,
    use_graph: bool,
) -> AppResult<RetrievalAnswer> {
    // Seed with extra headroom; expansion and dedupe shrink it back.
    let mut seeds = search_chunks(
        client,
        question_embedding,
        max_chunks * 2,
        MIN_SEED_SIMILARITY,
    )
    .await?;
    if let Some(focus) = focus_ticker {
        seeds.retain(|chunk| chunk.company_ticker.as_deref() == Some(focus));
    }

    if seeds.is_empty() {
        return Ok(RetrievalAnswer {
            question: question.to_string(),
            chunks: Vec::new(),
            context: String::new(),
            companies: Vec::new(),
            related_companies: Vec::new(),
            paths: Vec::new(),
        });
    }

    let seed_tickers: Vec<String> = seeds
        .iter()
        .filter_map(|chunk| chunk.company_ticker.clone())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    info!(seeds = seeds.len(), companies = seed_tickers.len(), "vector search seeded retrieval");

    let mut all_chunks = seeds;
    let mut related_companies: Vec<String> = Vec::new();
    let mut paths: Vec<TraversalPath> = Vec::new();

    if use_graph && !seed_tickers.is_empty() {
        paths = expand_companies(client, &seed_tickers, max_hops).await?;

        // Shortest path wins when a company is reachable multiple ways;
        // the traversal is ordered by hops, so first wins.
        let mut relationship_by_ticker: HashMap<String, String> = HashMap::new();
        for path in &paths {
            related_companies.push(path.ticker.clone());
            relationship_by_ticker
                .entry(path.ticker.clone())
                .or_insert_with(|| path.description.clone());
        }
        related_companies.sort();
        related_companies.dedup();
        debug!(related = related_companies.len(), "graph expansion found related companies");

        let related = related_company_chunks(
            client,
            question_embedding,
            &related_companies,
            &relationship_by_ticker,
            max_chunks,
        )
        .await?;
        all_chunks.extend(related);
    }

    // Merge: dedupe by chunk id keeping the best similarity, sort, cut.
    let mut seen: HashMap<String, RetrievedChunk> = HashMap::new();
    for chunk in all_chunks {
        match seen.get(&chunk.chunk_id) {
            Some(existing) if existing.similarity >= chunk.similarity => {}
            _ => {
                seen.insert(chunk.chunk_id.clone(), chunk);
            }
        }
    }
    let mut merged: Vec<RetrievedChunk> = seen.into_values().collect();
    merged.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    merged.truncate(max_chunks);

    let mut companies: Vec<(String, String)> = merged
        .iter()
        .filter_map(|chunk| {
            Some((
                chunk.company_ticker.clone()?,
                chunk.company_name.clone().unwrap_or_default(),
            ))
        })
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    companies.sort();

    let context = compose_context(&merged);
    paths.truncate(20);
    related_companies.truncate(20);

    Ok(RetrievalAnswer {
        question: question.to_string(),
        chunks: merged,
        context,
        companies,
        related_companies,
        paths,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, similarity: f32, source: &'static str) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: id.to_string(),
            text: format!("text of {id}"),
            chunk_index: 0,
            similarity,
            section_type: Some("risk_factors".to_string()),
            company_cik: Some("0000320193".to_string()),
            company_ticker: Some("AAPL".to_string()),
            company_name: Some("Apple Inc.".to_string()),
            filing_year: Some(2024),
            source,
            graph_relationship: None,
        }
    }

    #[test]
    fn cosine_handles_zero_vectors() {
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        let same = cosine(&[1.0, 0.0], &[1.0, 0.0]);
        assert!((same - 1.0).abs() < 1e-6);
    }

    #[test]
    fn traversal_statement_gates_and_clamps() {
        let statement = traversal_statement(2);
        assert!(statement.contains("[rels*1..2]"));
        for rel in TRAVERSAL_RELATIONSHIPS {
            assert!(statement.contains(rel));
        }
        // Out-of-range hop counts clamp instead of exploding the walk.
        assert!(traversal_statement(99).contains("[rels*1..3]"));
        assert!(traversal_statement(0).contains("[rels*1..1]"));
    }

    #[test]
    fn path_descriptions_show_direction_for_supply_chain() {
        let supplier = describe_path("HAS_SUPPLIER", 1, "Apple Inc.", "AAPL", "TSMC", "TSM", None);
        assert!(supplier.contains("<- Supplier: TSMC (TSM)"));
        let customer = describe_path("HAS_CUSTOMER", 1, "TSMC", "TSM", "Apple Inc.", "AAPL", None);
        assert!(customer.contains("-> Customer: Apple Inc. (AAPL)"));
        let multi = describe_path(
            "SIMILAR_RISK", 2, "Apple Inc.", "AAPL", "Microsoft", "MSFT", Some("NVDA"),
        );
        assert!(multi.contains("via NVDA"));
        assert!(multi.contains("Similar Risk"));
    }

    #[test]
    fn context_records_source_and_relationship() {
        let mut traversal = chunk("c2", 0.4, "graph_traversal");
        traversal.graph_relationship =
            Some("Apple Inc. (AAPL) - Has Competitor - Microsoft (MSFT)".to_string());
        let context = compose_context(&[chunk("c1", 0.9, "vector_search"), traversal]);

        assert!(context.contains("[Apple Inc. - risk_factors - Chunk 0 - Source: vector_search]:"));
        assert!(context.contains("Source: graph_traversal (Related: Apple Inc. (AAPL)"));
        assert!(context.contains("text of c1"));
    }
}
