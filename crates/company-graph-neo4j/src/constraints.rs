//! Constraint and index provisioning, run once at stage startup.

use neo4rs::query;
use tracing::{debug, info, warn};

use company_graph_core::constants::EMBEDDING_DIMENSION;
use company_graph_core::error::AppResult;

use crate::client::GraphClient;

/// Uniqueness constraints on every node key, secondary indexes on the hot
/// lookup properties, and the vector index over chunk embeddings.
pub fn constraint_statements() -> Vec<String> {
    let mut statements: Vec<String> = vec![
        // Node-key uniqueness
        "CREATE CONSTRAINT domain_name IF NOT EXISTS FOR (d:Domain) REQUIRE d.final_domain IS UNIQUE".into(),
        "CREATE CONSTRAINT technology_name IF NOT EXISTS FOR (t:Technology) REQUIRE t.name IS UNIQUE".into(),
        "CREATE CONSTRAINT company_cik IF NOT EXISTS FOR (c:Company) REQUIRE c.cik IS UNIQUE".into(),
        "CREATE CONSTRAINT unique_doc_id IF NOT EXISTS FOR (d:Document) REQUIRE d.doc_id IS UNIQUE".into(),
        "CREATE CONSTRAINT unique_chunk_id IF NOT EXISTS FOR (c:Chunk) REQUIRE c.chunk_id IS UNIQUE".into(),
        // Secondary indexes
        "CREATE INDEX company_ticker IF NOT EXISTS FOR (c:Company) ON (c.ticker)".into(),
        "CREATE INDEX company_sector IF NOT EXISTS FOR (c:Company) ON (c.sector)".into(),
        "CREATE INDEX company_industry IF NOT EXISTS FOR (c:Company) ON (c.industry)".into(),
        "CREATE INDEX company_sic_code IF NOT EXISTS FOR (c:Company) ON (c.sic_code)".into(),
        "CREATE INDEX company_naics_code IF NOT EXISTS FOR (c:Company) ON (c.naics_code)".into(),
        "CREATE INDEX company_filing_date IF NOT EXISTS FOR (c:Company) ON (c.filing_date)".into(),
        "CREATE INDEX document_company_cik IF NOT EXISTS FOR (d:Document) ON (d.company_cik)".into(),
        "CREATE INDEX document_section_type IF NOT EXISTS FOR (d:Document) ON (d.section_type)".into(),
        "CREATE INDEX chunk_chunk_index IF NOT EXISTS FOR (c:Chunk) ON (c.chunk_index)".into(),
    ];
    statements.push(format!(
        "CREATE VECTOR INDEX chunk_embedding_vector IF NOT EXISTS \
         FOR (c:Chunk) ON c.embedding \
         OPTIONS {{indexConfig: {{`vector.dimensions`: {EMBEDDING_DIMENSION}, \
         `vector.similarity_function`: 'cosine'}}}}"
    ));
    statements
}

/// Create all constraints and indexes. Pre-existing equivalents are fine;
/// anything else is logged and skipped so one bad statement does not
/// block provisioning.
pub async fn ensure_constraints(client: &GraphClient) -> AppResult<()> {
    for statement in constraint_statements() {
        match client.run(query(&statement)).await {
            Ok(()) => debug!(statement = &statement[..statement.len().min(60)], "created"),
            Err(e) => {
                let text = e.to_string().to_lowercase();
                if text.contains("already exists") || text.contains("equivalent") {
                    debug!(statement = &statement[..statement.len().min(60)], "already exists");
                } else {
                    warn!(error = %e, "constraint creation failed");
                }
            }
        }
    }
    info!("graph constraints and indexes ensured");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covers_every_node_key_and_the_vector_index() {
        let statements = constraint_statements();
        let all = statements.join("\n");
        for key in [
            "d.final_domain IS UNIQUE",
            "t.name IS UNIQUE",
            "c.cik IS UNIQUE",
            "d.doc_id IS UNIQUE",
            "c.chunk_id IS UNIQUE",
        ] {
            assert!(all.contains(key), "missing: {key}");
        }
        assert!(all.contains("VECTOR INDEX chunk_embedding_vector"));
        assert!(all.contains("`vector.dimensions`: 1536"));
        assert!(all.contains("'cosine'"));
        for index in ["ticker", "sector", "industry", "sic_code", "naics_code", "filing_date"] {
            assert!(all.contains(&format!("c.{index}")), "missing index on {index}");
        }
    }

    #[test]
    fn all_statements_are_idempotent() {
        for statement in constraint_statements() {
            assert!(statement.contains("IF NOT EXISTS"), "{statement}");
        }
    }
}
