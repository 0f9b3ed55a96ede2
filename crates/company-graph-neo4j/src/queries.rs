//! Company-centric graph reads and writes built on the batched loaders.

use neo4rs::query;
use serde_json::{Map, Value};
use tracing::info;

use company_graph_core::error::AppResult;
use company_graph_core::models::{
    CompanyListing, CompanyProperties, CompanyResult, FilingExtraction,
};

use crate::client::GraphClient;
use crate::loader::RelationshipRow;
use crate::types::{NodeLabel, RelationshipType};

/// Basic company identity row, the input for entity-resolution lookups.
#[derive(Debug, Clone)]
pub struct CompanyIdentity {
    pub cik: String,
    pub ticker: Option<String>,
    pub name: Option<String>,
}

/// Extracted filing sections stored on one Company node.
#[derive(Debug, Clone)]
pub struct CompanySections {
    pub cik: String,
    pub ticker: Option<String>,
    pub name: Option<String>,
    pub business_description: Option<String>,
    pub risk_factors: Option<String>,
    pub filing_year: Option<i32>,
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

impl GraphClient {
    /// Merge the SEC company universe into Company nodes.
    pub async fn upsert_companies(&self, listings: &[CompanyListing]) -> AppResult<usize> {
        let rows: Vec<Map<String, Value>> = listings
            .iter()
            .map(|listing| {
                object(serde_json::json!({
                    "cik": listing.cik,
                    "ticker": listing.ticker,
                    "name": listing.title,
                }))
            })
            .collect();
        self.upsert_nodes(NodeLabel::Company, "cik", &rows).await
    }

    /// Persist consensus outcomes: Domain nodes plus HAS_DOMAIN edges
    /// carrying the vote evidence. No-domain results write nothing here
    /// (their negative cache entry lives outside the graph).
    pub async fn save_domain_results(&self, results: &[CompanyResult]) -> AppResult<usize> {
        let with_domain: Vec<&CompanyResult> =
            results.iter().filter(|r| r.domain.is_some()).collect();
        if with_domain.is_empty() {
            return Ok(0);
        }

        let domain_rows: Vec<Map<String, Value>> = with_domain
            .iter()
            .map(|result| {
                object(serde_json::json!({
                    "final_domain": result.domain,
                    "description": result.description,
                }))
            })
            .collect();
        self.upsert_nodes(NodeLabel::Domain, "final_domain", &domain_rows).await?;

        let edges: Vec<RelationshipRow> = with_domain
            .iter()
            .map(|result| RelationshipRow {
                from_key: result.cik.clone(),
                to_key: result.domain.clone().unwrap_or_default(),
                properties: object(serde_json::json!({
                    "confidence": result.confidence,
                    "sources": result.sources.join(","),
                    "votes": result.votes as i64,
                })),
            })
            .collect();
        let written = self
            .upsert_relationships(
                RelationshipType::HasDomain,
                NodeLabel::Company,
                "cik",
                NodeLabel::Domain,
                "final_domain",
                &edges,
            )
            .await?;
        info!(companies = with_domain.len(), edges = written, "saved domain consensus");
        Ok(written)
    }

    /// Merge enriched properties onto one Company node.
    pub async fn save_company_properties(
        &self,
        cik: &str,
        properties: &CompanyProperties,
    ) -> AppResult<()> {
        let mut row = object(serde_json::to_value(properties)?);
        row.insert("cik".into(), Value::String(cik.to_string()));
        self.upsert_nodes(NodeLabel::Company, "cik", &[row]).await?;
        Ok(())
    }

    /// Persist a filing extraction: company text fields, filing metadata,
    /// and one labeled edge per resolved business relationship.
    pub async fn save_filing_extraction(&self, extraction: &FilingExtraction) -> AppResult<()> {
        let row = object(serde_json::json!({
            "cik": extraction.cik,
            "website": extraction.website,
            "business_description": extraction.business_description,
            "risk_factors": extraction.risk_factors,
            "accession_number": extraction.metadata.accession_number,
            "filing_date": extraction.metadata.filing_date.map(|d| d.to_string()),
            "fiscal_year_end": extraction.metadata.fiscal_year_end,
            "filing_year": extraction.filing_year,
        }));
        self.upsert_nodes(NodeLabel::Company, "cik", &[row]).await?;

        for kind in [
            company_graph_core::models::RelationshipKind::Competitor,
            company_graph_core::models::RelationshipKind::Supplier,
            company_graph_core::models::RelationshipKind::Customer,
            company_graph_core::models::RelationshipKind::Partner,
        ] {
            let edges: Vec<RelationshipRow> = extraction
                .relationships
                .iter()
                .filter(|mention| mention.kind == kind)
                .map(|mention| RelationshipRow {
                    from_key: extraction.cik.clone(),
                    to_key: mention.cik.clone(),
                    properties: object(serde_json::json!({
                        "confidence": mention.confidence,
                        "raw_mention": mention.raw_mention,
                        "context": mention.context,
                    })),
                })
                .collect();
            if edges.is_empty() {
                continue;
            }
            self.upsert_relationships(
                RelationshipType::for_kind(kind),
                NodeLabel::Company,
                "cik",
                NodeLabel::Company,
                "cik",
                &edges,
            )
            .await?;
        }
        Ok(())
    }

    /// All company identities, for lookup building and stage fan-out.
    pub async fn get_companies(&self) -> AppResult<Vec<CompanyIdentity>> {
        let mut stream = self
            .execute(query(
                "MATCH (c:Company) WHERE c.cik IS NOT NULL \
                 RETURN c.cik AS cik, c.ticker AS ticker, c.name AS name",
            ))
            .await?;

        let mut companies = Vec::new();
        while let Some(row) = stream.next().await? {
            let Ok(cik) = row.get::<String>("cik") else {
                continue;
            };
            companies.push(CompanyIdentity {
                cik,
                ticker: row.get::<Option<String>>("ticker").ok().flatten(),
                name: row.get::<Option<String>>("name").ok().flatten(),
            });
        }
        Ok(companies)
    }

    /// CIKs of companies that already carry extracted filing text, used by
    /// `--from-neo4j` to pick the work set from the graph.
    pub async fn get_ciks_with_filings(&self) -> AppResult<Vec<String>> {
        let mut stream = self
            .execute(query(
                "MATCH (c:Company) WHERE c.business_description IS NOT NULL \
                 RETURN c.cik AS cik",
            ))
            .await?;
        let mut ciks = Vec::new();
        while let Some(row) = stream.next().await? {
            if let Ok(cik) = row.get::<String>("cik") {
                ciks.push(cik);
            }
        }
        Ok(ciks)
    }

    /// Extracted filing sections stored on Company nodes, the GraphRAG
    /// chunking input.
    pub async fn get_company_sections(&self) -> AppResult<Vec<CompanySections>> {
        let mut stream = self
            .execute(query(
                "MATCH (c:Company) \
                 WHERE c.business_description IS NOT NULL OR c.risk_factors IS NOT NULL \
                 RETURN c.cik AS cik, c.ticker AS ticker, c.name AS name, \
                        c.business_description AS business_description, \
                        c.risk_factors AS risk_factors, \
                        c.filing_year AS filing_year",
            ))
            .await?;

        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            let Ok(cik) = row.get::<String>("cik") else {
                continue;
            };
            rows.push(CompanySections {
                cik,
                ticker: row.get::<Option<String>>("ticker").ok().flatten(),
                name: row.get::<Option<String>>("name").ok().flatten(),
                business_description: row
                    .get::<Option<String>>("business_description")
                    .ok()
                    .flatten(),
                risk_factors: row.get::<Option<String>>("risk_factors").ok().flatten(),
                filing_year: row
                    .get::<Option<i64>>("filing_year")
                    .ok()
                    .flatten()
                    .map(|y| y as i32),
            });
        }
        Ok(rows)
    }

    /// (key, text) pairs for one label/text property, the embedding
    /// engine's input.
    pub async fn get_texts_for_label(
        &self,
        label: NodeLabel,
        key_property: &str,
        text_property: &str,
    ) -> AppResult<Vec<(String, String)>> {
        crate::types::require_property_name(key_property)?;
        crate::types::require_property_name(text_property)?;
        let statement = format!(
            "MATCH (n:{label}) WHERE n.{text} IS NOT NULL \
             RETURN n.{key} AS key, n.{text} AS text",
            label = label.as_str(),
            key = key_property,
            text = text_property,
        );
        let mut stream = self.execute(query(&statement)).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            if let (Ok(key), Ok(text)) = (row.get::<String>("key"), row.get::<String>("text")) {
                rows.push((key, text));
            }
        }
        Ok(rows)
    }

    /// (key, embedding) pairs for one label/embedding property, the
    /// similarity engine's input.
    pub async fn get_embeddings_for_label(
        &self,
        label: NodeLabel,
        key_property: &str,
        embedding_property: &str,
    ) -> AppResult<Vec<(String, Vec<f32>)>> {
        crate::types::require_property_name(key_property)?;
        crate::types::require_property_name(embedding_property)?;
        let statement = format!(
            "MATCH (n:{label}) WHERE n.{emb} IS NOT NULL \
             RETURN n.{key} AS key, n.{emb} AS embedding",
            label = label.as_str(),
            key = key_property,
            emb = embedding_property,
        );
        let mut stream = self.execute(query(&statement)).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            if let (Ok(key), Ok(embedding)) =
                (row.get::<String>("key"), row.get::<Vec<f64>>("embedding"))
            {
                rows.push((key, embedding.into_iter().map(|v| v as f32).collect()));
            }
        }
        Ok(rows)
    }

    /// Write embeddings back onto nodes in batches.
    pub async fn set_embeddings(
        &self,
        label: NodeLabel,
        key_property: &str,
        embedding_property: &str,
        rows: &[(String, Vec<f32>)],
        model: &str,
        dimension: usize,
    ) -> AppResult<usize> {
        crate::types::require_property_name(key_property)?;
        crate::types::require_property_name(embedding_property)?;
        let statement = format!(
            "UNWIND $batch AS row\n\
             MATCH (n:{label} {{{key}: row.key}})\n\
             SET n.{emb} = row.embedding,\n\
                 n.embedding_model = $model,\n\
                 n.embedding_dimension = $dimension,\n\
                 n.loaded_at = datetime()",
            label = label.as_str(),
            key = key_property,
            emb = embedding_property,
        );

        let mut written = 0;
        for chunk in rows.chunks(500) {
            let batch: Vec<Map<String, Value>> = chunk
                .iter()
                .map(|(key, embedding)| {
                    object(serde_json::json!({ "key": key, "embedding": embedding }))
                })
                .collect();
            self.run(
                query(&statement)
                    .param("batch", crate::client::batch_param(&batch))
                    .param("model", model)
                    .param("dimension", dimension as i64),
            )
            .await?;
            written += chunk.len();
        }
        Ok(written)
    }

    /// Apply the context-sensitive false-positive delete rules as a
    /// post-pass over the extracted relationship edges.
    pub async fn cleanup_false_positive_relationships(&self) -> AppResult<i64> {
        let mut total = 0i64;
        for rule in company_graph_filings_rules() {
            let statement = "MATCH (:Company)-[r:HAS_COMPETITOR|HAS_SUPPLIER|HAS_CUSTOMER|HAS_PARTNER]->(t:Company) \
                 WHERE t.ticker = $ticker \
                   AND toLower(coalesce(r.raw_mention, '')) = $raw \
                   AND (size($markers) = 0 \
                        OR any(m IN $markers WHERE toLower(coalesce(r.context, '')) CONTAINS m)) \
                 DELETE r RETURN count(*) AS deleted";
            let markers: Vec<String> = rule.2.iter().map(|m| m.to_string()).collect();
            let deleted = self
                .run_returning_count(
                    query(statement)
                        .param("ticker", rule.1)
                        .param("raw", rule.0)
                        .param("markers", markers),
                    "deleted",
                    0,
                )
                .await?;
            total += deleted;
        }
        if total > 0 {
            info!(total, "deleted false-positive relationship edges");
        }
        Ok(total)
    }
}

/// (raw mention lowercase, ticker, context markers) triples mirroring the
/// extraction-side blacklist.
fn company_graph_filings_rules() -> Vec<(&'static str, &'static str, &'static [&'static str])> {
    vec![
        ("joint", "JYNT", &[]),
        ("cost", "COST", &[]),
        ("crm", "CRM", &[]),
        ("regis", "RGS", &[]),
        ("target", "TGT", &["target business", "target company"]),
        (
            "nasdaq",
            "NDAQ",
            &["listed on nasdaq", "nasdaq stock", "nasdaq global", "nasdaq listing"],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn false_positive_rules_match_the_extraction_blacklist() {
        let rules = company_graph_filings_rules();
        assert_eq!(rules.len(), 6);
        assert!(rules.iter().any(|(raw, ticker, _)| *raw == "joint" && *ticker == "JYNT"));
        let target = rules.iter().find(|(raw, _, _)| *raw == "target").unwrap();
        assert!(target.2.contains(&"target business"));
    }
}
