//! Bootstrap loaders for the domain-status layer: Domain nodes,
//! Technology nodes, and Domain-USES->Technology edges, read from JSONL
//! exports of the external domain-status source.

use std::io::BufRead;
use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use company_graph_core::domain::{is_infrastructure_domain, normalize_domain};
use company_graph_core::error::AppResult;

use crate::client::GraphClient;
use crate::loader::RelationshipRow;
use crate::types::{NodeLabel, RelationshipType};

/// One exported domain-status record.
#[derive(Debug, Clone, Deserialize)]
pub struct DomainRecord {
    pub final_domain: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub keywords: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// One exported domain-to-technology mapping.
#[derive(Debug, Clone, Deserialize)]
pub struct TechnologyMapping {
    pub final_domain: String,
    pub technology_name: String,
    #[serde(default)]
    pub technology_category: Option<String>,
}

/// Read JSONL records, skipping unparseable lines with a warning.
pub fn read_jsonl<T: serde::de::DeserializeOwned>(path: &Path) -> AppResult<Vec<T>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut records = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(line = number + 1, error = %e, "skipping malformed record"),
        }
    }
    Ok(records)
}

/// Load Domain nodes. Every domain passes the central validation funnel
/// and the infrastructure blacklist; rejected ones are dropped, not
/// persisted.
pub async fn load_domains(client: &GraphClient, domains: &[DomainRecord]) -> AppResult<usize> {
    let rows: Vec<Map<String, Value>> = domains
        .iter()
        .filter_map(|record| {
            let normalized = normalize_domain(&record.final_domain)?;
            if is_infrastructure_domain(&normalized) {
                return None;
            }
            let value = serde_json::json!({
                "final_domain": normalized,
                "title": record.title,
                "keywords": record.keywords,
                "description": record.description,
            });
            value.as_object().cloned()
        })
        .collect();

    let dropped = domains.len() - rows.len();
    if dropped > 0 {
        warn!(dropped, "dropped invalid or infrastructure domains during bootstrap");
    }

    let written = client.upsert_nodes(NodeLabel::Domain, "final_domain", &rows).await?;
    info!(written, "loaded Domain nodes");
    Ok(written)
}

/// Load Technology nodes and Domain-USES->Technology edges.
pub async fn load_technologies(
    client: &GraphClient,
    mappings: &[TechnologyMapping],
) -> AppResult<(usize, usize)> {
    let mut tech_rows: Vec<Map<String, Value>> = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for mapping in mappings {
        let name = mapping.technology_name.trim();
        if name.is_empty() || !seen.insert(name.to_string()) {
            continue;
        }
        if let Some(row) = serde_json::json!({
            "name": name,
            "category": mapping.technology_category,
        })
        .as_object()
        {
            tech_rows.push(row.clone());
        }
    }
    let nodes = client.upsert_nodes(NodeLabel::Technology, "name", &tech_rows).await?;

    let edges: Vec<RelationshipRow> = mappings
        .iter()
        .filter_map(|mapping| {
            let domain = normalize_domain(&mapping.final_domain)?;
            if is_infrastructure_domain(&domain) {
                return None;
            }
            let name = mapping.technology_name.trim();
            if name.is_empty() {
                return None;
            }
            Some(RelationshipRow {
                from_key: domain,
                to_key: name.to_string(),
                properties: Map::new(),
            })
        })
        .collect();
    let relationships = client
        .upsert_relationships(
            RelationshipType::Uses,
            NodeLabel::Domain,
            "final_domain",
            NodeLabel::Technology,
            "name",
            &edges,
        )
        .await?;

    info!(nodes, relationships, "loaded Technology layer");
    Ok((nodes, relationships))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jsonl_reader_skips_bad_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("domains.jsonl");
        std::fs::write(
            &path,
            "{\"final_domain\": \"apple.com\", \"title\": \"Apple\"}\n\
             not json at all\n\
             \n\
             {\"final_domain\": \"example.co.uk\"}\n",
        )
        .unwrap();

        let records: Vec<DomainRecord> = read_jsonl(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].final_domain, "apple.com");
        assert_eq!(records[1].final_domain, "example.co.uk");
    }
}
