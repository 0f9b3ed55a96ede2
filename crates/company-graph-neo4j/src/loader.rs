//! Batched idempotent loaders.
//!
//! All merges use `SET n += row` with pre-cleaned property maps (nulls and
//! empty strings stripped) so a merge never overwrites a populated
//! attribute with an empty one. Every merge stamps `loaded_at`.

use neo4rs::query;
use serde_json::{Map, Value};
use tracing::{debug, info};

use company_graph_core::constants::{
    BATCH_SIZE_DELETE, BATCH_SIZE_NODES, BATCH_SIZE_RELATIONSHIPS,
};
use company_graph_core::error::AppResult;

use crate::client::{batch_param, GraphClient};
use crate::types::{require_property_name, NodeLabel, RelationshipType};

/// Strip nulls and empty strings from a property map.
pub fn clean_properties(properties: &Map<String, Value>) -> Map<String, Value> {
    properties
        .iter()
        .filter(|(_, value)| match value {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            _ => true,
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Clean a whole batch of property maps.
pub fn clean_properties_batch(batch: &[Map<String, Value>]) -> Vec<Map<String, Value>> {
    batch.iter().map(clean_properties).collect()
}

/// One relationship row for the batched loaders.
#[derive(Debug, Clone)]
pub struct RelationshipRow {
    pub from_key: String,
    pub to_key: String,
    pub properties: Map<String, Value>,
}

pub(crate) fn upsert_nodes_query(label: NodeLabel, key_property: &str) -> String {
    format!(
        "UNWIND $batch AS row\n\
         MERGE (n:{label} {{{key}: row.{key}}})\n\
         SET n += row, n.loaded_at = datetime()",
        label = label.as_str(),
        key = key_property,
    )
}

pub(crate) fn upsert_relationships_query(
    rel: RelationshipType,
    from: NodeLabel,
    from_key: &str,
    to: NodeLabel,
    to_key: &str,
) -> String {
    format!(
        "UNWIND $batch AS row\n\
         MATCH (a:{from} {{{fk}: row.from_key}})\n\
         MATCH (b:{to} {{{tk}: row.to_key}})\n\
         MERGE (a)-[r:{rel}]->(b)\n\
         SET r += row.properties, r.loaded_at = datetime()",
        from = from.as_str(),
        to = to.as_str(),
        rel = rel.as_str(),
        fk = from_key,
        tk = to_key,
    )
}

impl GraphClient {
    /// Batched node upsert keyed on `key_property`.
    pub async fn upsert_nodes(
        &self,
        label: NodeLabel,
        key_property: &str,
        rows: &[Map<String, Value>],
    ) -> AppResult<usize> {
        require_property_name(key_property)?;
        let cleaned = clean_properties_batch(rows);
        // Rows stripped of their key can no longer be merged.
        let cleaned: Vec<_> = cleaned
            .into_iter()
            .filter(|row| row.contains_key(key_property))
            .collect();

        let statement = upsert_nodes_query(label, key_property);
        let mut written = 0;
        for chunk in cleaned.chunks(BATCH_SIZE_NODES) {
            self.run(query(&statement).param("batch", batch_param(chunk))).await?;
            written += chunk.len();
            debug!(label = label.as_str(), written, total = cleaned.len(), "node batch merged");
        }
        Ok(written)
    }

    /// Batched relationship upsert between two keyed node sets.
    pub async fn upsert_relationships(
        &self,
        rel: RelationshipType,
        from: NodeLabel,
        from_key: &str,
        to: NodeLabel,
        to_key: &str,
        rows: &[RelationshipRow],
    ) -> AppResult<usize> {
        require_property_name(from_key)?;
        require_property_name(to_key)?;

        let statement = upsert_relationships_query(rel, from, from_key, to, to_key);
        let mut written = 0;
        let encoded: Vec<Map<String, Value>> = rows
            .iter()
            .map(|row| {
                let mut map = Map::new();
                map.insert("from_key".into(), Value::String(row.from_key.clone()));
                map.insert("to_key".into(), Value::String(row.to_key.clone()));
                map.insert(
                    "properties".into(),
                    Value::Object(clean_properties(&row.properties)),
                );
                map
            })
            .collect();

        for chunk in encoded.chunks(BATCH_SIZE_RELATIONSHIPS) {
            self.run(query(&statement).param("batch", batch_param(chunk))).await?;
            written += chunk.len();
        }
        Ok(written)
    }

    /// Delete every relationship of a type between nodes of one label, in
    /// bounded batches. Returns the number deleted.
    pub async fn delete_relationships(
        &self,
        rel: RelationshipType,
        label: NodeLabel,
        batch_size: Option<usize>,
    ) -> AppResult<i64> {
        let statement = format!(
            "MATCH (:{label})-[r:{rel}]->(:{label})\n\
             WITH r LIMIT $limit\n\
             DELETE r\n\
             RETURN count(*) AS deleted",
            label = label.as_str(),
            rel = rel.as_str(),
        );
        let batch_size = batch_size.unwrap_or(BATCH_SIZE_DELETE);

        let mut total = 0i64;
        loop {
            let deleted = self
                .run_returning_count(
                    query(&statement).param("limit", batch_size as i64),
                    "deleted",
                    0,
                )
                .await?;
            total += deleted;
            if deleted == 0 {
                break;
            }
        }
        if total > 0 {
            info!(rel = rel.as_str(), total, "deleted existing relationships");
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn cleaning_strips_nulls_and_empties_only() {
        let cleaned = clean_properties(&map(json!({
            "cik": "0000320193",
            "website": "",
            "sector": null,
            "employees": 0,
            "name": "  ",
            "ok": "value"
        })));
        assert_eq!(cleaned.len(), 3);
        assert!(cleaned.contains_key("cik"));
        assert!(cleaned.contains_key("ok"));
        // Zero is a real value, not an empty one.
        assert!(cleaned.contains_key("employees"));
        assert!(!cleaned.contains_key("website"));
        assert!(!cleaned.contains_key("sector"));
        assert!(!cleaned.contains_key("name"));
    }

    #[test]
    fn node_query_merges_on_the_key_and_stamps_loaded_at() {
        let statement = upsert_nodes_query(NodeLabel::Company, "cik");
        assert!(statement.contains("MERGE (n:Company {cik: row.cik})"));
        assert!(statement.contains("SET n += row"));
        assert!(statement.contains("n.loaded_at = datetime()"));
    }

    #[test]
    fn relationship_query_uses_enum_types_only() {
        let statement = upsert_relationships_query(
            RelationshipType::HasDomain,
            NodeLabel::Company,
            "cik",
            NodeLabel::Domain,
            "final_domain",
        );
        assert!(statement.contains("MATCH (a:Company {cik: row.from_key})"));
        assert!(statement.contains("MATCH (b:Domain {final_domain: row.to_key})"));
        assert!(statement.contains("MERGE (a)-[r:HAS_DOMAIN]->(b)"));
        assert!(statement.contains("r.loaded_at = datetime()"));
    }
}
