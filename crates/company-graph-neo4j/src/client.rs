//! Thin wrapper around the Bolt driver plus JSON-to-Bolt conversion for
//! batched UNWIND parameters.

use neo4rs::{
    BoltBoolean, BoltFloat, BoltInteger, BoltList, BoltMap, BoltString, BoltType, ConfigBuilder,
    DetachedRowStream, Graph, Query,
};
use serde_json::Value;

use company_graph_core::config::GraphSettings;
use company_graph_core::error::{AppError, AppResult};

/// Shared graph connection. `neo4rs::Graph` pools sessions internally and
/// is safe to clone across workers.
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    /// Connect using configured settings. An unreachable database is a
    /// fatal configuration error for the calling stage.
    pub async fn connect(settings: &GraphSettings) -> AppResult<Self> {
        let mut builder = ConfigBuilder::default()
            .uri(&settings.uri)
            .user(&settings.user)
            .password(&settings.password);
        if let Some(database) = settings.database.as_deref() {
            builder = builder.db(database);
        }
        let config = builder
            .build()
            .map_err(|e| AppError::ConfigError(format!("graph config: {e}")))?;
        let graph = Graph::connect(config).await?;
        Ok(Self { graph })
    }

    pub async fn run(&self, query: Query) -> AppResult<()> {
        self.graph.run(query).await?;
        Ok(())
    }

    pub async fn execute(&self, query: Query) -> AppResult<DetachedRowStream> {
        Ok(self.graph.execute(query).await?)
    }

    /// Run a statement and return the single i64 column of its first row,
    /// or `default` when the result is empty.
    pub async fn run_returning_count(
        &self,
        query: Query,
        column: &str,
        default: i64,
    ) -> AppResult<i64> {
        let mut stream = self.graph.execute(query).await?;
        if let Some(row) = stream.next().await? {
            if let Ok(count) = row.get::<i64>(column) {
                return Ok(count);
            }
        }
        Ok(default)
    }
}

/// Convert a JSON value into a Bolt parameter value.
///
/// Nulls have no business reaching the driver (property cleaning strips
/// them first); any stragglers become empty strings, which the cleaners
/// also strip on the next pass.
pub fn json_to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::String(BoltString::from("")),
        Value::Bool(b) => BoltType::Boolean(BoltBoolean::new(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                BoltType::Integer(BoltInteger::new(i))
            } else {
                BoltType::Float(BoltFloat::new(n.as_f64().unwrap_or(0.0)))
            }
        }
        Value::String(s) => BoltType::String(BoltString::from(s.as_str())),
        Value::Array(items) => {
            let mut list = BoltList::default();
            for item in items {
                list.push(json_to_bolt(item));
            }
            BoltType::List(list)
        }
        Value::Object(map) => {
            let mut bolt_map = BoltMap::default();
            for (key, item) in map {
                bolt_map.put(BoltString::from(key.as_str()), json_to_bolt(item));
            }
            BoltType::Map(bolt_map)
        }
    }
}

/// A list-of-maps batch parameter for `UNWIND $batch AS row`.
pub fn batch_param(rows: &[serde_json::Map<String, Value>]) -> BoltType {
    let mut list = BoltList::default();
    for row in rows {
        list.push(json_to_bolt(&Value::Object(row.clone())));
    }
    BoltType::List(list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn primitives_convert() {
        assert!(matches!(json_to_bolt(&json!(true)), BoltType::Boolean(_)));
        assert!(matches!(json_to_bolt(&json!(42)), BoltType::Integer(_)));
        assert!(matches!(json_to_bolt(&json!(0.5)), BoltType::Float(_)));
        assert!(matches!(json_to_bolt(&json!("x")), BoltType::String(_)));
    }

    #[test]
    fn nested_structures_convert() {
        let value = json!({"scores": [0.1, 0.2], "meta": {"k": "v"}});
        let BoltType::Map(map) = json_to_bolt(&value) else {
            panic!("expected map");
        };
        assert_eq!(map.value.len(), 2);
    }

    #[test]
    fn batches_become_lists_of_maps() {
        let rows = vec![
            json!({"cik": "0000320193", "ticker": "AAPL"}),
            json!({"cik": "0000789019", "ticker": "MSFT"}),
        ];
        let rows: Vec<_> = rows
            .into_iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect();
        let BoltType::List(list) = batch_param(&rows) else {
            panic!("expected list");
        };
        assert_eq!(list.value.len(), 2);
    }
}
