//! Pairwise cosine similarity with top-K pruning and symmetric edge
//! writes.
//!
//! The full recompute is delete-then-insert: all existing edges of the
//! type are removed, then every surviving pair is written in both
//! directions with identical properties.

use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::Map;
use tracing::{info, warn};

use company_graph_core::constants::BATCH_SIZE_RELATIONSHIPS;
use company_graph_core::error::{AppError, AppResult};
use company_graph_neo4j::loader::RelationshipRow;
use company_graph_neo4j::{GraphClient, NodeLabel, RelationshipType};

/// Dimension and finiteness check applied to every vector at the door.
pub fn validate_embedding(embedding: &[f32], expected_dimension: usize) -> bool {
    if embedding.len() != expected_dimension {
        return false;
    }
    embedding.iter().all(|v| v.is_finite())
}

/// Row-wise L2 normalization; zero-norm rows divide by one instead of
/// producing NaN.
fn normalize_rows(embeddings: &[Vec<f32>]) -> Vec<Vec<f32>> {
    embeddings
        .iter()
        .map(|row| {
            let norm: f32 = row.iter().map(|v| v * v).sum::<f32>().sqrt();
            let norm = if norm == 0.0 { 1.0 } else { norm };
            row.iter().map(|v| v / norm).collect()
        })
        .collect()
}

/// Find the top-K similar pairs above a threshold.
///
/// Returns `(key_i, key_j) -> score` with `key_i < key_j`; when a pair is
/// proposed from both rows the higher score wins. NaN/Inf inputs and
/// mismatched lengths are rejected up front.
pub fn find_top_k_similar_pairs(
    keys: &[String],
    embeddings: &[Vec<f32>],
    similarity_threshold: f32,
    top_k: usize,
) -> AppResult<BTreeMap<(String, String), f32>> {
    if keys.len() != embeddings.len() {
        return Err(AppError::ValidationError(format!(
            "keys ({}) and embeddings ({}) must match",
            keys.len(),
            embeddings.len()
        )));
    }
    if embeddings.iter().flatten().any(|v| !v.is_finite()) {
        return Err(AppError::ValidationError(
            "embeddings contain NaN or Inf components".to_string(),
        ));
    }
    if keys.len() < 2 {
        return Ok(BTreeMap::new());
    }

    let normalized = normalize_rows(embeddings);
    let mut pairs: BTreeMap<(String, String), f32> = BTreeMap::new();

    for (i, row) in normalized.iter().enumerate() {
        // Scores for row i against everyone, self excluded.
        let mut scored: Vec<(usize, f32)> = normalized
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(j, other)| {
                let dot: f32 = row.iter().zip(other).map(|(a, b)| a * b).sum();
                (j, dot.clamp(-1.0, 1.0))
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        for (j, score) in scored.into_iter().take(top_k) {
            if score < similarity_threshold {
                break;
            }
            let pair = if keys[i] < keys[j] {
                (keys[i].clone(), keys[j].clone())
            } else {
                (keys[j].clone(), keys[i].clone())
            };
            let entry = pairs.entry(pair).or_insert(score);
            if score > *entry {
                *entry = score;
            }
        }
    }
    Ok(pairs)
}

/// Compute pairwise similarity for all nodes of a label with stored
/// embeddings.
pub async fn compute_similarity_for_label(
    client: &GraphClient,
    label: NodeLabel,
    embedding_property: &str,
    expected_dimension: usize,
    similarity_threshold: f32,
    top_k: usize,
    min_text_items: Option<usize>,
) -> AppResult<BTreeMap<(String, String), f32>> {
    let rows = client
        .get_embeddings_for_label(label, label.key_property(), embedding_property)
        .await?;

    let (keys, embeddings): (Vec<String>, Vec<Vec<f32>>) = rows
        .into_iter()
        .filter(|(key, embedding)| {
            let valid = validate_embedding(embedding, expected_dimension);
            if !valid {
                warn!(key, "dropping node with invalid stored embedding");
            }
            valid
        })
        .unzip();

    if keys.len() < min_text_items.unwrap_or(2) {
        info!(label = label.as_str(), nodes = keys.len(), "not enough nodes for similarity");
        return Ok(BTreeMap::new());
    }

    info!(label = label.as_str(), nodes = keys.len(), "computing pairwise cosine similarity");
    find_top_k_similar_pairs(&keys, &embeddings, similarity_threshold, top_k)
}

/// Delete-then-insert the symmetric edge set for one relationship type.
///
/// Both directions are written with identical `{score, metric,
/// computed_at}` so the undirected relation survives on a directed-edge
/// engine. Serialized per (label, type) by construction: one call owns
/// the whole recompute.
pub async fn write_similarity_relationships(
    client: &GraphClient,
    pairs: &BTreeMap<(String, String), f32>,
    label: NodeLabel,
    relationship_type: RelationshipType,
) -> AppResult<usize> {
    client.delete_relationships(relationship_type, label, None).await?;

    if pairs.is_empty() {
        info!(rel = relationship_type.as_str(), "no pairs to write");
        return Ok(0);
    }

    let computed_at = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    let mut rows: Vec<RelationshipRow> = Vec::with_capacity(pairs.len() * 2);
    for ((key_a, key_b), score) in pairs {
        let mut properties = Map::new();
        properties.insert("score".into(), serde_json::json!(score));
        properties.insert("metric".into(), serde_json::json!("COSINE"));
        properties.insert("computed_at".into(), serde_json::json!(computed_at));
        rows.push(RelationshipRow {
            from_key: key_a.clone(),
            to_key: key_b.clone(),
            properties: properties.clone(),
        });
        rows.push(RelationshipRow {
            from_key: key_b.clone(),
            to_key: key_a.clone(),
            properties,
        });
    }

    let mut written = 0;
    for chunk in rows.chunks(BATCH_SIZE_RELATIONSHIPS) {
        written += client
            .upsert_relationships(
                relationship_type,
                label,
                label.key_property(),
                label,
                label.key_property(),
                chunk,
            )
            .await?;
    }
    info!(rel = relationship_type.as_str(), written, "wrote symmetric similarity edges");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn identical_vectors_score_one() {
        let pairs = find_top_k_similar_pairs(
            &keys(&["a", "b"]),
            &[vec![1.0, 0.0], vec![1.0, 0.0]],
            0.6,
            10,
        )
        .unwrap();
        let score = pairs.get(&("a".to_string(), "b".to_string())).copied().unwrap();
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_fall_below_threshold() {
        let pairs = find_top_k_similar_pairs(
            &keys(&["a", "b"]),
            &[vec![1.0, 0.0], vec![0.0, 1.0]],
            0.6,
            10,
        )
        .unwrap();
        assert!(pairs.is_empty());
    }

    #[test]
    fn pairs_are_ordered_and_deduplicated() {
        // Three mutually similar vectors: every pair appears exactly once,
        // ordered key_i < key_j.
        let vectors = vec![
            vec![1.0, 0.1],
            vec![1.0, 0.0],
            vec![0.9, 0.05],
        ];
        let pairs =
            find_top_k_similar_pairs(&keys(&["c", "a", "b"]), &vectors, 0.6, 10).unwrap();
        for (a, b) in pairs.keys() {
            assert!(a < b, "pair ({a}, {b}) is not ordered");
        }
        assert_eq!(pairs.len(), 3);
    }

    #[test]
    fn top_k_limits_neighbors_per_row() {
        // One hub vector similar to many others, k = 2.
        let mut vectors = vec![vec![1.0, 0.0]];
        let mut names = vec!["hub".to_string()];
        for i in 0..5 {
            vectors.push(vec![1.0, 0.001 * i as f32]);
            names.push(format!("n{i}"));
        }
        let pairs = find_top_k_similar_pairs(&names, &vectors, 0.9, 2).unwrap();
        let hub_pairs = pairs.keys().filter(|(a, b)| a == "hub" || b == "hub").count();
        assert!(hub_pairs <= 2, "hub had {hub_pairs} neighbors");
    }

    #[test]
    fn nan_inputs_are_rejected_up_front() {
        let result = find_top_k_similar_pairs(
            &keys(&["a", "b"]),
            &[vec![f32::NAN, 0.0], vec![1.0, 0.0]],
            0.6,
            10,
        );
        assert!(result.is_err());
    }

    #[test]
    fn zero_norm_vectors_do_not_produce_nan() {
        let pairs = find_top_k_similar_pairs(
            &keys(&["a", "b", "c"]),
            &[vec![0.0, 0.0], vec![1.0, 0.0], vec![1.0, 0.0]],
            0.6,
            10,
        )
        .unwrap();
        for score in pairs.values() {
            assert!(score.is_finite());
            assert!((-1.0..=1.0).contains(score));
        }
    }

    #[test]
    fn scores_stay_within_bounds_on_a_larger_sample() {
        // Pseudo-random but deterministic vectors.
        let mut vectors = Vec::new();
        let mut names = Vec::new();
        let mut state = 1u64;
        for i in 0..50 {
            let mut v = Vec::with_capacity(8);
            for _ in 0..8 {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                v.push(((state >> 33) as f32 / u32::MAX as f32) - 0.5);
            }
            vectors.push(v);
            names.push(format!("company_{i:02}"));
        }
        let pairs = find_top_k_similar_pairs(&names, &vectors, 0.6, 10).unwrap();
        for ((a, b), score) in &pairs {
            assert!(a < b);
            assert!(*score >= 0.6 && *score <= 1.0 + 1e-6, "score {score} out of range");
        }
    }

    #[test]
    fn mismatched_lengths_error() {
        let result = find_top_k_similar_pairs(&keys(&["a"]), &[], 0.6, 10);
        assert!(result.is_err());
    }

    #[test]
    fn validation_checks_dimension_and_finiteness() {
        assert!(validate_embedding(&[0.0, 1.0], 2));
        assert!(!validate_embedding(&[0.0, 1.0], 3));
        assert!(!validate_embedding(&[f32::INFINITY, 1.0], 2));
    }
}
