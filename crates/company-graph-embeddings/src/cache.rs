//! SHA-keyed embedding cache on top of the artifact cache.
//!
//! A cached vector is only served when the stored model, dimension, and
//! text hash all match the current request; any mismatch is a miss. Both
//! reads and writes validate the vector itself.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use company_graph_core::cache::cache_get_or_none;
use company_graph_core::constants::NS_EMBEDDINGS;
use company_graph_core::error::{AppError, AppResult};
use company_graph_core::AppCache;

use crate::similarity::validate_embedding;

/// One cached embedding with its integrity fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingCacheEntry {
    pub text_sha256: String,
    pub model: String,
    pub dimension: usize,
    pub embedding: Vec<f32>,
    pub created_at: String,
}

pub fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Cache key: `{entity_key}:{text_property}`.
pub fn cache_key(entity_key: &str, text_property: &str) -> String {
    format!("{entity_key}:{text_property}")
}

/// Read a cached embedding, enforcing the integrity contract.
pub fn get_cached_embedding(
    cache: &AppCache,
    entity_key: &str,
    text_property: &str,
    text: &str,
    model: &str,
    dimension: usize,
) -> Option<Vec<f32>> {
    let key = cache_key(entity_key, text_property);
    let entry: EmbeddingCacheEntry = cache_get_or_none(cache, NS_EMBEDDINGS, &key)?;

    if entry.model != model || entry.dimension != dimension {
        debug!(key, "embedding cache entry has wrong model or dimension, miss");
        return None;
    }
    if entry.text_sha256 != sha256_hex(text) {
        debug!(key, "embedding cache entry is stale (text changed), miss");
        return None;
    }
    if !validate_embedding(&entry.embedding, dimension) {
        debug!(key, "embedding cache entry failed validation, miss");
        return None;
    }
    Some(entry.embedding)
}

/// Store an embedding; rejects invalid vectors rather than persisting.
pub fn store_embedding(
    cache: &AppCache,
    entity_key: &str,
    text_property: &str,
    text: &str,
    model: &str,
    embedding: Vec<f32>,
) -> AppResult<()> {
    let dimension = embedding.len();
    if !validate_embedding(&embedding, dimension) {
        return Err(AppError::ValidationError(
            "refusing to cache an invalid embedding".to_string(),
        ));
    }
    let entry = EmbeddingCacheEntry {
        text_sha256: sha256_hex(text),
        model: model.to_string(),
        dimension,
        embedding,
        created_at: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
    };
    cache.set(NS_EMBEDDINGS, &cache_key(entity_key, text_property), &entry, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_cache() -> (tempfile::TempDir, AppCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = AppCache::open(dir.path()).unwrap();
        (dir, cache)
    }

    #[test]
    fn hit_requires_matching_hash_model_and_dimension() {
        let (_dir, cache) = temp_cache();
        let vector = vec![0.5f32; 8];
        store_embedding(&cache, "doc_1", "text", "hello world", "model-a", vector.clone())
            .unwrap();

        // Full match: hit.
        let hit = get_cached_embedding(&cache, "doc_1", "text", "hello world", "model-a", 8);
        assert_eq!(hit, Some(vector));

        // Changed text: miss.
        assert!(
            get_cached_embedding(&cache, "doc_1", "text", "hello there", "model-a", 8).is_none()
        );
        // Different model: miss.
        assert!(
            get_cached_embedding(&cache, "doc_1", "text", "hello world", "model-b", 8).is_none()
        );
        // Wrong dimension: miss.
        assert!(
            get_cached_embedding(&cache, "doc_1", "text", "hello world", "model-a", 16).is_none()
        );
    }

    #[test]
    fn invalid_vectors_are_never_cached() {
        let (_dir, cache) = temp_cache();
        let result = store_embedding(
            &cache,
            "doc_1",
            "text",
            "hello",
            "model-a",
            vec![f32::NAN, 1.0],
        );
        assert!(result.is_err());
        assert!(get_cached_embedding(&cache, "doc_1", "text", "hello", "model-a", 2).is_none());
    }

    #[test]
    fn sha_is_stable() {
        assert_eq!(sha256_hex("abc"), sha256_hex("abc"));
        assert_ne!(sha256_hex("abc"), sha256_hex("abd"));
        assert_eq!(sha256_hex("abc").len(), 64);
    }
}
