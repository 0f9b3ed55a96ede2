//! Node-embedding pipeline: fetch texts, serve what the cache can,
//! chunk and batch the rest through the provider, aggregate, validate,
//! and write the vectors back onto the graph.

use tracing::{info, warn};

use company_graph_core::error::AppResult;
use company_graph_core::AppCache;
use company_graph_neo4j::{GraphClient, NodeLabel};

use crate::cache::{get_cached_embedding, store_embedding};
use crate::chunking::{
    aggregate_embeddings, chunk_text, AggregationMethod, CHUNK_OVERLAP_TOKENS, CHUNK_SIZE_TOKENS,
};
use crate::client::EmbeddingClient;

/// Counters for one embedding run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddingRunStats {
    pub processed: usize,
    pub created: usize,
    pub cached: usize,
    pub failed: usize,
}

/// Create embeddings for every node of `label` that has `text_property`.
///
/// Dry-run (`execute == false`) reports what would happen and makes zero
/// provider calls. All chunks from all texts share one batched request
/// stream; results map back to their source text by index.
pub async fn create_embeddings_for_nodes(
    graph: &GraphClient,
    cache: &AppCache,
    client: &EmbeddingClient,
    label: NodeLabel,
    text_property: &str,
    embedding_property: &str,
    min_text_chars: usize,
    execute: bool,
) -> AppResult<EmbeddingRunStats> {
    let texts = graph
        .get_texts_for_label(label, label.key_property(), text_property)
        .await?;

    let mut stats = EmbeddingRunStats {
        processed: texts.len(),
        ..Default::default()
    };

    let mut to_write: Vec<(String, Vec<f32>)> = Vec::new();

    // Cache pass: anything with a matching hash/model/dimension is done.
    let mut pending: Vec<(String, String)> = Vec::new();
    for (key, text) in texts {
        if text.trim().is_empty() || text.len() < min_text_chars {
            continue;
        }
        if let Some(embedding) = get_cached_embedding(
            cache,
            &key,
            text_property,
            &text,
            client.model(),
            client.dimension(),
        ) {
            stats.cached += 1;
            to_write.push((key, embedding));
        } else {
            pending.push((key, text));
        }
    }

    if !execute {
        info!(
            label = label.as_str(),
            cached = stats.cached,
            to_embed = pending.len(),
            "[dry run] would embed texts"
        );
        return Ok(stats);
    }

    if !pending.is_empty() {
        // Flatten all chunks across texts so batches fill up regardless
        // of how long any single text is.
        let mut all_chunks: Vec<String> = Vec::new();
        let mut spans: Vec<(String, String, usize, usize)> = Vec::new();
        for (key, text) in &pending {
            let chunks = chunk_text(text, CHUNK_SIZE_TOKENS, CHUNK_OVERLAP_TOKENS);
            if chunks.is_empty() {
                continue;
            }
            let start = all_chunks.len();
            all_chunks.extend(chunks);
            spans.push((key.clone(), text.clone(), start, all_chunks.len()));
        }

        info!(
            label = label.as_str(),
            texts = spans.len(),
            chunks = all_chunks.len(),
            "embedding chunks in batched requests"
        );
        let vectors = client.embed_many(&all_chunks).await?;

        for (key, text, start, end) in spans {
            let chunk_vectors = &vectors[start..end];
            match aggregate_embeddings(chunk_vectors, AggregationMethod::WeightedAverage) {
                Ok(embedding) => {
                    if let Err(e) = store_embedding(
                        cache,
                        &key,
                        text_property,
                        &text,
                        client.model(),
                        embedding.clone(),
                    ) {
                        warn!(key, error = %e, "failed to cache embedding");
                    }
                    stats.created += 1;
                    to_write.push((key, embedding));
                }
                Err(e) => {
                    warn!(key, error = %e, "aggregation failed");
                    stats.failed += 1;
                }
            }
        }
    }

    let written = graph
        .set_embeddings(
            label,
            label.key_property(),
            embedding_property,
            &to_write,
            client.model(),
            client.dimension(),
        )
        .await?;
    info!(
        label = label.as_str(),
        written,
        created = stats.created,
        cached = stats.cached,
        failed = stats.failed,
        "embedding run complete"
    );

    Ok(stats)
}
