//! Token-aware chunking and chunk-vector aggregation.
//!
//! Chunking is a pure function of (text, chunk size, overlap): fixed token
//! windows, no sentence-boundary heuristics, so re-runs produce identical
//! chunks and the cache keys stay stable. When the tokenizer cannot load,
//! a character-based fallback at ~4 chars/token keeps the same shape.

use once_cell::sync::Lazy;
use tiktoken_rs::CoreBPE;
use tracing::{debug, warn};

use company_graph_core::error::{AppError, AppResult};

/// Chunk size leaves headroom under the provider's per-input limit.
pub const CHUNK_SIZE_TOKENS: usize = 7000;
/// Overlap preserves context across chunk boundaries.
pub const CHUNK_OVERLAP_TOKENS: usize = 200;

/// Provider request ceilings for flattened chunk batches.
pub const MAX_CHUNKS_PER_BATCH: usize = 30;
pub const MAX_TOKENS_PER_BATCH: usize = 250_000;

/// Decay rate for the weighted aggregation: earlier chunks dominate.
const AGGREGATION_DECAY: f64 = 0.2;

static TOKENIZER: Lazy<Option<CoreBPE>> = Lazy::new(|| match tiktoken_rs::cl100k_base() {
    Ok(bpe) => Some(bpe),
    Err(e) => {
        warn!(error = %e, "tokenizer unavailable, falling back to character chunking");
        None
    }
});

/// Token count for budgeting; approximated at 4 chars/token without the
/// tokenizer.
pub fn count_tokens(text: &str) -> usize {
    match TOKENIZER.as_ref() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len(),
        None => text.chars().count().div_ceil(4),
    }
}

/// Split text into overlapping token windows.
pub fn chunk_text(text: &str, chunk_size_tokens: usize, overlap_tokens: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    match TOKENIZER.as_ref() {
        Some(bpe) => {
            let tokens = bpe.encode_with_special_tokens(text);
            if tokens.len() <= chunk_size_tokens {
                return vec![text.to_string()];
            }

            let mut chunks = Vec::new();
            let mut start = 0usize;
            while start < tokens.len() {
                let end = (start + chunk_size_tokens).min(tokens.len());
                match bpe.decode(tokens[start..end].to_vec()) {
                    Ok(chunk) => chunks.push(chunk),
                    Err(e) => {
                        // Token windows can split a multi-byte character;
                        // fall back to lossless char windows for the rest.
                        warn!(error = %e, "token decode failed, using char fallback");
                        return chunk_text_by_chars(text, chunk_size_tokens, overlap_tokens);
                    }
                }
                if end >= tokens.len() {
                    break;
                }
                let next = end - overlap_tokens.min(end);
                // Guarantee forward progress when overlap >= chunk size.
                start = if next > start { next } else { end };
            }
            debug!(
                tokens = tokens.len(),
                chunks = chunks.len(),
                "chunked text by tokens"
            );
            chunks
        }
        None => chunk_text_by_chars(text, chunk_size_tokens, overlap_tokens),
    }
}

/// Character-window fallback at ~4 chars per token.
fn chunk_text_by_chars(
    text: &str,
    chunk_size_tokens: usize,
    overlap_tokens: usize,
) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let chunk_chars = chunk_size_tokens * 4;
    let overlap_chars = overlap_tokens * 4;

    if chars.len() <= chunk_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < chars.len() {
        let end = (start + chunk_chars).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end >= chars.len() {
            break;
        }
        let next = end - overlap_chars.min(end);
        start = if next > start { next } else { end };
    }
    chunks
}

/// How chunk vectors combine back into one vector per source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationMethod {
    /// Exponential-decay weights; earlier chunks dominate. The default.
    WeightedAverage,
    Average,
    /// Element-wise maximum.
    Max,
}

/// Aggregate chunk embeddings into a single vector.
pub fn aggregate_embeddings(
    embeddings: &[Vec<f32>],
    method: AggregationMethod,
) -> AppResult<Vec<f32>> {
    if embeddings.is_empty() {
        return Err(AppError::EmbeddingError(
            "cannot aggregate zero embeddings".to_string(),
        ));
    }
    let dimension = embeddings[0].len();
    if embeddings.iter().any(|e| e.len() != dimension) {
        return Err(AppError::EmbeddingError(
            "chunk embeddings have inconsistent dimensions".to_string(),
        ));
    }
    if embeddings.len() == 1 {
        return Ok(embeddings[0].clone());
    }

    let out = match method {
        AggregationMethod::Average => {
            let mut sum = vec![0.0f64; dimension];
            for embedding in embeddings {
                for (acc, v) in sum.iter_mut().zip(embedding) {
                    *acc += f64::from(*v);
                }
            }
            sum.into_iter()
                .map(|v| (v / embeddings.len() as f64) as f32)
                .collect()
        }
        AggregationMethod::WeightedAverage => {
            let weights: Vec<f64> = (0..embeddings.len())
                .map(|i| (-AGGREGATION_DECAY * i as f64).exp())
                .collect();
            let total: f64 = weights.iter().sum();
            let mut sum = vec![0.0f64; dimension];
            for (embedding, weight) in embeddings.iter().zip(&weights) {
                for (acc, v) in sum.iter_mut().zip(embedding) {
                    *acc += f64::from(*v) * weight / total;
                }
            }
            sum.into_iter().map(|v| v as f32).collect()
        }
        AggregationMethod::Max => {
            let mut max = vec![f32::MIN; dimension];
            for embedding in embeddings {
                for (acc, v) in max.iter_mut().zip(embedding) {
                    *acc = acc.max(*v);
                }
            }
            max
        }
    };
    Ok(out)
}
