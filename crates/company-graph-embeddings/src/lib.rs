//! Embedding engine and similarity computation.
//!
//! Long texts are chunked token-aware, chunks from many source texts are
//! flattened into shared batched provider calls, chunk vectors are
//! aggregated back per text, and everything is cached keyed by the
//! SHA-256 of the text so unchanged inputs never hit the provider twice.
//! The similarity engine turns stored vectors into symmetric, thresholded
//! SIMILAR_* edges.

pub mod cache;
pub mod chunking;
pub mod client;
pub mod engine;
pub mod similarity;

pub use cache::EmbeddingCacheEntry;
pub use chunking::{aggregate_embeddings, chunk_text, count_tokens, AggregationMethod};
pub use client::EmbeddingClient;
pub use similarity::{find_top_k_similar_pairs, validate_embedding};
