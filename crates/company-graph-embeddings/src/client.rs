//! Batched embedding calls against the provider.
//!
//! Requests are flattened chunk batches capped by both chunk count and
//! token budget, paced by the shared provider rate limiter. This is a
//! billed path: a single retry on transient failures, nothing more.

use async_openai::config::OpenAIConfig;
use async_openai::types::CreateEmbeddingRequestArgs;
use async_openai::Client;
use tracing::{debug, warn};

use company_graph_core::constants::{
    EMBEDDING_DIMENSION, EMBEDDING_MODEL, EMBEDDING_RATE_LIMIT,
};
use company_graph_core::error::{AppError, AppResult};
use company_graph_core::rate_limiter::limiter_for;

use crate::chunking::{count_tokens, MAX_CHUNKS_PER_BATCH, MAX_TOKENS_PER_BATCH};

/// Embedding provider client with batching and pacing.
pub struct EmbeddingClient {
    client: Client<OpenAIConfig>,
    model: String,
    dimension: usize,
}

impl EmbeddingClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: Client::with_config(OpenAIConfig::new().with_api_key(api_key)),
            model: EMBEDDING_MODEL.to_string(),
            dimension: EMBEDDING_DIMENSION,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed many texts, preserving order. Inputs are split into requests
    /// of at most [`MAX_CHUNKS_PER_BATCH`] texts and
    /// [`MAX_TOKENS_PER_BATCH`] tokens.
    pub async fn embed_many(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut results: Vec<Vec<f32>> = Vec::with_capacity(texts.len());
        let mut batch: Vec<String> = Vec::new();
        let mut batch_tokens = 0usize;

        for text in texts {
            let tokens = count_tokens(text);
            let would_overflow = !batch.is_empty()
                && (batch.len() >= MAX_CHUNKS_PER_BATCH
                    || batch_tokens + tokens > MAX_TOKENS_PER_BATCH);
            if would_overflow {
                results.extend(self.embed_batch(&batch).await?);
                batch.clear();
                batch_tokens = 0;
            }
            batch.push(text.clone());
            batch_tokens += tokens;
        }
        if !batch.is_empty() {
            results.extend(self.embed_batch(&batch).await?);
        }

        Ok(results)
    }

    /// One provider request. Validates that every returned vector has the
    /// expected dimension and only finite components.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        limiter_for("openai_embeddings", EMBEDDING_RATE_LIMIT)?.acquire().await;

        let mut attempts = 0u32;
        let response = loop {
            let request = CreateEmbeddingRequestArgs::default()
                .model(&self.model)
                .input(texts.to_vec())
                .build()
                .map_err(|e| AppError::EmbeddingError(e.to_string()))?;

            match self.client.embeddings().create(request).await {
                Ok(response) => break response,
                Err(e) if attempts == 0 && is_transient_provider_error(&e) => {
                    attempts += 1;
                    warn!(error = %e, "transient embedding failure, one retry");
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                }
                Err(e) => return Err(AppError::EmbeddingError(e.to_string())),
            }
        };

        if response.data.len() != texts.len() {
            return Err(AppError::EmbeddingError(format!(
                "embedding count mismatch: got {}, expected {}",
                response.data.len(),
                texts.len()
            )));
        }

        let mut vectors = Vec::with_capacity(texts.len());
        // The API may return data out of order; index is authoritative.
        let mut data = response.data;
        data.sort_by_key(|d| d.index);
        for item in data {
            let embedding = item.embedding;
            if embedding.len() != self.dimension {
                return Err(AppError::EmbeddingError(format!(
                    "embedding dimension {} != expected {}",
                    embedding.len(),
                    self.dimension
                )));
            }
            if embedding.iter().any(|v| !v.is_finite()) {
                return Err(AppError::EmbeddingError(
                    "embedding contains non-finite components".to_string(),
                ));
            }
            vectors.push(embedding);
        }
        debug!(texts = texts.len(), "embedded batch");
        Ok(vectors)
    }
}

fn is_transient_provider_error(error: &async_openai::error::OpenAIError) -> bool {
    match error {
        async_openai::error::OpenAIError::Reqwest(e) => e.is_timeout() || e.is_connect(),
        async_openai::error::OpenAIError::ApiError(api) => {
            let message = api.message.to_lowercase();
            message.contains("rate limit") || message.contains("server error")
        }
        _ => false,
    }
}
