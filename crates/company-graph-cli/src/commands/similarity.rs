use anyhow::{Context, Result};
use tracing::info;

use company_graph_core::constants::{
    DEFAULT_SIMILARITY_THRESHOLD, DESCRIPTION_SIMILARITY_THRESHOLD, EMBEDDING_DIMENSION,
    MIN_DESCRIPTION_LENGTH_FOR_SIMILARITY,
};
use company_graph_embeddings::engine::create_embeddings_for_nodes;
use company_graph_embeddings::similarity::{
    compute_similarity_for_label, write_similarity_relationships,
};
use company_graph_embeddings::EmbeddingClient;
use company_graph_neo4j::{NodeLabel, RelationshipType};

use crate::context::AppContext;
use crate::CommonArgs;

/// Company-to-company similarity: embed the stored narrative sections,
/// compute thresholded top-K cosine pairs, and rewrite the symmetric
/// SIMILAR_DESCRIPTION / SIMILAR_RISK edge sets.
pub async fn run(
    ctx: &AppContext,
    common: &CommonArgs,
    threshold: Option<f32>,
    top_k: usize,
) -> Result<()> {
    let client = ctx.graph().await?;
    let api_key = ctx
        .config
        .openai_api_key
        .as_deref()
        .context("OPENAI_API_KEY is required for similarity embeddings")?;
    let embedder = EmbeddingClient::new(api_key);

    // (text property, embedding property, edge type, default threshold)
    let passes = [
        (
            "business_description",
            "description_embedding",
            RelationshipType::SimilarDescription,
            DESCRIPTION_SIMILARITY_THRESHOLD,
        ),
        (
            "risk_factors",
            "risk_embedding",
            RelationshipType::SimilarRisk,
            DEFAULT_SIMILARITY_THRESHOLD,
        ),
    ];

    for (text_property, embedding_property, relationship, default_threshold) in passes {
        let stats = create_embeddings_for_nodes(
            &client,
            &ctx.cache,
            &embedder,
            NodeLabel::Company,
            text_property,
            embedding_property,
            MIN_DESCRIPTION_LENGTH_FOR_SIMILARITY,
            common.execute,
        )
        .await?;
        info!(
            text_property,
            created = stats.created,
            cached = stats.cached,
            "embeddings ready"
        );

        if !common.execute {
            info!(
                rel = relationship.as_str(),
                "[dry run] would recompute similarity edges; pass --execute to apply"
            );
            continue;
        }

        let pairs = compute_similarity_for_label(
            &client,
            NodeLabel::Company,
            embedding_property,
            EMBEDDING_DIMENSION,
            threshold.unwrap_or(default_threshold),
            top_k,
            None,
        )
        .await?;
        info!(rel = relationship.as_str(), pairs = pairs.len(), "similar pairs found");

        let written =
            write_similarity_relationships(&client, &pairs, NodeLabel::Company, relationship)
                .await?;
        info!(rel = relationship.as_str(), written, "symmetric edges written");
    }

    Ok(())
}
