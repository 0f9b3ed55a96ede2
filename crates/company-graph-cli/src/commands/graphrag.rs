use anyhow::{Context, Result};
use tracing::info;

use company_graph_embeddings::engine::create_embeddings_for_nodes;
use company_graph_embeddings::EmbeddingClient;
use company_graph_graphrag::chunks::chunk_filing_sections;
use company_graph_graphrag::create_documents_and_chunks;
use company_graph_neo4j::NodeLabel;

use crate::context::AppContext;
use crate::CommonArgs;

/// Build the GraphRAG layer: chunk stored filing sections into
/// Document/Chunk nodes, then embed every chunk.
pub async fn run(ctx: &AppContext, common: &CommonArgs) -> Result<()> {
    let client = ctx.graph().await?;

    let mut sections = client.get_company_sections().await?;
    if let Some(limit) = common.limit {
        sections.truncate(limit);
    }
    info!(companies = sections.len(), "chunking filing sections");

    let mut chunks = Vec::new();
    for company in &sections {
        chunks.extend(chunk_filing_sections(
            company.business_description.as_deref(),
            company.risk_factors.as_deref(),
            &company.cik,
            company.ticker.as_deref(),
            company.name.as_deref(),
            company.filing_year,
        ));
    }

    let (documents, created_chunks) =
        create_documents_and_chunks(&client, &chunks, common.execute).await?;
    if common.execute {
        info!(documents, chunks = created_chunks, "document layer ready");
    }

    let api_key = ctx
        .config
        .openai_api_key
        .as_deref()
        .context("OPENAI_API_KEY is required to embed chunks")?;
    let embedder = EmbeddingClient::new(api_key);

    let stats = create_embeddings_for_nodes(
        &client,
        &ctx.cache,
        &embedder,
        NodeLabel::Chunk,
        "text",
        "embedding",
        0,
        common.execute,
    )
    .await?;
    info!(
        processed = stats.processed,
        created = stats.created,
        cached = stats.cached,
        failed = stats.failed,
        "chunk embeddings complete"
    );
    Ok(())
}
