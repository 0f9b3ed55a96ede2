use anyhow::{Context, Result};
use tracing::info;

use company_graph_embeddings::EmbeddingClient;
use company_graph_graphrag::answer_question;

use crate::context::AppContext;

/// Retrieve context for a question. Synthesis belongs to the caller's
/// language model; this prints the composed context and the graph
/// evidence behind it.
pub async fn run(
    ctx: &AppContext,
    question: &str,
    focus_ticker: Option<&str>,
    max_chunks: usize,
    max_hops: usize,
    use_graph: bool,
) -> Result<()> {
    let client = ctx.graph().await?;
    let api_key = ctx
        .config
        .openai_api_key
        .as_deref()
        .context("OPENAI_API_KEY is required to embed the question")?;
    let embedder = EmbeddingClient::new(api_key);

    let vectors = embedder.embed_many(&[question.to_string()]).await?;
    let question_embedding = vectors
        .into_iter()
        .next()
        .context("embedding provider returned no vector for the question")?;

    let answer = answer_question(
        &client,
        question,
        &question_embedding,
        focus_ticker,
        max_chunks,
        max_hops,
        use_graph,
    )
    .await?;

    info!(
        chunks = answer.chunks.len(),
        companies = answer.companies.len(),
        related = answer.related_companies.len(),
        "retrieval complete"
    );

    println!("Question: {question}\n");
    if answer.chunks.is_empty() {
        println!("No relevant context found.");
        return Ok(());
    }

    println!("Companies: {}", answer
        .companies
        .iter()
        .map(|(ticker, name)| format!("{name} ({ticker})"))
        .collect::<Vec<_>>()
        .join(", "));

    if !answer.paths.is_empty() {
        println!("\nGraph evidence:");
        for path in &answer.paths {
            println!("  {}", path.description);
        }
    }

    println!("\n--- Context ---\n{}", answer.context);
    Ok(())
}
