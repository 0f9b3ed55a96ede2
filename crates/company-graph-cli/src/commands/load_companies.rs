use anyhow::Result;
use tracing::info;

use crate::commands::company_universe;
use crate::context::AppContext;
use crate::CommonArgs;

pub async fn run(ctx: &AppContext, common: &CommonArgs) -> Result<()> {
    let listings = company_universe(ctx, common.limit).await?;
    info!(companies = listings.len(), "fetched SEC company universe");

    if !common.execute {
        info!("[dry run] would merge Company nodes; pass --execute to apply");
        return Ok(());
    }

    let client = ctx.graph().await?;
    company_graph_neo4j::constraints::ensure_constraints(&client).await?;

    let batch_size = common
        .batch_size
        .unwrap_or(company_graph_core::constants::BATCH_SIZE_NODES);
    let mut written = 0;
    for chunk in listings.chunks(batch_size) {
        written += client.upsert_companies(chunk).await?;
    }
    info!(written, "merged Company nodes");
    Ok(())
}
