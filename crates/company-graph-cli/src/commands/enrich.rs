use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use company_graph_core::models::CompanyProperties;
use company_graph_core::parallel::run_parallel;
use company_graph_core::ExecutionStats;
use company_graph_sources::enrich_company;

use crate::commands::company_universe;
use crate::context::AppContext;
use crate::CommonArgs;

pub async fn run(ctx: &AppContext, common: &CommonArgs) -> Result<()> {
    let listings = company_universe(ctx, common.limit).await?;
    let workers = ctx.workers(common.workers);
    info!(companies = listings.len(), workers, "enriching company properties");

    if !common.execute {
        info!(
            companies = listings.len(),
            "[dry run] would enrich and merge properties; pass --execute to apply"
        );
        return Ok(());
    }

    let stats = Arc::new(ExecutionStats::new());
    let sources = &ctx.sources;
    let cache = &ctx.cache;
    let stats_ref = &stats;

    let enriched: Vec<(String, Option<CompanyProperties>)> =
        run_parallel(listings, workers, |listing| async move {
            let properties =
                match enrich_company(sources, cache, &listing.cik, &listing.ticker).await {
                    Ok(Some(properties)) => {
                        stats_ref.increment("success");
                        Some(properties)
                    }
                    Ok(None) => {
                        stats_ref.increment("no_data");
                        None
                    }
                    Err(e) => {
                        stats_ref.record_error(format!("{}: {e}", listing.cik));
                        None
                    }
                };
            (listing.cik, properties)
        })
        .await;

    let client = ctx.graph().await?;
    for (cik, properties) in enriched.iter() {
        if let Some(properties) = properties {
            client.save_company_properties(cik, properties).await?;
        }
    }

    info!("summary: {}", stats.summary());
    Ok(())
}
