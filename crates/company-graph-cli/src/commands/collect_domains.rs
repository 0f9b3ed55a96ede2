use std::sync::Arc;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use company_graph_core::cache::cache_get_or_none;
use company_graph_core::constants::{
    CACHE_TTL_COMPANY_DOMAINS, CACHE_TTL_NEGATIVE_RESULT, NS_COMPANY_DOMAINS,
};
use company_graph_core::models::CompanyResult;
use company_graph_core::parallel::run_parallel;
use company_graph_core::ExecutionStats;
use company_graph_sources::collect_domains;

use crate::commands::company_universe;
use crate::context::AppContext;
use crate::CommonArgs;

pub async fn run(ctx: &AppContext, common: &CommonArgs, early_stop: f64) -> Result<()> {
    let listings = company_universe(ctx, common.limit).await?;
    let workers = ctx.workers(common.workers);
    let stats = Arc::new(ExecutionStats::new());
    info!(companies = listings.len(), workers, "collecting domains");

    if !common.execute {
        info!(
            companies = listings.len(),
            "[dry run] would run domain consensus; pass --execute to apply"
        );
        return Ok(());
    }

    let progress = ProgressBar::new(listings.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}").unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let sources = &ctx.sources;
    let cache = &ctx.cache;
    let stats_ref = &stats;
    let progress_ref = &progress;

    let results: Vec<Option<CompanyResult>> = run_parallel(listings, workers, |listing| async move {
        let outcome = async {
            if let Some(cached) =
                cache_get_or_none::<CompanyResult>(cache, NS_COMPANY_DOMAINS, &listing.cik)
            {
                stats_ref.increment("cached");
                return Some(cached);
            }

            let result = collect_domains(
                sources,
                &listing.cik,
                &listing.ticker,
                &listing.title,
                early_stop,
            )
            .await;

            let ttl = if result.no_domain {
                stats_ref.increment("no_data");
                CACHE_TTL_NEGATIVE_RESULT
            } else {
                stats_ref.increment("success");
                CACHE_TTL_COMPANY_DOMAINS
            };
            if let Err(e) = cache.set(NS_COMPANY_DOMAINS, &listing.cik, &result, Some(ttl)) {
                stats_ref.record_error(format!("{}: cache write failed: {e}", listing.cik));
            }
            Some(result)
        }
        .await;
        progress_ref.inc(1);
        outcome
    })
    .await;
    progress.finish_and_clear();

    let results: Vec<CompanyResult> = results.into_iter().flatten().collect();
    let with_domain = results.iter().filter(|r| r.domain.is_some()).count();
    info!(
        total = results.len(),
        with_domain,
        "consensus complete, saving to graph"
    );

    let client = ctx.graph().await?;
    let batch_size = common
        .batch_size
        .unwrap_or(company_graph_core::constants::BATCH_SIZE_NODES);
    for chunk in results.chunks(batch_size) {
        client.save_domain_results(chunk).await?;
    }

    info!("summary: {}", stats.summary());
    debug!(
        "candidates sample: {:?}",
        results.iter().take(3).map(|r| &r.all_candidates).collect::<Vec<_>>()
    );
    Ok(())
}
