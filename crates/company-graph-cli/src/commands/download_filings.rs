use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use company_graph_core::parallel::{run_with_stats, TaskOutcome};
use company_graph_core::ExecutionStats;
use company_graph_filings::downloader::{DownloadOptions, DownloadOutcome, FilingDownloader};

use crate::commands::company_universe;
use crate::context::AppContext;
use crate::CommonArgs;

#[allow(clippy::too_many_arguments)]
pub async fn run(
    ctx: &AppContext,
    common: &CommonArgs,
    filing_date_start: Option<NaiveDate>,
    filing_date_end: Option<NaiveDate>,
    force: bool,
    no_pre_check: bool,
    from_neo4j: bool,
) -> Result<()> {
    let ciks: Vec<String> = if from_neo4j {
        let client = ctx.graph().await?;
        let mut ciks = client.get_ciks_with_filings().await?;
        if let Some(limit) = common.limit {
            ciks.truncate(limit);
        }
        ciks
    } else {
        company_universe(ctx, common.limit)
            .await?
            .into_iter()
            .map(|listing| listing.cik)
            .collect()
    };

    let options = DownloadOptions {
        date_start: filing_date_start,
        date_end: filing_date_end,
        force,
        pre_check: !no_pre_check,
    };
    let workers = ctx.workers(common.workers);
    info!(
        companies = ciks.len(),
        workers,
        provider = ctx.config.filing_provider_api_key.is_some(),
        "downloading 10-K filings"
    );

    if !common.execute {
        info!(
            companies = ciks.len(),
            "[dry run] would download and extract filings; pass --execute to apply"
        );
        return Ok(());
    }

    std::fs::create_dir_all(ctx.config.portfolios_dir())?;
    std::fs::create_dir_all(ctx.config.filings_dir())?;

    let stats = Arc::new(ExecutionStats::new());
    let progress = ProgressBar::new(ciks.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let portfolios_dir = ctx.config.portfolios_dir();
    let filings_dir = ctx.config.filings_dir();
    let downloader = FilingDownloader::new(
        &ctx.sources,
        &ctx.cache,
        ctx.config.filing_provider_api_key.clone(),
        &portfolios_dir,
        &filings_dir,
    );

    let downloader_ref = &downloader;
    let options_ref = &options;
    let stats_ref = &stats;
    let progress_ref = &progress;

    run_with_stats(ciks, workers, stats.clone(), |cik| async move {
        let outcome = match downloader_ref.download_and_extract(&cik, options_ref).await {
            Ok(DownloadOutcome::Extracted(_)) => TaskOutcome::Success,
            Ok(DownloadOutcome::CachedNoFiling) => TaskOutcome::Cached,
            Ok(DownloadOutcome::NoFiling) => TaskOutcome::NoData,
            Err(e) => {
                stats_ref.record_error(format!("{cik}: {e}"));
                TaskOutcome::Error
            }
        };
        progress_ref.inc(1);
        outcome
    })
    .await;
    progress.finish_and_clear();

    info!("summary: {}", stats.summary());
    Ok(())
}
