use anyhow::Result;
use tracing::{info, warn};

use company_graph_core::cache::cache_get_or_none;
use company_graph_core::constants::{CACHE_TTL_10K_EXTRACTED, NS_10K_EXTRACTED};
use company_graph_core::models::FilingExtraction;
use company_graph_core::ExecutionStats;
use company_graph_filings::extract::{default_extractors, run_extractors};
use company_graph_filings::lookup::{CompanyLookup, CompanyRef};
use company_graph_graphrag::filing_text::find_10k_file;

use crate::context::AppContext;
use crate::CommonArgs;

/// Filing year encoded in the extracted file name (`10k_{year}.html`).
fn year_from_filename(path: &std::path::Path) -> Option<i32> {
    path.file_stem()?
        .to_str()?
        .strip_prefix("10k_")?
        .parse()
        .ok()
}

/// Run the extractor registry over every downloaded filing, cache the
/// results for a year, and persist them (plus relationship edges) to the
/// graph. Extraction itself is CPU-bound file parsing; it runs on
/// blocking threads.
pub async fn run(ctx: &AppContext, common: &CommonArgs) -> Result<()> {
    let client = ctx.graph().await?;

    // Lookup for entity resolution, built once from the graph.
    let companies = client.get_companies().await?;
    let refs: Vec<CompanyRef> = companies
        .iter()
        .map(|company| CompanyRef {
            cik: company.cik.clone(),
            ticker: company.ticker.clone(),
            name: company.name.clone().unwrap_or_default(),
        })
        .collect();
    let lookup = std::sync::Arc::new(CompanyLookup::build(&refs));
    info!(companies = refs.len(), variants = lookup.len(), "built entity-resolution lookup");

    let filings_dir = ctx.config.filings_dir();
    let mut ciks: Vec<String> = companies.into_iter().map(|company| company.cik).collect();
    ciks.retain(|cik| find_10k_file(cik, &filings_dir).is_some());
    if let Some(limit) = common.limit {
        ciks.truncate(limit);
    }
    info!(filings = ciks.len(), "filings available for extraction");

    if !common.execute {
        info!("[dry run] would extract fields; pass --execute to apply");
        return Ok(());
    }

    let stats = ExecutionStats::new();
    let mut extractions: Vec<FilingExtraction> = Vec::new();

    for cik in &ciks {
        if let Some(cached) =
            cache_get_or_none::<FilingExtraction>(&ctx.cache, NS_10K_EXTRACTED, cik)
        {
            stats.increment("cached");
            extractions.push(cached);
            continue;
        }

        let Some(path) = find_10k_file(cik, &filings_dir) else {
            stats.increment("no_data");
            continue;
        };

        let lookup_for_task = lookup.clone();
        let cik_for_task = cik.clone();
        let fallback_year = year_from_filename(&path);
        let extraction = tokio::task::spawn_blocking(move || {
            let extractors = default_extractors();
            run_extractors(&path, &cik_for_task, Some(lookup_for_task.as_ref()), &extractors)
        })
        .await;

        match extraction {
            Ok(Ok(mut extraction)) => {
                extraction.filing_year = extraction.filing_year.or(fallback_year);
                if let Err(e) =
                    ctx.cache
                        .set(NS_10K_EXTRACTED, cik, &extraction, Some(CACHE_TTL_10K_EXTRACTED))
                {
                    warn!(cik, error = %e, "failed to cache extraction");
                }
                stats.increment("success");
                extractions.push(extraction);
            }
            Ok(Err(e)) => stats.record_error(format!("{cik}: {e}")),
            Err(e) => stats.record_error(format!("{cik}: extraction task panicked: {e}")),
        }
    }

    info!(extracted = extractions.len(), "saving extractions to graph");
    for extraction in &extractions {
        client.save_filing_extraction(extraction).await?;
    }
    client.cleanup_false_positive_relationships().await?;

    info!("summary: {}", stats.summary());
    Ok(())
}
