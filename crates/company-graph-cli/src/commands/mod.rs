pub mod ask;
pub mod bootstrap;
pub mod cache_stats;
pub mod collect_domains;
pub mod download_filings;
pub mod enrich;
pub mod extract_filings;
pub mod graphrag;
pub mod load_companies;
pub mod similarity;

use company_graph_core::models::CompanyListing;
use company_graph_sources::sec_edgar;

use crate::context::AppContext;

/// The company universe for stage fan-out, optionally truncated.
pub(crate) async fn company_universe(
    ctx: &AppContext,
    limit: Option<usize>,
) -> anyhow::Result<Vec<CompanyListing>> {
    let mut listings =
        sec_edgar::fetch_company_universe(&ctx.sources, sec_edgar::SEC_WWW_BASE).await?;
    if let Some(limit) = limit {
        listings.truncate(limit);
    }
    Ok(listings)
}
