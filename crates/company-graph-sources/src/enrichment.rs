//! Company property enrichment from SEC EDGAR and Yahoo Finance.
//!
//! Both sources are fetched in parallel and merged with a fixed priority:
//! Yahoo provides the financial bulk, SEC overrides the industry
//! classifiers it is authoritative for. The merged record is cached per
//! CIK for thirty days.

use chrono::Utc;
use tracing::debug;

use company_graph_core::cache::cache_get_or_none;
use company_graph_core::constants::{CACHE_TTL_COMPANY_PROPERTIES, NS_COMPANY_PROPERTIES};
use company_graph_core::error::AppResult;
use company_graph_core::models::CompanyProperties;
use company_graph_core::AppCache;

use crate::context::SourceContext;
use crate::sec_edgar::{self, CompanySubmissions};
use crate::yahoo::{self, YahooProfile};

/// Normalize SIC (4-digit) and NAICS (6-digit) classification codes.
pub fn normalize_industry_codes(
    sic: Option<&str>,
    naics: Option<&str>,
) -> (Option<String>, Option<String>) {
    let digits = |value: &str| -> String { value.chars().filter(char::is_ascii_digit).collect() };

    let sic_code = sic.map(digits).filter(|d| d.len() >= 2).map(|d| {
        let trimmed: String = d.chars().take(4).collect();
        format!("{trimmed:0>4}")
    });
    let naics_code = naics.map(digits).filter(|d| d.len() >= 2).map(|d| {
        let trimmed: String = d.chars().take(6).collect();
        format!("{trimmed:0>6}")
    });
    (sic_code, naics_code)
}

/// Merge per-source data with priority SEC > Yahoo for classifiers and
/// Yahoo for everything else.
pub fn merge_company_data(
    sec: Option<&CompanySubmissions>,
    yahoo: Option<&YahooProfile>,
) -> CompanyProperties {
    let mut merged = CompanyProperties::default();

    if let Some(yahoo) = yahoo {
        merged.sector = yahoo.sector.clone();
        merged.industry = yahoo.industry.clone();
        merged.market_cap = yahoo.market_cap;
        merged.revenue = yahoo.revenue;
        merged.employees = yahoo.employees;
        merged.headquarters_city = yahoo.city.clone();
        merged.headquarters_state = yahoo.state.clone();
        merged.headquarters_country = yahoo.country.clone();
        merged.description = yahoo.description.clone();
    }

    if let Some(sec) = sec {
        let (sic_code, naics_code) =
            normalize_industry_codes(sec.sic.as_deref(), sec.naics.as_deref());
        if sic_code.is_some() {
            merged.sic_code = sic_code;
        }
        if naics_code.is_some() {
            merged.naics_code = naics_code;
        }
    }

    let mut sources = Vec::new();
    if sec.is_some() {
        sources.push("SEC_EDGAR");
    }
    if yahoo.is_some() {
        sources.push("YAHOO_FINANCE");
    }
    merged.data_source = if sources.is_empty() {
        None
    } else {
        Some(sources.join(","))
    };
    merged.data_updated_at = Some(Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string());

    merged
}

/// Fetch and merge company properties, serving from cache when possible.
///
/// Returns `Ok(None)` when neither source had anything (the expected
/// "no data" outcome, counted separately from errors).
pub async fn enrich_company(
    ctx: &SourceContext,
    cache: &AppCache,
    cik: &str,
    ticker: &str,
) -> AppResult<Option<CompanyProperties>> {
    if let Some(cached) = cache_get_or_none::<CompanyProperties>(cache, NS_COMPANY_PROPERTIES, cik)
    {
        debug!(cik, ticker, "company properties served from cache");
        return Ok(Some(cached));
    }

    enrich_company_at(ctx, cache, sec_edgar::SEC_DATA_BASE, yahoo::YAHOO_BASE, cik, ticker).await
}

pub async fn enrich_company_at(
    ctx: &SourceContext,
    cache: &AppCache,
    sec_base: &str,
    yahoo_base: &str,
    cik: &str,
    ticker: &str,
) -> AppResult<Option<CompanyProperties>> {
    let (sec, yahoo) = tokio::join!(
        sec_edgar::fetch_submissions(ctx, sec_base, cik),
        yahoo::fetch_profile(ctx, yahoo_base, ticker),
    );

    let sec = match sec {
        Ok(submissions) => Some(submissions),
        Err(e) => {
            debug!(cik, error = %e, "SEC enrichment fetch failed");
            None
        }
    };
    let yahoo = match yahoo {
        Ok(profile) => profile,
        Err(e) => {
            debug!(ticker, error = %e, "Yahoo enrichment fetch failed");
            None
        }
    };

    if sec.is_none() && yahoo.is_none() {
        return Ok(None);
    }

    let merged = merge_company_data(sec.as_ref(), yahoo.as_ref());
    cache.set(
        NS_COMPANY_PROPERTIES,
        cik,
        &merged,
        Some(CACHE_TTL_COMPANY_PROPERTIES),
    )?;
    Ok(Some(merged))
}
