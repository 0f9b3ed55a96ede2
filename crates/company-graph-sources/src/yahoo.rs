//! Yahoo Finance quoteSummary source (fast, good coverage, weight 3.0).
//!
//! Talks to the public quoteSummary JSON endpoint directly; the response
//! carries the website, the long business summary, and the financial
//! figures the enrichment stage wants.

use serde::Deserialize;
use tracing::debug;

use company_graph_core::constants::YAHOO_RATE_LIMIT;
use company_graph_core::domain::{is_infrastructure_domain, normalize_domain};
use company_graph_core::error::{AppError, AppResult};
use company_graph_core::models::DomainResult;
use company_graph_core::rate_limiter::limiter_for;

use crate::context::{SourceContext, BROWSER_USER_AGENT};

pub const YAHOO_BASE: &str = "https://query1.finance.yahoo.com";

#[derive(Debug, Deserialize)]
struct QuoteSummaryEnvelope {
    #[serde(rename = "quoteSummary")]
    quote_summary: QuoteSummaryBody,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteSummaryBody {
    #[serde(default)]
    result: Option<Vec<QuoteSummaryResult>>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteSummaryResult {
    #[serde(default, rename = "assetProfile")]
    asset_profile: Option<AssetProfile>,
    #[serde(default)]
    price: Option<PriceModule>,
    #[serde(default, rename = "financialData")]
    financial_data: Option<FinancialData>,
}

#[derive(Debug, Default, Deserialize)]
struct AssetProfile {
    #[serde(default)]
    website: Option<String>,
    #[serde(default)]
    sector: Option<String>,
    #[serde(default)]
    industry: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default, rename = "fullTimeEmployees")]
    full_time_employees: Option<i64>,
    #[serde(default, rename = "longBusinessSummary")]
    long_business_summary: Option<String>,
}

/// Yahoo wraps numbers as `{"raw": 123, "fmt": "123"}`.
#[derive(Debug, Default, Deserialize)]
struct RawValue {
    #[serde(default)]
    raw: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct PriceModule {
    #[serde(default, rename = "marketCap")]
    market_cap: Option<RawValue>,
    #[serde(default, rename = "regularMarketPrice")]
    regular_market_price: Option<RawValue>,
}

#[derive(Debug, Default, Deserialize)]
struct FinancialData {
    #[serde(default, rename = "totalRevenue")]
    total_revenue: Option<RawValue>,
}

/// Flattened company profile from Yahoo Finance.
#[derive(Debug, Clone, Default)]
pub struct YahooProfile {
    pub website: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub market_cap: Option<i64>,
    pub revenue: Option<i64>,
    pub employees: Option<i64>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub description: Option<String>,
}

pub async fn fetch_profile(
    ctx: &SourceContext,
    base: &str,
    ticker: &str,
) -> AppResult<Option<YahooProfile>> {
    limiter_for("yahoo", YAHOO_RATE_LIMIT)?.acquire().await;

    let url = format!(
        "{base}/v10/finance/quoteSummary/{ticker}?modules=assetProfile,price,financialData"
    );
    let response = ctx
        .http
        .get(&url)
        .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
        .send()
        .await?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !response.status().is_success() {
        return Err(AppError::ExternalApiError(format!(
            "Yahoo Finance returned {} for {ticker}",
            response.status()
        )));
    }

    let envelope: QuoteSummaryEnvelope = response.json().await?;
    let Some(result) = envelope
        .quote_summary
        .result
        .and_then(|mut results| if results.is_empty() { None } else { Some(results.remove(0)) })
    else {
        return Ok(None);
    };

    // No market price at all usually means a delisted or bogus symbol.
    let has_price = result
        .price
        .as_ref()
        .and_then(|p| p.regular_market_price.as_ref())
        .and_then(|v| v.raw)
        .is_some();
    let profile = result.asset_profile.unwrap_or_default();
    if !has_price && profile.website.is_none() && profile.long_business_summary.is_none() {
        return Ok(None);
    }

    let description = profile
        .long_business_summary
        .map(|d| d.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|d| !d.is_empty());

    Ok(Some(YahooProfile {
        website: profile.website,
        sector: profile.sector,
        industry: profile.industry,
        market_cap: result
            .price
            .and_then(|p| p.market_cap)
            .and_then(|v| v.raw)
            .map(|v| v as i64),
        revenue: result
            .financial_data
            .and_then(|f| f.total_revenue)
            .and_then(|v| v.raw)
            .map(|v| v as i64),
        employees: profile.full_time_employees,
        city: profile.city,
        state: profile.state,
        country: profile.country,
        description,
    }))
}

/// Get domain and description from Yahoo Finance (high confidence source).
pub async fn domain_from_yahoo(ctx: &SourceContext, ticker: &str) -> DomainResult {
    domain_from_yahoo_at(ctx, YAHOO_BASE, ticker).await
}

pub async fn domain_from_yahoo_at(ctx: &SourceContext, base: &str, ticker: &str) -> DomainResult {
    let profile = match fetch_profile(ctx, base, ticker).await {
        Ok(Some(profile)) => profile,
        Ok(None) => {
            debug!(ticker, "Yahoo Finance: symbol not found");
            return DomainResult::empty("yfinance");
        }
        Err(e) => {
            debug!(ticker, error = %e, "Yahoo Finance lookup failed");
            return DomainResult::empty("yfinance");
        }
    };

    let Some(raw_website) = profile.website.as_deref() else {
        return DomainResult::empty("yfinance").with_description(profile.description);
    };

    match normalize_domain(raw_website) {
        Some(domain) if !is_infrastructure_domain(&domain) => {
            DomainResult::found(domain, "yfinance", 0.9)
                .with_description(profile.description)
                .with_metadata("raw_website", raw_website)
        }
        _ => DomainResult::empty("yfinance").with_description(profile.description),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(website: &str) -> String {
        format!(
            r#"{{"quoteSummary":{{"result":[{{
                "assetProfile":{{
                    "website":"{website}",
                    "sector":"Technology",
                    "industry":"Consumer Electronics",
                    "city":"Cupertino","state":"CA","country":"United States",
                    "fullTimeEmployees":161000,
                    "longBusinessSummary":"Apple Inc. designs   smartphones."
                }},
                "price":{{"marketCap":{{"raw":2900000000000}},"regularMarketPrice":{{"raw":190.1}}}},
                "financialData":{{"totalRevenue":{{"raw":383285000000}}}}
            }}],"error":null}}}}"#
        )
    }

    #[tokio::test]
    async fn parses_profile_and_normalizes_domain() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock(
                "GET",
                "/v10/finance/quoteSummary/AAPL?modules=assetProfile,price,financialData",
            )
            .with_status(200)
            .with_body(body("https://www.apple.com"))
            .create_async()
            .await;

        let ctx = SourceContext::for_tests();
        let result = domain_from_yahoo_at(&ctx, &server.url(), "AAPL").await;
        assert_eq!(result.domain.as_deref(), Some("apple.com"));
        assert!((result.confidence - 0.9).abs() < 1e-9);
        // Whitespace in the description is collapsed, text kept in full.
        assert_eq!(
            result.description.as_deref(),
            Some("Apple Inc. designs smartphones.")
        );
    }

    #[tokio::test]
    async fn infrastructure_domains_are_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock(
                "GET",
                "/v10/finance/quoteSummary/BAD?modules=assetProfile,price,financialData",
            )
            .with_status(200)
            .with_body(body("https://finance.yahoo.com"))
            .create_async()
            .await;

        let ctx = SourceContext::for_tests();
        let result = domain_from_yahoo_at(&ctx, &server.url(), "BAD").await;
        assert!(result.domain.is_none());
    }

    #[tokio::test]
    async fn profile_carries_financials() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock(
                "GET",
                "/v10/finance/quoteSummary/AAPL?modules=assetProfile,price,financialData",
            )
            .with_status(200)
            .with_body(body("https://www.apple.com"))
            .create_async()
            .await;

        let ctx = SourceContext::for_tests();
        let profile = fetch_profile(&ctx, &server.url(), "AAPL").await.unwrap().unwrap();
        assert_eq!(profile.market_cap, Some(2_900_000_000_000));
        assert_eq!(profile.revenue, Some(383_285_000_000));
        assert_eq!(profile.employees, Some(161_000));
        assert_eq!(profile.sector.as_deref(), Some("Technology"));
    }
}
