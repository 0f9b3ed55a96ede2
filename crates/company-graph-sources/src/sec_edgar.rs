//! SEC EDGAR submissions API: company metadata and the sec_edgar domain
//! source (authoritative but slower, weight 2.5).

use serde::Deserialize;
use tracing::debug;

use company_graph_core::constants::SEC_EDGAR_RATE_LIMIT;
use company_graph_core::domain::{is_infrastructure_domain, normalize_domain};
use company_graph_core::error::{AppError, AppResult};
use company_graph_core::models::DomainResult;
use company_graph_core::rate_limiter::limiter_for;

use crate::context::SourceContext;

pub const SEC_DATA_BASE: &str = "https://data.sec.gov";
pub const SEC_WWW_BASE: &str = "https://www.sec.gov";

/// Subset of `submissions/CIK{cik}.json` the pipeline consumes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompanySubmissions {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tickers: Vec<String>,
    #[serde(default)]
    pub sic: Option<String>,
    #[serde(default, rename = "sicDescription")]
    pub sic_description: Option<String>,
    #[serde(default)]
    pub naics: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default, rename = "investorWebsite")]
    pub investor_website: Option<String>,
    #[serde(default, rename = "fiscalYearEnd")]
    pub fiscal_year_end: Option<String>,
    #[serde(default)]
    pub filings: SubmissionFilings,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmissionFilings {
    #[serde(default)]
    pub recent: RecentFilings,
}

/// Column-oriented arrays; index i describes one filing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecentFilings {
    #[serde(default, rename = "accessionNumber")]
    pub accession_number: Vec<String>,
    #[serde(default, rename = "filingDate")]
    pub filing_date: Vec<String>,
    #[serde(default)]
    pub form: Vec<String>,
    #[serde(default, rename = "primaryDocument")]
    pub primary_document: Vec<String>,
}

impl RecentFilings {
    /// Iterate (accession_number, filing_date, form, primary_document).
    pub fn rows(&self) -> impl Iterator<Item = (&str, &str, &str, Option<&str>)> {
        self.accession_number
            .iter()
            .zip(self.filing_date.iter())
            .zip(self.form.iter())
            .enumerate()
            .map(move |(i, ((accession, date), form))| {
                (
                    accession.as_str(),
                    date.as_str(),
                    form.as_str(),
                    self.primary_document.get(i).map(String::as_str),
                )
            })
    }
}

pub fn submissions_url(base: &str, cik: &str) -> String {
    format!("{base}/submissions/CIK{cik:0>10}.json")
}

#[derive(Debug, Deserialize)]
struct TickerRow {
    cik_str: u64,
    ticker: String,
    title: String,
}

/// Fetch the full SEC company universe (`company_tickers.json`), sorted by
/// CIK for deterministic fan-out order.
pub async fn fetch_company_universe(
    ctx: &SourceContext,
    base: &str,
) -> AppResult<Vec<company_graph_core::models::CompanyListing>> {
    limiter_for("sec_edgar", SEC_EDGAR_RATE_LIMIT)?.acquire().await;

    let url = format!("{base}/files/company_tickers.json");
    let response = ctx
        .http
        .get(&url)
        .header(reqwest::header::USER_AGENT, &ctx.sec_user_agent)
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(AppError::ExternalApiError(format!(
            "company_tickers.json returned {}",
            response.status()
        )));
    }

    let rows: std::collections::HashMap<String, TickerRow> = response.json().await?;
    let mut listings: Vec<_> = rows
        .into_values()
        .map(|row| {
            company_graph_core::models::CompanyListing::new(row.cik_str, &row.ticker, &row.title)
        })
        .collect();
    listings.sort_by(|a, b| a.cik.cmp(&b.cik));
    listings.dedup_by(|a, b| a.cik == b.cik);
    Ok(listings)
}

/// Fetch the submissions record for a CIK. 404 maps to `NotFound`, which
/// callers cache as a negative result rather than retry.
pub async fn fetch_submissions(
    ctx: &SourceContext,
    base: &str,
    cik: &str,
) -> AppResult<CompanySubmissions> {
    limiter_for("sec_edgar", SEC_EDGAR_RATE_LIMIT)?.acquire().await;

    let url = submissions_url(base, cik);
    let response = ctx
        .http
        .get(&url)
        .header(reqwest::header::USER_AGENT, &ctx.sec_user_agent)
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Err(AppError::NotFound(format!("no submissions for CIK {cik}")));
    }
    if !response.status().is_success() {
        return Err(AppError::ExternalApiError(format!(
            "SEC submissions returned {} for CIK {cik}",
            response.status()
        )));
    }

    Ok(response.json().await?)
}

/// Get domain from SEC EDGAR's website fields.
pub async fn domain_from_sec(ctx: &SourceContext, cik: &str, ticker: &str) -> DomainResult {
    domain_from_sec_at(ctx, SEC_DATA_BASE, cik, ticker).await
}

pub async fn domain_from_sec_at(
    ctx: &SourceContext,
    base: &str,
    cik: &str,
    ticker: &str,
) -> DomainResult {
    let submissions = match fetch_submissions(ctx, base, cik).await {
        Ok(submissions) => submissions,
        Err(e) => {
            debug!(ticker, cik, error = %e, "SEC submissions lookup failed");
            return DomainResult::empty("sec_edgar");
        }
    };

    if let Some(website) = submissions.website.as_deref() {
        if let Some(domain) = normalize_domain(website) {
            if !is_infrastructure_domain(&domain) {
                return DomainResult::found(domain, "sec_edgar", 0.85)
                    .with_metadata("field", "website");
            }
        }
    }

    // Sometimes only the investor-relations site is populated.
    if let Some(investor) = submissions.investor_website.as_deref() {
        if let Some(domain) = normalize_domain(investor) {
            if !is_infrastructure_domain(&domain) {
                let domain = domain
                    .strip_prefix("investor.")
                    .map(str::to_string)
                    .unwrap_or(domain);
                return DomainResult::found(domain, "sec_edgar", 0.75)
                    .with_metadata("field", "investorWebsite");
            }
        }
    }

    DomainResult::empty("sec_edgar")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submissions_body(website: &str, investor: &str) -> String {
        format!(
            r#"{{
                "name": "APPLE INC",
                "tickers": ["AAPL"],
                "sic": "3571",
                "sicDescription": "Electronic Computers",
                "website": "{website}",
                "investorWebsite": "{investor}",
                "fiscalYearEnd": "0927",
                "filings": {{"recent": {{
                    "accessionNumber": ["0000320193-23-000106"],
                    "filingDate": ["2023-11-03"],
                    "form": ["10-K"],
                    "primaryDocument": ["aapl-20230930.htm"]
                }}}}
            }}"#
        )
    }

    #[tokio::test]
    async fn extracts_domain_from_website_field() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/submissions/CIK0000320193.json")
            .with_status(200)
            .with_body(submissions_body("https://www.apple.com", ""))
            .create_async()
            .await;

        let ctx = SourceContext::for_tests();
        let result = domain_from_sec_at(&ctx, &server.url(), "0000320193", "AAPL").await;
        assert_eq!(result.domain.as_deref(), Some("apple.com"));
        assert_eq!(result.source, "sec_edgar");
        assert!((result.confidence - 0.85).abs() < 1e-9);
    }

    #[tokio::test]
    async fn falls_back_to_investor_website() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/submissions/CIK0000320193.json")
            .with_status(200)
            .with_body(submissions_body("", "https://investor.apple.com"))
            .create_async()
            .await;

        let ctx = SourceContext::for_tests();
        let result = domain_from_sec_at(&ctx, &server.url(), "0000320193", "AAPL").await;
        assert_eq!(result.domain.as_deref(), Some("apple.com"));
        assert!((result.confidence - 0.75).abs() < 1e-9);
    }

    #[tokio::test]
    async fn missing_company_is_a_non_response() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/submissions/CIK0000000001.json")
            .with_status(404)
            .create_async()
            .await;

        let ctx = SourceContext::for_tests();
        let result = domain_from_sec_at(&ctx, &server.url(), "0000000001", "NONE").await;
        assert!(result.domain.is_none());
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn recent_filings_rows_zip_columns() {
        let recent = RecentFilings {
            accession_number: vec!["a1".into(), "a2".into()],
            filing_date: vec!["2024-01-01".into(), "2022-06-30".into()],
            form: vec!["10-K".into(), "8-K".into()],
            primary_document: vec!["doc1.htm".into()],
        };
        let rows: Vec<_> = recent.rows().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], ("a1", "2024-01-01", "10-K", Some("doc1.htm")));
        assert_eq!(rows[1], ("a2", "2022-06-30", "8-K", None));
    }
}
