//! Finviz quote-page scrape (medium confidence source, weight 2.0).

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use company_graph_core::constants::FINVIZ_RATE_LIMIT;
use company_graph_core::domain::{is_infrastructure_domain, normalize_domain};
use company_graph_core::models::DomainResult;
use company_graph_core::rate_limiter::limiter_for;

use crate::context::{SourceContext, BROWSER_USER_AGENT};

pub const FINVIZ_BASE: &str = "https://finviz.com";

/// The quote page lists the website in a table row:
/// `<td>Website</td><td><a href="https://www.company.com">...</a></td>`.
/// Anchored on the label so Yahoo/Google chart links nearby don't match.
static WEBSITE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)Website["']?\s*</td>\s*<td[^>]*>\s*<a[^>]*href=["'](https?://(?:www\.)?([a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?(?:\.[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?)+))"#,
    )
    .unwrap()
});

/// Get domain from Finviz (medium confidence source).
pub async fn domain_from_finviz(ctx: &SourceContext, ticker: &str) -> DomainResult {
    domain_from_finviz_at(ctx, FINVIZ_BASE, ticker).await
}

pub async fn domain_from_finviz_at(ctx: &SourceContext, base: &str, ticker: &str) -> DomainResult {
    if let Ok(limiter) = limiter_for("finviz", FINVIZ_RATE_LIMIT) {
        limiter.acquire().await;
    }

    let url = format!("{base}/quote.ashx?t={ticker}");
    let response = match ctx
        .http
        .get(&url)
        .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            debug!(ticker, error = %e, "Finviz request failed");
            return DomainResult::empty("finviz");
        }
    };

    if !response.status().is_success() {
        debug!(ticker, status = %response.status(), "Finviz returned non-success");
        return DomainResult::empty("finviz");
    }

    let html = match response.text().await {
        Ok(html) => html,
        Err(e) => {
            debug!(ticker, error = %e, "Finviz body read failed");
            return DomainResult::empty("finviz");
        }
    };

    if let Some(captures) = WEBSITE_RE.captures(&html) {
        if let Some(domain) = normalize_domain(&captures[1]) {
            if !is_infrastructure_domain(&domain)
                && !domain.contains("finviz.com")
                && !domain.contains("yahoo.com")
                && !domain.contains("google.com")
            {
                return DomainResult::found(domain, "finviz", 0.7);
            }
        }
    }

    DomainResult::empty("finviz")
}
