//! Finnhub company profile source (incomplete coverage, weight 1.0).
//! Disabled entirely when no API key is configured.

use serde::Deserialize;
use tracing::debug;

use company_graph_core::constants::FINNHUB_RATE_LIMIT;
use company_graph_core::domain::{is_infrastructure_domain, normalize_domain};
use company_graph_core::models::DomainResult;
use company_graph_core::rate_limiter::limiter_for;

use crate::context::SourceContext;

pub const FINNHUB_BASE: &str = "https://finnhub.io";

#[derive(Debug, Default, Deserialize)]
struct FinnhubProfile {
    #[serde(default)]
    weburl: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, rename = "finnhubIndustry")]
    finnhub_industry: Option<String>,
}

/// Get domain and description from Finnhub (low confidence).
pub async fn domain_from_finnhub(ctx: &SourceContext, ticker: &str) -> DomainResult {
    domain_from_finnhub_at(ctx, FINNHUB_BASE, ticker).await
}

pub async fn domain_from_finnhub_at(
    ctx: &SourceContext,
    base: &str,
    ticker: &str,
) -> DomainResult {
    let Some(api_key) = ctx.finnhub_api_key.as_deref() else {
        return DomainResult::empty("finnhub");
    };

    if let Ok(limiter) = limiter_for("finnhub", FINNHUB_RATE_LIMIT) {
        limiter.acquire().await;
    }

    let url = format!("{base}/api/v1/stock/profile2?symbol={ticker}&token={api_key}");
    let profile: FinnhubProfile = match ctx.http.get(&url).send().await {
        Ok(response) if response.status().is_success() => match response.json().await {
            Ok(profile) => profile,
            Err(e) => {
                debug!(ticker, error = %e, "Finnhub body parse failed");
                return DomainResult::empty("finnhub");
            }
        },
        Ok(response) => {
            debug!(ticker, status = %response.status(), "Finnhub returned non-success");
            return DomainResult::empty("finnhub");
        }
        Err(e) => {
            debug!(ticker, error = %e, "Finnhub request failed");
            return DomainResult::empty("finnhub");
        }
    };

    let description = profile
        .description
        .or(profile.finnhub_industry)
        .map(|d| d.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|d| !d.is_empty());

    if let Some(weburl) = profile.weburl.as_deref() {
        if let Some(domain) = normalize_domain(weburl) {
            if !is_infrastructure_domain(&domain) {
                return DomainResult::found(domain, "finnhub", 0.6).with_description(description);
            }
        }
    }

    DomainResult::empty("finnhub").with_description(description)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_api_key_disables_the_source() {
        let ctx = SourceContext::for_tests();
        let result = domain_from_finnhub_at(&ctx, "http://127.0.0.1:1", "AAPL").await;
        assert!(result.domain.is_none());
        assert_eq!(result.confidence, 0.0);
    }

    #[tokio::test]
    async fn parses_weburl_when_keyed() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v1/stock/profile2?symbol=AAPL&token=test-key")
            .with_status(200)
            .with_body(r#"{"weburl":"https://www.apple.com/","finnhubIndustry":"Technology"}"#)
            .create_async()
            .await;

        let mut ctx = SourceContext::for_tests();
        ctx.finnhub_api_key = Some("test-key".to_string());
        let result = domain_from_finnhub_at(&ctx, &server.url(), "AAPL").await;
        assert_eq!(result.domain.as_deref(), Some("apple.com"));
        assert!((result.confidence - 0.6).abs() < 1e-9);
        assert_eq!(result.description.as_deref(), Some("Technology"));
    }
}
