use std::time::Duration;

use company_graph_core::error::AppResult;
use company_graph_core::Config;

/// Browser User-Agent for sources that reject obvious bots (Finviz, Yahoo).
pub(crate) const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Shared dependencies for all domain sources: the pooled HTTP client and
/// the per-source credentials. Constructed once at stage startup and
/// passed through rather than reached for globally.
#[derive(Debug, Clone)]
pub struct SourceContext {
    pub http: reqwest::Client,
    pub sec_user_agent: String,
    pub finnhub_api_key: Option<String>,
}

impl SourceContext {
    pub fn new(config: &Config) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            sec_user_agent: config.sec_user_agent.clone(),
            finnhub_api_key: config.finnhub_api_key.clone(),
        })
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            http: reqwest::Client::new(),
            sec_user_agent: "company-graph tests".to_string(),
            finnhub_api_key: None,
        }
    }
}
