use std::path::PathBuf;

use crate::error::{AppError, AppResult};

/// Connection settings for the graph database.
#[derive(Debug, Clone)]
pub struct GraphSettings {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: Option<String>,
}

/// **Pipeline Configuration**
///
/// All configuration comes from environment variables (a `.env` file is
/// honored via dotenvy). Missing optional API keys silently disable the
/// corresponding source; missing graph credentials only fail the stages
/// that need the graph.
#[derive(Debug, Clone)]
pub struct Config {
    /// Graph connection, if NEO4J_URI/NEO4J_USER/NEO4J_PASSWORD are set
    graph: Option<GraphSettings>,

    /// Embedding provider API key (OPENAI_API_KEY)
    pub openai_api_key: Option<String>,

    /// Commercial filing-archive provider key (FILING_PROVIDER_API_KEY)
    pub filing_provider_api_key: Option<String>,

    /// Finnhub API key (FINNHUB_API_KEY)
    pub finnhub_api_key: Option<String>,

    /// User-Agent sent to SEC EDGAR (SEC_USER_AGENT)
    pub sec_user_agent: String,

    /// Root data directory (DATA_DIR, default "data")
    pub data_dir: PathBuf,
}

impl Config {
    /// Load configuration from the environment.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let graph = match (
            std::env::var("NEO4J_URI"),
            std::env::var("NEO4J_USER"),
            std::env::var("NEO4J_PASSWORD"),
        ) {
            (Ok(uri), Ok(user), Ok(password)) => Some(GraphSettings {
                uri,
                user,
                password,
                database: std::env::var("NEO4J_DATABASE").ok(),
            }),
            _ => None,
        };

        let data_dir = std::env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data"));

        Self {
            graph,
            openai_api_key: non_empty_env("OPENAI_API_KEY"),
            filing_provider_api_key: non_empty_env("FILING_PROVIDER_API_KEY"),
            finnhub_api_key: non_empty_env("FINNHUB_API_KEY"),
            sec_user_agent: std::env::var("SEC_USER_AGENT").unwrap_or_else(|_| {
                "company-graph pipeline (contact: admin@example.com)".to_string()
            }),
            data_dir,
        }
    }

    /// Graph settings, or a fatal configuration error for stages that
    /// cannot run without the graph.
    pub fn graph(&self) -> AppResult<&GraphSettings> {
        self.graph.as_ref().ok_or_else(|| {
            AppError::ConfigError(
                "NEO4J_URI, NEO4J_USER and NEO4J_PASSWORD must be set".to_string(),
            )
        })
    }

    pub fn has_graph(&self) -> bool {
        self.graph.is_some()
    }

    /// Directory backing the artifact cache.
    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }

    /// Raw downloaded archives, one subdirectory per CIK (`10k_{cik}`).
    pub fn portfolios_dir(&self) -> PathBuf {
        self.data_dir.join("10k_portfolios")
    }

    /// Extracted primary documents, `{cik}/10k_{year}.html`.
    pub fn filings_dir(&self) -> PathBuf {
        self.data_dir.join("10k_filings")
    }

    pub fn logs_dir(&self) -> PathBuf {
        PathBuf::from("logs")
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_graph_settings_is_a_config_error() {
        let config = Config {
            graph: None,
            openai_api_key: None,
            filing_provider_api_key: None,
            finnhub_api_key: None,
            sec_user_agent: "test".to_string(),
            data_dir: PathBuf::from("data"),
        };
        assert!(matches!(config.graph(), Err(AppError::ConfigError(_))));
        assert!(!config.has_graph());
    }

    #[test]
    fn data_layout_is_rooted_at_data_dir() {
        let config = Config {
            graph: None,
            openai_api_key: None,
            filing_provider_api_key: None,
            finnhub_api_key: None,
            sec_user_agent: "test".to_string(),
            data_dir: PathBuf::from("/tmp/cg"),
        };
        assert_eq!(config.cache_dir(), PathBuf::from("/tmp/cg/cache"));
        assert_eq!(config.portfolios_dir(), PathBuf::from("/tmp/cg/10k_portfolios"));
        assert_eq!(config.filings_dir(), PathBuf::from("/tmp/cg/10k_filings"));
    }
}
