use std::sync::Arc;

use anyhow::{Context, Result};

use company_graph_core::{AppCache, Config};
use company_graph_neo4j::GraphClient;
use company_graph_sources::SourceContext;

/// Explicit dependencies for every stage: configuration, the artifact
/// cache, and the HTTP source context. Constructed once at process start
/// and passed through; test code builds its own with alternates.
pub struct AppContext {
    pub config: Config,
    pub cache: Arc<AppCache>,
    pub sources: SourceContext,
}

impl AppContext {
    pub fn new() -> Result<Self> {
        let config = Config::from_env();
        let cache = Arc::new(
            AppCache::open(&config.cache_dir()).context("failed to open the artifact cache")?,
        );
        let sources =
            SourceContext::new(&config).context("failed to build the HTTP source context")?;
        Ok(Self {
            config,
            cache,
            sources,
        })
    }

    /// Connect to the graph; missing settings or an unreachable database
    /// are fatal for the calling stage.
    pub async fn graph(&self) -> Result<GraphClient> {
        let settings = self.config.graph()?;
        GraphClient::connect(settings)
            .await
            .context("failed to connect to the graph database")
    }

    /// Worker-pool size: explicit flag, else 16 with the commercial
    /// provider configured, else 8.
    pub fn workers(&self, requested: Option<usize>) -> usize {
        use company_graph_core::constants::{DEFAULT_WORKERS, DEFAULT_WORKERS_WITH_API};
        requested.unwrap_or(if self.config.filing_provider_api_key.is_some() {
            DEFAULT_WORKERS_WITH_API
        } else {
            DEFAULT_WORKERS
        })
    }
}
