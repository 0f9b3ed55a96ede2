//! `company-graph`: one subcommand per pipeline stage.
//!
//! Every mutating stage is a dry-run by default; pass `--execute` to act.
//! Exit code 0 on success, non-zero on configuration or connection
//! failure.

mod commands;
mod context;
mod logging;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use context::AppContext;

#[derive(Parser)]
#[command(name = "company-graph")]
#[command(about = "SEC EDGAR public-company knowledge graph pipeline")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by every pipeline stage.
#[derive(Args, Debug, Clone)]
struct CommonArgs {
    /// Apply changes. Without this flag the stage plans but performs no
    /// side effects.
    #[arg(long)]
    execute: bool,

    /// Process at most this many entities
    #[arg(long)]
    limit: Option<usize>,

    /// Worker pool size (default 8; 16 when the commercial provider key
    /// is configured)
    #[arg(long)]
    workers: Option<usize>,

    /// Batch size for graph writes
    #[arg(long)]
    batch_size: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision constraints/indexes and load the domain-status layer
    Bootstrap {
        #[command(flatten)]
        common: CommonArgs,

        /// JSONL export of Domain records
        #[arg(long)]
        domains_file: Option<PathBuf>,

        /// JSONL export of domain-to-technology mappings
        #[arg(long)]
        technologies_file: Option<PathBuf>,
    },

    /// Load the SEC company universe into Company nodes
    LoadCompanies {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Multi-source weighted domain consensus per company
    CollectDomains {
        #[command(flatten)]
        common: CommonArgs,

        /// Early-stop confidence threshold
        #[arg(long, default_value_t = company_graph_core::constants::DEFAULT_EARLY_STOP_CONFIDENCE)]
        early_stop: f64,
    },

    /// Download 10-K archives and extract primary documents
    DownloadFilings {
        #[command(flatten)]
        common: CommonArgs,

        /// Earliest filing date to accept (YYYY-MM-DD)
        #[arg(long)]
        filing_date_start: Option<chrono::NaiveDate>,

        /// Latest filing date to accept (YYYY-MM-DD)
        #[arg(long)]
        filing_date_end: Option<chrono::NaiveDate>,

        /// Purge the selected CIKs' archives and re-download
        #[arg(long)]
        force: bool,

        /// Skip the free availability pre-check
        #[arg(long)]
        no_pre_check: bool,

        /// Take the CIK set from the graph instead of company_tickers.json
        #[arg(long)]
        from_neo4j: bool,
    },

    /// Run the field extractors over downloaded filings
    ExtractFilings {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Merge SEC and Yahoo company properties
    EnrichCompanies {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Build the Document/Chunk layer and embed chunks
    Graphrag {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Compute SIMILAR_* edges from stored embeddings
    Similarity {
        #[command(flatten)]
        common: CommonArgs,

        /// Similarity threshold override
        #[arg(long)]
        threshold: Option<f32>,

        /// Top-K neighbors per node
        #[arg(long, default_value_t = company_graph_core::constants::DEFAULT_TOP_K)]
        top_k: usize,
    },

    /// Retrieve context for a question (synthesis is external)
    Ask {
        /// The question text
        question: String,

        /// Focus retrieval on one ticker
        #[arg(long)]
        ticker: Option<String>,

        /// Maximum chunks in the composed context
        #[arg(long, default_value_t = 5)]
        max_chunks: usize,

        /// Maximum graph traversal depth
        #[arg(long, default_value_t = 2)]
        max_hops: usize,

        /// Disable graph traversal (vector search only)
        #[arg(long)]
        no_graph: bool,
    },

    /// Show artifact cache statistics
    CacheStats {
        /// Clear this namespace before reporting
        #[arg(long)]
        clear_namespace: Option<String>,
    },
}

impl Commands {
    fn stage_name(&self) -> &'static str {
        match self {
            Commands::Bootstrap { .. } => "bootstrap",
            Commands::LoadCompanies { .. } => "load_companies",
            Commands::CollectDomains { .. } => "collect_domains",
            Commands::DownloadFilings { .. } => "download_filings",
            Commands::ExtractFilings { .. } => "extract_filings",
            Commands::EnrichCompanies { .. } => "enrich_companies",
            Commands::Graphrag { .. } => "graphrag",
            Commands::Similarity { .. } => "similarity",
            Commands::Ask { .. } => "ask",
            Commands::CacheStats { .. } => "cache_stats",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let ctx = AppContext::new()?;
    logging::init_stage_logging(cli.command.stage_name(), &ctx.config.logs_dir())?;

    match cli.command {
        Commands::Bootstrap {
            common,
            domains_file,
            technologies_file,
        } => commands::bootstrap::run(&ctx, &common, domains_file, technologies_file).await,
        Commands::LoadCompanies { common } => commands::load_companies::run(&ctx, &common).await,
        Commands::CollectDomains { common, early_stop } => {
            commands::collect_domains::run(&ctx, &common, early_stop).await
        }
        Commands::DownloadFilings {
            common,
            filing_date_start,
            filing_date_end,
            force,
            no_pre_check,
            from_neo4j,
        } => {
            commands::download_filings::run(
                &ctx,
                &common,
                filing_date_start,
                filing_date_end,
                force,
                no_pre_check,
                from_neo4j,
            )
            .await
        }
        Commands::ExtractFilings { common } => commands::extract_filings::run(&ctx, &common).await,
        Commands::EnrichCompanies { common } => commands::enrich::run(&ctx, &common).await,
        Commands::Graphrag { common } => commands::graphrag::run(&ctx, &common).await,
        Commands::Similarity {
            common,
            threshold,
            top_k,
        } => commands::similarity::run(&ctx, &common, threshold, top_k).await,
        Commands::Ask {
            question,
            ticker,
            max_chunks,
            max_hops,
            no_graph,
        } => commands::ask::run(&ctx, &question, ticker.as_deref(), max_chunks, max_hops, !no_graph)
            .await,
        Commands::CacheStats { clear_namespace } => {
            commands::cache_stats::run(&ctx, clear_namespace.as_deref())
        }
    }
}
