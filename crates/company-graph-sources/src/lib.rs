//! Domain sources, weighted consensus, and company property enrichment.
//!
//! Four independent sources (Yahoo Finance, Finviz, SEC EDGAR, Finnhub)
//! propose a company's website domain; the consensus module runs them
//! concurrently and settles on a winner by weighted vote with early
//! stopping. The enrichment module merges SEC and Yahoo company
//! properties into one cached record per CIK.

pub mod consensus;
pub mod context;
pub mod enrichment;
pub mod finnhub;
pub mod finviz;
pub mod sec_edgar;
pub mod yahoo;

pub use consensus::collect_domains;
pub use context::SourceContext;
pub use enrichment::enrich_company;
