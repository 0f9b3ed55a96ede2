//! Centralized defaults shared across pipeline stages.

/// Batch size for node creation
pub const BATCH_SIZE_NODES: usize = 1000;
/// Batch size for relationship creation
pub const BATCH_SIZE_RELATIONSHIPS: usize = 5000;
/// Batch size for relationship deletion
pub const BATCH_SIZE_DELETE: usize = 10000;

/// Similarity defaults
pub const DEFAULT_TOP_K: usize = 50;
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.7;
pub const DESCRIPTION_SIMILARITY_THRESHOLD: f32 = 0.6;

/// Descriptions shorter than this produce degenerate exact matches
/// (boilerplate "N/A" style text) and are skipped for similarity.
pub const MIN_DESCRIPTION_LENGTH_FOR_SIMILARITY: usize = 200;

/// Embedding defaults
pub const EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const EMBEDDING_DIMENSION: usize = 1536;

/// API rate limits (requests per second)
pub const SEC_EDGAR_RATE_LIMIT: f64 = 10.0;
/// SEC long-duration average for bulk downloads
pub const SEC_EDGAR_LONG_DURATION_LIMIT: f64 = 5.0;
pub const FINVIZ_RATE_LIMIT: f64 = 5.0;
/// Finnhub free tier: 60 req/min
pub const FINNHUB_RATE_LIMIT: f64 = 1.0;
pub const YAHOO_RATE_LIMIT: f64 = 10.0;
pub const EMBEDDING_RATE_LIMIT: f64 = 100.0;

/// Cache TTLs in days
pub const CACHE_TTL_COMPANY_DOMAINS: u32 = 30;
pub const CACHE_TTL_COMPANY_PROPERTIES: u32 = 30;
pub const CACHE_TTL_10K_EXTRACTED: u32 = 365;
pub const CACHE_TTL_NEGATIVE_RESULT: u32 = 7;

/// Cache namespaces
pub const NS_COMPANY_DOMAINS: &str = "company_domains";
pub const NS_COMPANY_PROPERTIES: &str = "company_properties";
pub const NS_10K_EXTRACTED: &str = "10k_extracted";
pub const NS_EMBEDDINGS: &str = "embeddings";

/// Parallelism defaults
pub const DEFAULT_WORKERS: usize = 8;
/// More workers are safe when the commercial provider absorbs the load
pub const DEFAULT_WORKERS_WITH_API: usize = 16;

/// Domain consensus
pub const DEFAULT_EARLY_STOP_CONFIDENCE: f64 = 0.75;
/// Per-source timeout in seconds
pub const SOURCE_TIMEOUT_SECS: u64 = 30;

/// Source weights for domain consensus voting (higher = more reliable)
pub fn source_weight(source: &str) -> f64 {
    match source {
        "yfinance" => 3.0,
        "sec_edgar" => 2.5,
        "finviz" => 2.0,
        "finnhub" => 1.0,
        _ => 1.0,
    }
}

/// Sum of all source weights (denominator for early-stop confidence)
pub fn total_source_weight() -> f64 {
    source_weight("yfinance")
        + source_weight("sec_edgar")
        + source_weight("finviz")
        + source_weight("finnhub")
}
