use thiserror::Error;

/// Application-specific error types
///
/// Per-entity failures stay local to the worker that hit them; only
/// configuration and stage-level errors propagate to the CLI entry point.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] rusqlite::Error),

    #[error("Graph database error: {0}")]
    Graph(#[from] neo4rs::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Security error: {0}")]
    SecurityError(String),

    #[error("External API error: {0}")]
    ExternalApiError(String),

    #[error("Parser error: {0}")]
    ParserError(String),

    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("Archive error: {0}")]
    ArchiveError(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Whether a retry could plausibly succeed.
    ///
    /// Only network/timeout-class failures qualify; "not found" and
    /// structural errors are cached as negative results instead.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::HttpClient(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| s.is_server_error())
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_http_errors_are_not_transient() {
        assert!(!AppError::NotFound("x".into()).is_transient());
        assert!(!AppError::ValidationError("x".into()).is_transient());
        assert!(!AppError::ParserError("x".into()).is_transient());
    }
}
