//! Weighted multi-source domain consensus with early stopping.
//!
//! All registered sources run concurrently. As results arrive, candidate
//! domains accumulate `weight(source) * confidence`; once at least two
//! sources have responded the wait ends early on unanimity or when the
//! weighted confidence clears the early-stop threshold. Source failures
//! and timeouts are non-responses, never errors.

use std::collections::HashMap;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use tracing::debug;

use company_graph_core::constants::{
    source_weight, total_source_weight, SOURCE_TIMEOUT_SECS,
};
use company_graph_core::models::{CompanyResult, DomainResult};

use crate::context::SourceContext;
use crate::{finnhub, finviz, sec_edgar, yahoo};

/// Collect domains for one company from all four sources.
pub async fn collect_domains(
    ctx: &SourceContext,
    cik: &str,
    ticker: &str,
    company_name: &str,
    early_stop_confidence: f64,
) -> CompanyResult {
    let sources: Vec<BoxFuture<'_, DomainResult>> = vec![
        Box::pin(yahoo::domain_from_yahoo(ctx, ticker)),
        Box::pin(finviz::domain_from_finviz(ctx, ticker)),
        Box::pin(sec_edgar::domain_from_sec(ctx, cik, ticker)),
        Box::pin(finnhub::domain_from_finnhub(ctx, ticker)),
    ];
    collect_from_futures(cik, ticker, company_name, sources, early_stop_confidence).await
}

/// Consensus over an explicit set of source futures. Separated from
/// [`collect_domains`] so tests can inject stub sources.
pub async fn collect_from_futures(
    cik: &str,
    ticker: &str,
    company_name: &str,
    sources: Vec<BoxFuture<'_, DomainResult>>,
    early_stop_confidence: f64,
) -> CompanyResult {
    let mut pending: FuturesUnordered<_> = sources
        .into_iter()
        .map(|fut| tokio::time::timeout(Duration::from_secs(SOURCE_TIMEOUT_SECS), fut))
        .collect();

    let mut results: Vec<DomainResult> = Vec::new();
    let mut domain_scores: HashMap<String, f64> = HashMap::new();

    while let Some(outcome) = pending.next().await {
        let result = match outcome {
            Ok(result) => result,
            Err(_elapsed) => {
                // Exceeded sources are silently dropped.
                debug!(ticker, "domain source timed out");
                continue;
            }
        };

        let Some(domain) = result.domain.clone() else {
            continue;
        };

        let weight = source_weight(&result.source);
        *domain_scores.entry(domain).or_insert(0.0) += weight * result.confidence;
        results.push(result);

        if results.len() >= 2 {
            // All responded sources agree on one domain.
            let unanimous = {
                let first = results[0].domain.as_deref();
                results.iter().all(|r| r.domain.as_deref() == first)
            };
            if unanimous {
                break;
            }

            let max_score = domain_scores.values().cloned().fold(0.0, f64::max);
            if max_score / total_source_weight() >= early_stop_confidence {
                break;
            }
        }
    }
    // Dropping `pending` cancels any source still in flight.
    drop(pending);

    consensus_from_results(cik, ticker, company_name, results)
}

/// Fold collected per-source results into the final [`CompanyResult`].
pub fn consensus_from_results(
    cik: &str,
    ticker: &str,
    company_name: &str,
    results: Vec<DomainResult>,
) -> CompanyResult {
    let mut domain_scores: HashMap<String, f64> = HashMap::new();
    let mut domain_votes: HashMap<String, Vec<String>> = HashMap::new();

    for result in &results {
        if let Some(domain) = result.domain.as_ref() {
            let weight = source_weight(&result.source);
            *domain_scores.entry(domain.clone()).or_insert(0.0) += weight * result.confidence;
            domain_votes
                .entry(domain.clone())
                .or_default()
                .push(result.source.clone());
        }
    }

    if domain_scores.is_empty() {
        return CompanyResult::no_domain(cik, ticker, company_name);
    }

    // Winner by weighted score; ties broken by domain name for determinism.
    let (winner_domain, winner_score) = domain_scores
        .iter()
        .max_by(|a, b| {
            a.1.partial_cmp(b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.0.cmp(a.0))
        })
        .map(|(domain, score)| (domain.clone(), *score))
        .unwrap_or_default();

    // Independent weighted vote over (description, source) pairs.
    let mut description_scores: HashMap<String, (f64, String)> = HashMap::new();
    for result in &results {
        if let Some(description) = result.description.as_ref() {
            let weight = source_weight(&result.source) * result.confidence;
            description_scores
                .entry(description.clone())
                .and_modify(|(score, _)| *score += weight)
                .or_insert((weight, result.source.clone()));
        }
    }
    let best_description = description_scores
        .iter()
        .max_by(|a, b| {
            a.1 .0
                .partial_cmp(&b.1 .0)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(description, (_, source))| (description.clone(), source.clone()));

    // Normalize by the sources that actually responded with a domain, so a
    // single confident source on an illiquid ticker still scores well.
    let mut responded: Vec<&str> = results
        .iter()
        .filter(|r| r.domain.is_some())
        .map(|r| r.source.as_str())
        .collect();
    responded.sort_unstable();
    responded.dedup();
    let max_possible: f64 = responded.iter().map(|s| source_weight(s)).sum();

    let confidence = if max_possible > 0.0 {
        (winner_score / max_possible).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let winner_sources = domain_votes.get(&winner_domain).cloned().unwrap_or_default();

    CompanyResult {
        cik: cik.to_string(),
        ticker: ticker.to_string(),
        name: company_name.to_string(),
        domain: Some(winner_domain),
        votes: winner_sources.len(),
        sources: winner_sources,
        confidence,
        all_candidates: domain_votes,
        description: best_description.as_ref().map(|(d, _)| d.clone()),
        description_source: best_description.map(|(_, s)| s),
        no_domain: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn result(domain: Option<&str>, source: &str, confidence: f64) -> DomainResult {
        DomainResult {
            domain: domain.map(str::to_string),
            source: source.to_string(),
            confidence,
            description: None,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn unanimous_sources_win_with_high_confidence() {
        let results = vec![
            result(Some("apple.com"), "yfinance", 0.9),
            result(Some("apple.com"), "sec_edgar", 0.85),
            result(Some("apple.com"), "finviz", 0.7),
            result(Some("apple.com"), "finnhub", 0.6),
        ];
        let consensus = consensus_from_results("0000320193", "AAPL", "Apple Inc.", results);
        assert_eq!(consensus.domain.as_deref(), Some("apple.com"));
        assert!(consensus.confidence >= 0.7);
        assert!(consensus.sources.contains(&"yfinance".to_string()));
        assert!(consensus.sources.contains(&"sec_edgar".to_string()));
        assert_eq!(consensus.votes, 4);
        assert!(!consensus.no_domain);
    }

    #[test]
    fn weighted_vote_breaks_disagreement() {
        // yfinance (3.0 * 0.9) + sec_edgar (2.5 * 0.85) + finnhub (1.0 * 0.6)
        // back apple.com against finviz (2.0 * 0.7) for microsoft.com.
        let results = vec![
            result(Some("apple.com"), "yfinance", 0.9),
            result(Some("microsoft.com"), "finviz", 0.7),
            result(Some("apple.com"), "sec_edgar", 0.85),
            result(Some("apple.com"), "finnhub", 0.6),
        ];
        let consensus = consensus_from_results("0000320193", "AAPL", "Apple Inc.", results);
        assert_eq!(consensus.domain.as_deref(), Some("apple.com"));
        assert!(!consensus.sources.contains(&"finviz".to_string()));
        assert_eq!(
            consensus.all_candidates.get("microsoft.com"),
            Some(&vec!["finviz".to_string()])
        );
    }

    #[test]
    fn zero_candidates_yields_no_domain() {
        let results = vec![
            result(None, "yfinance", 0.0),
            result(None, "finviz", 0.0),
        ];
        let consensus = consensus_from_results("0000000001", "NONE", "Nothing Corp", results);
        assert!(consensus.no_domain);
        assert!(consensus.domain.is_none());
        assert_eq!(consensus.confidence, 0.0);
        assert_eq!(consensus.votes, 0);
    }

    #[test]
    fn confidence_normalizes_over_responders_only() {
        // Only one source responded; its full weight backs the winner.
        let results = vec![result(Some("apple.com"), "yfinance", 1.0)];
        let consensus = consensus_from_results("0000320193", "AAPL", "Apple Inc.", results);
        assert!((consensus.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn descriptions_vote_independently() {
        let mut yf = result(Some("apple.com"), "yfinance", 0.9);
        yf.description = Some("Designs consumer electronics.".to_string());
        let mut fh = result(Some("apple.com"), "finnhub", 0.6);
        fh.description = Some("Technology".to_string());
        let consensus =
            consensus_from_results("0000320193", "AAPL", "Apple Inc.", vec![yf, fh]);
        assert_eq!(
            consensus.description.as_deref(),
            Some("Designs consumer electronics.")
        );
        assert_eq!(consensus.description_source.as_deref(), Some("yfinance"));
    }

    #[tokio::test]
    async fn early_stop_skips_slow_sources_on_unanimity() {
        let slow_polled = Arc::new(AtomicUsize::new(0));
        let slow_polled2 = slow_polled.clone();

        let sources: Vec<BoxFuture<'static, DomainResult>> = vec![
            Box::pin(async { result(Some("apple.com"), "yfinance", 0.9) }),
            Box::pin(async { result(Some("apple.com"), "sec_edgar", 0.85) }),
            Box::pin(async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                slow_polled2.fetch_add(1, Ordering::SeqCst);
                result(Some("slow.com"), "finnhub", 0.6)
            }),
        ];

        let started = std::time::Instant::now();
        let consensus =
            collect_from_futures("0000320193", "AAPL", "Apple Inc.", sources, 0.75).await;
        assert_eq!(consensus.domain.as_deref(), Some("apple.com"));
        // The slow source was abandoned, not awaited.
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(slow_polled.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn disagreement_below_threshold_waits_for_everyone() {
        let sources: Vec<BoxFuture<'static, DomainResult>> = vec![
            Box::pin(async { result(Some("apple.com"), "finnhub", 0.6) }),
            Box::pin(async { result(Some("microsoft.com"), "finviz", 0.7) }),
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                result(Some("apple.com"), "yfinance", 0.9)
            }),
        ];
        let consensus =
            collect_from_futures("0000320193", "AAPL", "Apple Inc.", sources, 0.75).await;
        assert_eq!(consensus.domain.as_deref(), Some("apple.com"));
        assert_eq!(consensus.votes, 2);
    }
}
