//! Bounded worker pool for embarrassingly-parallel per-entity tasks.
//!
//! Each pipeline stage drains a queue of entity IDs through a fixed number
//! of concurrent workers. Ordering across workers is unspecified; per-entity
//! work is serial inside one task. Task failures never abort the pool.

use std::future::Future;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::debug;

use crate::stats::ExecutionStats;

/// Outcome of one per-entity task, used to aggregate stage statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Work done and persisted
    Success,
    /// Served from cache, no external calls made
    Cached,
    /// Expected absence of data (no 10-K, no domain found)
    NoData,
    /// Unexpected failure; stays local to the task
    Error,
}

impl TaskOutcome {
    pub fn counter_key(&self) -> &'static str {
        match self {
            TaskOutcome::Success => "success",
            TaskOutcome::Cached => "cached",
            TaskOutcome::NoData => "no_data",
            TaskOutcome::Error => "error",
        }
    }
}

/// Run `task` over every item with at most `workers` in flight, collecting
/// the results in completion order.
pub async fn run_parallel<T, R, F, Fut>(items: Vec<T>, workers: usize, task: F) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    let workers = workers.max(1);
    debug!(total = items.len(), workers, "starting worker pool");
    stream::iter(items.into_iter().map(task))
        .buffer_unordered(workers)
        .collect()
        .await
}

/// Like [`run_parallel`], but each task reports a [`TaskOutcome`] that is
/// folded into the shared statistics sink.
pub async fn run_with_stats<T, F, Fut>(
    items: Vec<T>,
    workers: usize,
    stats: Arc<ExecutionStats>,
    task: F,
) where
    F: Fn(T) -> Fut,
    Fut: Future<Output = TaskOutcome>,
{
    let workers = workers.max(1);
    stream::iter(items.into_iter().map(|item| {
        let stats = stats.clone();
        let fut = task(item);
        async move {
            let outcome = fut.await;
            // Error tasks record their own message; the counter comes from
            // record_error to keep the two in sync.
            if outcome != TaskOutcome::Error {
                stats.increment(outcome.counter_key());
            }
        }
    }))
    .buffer_unordered(workers)
    .collect::<Vec<()>>()
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn processes_every_item() {
        let results = run_parallel(vec![1, 2, 3, 4, 5], 2, |n| async move { n * 2 }).await;
        let mut sorted = results.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![2, 4, 6, 8, 10]);
    }

    #[tokio::test]
    async fn respects_the_concurrency_bound() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let items: Vec<u32> = (0..20).collect();
        let in_flight2 = in_flight.clone();
        let peak2 = peak.clone();
        run_parallel(items, 4, move |_| {
            let in_flight = in_flight2.clone();
            let peak = peak2.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }
        })
        .await;

        assert!(peak.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test]
    async fn outcomes_are_folded_into_stats() {
        let stats = Arc::new(ExecutionStats::new());
        let outcomes = vec![
            TaskOutcome::Success,
            TaskOutcome::Success,
            TaskOutcome::Cached,
            TaskOutcome::NoData,
        ];
        run_with_stats(outcomes, 2, stats.clone(), |o| async move { o }).await;
        assert_eq!(stats.get("success"), 2);
        assert_eq!(stats.get("cached"), 1);
        assert_eq!(stats.get("no_data"), 1);
        assert_eq!(stats.get("error"), 0);
    }
}
