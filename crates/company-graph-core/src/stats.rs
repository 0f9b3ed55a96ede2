//! Thread-safe statistics tracking for parallel stage execution.

use std::collections::BTreeMap;
use std::sync::Mutex;

/// Maximum number of verbatim error messages retained for the summary.
const MAX_RECORDED_ERRORS: usize = 10;

/// **Execution statistics**
///
/// A mutex-guarded counter map shared by all workers of a stage. Counters
/// distinguish expected "no data" outcomes from unexpected errors; the
/// first few error messages are kept verbatim for the final summary.
#[derive(Debug, Default)]
pub struct ExecutionStats {
    counters: Mutex<BTreeMap<String, u64>>,
    errors: Mutex<Vec<String>>,
    dropped_errors: Mutex<u64>,
}

impl ExecutionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a counter by one.
    pub fn increment(&self, key: &str) {
        self.increment_by(key, 1);
    }

    pub fn increment_by(&self, key: &str, amount: u64) {
        let mut counters = self.lock_counters();
        *counters.entry(key.to_string()).or_insert(0) += amount;
    }

    pub fn get(&self, key: &str) -> u64 {
        self.lock_counters().get(key).copied().unwrap_or(0)
    }

    /// Record an unexpected error (also bumps the "error" counter).
    pub fn record_error(&self, message: impl Into<String>) {
        self.increment("error");
        let mut errors = match self.errors.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if errors.len() < MAX_RECORDED_ERRORS {
            errors.push(message.into());
        } else {
            let mut dropped = match self.dropped_errors.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *dropped += 1;
        }
    }

    pub fn to_map(&self) -> BTreeMap<String, u64> {
        self.lock_counters().clone()
    }

    /// Human-readable stage summary: counters plus the retained errors.
    pub fn summary(&self) -> String {
        let counters = self.lock_counters();
        let mut out = counters
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ");
        drop(counters);

        let errors = match self.errors.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !errors.is_empty() {
            out.push_str("\nfirst errors:");
            for error in errors.iter() {
                out.push_str("\n  - ");
                out.push_str(error);
            }
            let dropped = match self.dropped_errors.lock() {
                Ok(guard) => *guard,
                Err(poisoned) => *poisoned.into_inner(),
            };
            if dropped > 0 {
                out.push_str(&format!("\n  ... and {dropped} more"));
            }
        }
        out
    }

    fn lock_counters(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, u64>> {
        match self.counters.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn counters_accumulate() {
        let stats = ExecutionStats::new();
        stats.increment("success");
        stats.increment("success");
        stats.increment_by("cached", 3);
        assert_eq!(stats.get("success"), 2);
        assert_eq!(stats.get("cached"), 3);
        assert_eq!(stats.get("missing"), 0);
    }

    #[test]
    fn errors_are_capped_for_the_summary() {
        let stats = ExecutionStats::new();
        for i in 0..15 {
            stats.record_error(format!("boom {i}"));
        }
        assert_eq!(stats.get("error"), 15);
        let summary = stats.summary();
        assert!(summary.contains("boom 0"));
        assert!(summary.contains("boom 9"));
        assert!(!summary.contains("boom 10"));
        assert!(summary.contains("and 5 more"));
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let stats = Arc::new(ExecutionStats::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let stats = stats.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    stats.increment("n");
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(stats.get("n"), 8000);
    }
}
