//! Process-wide fallback counter.
//!
//! Any code path that degrades instead of failing (binary file skipped,
//! non-UTF-8 decode, git command failure, missing ripgrep, LLM client
//! replaced by a mock, planner retry) calls [`record_fallback`]. The kernel
//! drains the counter once per session via [`FallbackTracker::take_summary`]
//! and surfaces the totals to the consumer as a warning event.

use std::collections::BTreeMap;
use std::sync::{Mutex, OnceLock};

use serde::Serialize;
use serde_json::Value;

const SAMPLE_LIMIT: usize = 5;

/// One recorded degradation, kept as a debugging sample.
#[derive(Debug, Clone, Serialize)]
pub struct FallbackSample {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// Aggregated view of all fallbacks recorded since the last reset.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FallbackSummary {
    pub total: u64,
    pub by_key: BTreeMap<String, u64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub samples: BTreeMap<String, Vec<FallbackSample>>,
}

impl FallbackSummary {
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

#[derive(Default)]
struct TrackerState {
    counts: BTreeMap<String, u64>,
    samples: BTreeMap<String, Vec<FallbackSample>>,
}

/// Thread-safe counter aggregating degraded-path occurrences.
pub struct FallbackTracker {
    state: Mutex<TrackerState>,
}

impl FallbackTracker {
    fn new() -> Self {
        Self {
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// Record one fallback, keeping at most [`SAMPLE_LIMIT`] samples per key.
    pub fn record(&self, key: &str, message: &str, meta: Option<Value>) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        *state.counts.entry(key.to_string()).or_insert(0) += 1;
        let bucket = state.samples.entry(key.to_string()).or_default();
        if bucket.len() < SAMPLE_LIMIT {
            bucket.push(FallbackSample {
                message: message.to_string(),
                meta,
            });
        }
    }

    /// Current totals without clearing the counters.
    pub fn summary(&self) -> FallbackSummary {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        FallbackSummary {
            total: state.counts.values().sum(),
            by_key: state.counts.clone(),
            samples: state.samples.clone(),
        }
    }

    /// Drain the counters, returning the summary accumulated so far.
    pub fn take_summary(&self) -> FallbackSummary {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let summary = FallbackSummary {
            total: state.counts.values().sum(),
            by_key: std::mem::take(&mut state.counts),
            samples: std::mem::take(&mut state.samples),
        };
        summary
    }

    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.counts.clear();
        state.samples.clear();
    }
}

/// Process-wide tracker instance. Counters are reset at session start.
pub fn fallback_tracker() -> &'static FallbackTracker {
    static TRACKER: OnceLock<FallbackTracker> = OnceLock::new();
    TRACKER.get_or_init(FallbackTracker::new)
}

/// Convenience wrapper over the singleton.
pub fn record_fallback(key: &str, message: &str, meta: Option<Value>) {
    tracing::debug!(key, message, "fallback recorded");
    fallback_tracker().record(key, message, meta);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_samples_accumulate() {
        let tracker = FallbackTracker::new();
        for i in 0..8 {
            tracker.record(
                "binary_file_skipped",
                "skipped",
                Some(serde_json::json!({ "n": i })),
            );
        }
        tracker.record("git_show_failed", "boom", None);

        let summary = tracker.summary();
        assert_eq!(summary.total, 9);
        assert_eq!(summary.by_key["binary_file_skipped"], 8);
        assert_eq!(summary.samples["binary_file_skipped"].len(), 5);
    }

    #[test]
    fn take_summary_drains_state() {
        let tracker = FallbackTracker::new();
        tracker.record("io_decode_fallback", "lossy read", None);

        let first = tracker.take_summary();
        assert_eq!(first.total, 1);

        let second = tracker.take_summary();
        assert!(second.is_empty());
    }
}
