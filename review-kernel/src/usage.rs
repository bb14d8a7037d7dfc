//! Per-session token accounting.
//!
//! Providers re-announce usage inconsistently while streaming (cumulative
//! for some, per-chunk for others), so per-call numbers are max-merged.
//! All-zero usage payloads are invalid and never aggregated.

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::Serialize;

use ai_llm_service::Usage;

/// Unified triple reported per call and per session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageTotals {
    #[serde(rename = "in")]
    pub input: u64,
    #[serde(rename = "out")]
    pub output: u64,
    pub total: u64,
}

/// Max-merging aggregator keyed by `(stage, call_index)`.
#[derive(Default)]
pub struct UsageAggregator {
    calls: Mutex<BTreeMap<String, UsageTotals>>,
}

impl UsageAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&self) {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).clear();
    }

    /// Merge one usage report; returns `(call_totals, session_totals)`.
    pub fn update(
        &self,
        usage: &Usage,
        stage: &str,
        call_index: Option<u32>,
    ) -> (UsageTotals, UsageTotals) {
        let key = format!("{stage}:{}", call_index.unwrap_or(0));
        let mut calls = self.calls.lock().unwrap_or_else(|p| p.into_inner());
        let entry = calls.entry(key).or_default();
        entry.input = entry.input.max(usage.input_tokens);
        entry.output = entry.output.max(usage.output_tokens);
        entry.total = entry.total.max(usage.total_tokens);
        let call = *entry;
        let session = Self::sum(&calls);
        (call, session)
    }

    pub fn session_totals(&self) -> UsageTotals {
        let calls = self.calls.lock().unwrap_or_else(|p| p.into_inner());
        Self::sum(&calls)
    }

    fn sum(calls: &BTreeMap<String, UsageTotals>) -> UsageTotals {
        UsageTotals {
            input: calls.values().map(|c| c.input).sum(),
            output: calls.values().map(|c| c.output).sum(),
            total: calls.values().map(|c| c.total).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(input: u64, output: u64, total: u64) -> Usage {
        Usage {
            input_tokens: input,
            output_tokens: output,
            total_tokens: total,
        }
    }

    #[test]
    fn per_call_numbers_are_max_merged() {
        let agg = UsageAggregator::new();
        agg.update(&usage(10, 5, 15), "review", Some(1));
        let (call, _) = agg.update(&usage(10, 8, 18), "review", Some(1));
        assert_eq!(call, UsageTotals { input: 10, output: 8, total: 18 });
    }

    #[test]
    fn session_totals_sum_across_stages_and_calls() {
        let agg = UsageAggregator::new();
        agg.update(&usage(10, 5, 15), "planner", Some(0));
        agg.update(&usage(5, 2, 7), "intent", None);
        agg.update(&usage(20, 10, 30), "review", Some(1));
        assert_eq!(agg.session_totals().total, 52);

        agg.reset();
        assert_eq!(agg.session_totals().total, 0);
    }
}
