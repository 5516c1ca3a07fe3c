//! Gateway metrics: named counters and bounded time series.
//!
//! Readers get copies; nothing here blocks for long. Series are capped so
//! an idle-forever gateway can't grow without bound.

use edgemesh_types::now_ms;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

/// Samples kept per series.
pub const MAX_SERIES_SAMPLES: usize = 1024;

// Counter names.
pub const POLLS_COMPLETED: &str = "polls_completed";
pub const TOTAL_HTTP_SUCCESS: &str = "total_http_success";
pub const TOTAL_HTTP_FAILURES: &str = "total_http_failures";
pub const HTTP_RETRIES: &str = "http_retries";
pub const TOTAL_CONVERGENCE_EVENTS: &str = "total_convergence_events";
pub const LAST_REACHABLE_NODES: &str = "last_reachable_nodes";
pub const LAST_MERGE_DURATION_MS: &str = "last_merge_duration_ms";

/// Series name for per-poll merge timings.
pub const MERGE_TIME_MS: &str = "merge_time_ms";

/// One time-series sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub timestamp_ms: u64,
    pub value: f64,
}

/// Process-wide metrics store.
#[derive(Default)]
pub struct MetricsRegistry {
    counters: Mutex<BTreeMap<String, u64>>,
    series: Mutex<BTreeMap<String, VecDeque<Sample>>>,
}

impl MetricsRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `delta` to a counter, creating it at zero if absent.
    pub fn incr(&self, name: &str, delta: u64) {
        let mut counters = self.counters.lock().expect("metrics lock");
        *counters.entry(name.to_string()).or_insert(0) += delta;
    }

    /// Sets a counter to an absolute value (gauges like
    /// `last_reachable_nodes`).
    pub fn set(&self, name: &str, value: u64) {
        let mut counters = self.counters.lock().expect("metrics lock");
        counters.insert(name.to_string(), value);
    }

    /// Reads one counter (0 if never touched).
    #[must_use]
    pub fn counter(&self, name: &str) -> u64 {
        let counters = self.counters.lock().expect("metrics lock");
        counters.get(name).copied().unwrap_or(0)
    }

    /// Copy of all counters.
    #[must_use]
    pub fn counters(&self) -> BTreeMap<String, u64> {
        self.counters.lock().expect("metrics lock").clone()
    }

    /// Appends a sample to a named series, evicting the oldest past the
    /// cap.
    pub fn record(&self, series: &str, value: f64) {
        let mut all = self.series.lock().expect("metrics lock");
        let samples = all.entry(series.to_string()).or_default();
        if samples.len() == MAX_SERIES_SAMPLES {
            samples.pop_front();
        }
        samples.push_back(Sample {
            timestamp_ms: now_ms(),
            value,
        });
    }

    /// The most recent `limit` samples of a series, oldest first.
    #[must_use]
    pub fn series(&self, name: &str, limit: usize) -> Vec<Sample> {
        let all = self.series.lock().expect("metrics lock");
        match all.get(name) {
            Some(samples) => {
                let skip = samples.len().saturating_sub(limit);
                samples.iter().skip(skip).copied().collect()
            }
            None => Vec::new(),
        }
    }

    /// Names of all known series.
    #[must_use]
    pub fn series_names(&self) -> Vec<String> {
        self.series.lock().expect("metrics lock").keys().cloned().collect()
    }
}
