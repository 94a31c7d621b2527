//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with standardized naming conventions.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all Chronoscope metrics
pub const METRICS_PREFIX: &str = "chronoscope";

/// Histogram buckets for HTTP request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001, // 1ms
    0.005, // 5ms
    0.010, // 10ms
    0.025, // 25ms
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.500, // 2.5s
    5.000, // 5s
];

/// Buckets for dispatch latency; the client timeout is 20s
pub const DISPATCH_BUCKETS: &[f64] = &[0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.00, 20.00];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Completion metrics
    describe_counter!(
        format!("{}_completions_total", METRICS_PREFIX),
        Unit::Count,
        "Completion attempts by strategy and outcome"
    );

    describe_gauge!(
        format!("{}_completion_matched_layers", METRICS_PREFIX),
        Unit::Count,
        "Matched layer count of the last local completion"
    );

    // Dispatch metrics
    describe_counter!(
        format!("{}_dispatches_total", METRICS_PREFIX),
        Unit::Count,
        "Dispatches to the computation service by outcome"
    );

    describe_histogram!(
        format!("{}_dispatch_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Dispatch round-trip latency in seconds"
    );

    describe_counter!(
        format!("{}_dispatch_dropped_total", METRICS_PREFIX),
        Unit::Count,
        "Dispatch jobs dropped because the queue was full"
    );

    // Ingestion metrics
    describe_counter!(
        format!("{}_ingestions_total", METRICS_PREFIX),
        Unit::Count,
        "Async results received by outcome"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Record a completion attempt; `matched` is set for local completions
pub fn record_completion(strategy: &str, outcome: &str, matched: Option<i32>) {
    counter!(
        format!("{}_completions_total", METRICS_PREFIX),
        "strategy" => strategy.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    if let Some(matched) = matched {
        gauge!(format!("{}_completion_matched_layers", METRICS_PREFIX)).set(matched as f64);
    }
}

/// Record one dispatch attempt
pub fn record_dispatch(duration_secs: f64, outcome: &str) {
    counter!(
        format!("{}_dispatches_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(format!("{}_dispatch_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

pub fn record_dispatch_dropped() {
    counter!(format!("{}_dispatch_dropped_total", METRICS_PREFIX)).increment(1);
}

/// Record an async result by outcome (`updated`, `rejected`, `not_found`)
pub fn record_ingestion(outcome: &str) {
    counter!(
        format!("{}_ingestions_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_sorted() {
        for buckets in [LATENCY_BUCKETS, DISPATCH_BUCKETS] {
            let mut prev = 0.0;
            for &bucket in buckets {
                assert!(bucket > prev);
                prev = bucket;
            }
        }

        // Dispatch buckets must reach the client timeout
        assert_eq!(DISPATCH_BUCKETS.last(), Some(&20.00));
    }

    #[test]
    fn test_recorders_without_exporter() {
        let metrics = RequestMetrics::start("PUT", "/api/chrono/{id}/complete");
        metrics.finish(200);
        record_completion("local", "completed", Some(2));
        record_dispatch(0.01, "failed");
        record_dispatch_dropped();
        record_ingestion("updated");
    }
}
