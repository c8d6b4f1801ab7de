//! Metrics and observability utilities
//!
//! Prometheus-style metrics with standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all IdeaForge metrics
pub const METRICS_PREFIX: &str = "ideaforge";

/// Buckets for text service latency (model calls are slow)
pub const GENERATION_BUCKETS: &[f64] = &[
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.000,  // 2s
    5.000,  // 5s
    10.00,  // 10s
    20.00,  // 20s
    40.00,  // 40s
    60.00,  // 60s
];

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

    // Pipeline metrics
    describe_counter!(
        format!("{}_submissions_total", METRICS_PREFIX),
        Unit::Count,
        "Submissions persisted"
    );

    describe_counter!(
        format!("{}_fragments_total", METRICS_PREFIX),
        Unit::Count,
        "Prompt fragment outcomes (appended or duplicate)"
    );

    describe_counter!(
        format!("{}_prompt_update_failures_total", METRICS_PREFIX),
        Unit::Count,
        "Submissions saved whose prompt update failed"
    );

    // Text service metrics
    describe_counter!(
        format!("{}_generation_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Text service operations by purpose and outcome"
    );

    describe_counter!(
        format!("{}_generation_attempts_total", METRICS_PREFIX),
        Unit::Count,
        "Individual text service calls, including retries"
    );

    describe_histogram!(
        format!("{}_generation_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Text service latency in seconds, including backoff"
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

/// Helper to record a text service operation (all attempts)
pub fn record_generation(purpose: &str, duration_secs: f64, attempts: u32, outcome: &str) {
    counter!(
        format!("{}_generation_requests_total", METRICS_PREFIX),
        "purpose" => purpose.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    counter!(
        format!("{}_generation_attempts_total", METRICS_PREFIX),
        "purpose" => purpose.to_string()
    )
    .increment(u64::from(attempts));

    histogram!(
        format!("{}_generation_duration_seconds", METRICS_PREFIX),
        "purpose" => purpose.to_string()
    )
    .record(duration_secs);
}

/// Helper to record a persisted submission
pub fn record_submission(strategy: &str) {
    counter!(
        format!("{}_submissions_total", METRICS_PREFIX),
        "strategy" => strategy.to_string()
    )
    .increment(1);
}

/// Helper to record what happened to a derived fragment
pub fn record_fragment(appended: bool) {
    let outcome = if appended { "appended" } else { "duplicate" };
    counter!(
        format!("{}_fragments_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(1);
}

/// Helper to record a saved submission whose prompt update failed
pub fn record_prompt_update_failure(cause: &str) {
    counter!(
        format!("{}_prompt_update_failures_total", METRICS_PREFIX),
        "cause" => cause.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_buckets() {
        let mut prev = 0.0;
        for &bucket in GENERATION_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }
    }

    #[test]
    fn test_recorders_without_exporter() {
        let metrics = RequestMetrics::start("POST", "/submissions");
        metrics.finish(201);
        record_generation("transform", 0.5, 2, "ok");
        record_submission("fragments");
        record_fragment(true);
        record_prompt_update_failure("RATE_LIMITED");
        // Just verify it runs without panic
    }
}
