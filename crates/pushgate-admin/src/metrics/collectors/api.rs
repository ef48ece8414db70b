use std::{sync::Arc, time::Duration};

use pushgate_common::Result;

use crate::metrics::registry::{CounterMetric, HistogramMetric, MetricsRegistry};

const DURATION_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Request accounting for the push/scrape listener.
pub struct ApiMetrics {
    requests_total: Arc<CounterMetric>,
    request_duration_seconds: Arc<HistogramMetric>,
    errors_total: Arc<CounterMetric>,
}

impl ApiMetrics {
    pub fn register(registry: &MetricsRegistry) -> Result<Self> {
        let requests_total = registry.register_counter(
            "pushgate_http_requests_total",
            "Total number of push and scrape requests",
            &["method", "status"],
        )?;

        let request_duration_seconds = registry.register_histogram(
            "pushgate_http_request_duration_seconds",
            "Duration of push and scrape requests in seconds",
            &["method", "status"],
            DURATION_BUCKETS,
        )?;

        let errors_total = registry.register_counter(
            "pushgate_http_errors_total",
            "Total number of requests answered with a server error",
            &["method", "status"],
        )?;

        Ok(Self {
            requests_total,
            request_duration_seconds,
            errors_total,
        })
    }

    pub fn record_request(&self, method: &str, status: u16, duration: Duration) {
        let status_value = status.to_string();
        self.requests_total.inc_one(&[method, &status_value]);
        self.request_duration_seconds
            .observe(&[method, &status_value], duration.as_secs_f64());

        if status >= 500 {
            self.errors_total.inc_one(&[method, &status_value]);
        }
    }
}
