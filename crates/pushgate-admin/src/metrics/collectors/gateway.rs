use std::{collections::BTreeMap, sync::Arc};

use pushgate_aggregate::AggregateObserver;
use pushgate_common::Result;
use pushgate_expfmt::MetricType;

use crate::metrics::registry::{CounterMetric, GaugeMetric, MetricsRegistry};

/// Registry-backed observer for the aggregate.
pub struct GatewayMetrics {
    pushes_total: Arc<CounterMetric>,
    push_errors_total: Arc<CounterMetric>,
    family_metrics: Arc<GaugeMetric>,
    families: Arc<GaugeMetric>,
    families_by_type: Arc<GaugeMetric>,
    expired_series_total: Arc<CounterMetric>,
}

impl GatewayMetrics {
    pub fn register(registry: &MetricsRegistry) -> Result<Self> {
        Ok(Self {
            pushes_total: registry.register_counter(
                "pushgate_pushes_total",
                "Accepted pushes by job",
                &["job"],
            )?,
            push_errors_total: registry.register_counter(
                "pushgate_push_errors_total",
                "Rejected pushes by error kind",
                &["kind"],
            )?,
            family_metrics: registry.register_gauge(
                "pushgate_family_metrics",
                "Series currently stored per metric family",
                &["family"],
            )?,
            families: registry.register_gauge(
                "pushgate_families",
                "Metric families currently stored",
                &[],
            )?,
            families_by_type: registry.register_gauge(
                "pushgate_families_by_type",
                "Metric families seen by the last scrape, by type",
                &["type"],
            )?,
            expired_series_total: registry.register_counter(
                "pushgate_expired_series_total",
                "Series dropped because they were not refreshed within the TTL",
                &[],
            )?,
        })
    }
}

impl AggregateObserver for GatewayMetrics {
    fn record_push(&self, job: &str) {
        self.pushes_total.inc_one(&[job]);
    }

    fn record_push_error(&self, kind: &str) {
        self.push_errors_total.inc_one(&[kind]);
    }

    fn set_family_series(&self, family: &str, series: usize) {
        self.family_metrics.set(&[family], series as f64);
    }

    fn remove_family(&self, family: &str) {
        self.family_metrics.remove(&[family]);
    }

    fn set_family_count(&self, families: usize) {
        self.families.set(&[], families as f64);
    }

    fn set_type_distribution(&self, distribution: &BTreeMap<MetricType, usize>) {
        for (metric_type, count) in distribution {
            self.families_by_type
                .set(&[metric_type.as_prometheus_type()], *count as f64);
        }
    }

    fn record_expired(&self, series: usize) {
        self.expired_series_total.inc(&[], series as u64);
    }
}
