use std::collections::BTreeMap;

use pushgate_expfmt::MetricType;

/// Hooks the aggregate calls as its state changes. Every method defaults to
/// a no-op so implementors pick what they track.
pub trait AggregateObserver: Send + Sync {
    /// A push was accepted. `job` is the `job` path label, or empty.
    fn record_push(&self, _job: &str) {}

    /// A push was rejected with the given error code.
    fn record_push_error(&self, _kind: &str) {}

    /// A family now holds `series` series.
    fn set_family_series(&self, _family: &str, _series: usize) {}

    /// A family was evicted.
    fn remove_family(&self, _family: &str) {}

    fn set_family_count(&self, _families: usize) {}

    /// Family counts per type, observed during a render.
    fn set_type_distribution(&self, _distribution: &BTreeMap<MetricType, usize>) {}

    /// Series dropped by one expiry sweep.
    fn record_expired(&self, _series: usize) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl AggregateObserver for NoopObserver {}
