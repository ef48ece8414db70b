use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use pushgate_common::{PushgateError, Result};
use pushgate_expfmt::{
    Bucket, Encoder, Format, Histogram, Metric, MetricFamily, MetricType, MetricValue,
};

use crate::metrics::types::MetricDescriptor;

type LabelValues = Vec<String>;

trait RegisteredMetric: Send + Sync {
    fn descriptor(&self) -> &MetricDescriptor;
    fn collect(&self) -> Vec<Metric>;
}

/// The gateway's own metrics, kept apart from the pushed aggregate.
pub struct MetricsRegistry {
    metrics: RwLock<HashMap<String, Arc<dyn RegisteredMetric>>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            metrics: RwLock::new(HashMap::new()),
        }
    }

    pub fn register_counter(
        &self,
        name: &str,
        help: &str,
        variable_labels: &[&str],
    ) -> Result<Arc<CounterMetric>> {
        let metric = Arc::new(CounterMetric::new(name, help, variable_labels));
        self.register(metric.clone())?;
        Ok(metric)
    }

    pub fn register_gauge(
        &self,
        name: &str,
        help: &str,
        variable_labels: &[&str],
    ) -> Result<Arc<GaugeMetric>> {
        let metric = Arc::new(GaugeMetric::new(name, help, variable_labels));
        self.register(metric.clone())?;
        Ok(metric)
    }

    pub fn register_histogram(
        &self,
        name: &str,
        help: &str,
        variable_labels: &[&str],
        buckets: &[f64],
    ) -> Result<Arc<HistogramMetric>> {
        let metric = Arc::new(HistogramMetric::new(name, help, variable_labels, buckets));
        self.register(metric.clone())?;
        Ok(metric)
    }

    /// Snapshot of every registered metric, families sorted by name and
    /// series sorted by label set.
    pub fn collect_all(&self) -> Vec<MetricFamily> {
        let metrics = match self.metrics.read() {
            Ok(guard) => guard,
            Err(_) => return Vec::new(),
        };

        let mut collected = metrics
            .values()
            .map(|metric| {
                let descriptor = metric.descriptor();
                let mut samples = metric.collect();
                samples.sort_by(|left, right| left.labels.cmp(&right.labels));
                MetricFamily {
                    name: descriptor.name.clone(),
                    help: Some(descriptor.help.clone()),
                    metric_type: Some(descriptor.metric_type),
                    metrics: samples,
                }
            })
            .collect::<Vec<_>>();

        collected.sort_by(|left, right| left.name.cmp(&right.name));
        collected
    }

    pub fn render(&self, format: Format) -> Result<Vec<u8>> {
        let mut encoder = Encoder::new(Vec::new(), format);
        for family in self.collect_all() {
            encoder.encode(&family)?;
        }
        Ok(encoder.finish()?)
    }

    fn register<M: RegisteredMetric + 'static>(&self, metric: Arc<M>) -> Result<()> {
        let name = metric.descriptor().name.clone();
        let mut metrics = self.metrics.write().map_err(|_| {
            PushgateError::Internal("failed to acquire metrics registry lock".to_string())
        })?;

        if metrics.contains_key(&name) {
            return Err(PushgateError::InvalidConfig(format!(
                "metric already registered: {name}"
            )));
        }

        metrics.insert(name, metric);
        Ok(())
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Label values → per-series state, created on first use.
struct SeriesMap<T> {
    series: RwLock<HashMap<LabelValues, Arc<T>>>,
}

impl<T> SeriesMap<T> {
    fn new() -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
        }
    }

    fn get_or_create(&self, label_values: LabelValues, create: impl FnOnce() -> T) -> Arc<T> {
        if let Ok(guard) = self.series.read()
            && let Some(existing) = guard.get(&label_values)
        {
            return existing.clone();
        }

        match self.series.write() {
            Ok(mut guard) => guard
                .entry(label_values)
                .or_insert_with(|| Arc::new(create()))
                .clone(),
            Err(_) => Arc::new(create()),
        }
    }

    fn remove(&self, label_values: &LabelValues) {
        if let Ok(mut guard) = self.series.write() {
            guard.remove(label_values);
        }
    }

    fn snapshot(&self) -> Vec<(LabelValues, Arc<T>)> {
        match self.series.read() {
            Ok(guard) => guard
                .iter()
                .map(|(labels, value)| (labels.clone(), value.clone()))
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

pub struct CounterMetric {
    descriptor: MetricDescriptor,
    series: SeriesMap<AtomicU64>,
}

impl CounterMetric {
    fn new(name: &str, help: &str, variable_labels: &[&str]) -> Self {
        Self {
            descriptor: MetricDescriptor::new(name, help, MetricType::Counter, variable_labels),
            series: SeriesMap::new(),
        }
    }

    pub fn inc(&self, labels: &[&str], value: u64) {
        self.series
            .get_or_create(self.descriptor.label_values(labels), || AtomicU64::new(0))
            .fetch_add(value, Ordering::Relaxed);
    }

    pub fn inc_one(&self, labels: &[&str]) {
        self.inc(labels, 1);
    }
}

impl RegisteredMetric for CounterMetric {
    fn descriptor(&self) -> &MetricDescriptor {
        &self.descriptor
    }

    fn collect(&self) -> Vec<Metric> {
        self.series
            .snapshot()
            .into_iter()
            .map(|(label_values, value)| {
                Metric::new(
                    self.descriptor.label_pairs(&label_values),
                    MetricValue::Counter(value.load(Ordering::Relaxed) as f64),
                )
            })
            .collect()
    }
}

/// A gauge holding `f64` values, stored as their bit patterns.
pub struct GaugeMetric {
    descriptor: MetricDescriptor,
    series: SeriesMap<AtomicU64>,
}

impl GaugeMetric {
    fn new(name: &str, help: &str, variable_labels: &[&str]) -> Self {
        Self {
            descriptor: MetricDescriptor::new(name, help, MetricType::Gauge, variable_labels),
            series: SeriesMap::new(),
        }
    }

    pub fn set(&self, labels: &[&str], value: f64) {
        self.slot(labels).store(value.to_bits(), Ordering::Relaxed);
    }

    /// Drops the series so it is no longer exported.
    pub fn remove(&self, labels: &[&str]) {
        self.series.remove(&self.descriptor.label_values(labels));
    }

    fn slot(&self, labels: &[&str]) -> Arc<AtomicU64> {
        self.series
            .get_or_create(self.descriptor.label_values(labels), || {
                AtomicU64::new(0.0_f64.to_bits())
            })
    }
}

impl RegisteredMetric for GaugeMetric {
    fn descriptor(&self) -> &MetricDescriptor {
        &self.descriptor
    }

    fn collect(&self) -> Vec<Metric> {
        self.series
            .snapshot()
            .into_iter()
            .map(|(label_values, value)| {
                Metric::new(
                    self.descriptor.label_pairs(&label_values),
                    MetricValue::Gauge(f64::from_bits(value.load(Ordering::Relaxed))),
                )
            })
            .collect()
    }
}

pub struct HistogramMetric {
    descriptor: MetricDescriptor,
    buckets: Vec<f64>,
    series: SeriesMap<HistogramSeries>,
}

struct HistogramSeries {
    /// One slot per bound plus a trailing `+Inf` slot; not cumulative.
    bucket_counts: Vec<AtomicU64>,
    count: AtomicU64,
    sum: Mutex<f64>,
}

impl HistogramSeries {
    fn new(bounds: usize) -> Self {
        Self {
            bucket_counts: (0..bounds + 1).map(|_| AtomicU64::new(0)).collect(),
            count: AtomicU64::new(0),
            sum: Mutex::new(0.0),
        }
    }
}

impl HistogramMetric {
    fn new(name: &str, help: &str, variable_labels: &[&str], buckets: &[f64]) -> Self {
        let mut sorted_buckets = buckets.to_vec();
        sorted_buckets.sort_by(|left, right| left.total_cmp(right));
        sorted_buckets.dedup();

        Self {
            descriptor: MetricDescriptor::new(name, help, MetricType::Histogram, variable_labels),
            buckets: sorted_buckets,
            series: SeriesMap::new(),
        }
    }

    pub fn observe(&self, labels: &[&str], value: f64) {
        let bounds = self.buckets.len();
        let series = self
            .series
            .get_or_create(self.descriptor.label_values(labels), || HistogramSeries::new(bounds));

        let bucket_index = self
            .buckets
            .iter()
            .position(|bucket| value <= *bucket)
            .unwrap_or(bounds);

        if let Some(bucket) = series.bucket_counts.get(bucket_index) {
            bucket.fetch_add(1, Ordering::Relaxed);
        }

        series.count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut sum) = series.sum.lock() {
            *sum += value;
        }
    }
}

impl RegisteredMetric for HistogramMetric {
    fn descriptor(&self) -> &MetricDescriptor {
        &self.descriptor
    }

    fn collect(&self) -> Vec<Metric> {
        self.series
            .snapshot()
            .into_iter()
            .map(|(label_values, entry)| {
                let mut cumulative = 0_u64;
                let mut buckets = Vec::with_capacity(self.buckets.len() + 1);
                let bounds = self.buckets.iter().copied().chain([f64::INFINITY]);
                for (bound, slot) in bounds.zip(&entry.bucket_counts) {
                    cumulative = cumulative.saturating_add(slot.load(Ordering::Relaxed));
                    buckets.push(Bucket {
                        upper_bound: bound,
                        cumulative_count: cumulative,
                    });
                }

                let sum = match entry.sum.lock() {
                    Ok(value) => *value,
                    Err(_) => 0.0,
                };

                Metric::new(
                    self.descriptor.label_pairs(&label_values),
                    MetricValue::Histogram(Histogram {
                        buckets,
                        sample_count: entry.count.load(Ordering::Relaxed),
                        sample_sum: sum,
                    }),
                )
            })
            .collect()
    }
}
