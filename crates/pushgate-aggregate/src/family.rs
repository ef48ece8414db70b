use std::time::Instant;

use pushgate_common::Result;
use pushgate_expfmt::{FamilyHeader, Metric, MetricFamily, MetricType};

use crate::merge::coalesce;

/// A stored metric plus the last time a push touched its label set.
#[derive(Debug, Clone)]
pub struct Series {
    pub metric: Metric,
    pub last_refreshed: Instant,
}

impl Series {
    pub fn new(metric: Metric, now: Instant) -> Self {
        Self {
            metric,
            last_refreshed: now,
        }
    }
}

/// A family ready to be saved: validated, labels canonical, metrics sorted
/// by label set with no two metrics sharing one.
#[derive(Debug, Clone)]
pub struct PreparedFamily {
    pub name: String,
    pub help: Option<String>,
    pub metric_type: MetricType,
    pub metrics: Vec<Metric>,
}

impl PreparedFamily {
    /// Sorts and coalesces a family whose labels are already canonical and
    /// whose declared type was confirmed by validation.
    pub fn from_validated(family: MetricFamily, metric_type: MetricType) -> Result<Self> {
        let mut metrics = family.metrics;
        metrics.sort_by(|left, right| left.labels.cmp(&right.labels));
        let metrics = coalesce(&family.name, metrics)?;

        Ok(Self {
            name: family.name,
            help: family.help,
            metric_type,
            metrics,
        })
    }
}

/// The aggregated state of one family. `series` is always sorted by label
/// set and never holds two entries with equal label sets.
#[derive(Debug, Clone)]
pub struct StoredFamily {
    pub name: String,
    pub help: Option<String>,
    pub metric_type: MetricType,
    pub series: Vec<Series>,
}

impl StoredFamily {
    pub fn new(family: PreparedFamily, now: Instant) -> Self {
        Self {
            name: family.name,
            help: family.help,
            metric_type: family.metric_type,
            series: family
                .metrics
                .into_iter()
                .map(|metric| Series::new(metric, now))
                .collect(),
        }
    }

    pub fn header(&self) -> FamilyHeader<'_> {
        FamilyHeader {
            name: &self.name,
            help: self.help.as_deref(),
            metric_type: self.metric_type,
        }
    }

    pub fn metrics(&self) -> impl Iterator<Item = &Metric> {
        self.series.iter().map(|series| &series.metric)
    }

    pub fn to_metric_family(&self) -> MetricFamily {
        MetricFamily {
            name: self.name.clone(),
            help: self.help.clone(),
            metric_type: Some(self.metric_type),
            metrics: self.metrics().cloned().collect(),
        }
    }
}
