use std::collections::HashSet;

use pushgate_common::{PushgateError, Result};
use pushgate_expfmt::{Histogram, LabelPair, MetricFamily, MetricType, MetricValue, Summary};

/// Checks a decoded family before it may touch the store and returns its
/// declared type.
///
/// Unknown type tokens never get this far: the decoder refuses them, so an
/// unrecognized type shows up here as a missing one.
pub fn validate_family(family: &MetricFamily) -> Result<MetricType> {
    if family.name.is_empty() {
        return Err(PushgateError::invalid_family("", "family name is empty"));
    }

    let metric_type = family
        .metric_type
        .ok_or_else(|| PushgateError::invalid_family(&family.name, "family type is missing"))?;

    for metric in &family.metrics {
        validate_labels(&family.name, &metric.labels)?;

        let payload_type = metric.value.metric_type();
        if payload_type != metric_type {
            return Err(PushgateError::invalid_family(
                &family.name,
                format!(
                    "{} sample in a family declared as {}",
                    payload_type.as_prometheus_type(),
                    metric_type.as_prometheus_type()
                ),
            ));
        }

        match &metric.value {
            MetricValue::Histogram(histogram) => validate_histogram(&family.name, histogram)?,
            MetricValue::Summary(summary) => validate_summary(&family.name, summary)?,
            MetricValue::Counter(_) | MetricValue::Gauge(_) | MetricValue::Untyped(_) => {}
        }
    }

    Ok(metric_type)
}

fn validate_labels(family: &str, labels: &[LabelPair]) -> Result<()> {
    let mut seen = HashSet::with_capacity(labels.len());
    for label in labels {
        if !is_valid_label_name(&label.name) {
            return Err(PushgateError::invalid_family(
                family,
                format!("invalid label name {:?}", label.name),
            ));
        }
        if !seen.insert(label.name.as_str()) {
            return Err(PushgateError::invalid_family(
                family,
                format!("duplicate label name {:?}", label.name),
            ));
        }
    }
    Ok(())
}

fn validate_histogram(family: &str, histogram: &Histogram) -> Result<()> {
    let mut previous: Option<f64> = None;
    for bucket in &histogram.buckets {
        if bucket.upper_bound.is_nan() {
            return Err(PushgateError::invalid_family(family, "bucket bound is NaN"));
        }
        if previous.is_some_and(|bound| bucket.upper_bound <= bound) {
            return Err(PushgateError::invalid_family(
                family,
                "bucket bounds are not strictly increasing",
            ));
        }
        previous = Some(bucket.upper_bound);
    }
    Ok(())
}

fn validate_summary(family: &str, summary: &Summary) -> Result<()> {
    for quantile in &summary.quantiles {
        if !(0.0..=1.0).contains(&quantile.quantile) {
            return Err(PushgateError::invalid_family(
                family,
                format!("quantile {} is outside [0, 1]", quantile.quantile),
            ));
        }
    }
    Ok(())
}

fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    }
}
