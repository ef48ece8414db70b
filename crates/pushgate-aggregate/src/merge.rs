//! Per-type combination of metric families.
//!
//! Both sides are sorted by canonical label set, so merging is a single
//! merge-join. Matched series combine by type:
//!
//! | type              | result                                                    |
//! |-------------------|-----------------------------------------------------------|
//! | counter           | stored + pushed                                           |
//! | gauge / untyped   | stored + pushed (independent producers add up)            |
//! | histogram         | bucket counts, count and sum added; bounds must match     |
//! | summary           | count and sum added; pushed quantile values replace stored |
//!
//! Summary quantiles cannot be combined from the aggregated values alone,
//! so the pushed value for a quantile is kept. Producers that need exact
//! quantiles across instances have to aggregate upstream.

use std::cmp::Ordering;
use std::iter::Peekable;
use std::time::Instant;

use pushgate_common::{PushgateError, Result};
use pushgate_expfmt::{Metric, MetricValue, Quantile};

use crate::family::{PreparedFamily, Series, StoredFamily};

/// Merges `incoming` into `existing`.
///
/// Compatibility of every matched pair is checked before anything is
/// written, so on error `existing` is exactly as it was.
pub fn combine(existing: &mut StoredFamily, incoming: PreparedFamily, now: Instant) -> Result<()> {
    if existing.metric_type != incoming.metric_type {
        return Err(PushgateError::TypeMismatch {
            family: existing.name.clone(),
            stored: existing.metric_type.as_prometheus_type(),
            pushed: incoming.metric_type.as_prometheus_type(),
        });
    }

    check_compatible(&existing.name, &existing.series, &incoming.metrics)?;

    if let Some(help) = incoming.help.filter(|help| !help.is_empty()) {
        existing.help = Some(help);
    }

    let stored = std::mem::take(&mut existing.series);
    let mut merged = Vec::with_capacity(stored.len() + incoming.metrics.len());
    let mut stored = stored.into_iter().peekable();
    let mut pushed = incoming.metrics.into_iter().peekable();

    loop {
        let order = match (stored.peek(), pushed.peek()) {
            (Some(series), Some(metric)) => series.metric.labels.cmp(&metric.labels),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => break,
        };

        match order {
            Ordering::Less => merged.extend(stored.next()),
            Ordering::Greater => {
                merged.extend(pushed.next().map(|metric| Series::new(metric, now)));
            }
            Ordering::Equal => {
                if let (Some(mut series), Some(metric)) = (stored.next(), pushed.next()) {
                    accumulate(&mut series.metric, metric);
                    series.last_refreshed = now;
                    merged.push(series);
                }
            }
        }
    }

    existing.series = merged;
    Ok(())
}

/// Folds adjacent metrics with equal label sets into one. `metrics` must be
/// sorted by label set.
pub fn coalesce(family: &str, metrics: Vec<Metric>) -> Result<Vec<Metric>> {
    let mut out: Vec<Metric> = Vec::with_capacity(metrics.len());
    for metric in metrics {
        match out.last_mut() {
            Some(last) if last.labels == metric.labels => {
                ensure_compatible(family, &last.value, &metric.value)?;
                accumulate(last, metric);
            }
            _ => out.push(metric),
        }
    }
    Ok(out)
}

fn check_compatible(family: &str, stored: &[Series], pushed: &[Metric]) -> Result<()> {
    let mut stored = stored.iter().peekable();
    let mut pushed = pushed.iter().peekable();

    while let (Some(series), Some(metric)) = (stored.peek(), pushed.peek()) {
        match series.metric.labels.cmp(&metric.labels) {
            Ordering::Less => advance(&mut stored),
            Ordering::Greater => advance(&mut pushed),
            Ordering::Equal => {
                ensure_compatible(family, &series.metric.value, &metric.value)?;
                advance(&mut stored);
                advance(&mut pushed);
            }
        }
    }
    Ok(())
}

fn advance<I: Iterator>(iter: &mut Peekable<I>) {
    iter.next();
}

fn ensure_compatible(family: &str, stored: &MetricValue, pushed: &MetricValue) -> Result<()> {
    match (stored, pushed) {
        (MetricValue::Histogram(left), MetricValue::Histogram(right)) => {
            let same_bounds = left.buckets.len() == right.buckets.len()
                && left
                    .buckets
                    .iter()
                    .zip(&right.buckets)
                    .all(|(a, b)| a.upper_bound == b.upper_bound);
            if same_bounds {
                Ok(())
            } else {
                Err(PushgateError::BucketMismatch {
                    family: family.to_string(),
                })
            }
        }
        (left, right) if left.metric_type() == right.metric_type() => Ok(()),
        (left, right) => Err(PushgateError::TypeMismatch {
            family: family.to_string(),
            stored: left.metric_type().as_prometheus_type(),
            pushed: right.metric_type().as_prometheus_type(),
        }),
    }
}

/// Adds `incoming` into `target`. Callers have checked compatibility.
fn accumulate(target: &mut Metric, incoming: Metric) {
    let Metric {
        value,
        timestamp_ms,
        ..
    } = incoming;

    match (&mut target.value, value) {
        (MetricValue::Counter(stored), MetricValue::Counter(pushed))
        | (MetricValue::Gauge(stored), MetricValue::Gauge(pushed))
        | (MetricValue::Untyped(stored), MetricValue::Untyped(pushed)) => *stored += pushed,
        (MetricValue::Histogram(stored), MetricValue::Histogram(pushed)) => {
            for (bucket, other) in stored.buckets.iter_mut().zip(&pushed.buckets) {
                bucket.cumulative_count = bucket
                    .cumulative_count
                    .saturating_add(other.cumulative_count);
            }
            stored.sample_count = stored.sample_count.saturating_add(pushed.sample_count);
            stored.sample_sum += pushed.sample_sum;
        }
        (MetricValue::Summary(stored), MetricValue::Summary(pushed)) => {
            stored.sample_count = stored.sample_count.saturating_add(pushed.sample_count);
            stored.sample_sum += pushed.sample_sum;
            stored.quantiles = overlay_quantiles(&stored.quantiles, pushed.quantiles);
        }
        _ => {}
    }

    if timestamp_ms.is_some() {
        target.timestamp_ms = timestamp_ms;
    }
}

/// Union of both quantile lists (each sorted); pushed values win on equal quantiles.
fn overlay_quantiles(stored: &[Quantile], pushed: Vec<Quantile>) -> Vec<Quantile> {
    let mut out = Vec::with_capacity(stored.len().max(pushed.len()));
    let mut stored = stored.iter().copied().peekable();
    let mut pushed = pushed.into_iter().peekable();

    loop {
        let order = match (stored.peek(), pushed.peek()) {
            (Some(left), Some(right)) => left.quantile.total_cmp(&right.quantile),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => break,
        };
        match order {
            Ordering::Less => out.extend(stored.next()),
            Ordering::Greater => out.extend(pushed.next()),
            Ordering::Equal => {
                stored.next();
                out.extend(pushed.next());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pushgate_expfmt::{Bucket, Histogram, LabelPair, MetricType, Summary};

    use super::*;

    fn labels(raw: &[(&str, &str)]) -> Vec<LabelPair> {
        raw.iter().map(|(name, value)| LabelPair::new(*name, *value)).collect()
    }

    fn counter(raw: &[(&str, &str)], value: f64) -> Metric {
        Metric::new(labels(raw), MetricValue::Counter(value))
    }

    fn histogram(bounds: &[f64], counts: &[u64], count: u64, sum: f64) -> Metric {
        Metric::new(
            labels(&[("job", "a")]),
            MetricValue::Histogram(Histogram {
                buckets: bounds
                    .iter()
                    .zip(counts)
                    .map(|(bound, count)| Bucket {
                        upper_bound: *bound,
                        cumulative_count: *count,
                    })
                    .collect(),
                sample_count: count,
                sample_sum: sum,
            }),
        )
    }

    fn prepared(metric_type: MetricType, metrics: Vec<Metric>) -> PreparedFamily {
        PreparedFamily {
            name: "family".to_string(),
            help: None,
            metric_type,
            metrics,
        }
    }

    fn stored(metric_type: MetricType, metrics: Vec<Metric>, now: Instant) -> StoredFamily {
        StoredFamily::new(prepared(metric_type, metrics), now)
    }

    fn values(family: &StoredFamily) -> Vec<(Vec<LabelPair>, f64)> {
        family
            .series
            .iter()
            .map(|series| {
                (
                    series.metric.labels.clone(),
                    series.metric.value.as_scalar().unwrap(),
                )
            })
            .collect()
    }

    #[test]
    fn merge_join_keeps_inserts_and_sums() {
        let now = Instant::now();
        let mut existing = stored(
            MetricType::Counter,
            vec![counter(&[("job", "a")], 5.0), counter(&[("job", "c")], 1.0)],
            now,
        );
        let incoming = prepared(
            MetricType::Counter,
            vec![counter(&[("job", "a")], 3.0), counter(&[("job", "b")], 2.0)],
        );

        combine(&mut existing, incoming, now).unwrap();

        assert_eq!(
            values(&existing),
            vec![
                (labels(&[("job", "a")]), 8.0),
                (labels(&[("job", "b")]), 2.0),
                (labels(&[("job", "c")]), 1.0),
            ]
        );
    }

    #[test]
    fn gauges_add_up() {
        let now = Instant::now();
        let mut existing = stored(
            MetricType::Gauge,
            vec![Metric::new(Vec::new(), MetricValue::Gauge(1.5))],
            now,
        );
        let incoming = prepared(
            MetricType::Gauge,
            vec![Metric::new(Vec::new(), MetricValue::Gauge(2.0))],
        );
        combine(&mut existing, incoming, now).unwrap();
        assert_eq!(existing.series[0].metric.value, MetricValue::Gauge(3.5));
    }

    #[test]
    fn refresh_time_moves_only_for_touched_series() {
        let then = Instant::now();
        let later = then + Duration::from_secs(10);
        let mut existing = stored(
            MetricType::Counter,
            vec![counter(&[("job", "a")], 1.0), counter(&[("job", "b")], 1.0)],
            then,
        );
        combine(
            &mut existing,
            prepared(MetricType::Counter, vec![counter(&[("job", "b")], 1.0)]),
            later,
        )
        .unwrap();

        assert_eq!(existing.series[0].last_refreshed, then);
        assert_eq!(existing.series[1].last_refreshed, later);
    }

    #[test]
    fn histograms_sum_bucketwise() {
        let now = Instant::now();
        let mut existing = stored(
            MetricType::Histogram,
            vec![histogram(&[0.5, 1.0], &[1, 2], 2, 1.2)],
            now,
        );
        let incoming = prepared(
            MetricType::Histogram,
            vec![histogram(&[0.5, 1.0], &[3, 4], 4, 2.3)],
        );
        combine(&mut existing, incoming, now).unwrap();

        let MetricValue::Histogram(merged) = &existing.series[0].metric.value else {
            panic!("expected histogram");
        };
        let counts: Vec<u64> = merged.buckets.iter().map(|b| b.cumulative_count).collect();
        assert_eq!(counts, vec![4, 6]);
        assert_eq!(merged.sample_count, 6);
        assert!((merged.sample_sum - 3.5).abs() < 1e-9);
    }

    #[test]
    fn bucket_mismatch_leaves_family_untouched() {
        let now = Instant::now();
        let mut existing = stored(
            MetricType::Histogram,
            vec![histogram(&[0.5, 1.0], &[1, 2], 2, 1.2)],
            now,
        );
        let before = existing.to_metric_family();
        let incoming = prepared(
            MetricType::Histogram,
            vec![histogram(&[0.25, 1.0], &[3, 4], 4, 2.3)],
        );

        let err = combine(&mut existing, incoming, now).unwrap_err();
        assert!(matches!(err, PushgateError::BucketMismatch { .. }));
        assert_eq!(existing.to_metric_family(), before);
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let now = Instant::now();
        let mut existing = stored(MetricType::Counter, vec![counter(&[], 1.0)], now);
        let incoming = prepared(
            MetricType::Gauge,
            vec![Metric::new(Vec::new(), MetricValue::Gauge(1.0))],
        );
        let err = combine(&mut existing, incoming, now).unwrap_err();
        assert!(matches!(
            err,
            PushgateError::TypeMismatch {
                stored: "counter",
                pushed: "gauge",
                ..
            }
        ));
    }

    #[test]
    fn summaries_add_counts_and_carry_pushed_quantiles() {
        let summary = |quantiles: &[(f64, f64)], count: u64, sum: f64| {
            Metric::new(
                Vec::new(),
                MetricValue::Summary(Summary {
                    quantiles: quantiles
                        .iter()
                        .map(|(quantile, value)| Quantile {
                            quantile: *quantile,
                            value: *value,
                        })
                        .collect(),
                    sample_count: count,
                    sample_sum: sum,
                }),
            )
        };
        let now = Instant::now();
        let mut existing = stored(
            MetricType::Summary,
            vec![summary(&[(0.5, 1.0), (0.99, 9.0)], 10, 20.0)],
            now,
        );
        let incoming = prepared(MetricType::Summary, vec![summary(&[(0.5, 2.0)], 5, 7.0)]);
        combine(&mut existing, incoming, now).unwrap();

        let MetricValue::Summary(merged) = &existing.series[0].metric.value else {
            panic!("expected summary");
        };
        assert_eq!(merged.sample_count, 15);
        assert_eq!(merged.sample_sum, 27.0);
        assert_eq!(
            merged.quantiles,
            vec![
                Quantile {
                    quantile: 0.5,
                    value: 2.0
                },
                Quantile {
                    quantile: 0.99,
                    value: 9.0
                },
            ]
        );
    }

    #[test]
    fn coalesce_folds_equal_neighbours() {
        let metrics = vec![
            counter(&[("region", "eu")], 1.0),
            counter(&[("region", "us")], 2.0),
            counter(&[("region", "us")], 3.0),
        ];
        let out = coalesce("family", metrics).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].value, MetricValue::Counter(5.0));
    }

    #[test]
    fn pushed_timestamp_replaces_stored_one() {
        let now = Instant::now();
        let mut first = counter(&[], 1.0);
        first.timestamp_ms = Some(1_000);
        let mut existing = stored(MetricType::Counter, vec![first], now);

        let mut second = counter(&[], 1.0);
        second.timestamp_ms = Some(2_000);
        combine(&mut existing, prepared(MetricType::Counter, vec![second]), now).unwrap();
        assert_eq!(existing.series[0].metric.timestamp_ms, Some(2_000));

        combine(
            &mut existing,
            prepared(MetricType::Counter, vec![counter(&[], 1.0)]),
            now,
        )
        .unwrap();
        assert_eq!(existing.series[0].metric.timestamp_ms, Some(2_000));
    }
}
