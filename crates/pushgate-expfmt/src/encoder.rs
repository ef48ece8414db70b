//! Exposition encoders for the Prometheus text format and OpenMetrics.

use std::io::{self, Write};

use crate::format::Format;
use crate::types::{LabelPair, Metric, MetricFamily, MetricType, MetricValue};

/// Family metadata written ahead of the samples.
#[derive(Debug, Clone, Copy)]
pub struct FamilyHeader<'a> {
    pub name: &'a str,
    pub help: Option<&'a str>,
    pub metric_type: MetricType,
}

impl<'a> FamilyHeader<'a> {
    pub fn of(family: &'a MetricFamily) -> Self {
        Self {
            name: &family.name,
            help: family.help.as_deref(),
            metric_type: family.metric_type.unwrap_or(MetricType::Untyped),
        }
    }
}

/// Writes one family at a time into the underlying writer.
///
/// Each family is rendered into a scratch buffer first and handed to the
/// writer with a single `write_all`, so a failing writer never sees half a
/// sample line.
pub struct Encoder<W: Write> {
    writer: W,
    format: Format,
    scratch: String,
}

impl<W: Write> Encoder<W> {
    pub fn new(writer: W, format: Format) -> Self {
        Self {
            writer,
            format,
            scratch: String::new(),
        }
    }

    pub fn encode(&mut self, family: &MetricFamily) -> io::Result<()> {
        self.encode_parts(FamilyHeader::of(family), &family.metrics)
    }

    pub fn encode_parts<'m, I>(&mut self, header: FamilyHeader<'_>, metrics: I) -> io::Result<()>
    where
        I: IntoIterator<Item = &'m Metric>,
    {
        self.scratch.clear();
        let out = &mut self.scratch;
        let format = self.format;

        let family_name = match (format, header.metric_type) {
            (Format::OpenMetrics, MetricType::Counter) => {
                header.name.strip_suffix("_total").unwrap_or(header.name)
            }
            _ => header.name,
        };

        if let Some(help) = header.help {
            out.push_str("# HELP ");
            out.push_str(family_name);
            out.push(' ');
            out.push_str(&escape_help(help, format));
            out.push('\n');
        }

        out.push_str("# TYPE ");
        out.push_str(family_name);
        out.push(' ');
        out.push_str(match format {
            Format::Text => header.metric_type.as_prometheus_type(),
            Format::OpenMetrics => header.metric_type.as_openmetrics_type(),
        });
        out.push('\n');

        for metric in metrics {
            render_metric(out, format, family_name, header.metric_type, metric);
        }

        self.writer.write_all(self.scratch.as_bytes())
    }

    /// Writes the format trailer, flushes, and hands the writer back.
    pub fn finish(mut self) -> io::Result<W> {
        if self.format == Format::OpenMetrics {
            self.writer.write_all(b"# EOF\n")?;
        }
        self.writer.flush()?;
        Ok(self.writer)
    }
}

fn render_metric(
    out: &mut String,
    format: Format,
    family_name: &str,
    metric_type: MetricType,
    metric: &Metric,
) {
    let timestamp = metric.timestamp_ms;
    match &metric.value {
        MetricValue::Counter(value) | MetricValue::Gauge(value) | MetricValue::Untyped(value) => {
            let sample_name = match (format, metric_type) {
                (Format::OpenMetrics, MetricType::Counter) => format!("{family_name}_total"),
                _ => family_name.to_string(),
            };
            render_sample_line(out, format, &sample_name, &metric.labels, None, *value, timestamp);
        }
        MetricValue::Histogram(histogram) => {
            let bucket_name = format!("{family_name}_bucket");
            let mut saw_inf = false;
            for bucket in &histogram.buckets {
                saw_inf |= bucket.upper_bound == f64::INFINITY;
                render_sample_line(
                    out,
                    format,
                    &bucket_name,
                    &metric.labels,
                    Some(("le", &format_float(bucket.upper_bound))),
                    bucket.cumulative_count as f64,
                    timestamp,
                );
            }
            if !saw_inf {
                render_sample_line(
                    out,
                    format,
                    &bucket_name,
                    &metric.labels,
                    Some(("le", "+Inf")),
                    histogram.sample_count as f64,
                    timestamp,
                );
            }
            render_sample_line(
                out,
                format,
                &format!("{family_name}_sum"),
                &metric.labels,
                None,
                histogram.sample_sum,
                timestamp,
            );
            render_sample_line(
                out,
                format,
                &format!("{family_name}_count"),
                &metric.labels,
                None,
                histogram.sample_count as f64,
                timestamp,
            );
        }
        MetricValue::Summary(summary) => {
            for quantile in &summary.quantiles {
                render_sample_line(
                    out,
                    format,
                    family_name,
                    &metric.labels,
                    Some(("quantile", &format_float(quantile.quantile))),
                    quantile.value,
                    timestamp,
                );
            }
            render_sample_line(
                out,
                format,
                &format!("{family_name}_sum"),
                &metric.labels,
                None,
                summary.sample_sum,
                timestamp,
            );
            render_sample_line(
                out,
                format,
                &format!("{family_name}_count"),
                &metric.labels,
                None,
                summary.sample_count as f64,
                timestamp,
            );
        }
    }
}

fn render_sample_line(
    out: &mut String,
    format: Format,
    name: &str,
    labels: &[LabelPair],
    extra: Option<(&str, &str)>,
    value: f64,
    timestamp_ms: Option<i64>,
) {
    out.push_str(name);

    if !labels.is_empty() || extra.is_some() {
        out.push('{');
        let pairs = labels
            .iter()
            .map(|label| (label.name.as_str(), label.value.as_str()))
            .chain(extra);
        for (index, (key, value)) in pairs.enumerate() {
            if index > 0 {
                out.push(',');
            }
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&escape_label_value(value));
            out.push('"');
        }
        out.push('}');
    }

    out.push(' ');
    out.push_str(&format_float(value));

    if let Some(ts) = timestamp_ms {
        out.push(' ');
        match format {
            Format::Text => out.push_str(&ts.to_string()),
            // OpenMetrics timestamps are seconds.
            Format::OpenMetrics => {
                out.push_str(&format!("{}.{:03}", ts.div_euclid(1000), ts.rem_euclid(1000)));
            }
        }
    }

    out.push('\n');
}

pub(crate) fn format_float(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else if value != 0.0 && (value.abs() >= 1e15 || value.abs() < 1e-4) {
        format!("{value:e}")
    } else if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

fn escape_help(value: &str, format: Format) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\n', "\\n");
    match format {
        Format::Text => escaped,
        Format::OpenMetrics => escaped.replace('"', "\\\""),
    }
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_text;
    use crate::types::{Bucket, Histogram, Quantile, Summary};

    fn encode(family: &MetricFamily, format: Format) -> String {
        let mut encoder = Encoder::new(Vec::new(), format);
        encoder.encode(family).unwrap();
        String::from_utf8(encoder.finish().unwrap()).unwrap()
    }

    fn counter_family() -> MetricFamily {
        let mut family = MetricFamily::new("jobs_done_total", MetricType::Counter);
        family.help = Some("Jobs done.".to_string());
        family.metrics.push(Metric::new(
            vec![LabelPair::new("job", "a")],
            MetricValue::Counter(8.0),
        ));
        family
    }

    #[test]
    fn renders_text_counter() {
        assert_eq!(
            encode(&counter_family(), Format::Text),
            "# HELP jobs_done_total Jobs done.\n\
             # TYPE jobs_done_total counter\n\
             jobs_done_total{job=\"a\"} 8\n"
        );
    }

    #[test]
    fn renders_openmetrics_counter_with_total_suffix_and_eof() {
        assert_eq!(
            encode(&counter_family(), Format::OpenMetrics),
            "# HELP jobs_done Jobs done.\n\
             # TYPE jobs_done counter\n\
             jobs_done_total{job=\"a\"} 8\n\
             # EOF\n"
        );
    }

    #[test]
    fn renders_histogram_with_implicit_inf_bucket() {
        let mut family = MetricFamily::new("latency", MetricType::Histogram);
        family.metrics.push(Metric::new(
            Vec::new(),
            MetricValue::Histogram(Histogram {
                buckets: vec![Bucket {
                    upper_bound: 0.5,
                    cumulative_count: 2,
                }],
                sample_count: 3,
                sample_sum: 1.25,
            }),
        ));

        assert_eq!(
            encode(&family, Format::Text),
            "# TYPE latency histogram\n\
             latency_bucket{le=\"0.5\"} 2\n\
             latency_bucket{le=\"+Inf\"} 3\n\
             latency_sum 1.25\n\
             latency_count 3\n"
        );
    }

    #[test]
    fn renders_summary_quantiles() {
        let mut family = MetricFamily::new("rpc", MetricType::Summary);
        family.metrics.push(Metric::new(
            vec![LabelPair::new("svc", "x")],
            MetricValue::Summary(Summary {
                quantiles: vec![Quantile {
                    quantile: 0.99,
                    value: 0.3,
                }],
                sample_count: 10,
                sample_sum: 2.0,
            }),
        ));

        let output = encode(&family, Format::Text);
        assert!(output.contains("rpc{svc=\"x\",quantile=\"0.99\"} 0.3\n"));
        assert!(output.contains("rpc_sum{svc=\"x\"} 2\n"));
        assert!(output.contains("rpc_count{svc=\"x\"} 10\n"));
    }

    #[test]
    fn escapes_label_values() {
        let mut family = MetricFamily::new("m", MetricType::Gauge);
        family.metrics.push(Metric::new(
            vec![LabelPair::new("path", "a\"b\\c\nd")],
            MetricValue::Gauge(1.0),
        ));
        assert!(encode(&family, Format::Text).contains("m{path=\"a\\\"b\\\\c\\nd\"} 1\n"));
    }

    #[test]
    fn formats_special_floats() {
        assert_eq!(format_float(f64::NAN), "NaN");
        assert_eq!(format_float(f64::NEG_INFINITY), "-Inf");
        assert_eq!(format_float(0.25), "0.25");
        assert_eq!(format_float(1e20), "1e20");
        assert_eq!(format_float(-3.0), "-3");
    }

    #[test]
    fn text_output_parses_back() {
        let input = "# HELP up Whether the target is up.\n\
                     # TYPE up gauge\n\
                     up{instance=\"a:1\"} 1 1700000000000\n\
                     # TYPE lat histogram\n\
                     lat_bucket{le=\"1\"} 1\n\
                     lat_bucket{le=\"+Inf\"} 2\n\
                     lat_sum 3.5\n\
                     lat_count 2\n";
        let families = parse_text(input.as_bytes()).unwrap();
        let mut encoder = Encoder::new(Vec::new(), Format::Text);
        for family in &families {
            encoder.encode(family).unwrap();
        }
        let output = encoder.finish().unwrap();
        assert_eq!(parse_text(&output).unwrap(), families);
    }
}
