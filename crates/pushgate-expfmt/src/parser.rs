//! Text exposition format parser (format version 0.0.4).
//!
//! ```text
//! # HELP http_requests_total The total number of HTTP requests.
//! # TYPE http_requests_total counter
//! http_requests_total{method="post",code="200"} 1027 1395066363000
//! ```
//!
//! Histogram (`_bucket`, `_sum`, `_count`) and summary (`{quantile}`,
//! `_sum`, `_count`) samples are folded into one metric per label set.
//! Samples without a preceding `# TYPE` line form untyped families.

use std::collections::HashMap;

use crate::error::{ParseError, ParseErrorKind};
use crate::types::{
    Bucket, Histogram, LabelPair, Metric, MetricFamily, MetricType, MetricValue, Quantile, Summary,
};

const BUCKET_LABEL: &str = "le";
const QUANTILE_LABEL: &str = "quantile";

/// Parses a complete text exposition payload.
///
/// Families are returned in order of first appearance. Families that were
/// only announced by `# HELP`/`# TYPE` without any sample are dropped.
pub fn parse_text(input: &[u8]) -> Result<Vec<MetricFamily>, ParseError> {
    let mut parser = TextParser::default();
    for (index, raw) in input.split(|byte| *byte == b'\n').enumerate() {
        let line_number = index + 1;
        let line = std::str::from_utf8(raw)
            .map_err(|_| ParseError::new(line_number, ParseErrorKind::InvalidUtf8))?;
        parser
            .parse_line(line)
            .map_err(|kind| ParseError::new(line_number, kind))?;
    }
    Ok(parser.finish())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SampleRole {
    Value,
    Bucket,
    Sum,
    Count,
}

#[derive(Default)]
struct FamilyBuilder {
    name: String,
    help: Option<String>,
    metric_type: Option<MetricType>,
    has_samples: bool,
    metrics: Vec<Metric>,
    series_index: HashMap<Vec<LabelPair>, usize>,
}

impl FamilyBuilder {
    fn series_mut(
        &mut self,
        labels: Vec<LabelPair>,
        timestamp_ms: Option<i64>,
        empty: MetricValue,
    ) -> &mut Metric {
        let index = match self.series_index.get(&labels) {
            Some(index) => *index,
            None => {
                let index = self.metrics.len();
                self.series_index.insert(labels.clone(), index);
                self.metrics.push(Metric::new(labels, empty));
                index
            }
        };

        let metric = &mut self.metrics[index];
        if timestamp_ms.is_some() {
            metric.timestamp_ms = timestamp_ms;
        }
        metric
    }

    fn into_family(mut self) -> MetricFamily {
        for metric in &mut self.metrics {
            match &mut metric.value {
                MetricValue::Histogram(histogram) => histogram
                    .buckets
                    .sort_by(|left, right| left.upper_bound.total_cmp(&right.upper_bound)),
                MetricValue::Summary(summary) => summary
                    .quantiles
                    .sort_by(|left, right| left.quantile.total_cmp(&right.quantile)),
                _ => {}
            }
        }

        MetricFamily {
            name: self.name,
            help: self.help,
            metric_type: Some(self.metric_type.unwrap_or(MetricType::Untyped)),
            metrics: self.metrics,
        }
    }
}

#[derive(Default)]
struct TextParser {
    families: Vec<FamilyBuilder>,
    index: HashMap<String, usize>,
}

impl TextParser {
    fn parse_line(&mut self, line: &str) -> Result<(), ParseErrorKind> {
        let line = line.trim_end_matches('\r').trim_start_matches([' ', '\t']);
        if line.is_empty() {
            return Ok(());
        }
        match line.strip_prefix('#') {
            Some(comment) => self.parse_comment(comment),
            None => self.parse_sample(line),
        }
    }

    fn parse_comment(&mut self, comment: &str) -> Result<(), ParseErrorKind> {
        let (keyword, rest) = split_token(comment);
        match keyword {
            "HELP" => {
                let (name, text) = split_token(rest);
                validate_metric_name(name)?;
                let family = self.family_mut(name);
                if family.help.is_some() {
                    return Err(ParseErrorKind::DuplicateHelp(name.to_string()));
                }
                family.help = Some(unescape_help(text.trim_end()));
                Ok(())
            }
            "TYPE" => {
                let (name, rest) = split_token(rest);
                validate_metric_name(name)?;
                let (token, _) = split_token(rest);
                let metric_type = MetricType::from_type_token(token)
                    .ok_or_else(|| ParseErrorKind::UnknownType(token.to_string()))?;
                let family = self.family_mut(name);
                if family.metric_type.is_some() {
                    return Err(ParseErrorKind::DuplicateType(name.to_string()));
                }
                if family.has_samples {
                    return Err(ParseErrorKind::TypeAfterSamples(name.to_string()));
                }
                family.metric_type = Some(metric_type);
                Ok(())
            }
            // Plain comments, including the OpenMetrics `# EOF` marker.
            _ => Ok(()),
        }
    }

    fn parse_sample(&mut self, line: &str) -> Result<(), ParseErrorKind> {
        let name_end = line
            .find(|c: char| !is_metric_name_char(c))
            .unwrap_or(line.len());
        let name = &line[..name_end];
        validate_metric_name(name)?;

        let mut rest = line[name_end..].trim_start_matches([' ', '\t']);
        let mut labels = Vec::new();
        if let Some(after) = rest.strip_prefix('{') {
            let (parsed, remaining) = parse_labels(after)?;
            labels = parsed;
            rest = remaining;
        }

        let fields: Vec<&str> = rest.split_ascii_whitespace().collect();
        let (value, timestamp) = match fields.as_slice() {
            [] => {
                return Err(ParseErrorKind::Unexpected {
                    expected: "sample value",
                    found: String::new(),
                });
            }
            [value] => (*value, None),
            [value, timestamp] => (*value, Some(*timestamp)),
            [_, _, extra, ..] => {
                return Err(ParseErrorKind::Unexpected {
                    expected: "end of line",
                    found: truncate(extra),
                });
            }
        };

        let value =
            parse_float(value).ok_or_else(|| ParseErrorKind::InvalidValue(value.to_string()))?;
        let timestamp_ms = timestamp
            .map(|raw| {
                raw.parse::<i64>()
                    .map_err(|_| ParseErrorKind::InvalidTimestamp(raw.to_string()))
            })
            .transpose()?;

        self.add_sample(name, labels, value, timestamp_ms)
    }

    fn add_sample(
        &mut self,
        sample: &str,
        labels: Vec<LabelPair>,
        value: f64,
        timestamp_ms: Option<i64>,
    ) -> Result<(), ParseErrorKind> {
        let (family_name, role) = self.resolve(sample);
        let family = self.family_mut(&family_name);
        family.has_samples = true;
        let family_type = family.metric_type.unwrap_or(MetricType::Untyped);

        match (family_type, role) {
            (MetricType::Counter | MetricType::Gauge | MetricType::Untyped, SampleRole::Value) => {
                if let Some(value) = MetricValue::scalar(family_type, value) {
                    family.metrics.push(Metric {
                        labels,
                        value,
                        timestamp_ms,
                    });
                }
            }
            (MetricType::Histogram, SampleRole::Bucket) => {
                let (labels, bound) = take_label(labels, BUCKET_LABEL)
                    .ok_or_else(|| ParseErrorKind::MissingBucketBound(sample.to_string()))?;
                let upper_bound = parse_float(&bound).ok_or(ParseErrorKind::InvalidValue(bound))?;
                let cumulative_count = parse_count(value)?;
                let metric = family.series_mut(labels, timestamp_ms, empty_histogram());
                if let MetricValue::Histogram(histogram) = &mut metric.value {
                    histogram.buckets.push(Bucket {
                        upper_bound,
                        cumulative_count,
                    });
                }
            }
            (MetricType::Summary, SampleRole::Value) => {
                let (labels, quantile) = take_label(labels, QUANTILE_LABEL)
                    .ok_or_else(|| ParseErrorKind::MissingQuantile(sample.to_string()))?;
                let quantile =
                    parse_float(&quantile).ok_or(ParseErrorKind::InvalidValue(quantile))?;
                let metric = family.series_mut(labels, timestamp_ms, empty_summary());
                if let MetricValue::Summary(summary) = &mut metric.value {
                    summary.quantiles.push(Quantile { quantile, value });
                }
            }
            (MetricType::Histogram | MetricType::Summary, SampleRole::Sum) => {
                let empty = if family_type == MetricType::Histogram {
                    empty_histogram()
                } else {
                    empty_summary()
                };
                match &mut family.series_mut(labels, timestamp_ms, empty).value {
                    MetricValue::Histogram(histogram) => histogram.sample_sum = value,
                    MetricValue::Summary(summary) => summary.sample_sum = value,
                    _ => {}
                }
            }
            (MetricType::Histogram | MetricType::Summary, SampleRole::Count) => {
                let count = parse_count(value)?;
                let empty = if family_type == MetricType::Histogram {
                    empty_histogram()
                } else {
                    empty_summary()
                };
                match &mut family.series_mut(labels, timestamp_ms, empty).value {
                    MetricValue::Histogram(histogram) => histogram.sample_count = count,
                    MetricValue::Summary(summary) => summary.sample_count = count,
                    _ => {}
                }
            }
            _ => {
                return Err(ParseErrorKind::UnexpectedSample {
                    sample: sample.to_string(),
                    family: family_name,
                    family_type: family_type.as_prometheus_type(),
                });
            }
        }

        Ok(())
    }

    /// Maps a sample name onto the family it belongs to.
    fn resolve(&self, sample: &str) -> (String, SampleRole) {
        if let Some(&index) = self.index.get(sample)
            && self.families[index].metric_type.is_some()
        {
            return (sample.to_string(), SampleRole::Value);
        }

        for (suffix, role) in [
            ("_bucket", SampleRole::Bucket),
            ("_sum", SampleRole::Sum),
            ("_count", SampleRole::Count),
        ] {
            if let Some(base) = sample.strip_suffix(suffix)
                && let Some(&index) = self.index.get(base)
                && matches!(
                    (self.families[index].metric_type, role),
                    (Some(MetricType::Histogram), _)
                        | (Some(MetricType::Summary), SampleRole::Sum | SampleRole::Count)
                )
            {
                return (base.to_string(), role);
            }
        }

        (sample.to_string(), SampleRole::Value)
    }

    fn family_mut(&mut self, name: &str) -> &mut FamilyBuilder {
        let index = match self.index.get(name) {
            Some(index) => *index,
            None => {
                let index = self.families.len();
                self.index.insert(name.to_string(), index);
                self.families.push(FamilyBuilder {
                    name: name.to_string(),
                    ..FamilyBuilder::default()
                });
                index
            }
        };
        &mut self.families[index]
    }

    fn finish(self) -> Vec<MetricFamily> {
        self.families
            .into_iter()
            .filter(|family| !family.metrics.is_empty())
            .map(FamilyBuilder::into_family)
            .collect()
    }
}

fn parse_labels(input: &str) -> Result<(Vec<LabelPair>, &str), ParseErrorKind> {
    let mut labels: Vec<LabelPair> = Vec::new();
    let mut rest = input;

    loop {
        rest = rest.trim_start_matches([' ', '\t']);
        if let Some(after) = rest.strip_prefix('}') {
            return Ok((labels, after));
        }
        if rest.is_empty() {
            return Err(ParseErrorKind::UnterminatedLabels);
        }

        let name_end = rest
            .find(|c: char| !is_label_name_char(c))
            .unwrap_or(rest.len());
        let name = &rest[..name_end];
        if !is_valid_label_name(name) {
            return Err(ParseErrorKind::InvalidLabelName(truncate(rest)));
        }

        rest = rest[name_end..].trim_start_matches([' ', '\t']);
        rest = rest.strip_prefix('=').ok_or_else(|| unexpected("'='", rest))?;
        rest = rest.trim_start_matches([' ', '\t']);
        rest = rest.strip_prefix('"').ok_or_else(|| unexpected("'\"'", rest))?;
        let (value, after) = parse_label_value(rest)?;

        if labels.iter().any(|label| label.name == name) {
            return Err(ParseErrorKind::DuplicateLabel(name.to_string()));
        }
        labels.push(LabelPair::new(name, value));

        rest = after.trim_start_matches([' ', '\t']);
        if let Some(after) = rest.strip_prefix(',') {
            rest = after;
            continue;
        }
        if let Some(after) = rest.strip_prefix('}') {
            return Ok((labels, after));
        }
        if rest.is_empty() {
            return Err(ParseErrorKind::UnterminatedLabels);
        }
        return Err(unexpected("',' or '}'", rest));
    }
}

fn parse_label_value(input: &str) -> Result<(String, &str), ParseErrorKind> {
    let mut value = String::new();
    let mut chars = input.char_indices();
    while let Some((index, c)) = chars.next() {
        match c {
            '"' => return Ok((value, &input[index + 1..])),
            '\\' => match chars.next() {
                Some((_, '\\')) => value.push('\\'),
                Some((_, '"')) => value.push('"'),
                Some((_, 'n')) => value.push('\n'),
                Some(_) => return Err(ParseErrorKind::InvalidEscape),
                None => return Err(ParseErrorKind::UnterminatedLabels),
            },
            _ => value.push(c),
        }
    }
    Err(ParseErrorKind::UnterminatedLabels)
}

fn unescape_help(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn take_label(mut labels: Vec<LabelPair>, name: &str) -> Option<(Vec<LabelPair>, String)> {
    let position = labels.iter().position(|label| label.name == name)?;
    let label = labels.remove(position);
    Some((labels, label.value))
}

fn empty_histogram() -> MetricValue {
    MetricValue::Histogram(Histogram::default())
}

fn empty_summary() -> MetricValue {
    MetricValue::Summary(Summary::default())
}

/// Parses a sample value, accepting the `NaN`, `+Inf` and `-Inf` spellings.
pub(crate) fn parse_float(raw: &str) -> Option<f64> {
    match raw {
        "NaN" => Some(f64::NAN),
        "+Inf" | "Inf" => Some(f64::INFINITY),
        "-Inf" => Some(f64::NEG_INFINITY),
        _ => raw.parse::<f64>().ok(),
    }
}

fn parse_count(value: f64) -> Result<u64, ParseErrorKind> {
    if !value.is_finite() || value < 0.0 {
        return Err(ParseErrorKind::InvalidCount(value.to_string()));
    }
    Ok(value as u64)
}

fn split_token(input: &str) -> (&str, &str) {
    let input = input.trim_start_matches([' ', '\t']);
    match input.find([' ', '\t']) {
        Some(end) => (&input[..end], input[end..].trim_start_matches([' ', '\t'])),
        None => (input, ""),
    }
}

fn validate_metric_name(name: &str) -> Result<(), ParseErrorKind> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_' || first == ':')
                && chars.all(is_metric_name_char)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ParseErrorKind::InvalidMetricName(truncate(name)))
    }
}

fn is_metric_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == ':'
}

fn is_label_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => (first.is_ascii_alphabetic() || first == '_') && chars.all(is_label_name_char),
        None => false,
    }
}

fn unexpected(expected: &'static str, found: &str) -> ParseErrorKind {
    ParseErrorKind::Unexpected {
        expected,
        found: truncate(found),
    }
}

fn truncate(value: &str) -> String {
    if value.chars().count() > 32 {
        let head: String = value.chars().take(29).collect();
        format!("{head}...")
    } else {
        value.to_string()
    }
}
