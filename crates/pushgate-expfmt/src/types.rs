#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
    Summary,
    Untyped,
}

impl MetricType {
    pub const ALL: [MetricType; 5] = [
        Self::Counter,
        Self::Gauge,
        Self::Histogram,
        Self::Summary,
        Self::Untyped,
    ];

    pub fn as_prometheus_type(&self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Histogram => "histogram",
            Self::Summary => "summary",
            Self::Untyped => "untyped",
        }
    }

    pub fn as_openmetrics_type(&self) -> &'static str {
        match self {
            Self::Untyped => "unknown",
            other => other.as_prometheus_type(),
        }
    }

    /// Reads the type token of a `# TYPE` line. OpenMetrics `unknown` maps to untyped.
    pub fn from_type_token(token: &str) -> Option<Self> {
        match token {
            "counter" => Some(Self::Counter),
            "gauge" => Some(Self::Gauge),
            "histogram" => Some(Self::Histogram),
            "summary" => Some(Self::Summary),
            "untyped" | "unknown" => Some(Self::Untyped),
            _ => None,
        }
    }
}

/// A single label. Ordering is by name, then value, which gives label sets
/// (`Vec<LabelPair>`) their lexicographic total order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LabelPair {
    pub name: String,
    pub value: String,
}

impl LabelPair {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bucket {
    pub upper_bound: f64,
    pub cumulative_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Histogram {
    pub buckets: Vec<Bucket>,
    pub sample_count: u64,
    pub sample_sum: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantile {
    pub quantile: f64,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    pub quantiles: Vec<Quantile>,
    pub sample_count: u64,
    pub sample_sum: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Counter(f64),
    Gauge(f64),
    Untyped(f64),
    Histogram(Histogram),
    Summary(Summary),
}

impl MetricValue {
    pub fn metric_type(&self) -> MetricType {
        match self {
            Self::Counter(_) => MetricType::Counter,
            Self::Gauge(_) => MetricType::Gauge,
            Self::Untyped(_) => MetricType::Untyped,
            Self::Histogram(_) => MetricType::Histogram,
            Self::Summary(_) => MetricType::Summary,
        }
    }

    /// Builds the single-value payload for a counter, gauge or untyped family.
    pub fn scalar(metric_type: MetricType, value: f64) -> Option<Self> {
        match metric_type {
            MetricType::Counter => Some(Self::Counter(value)),
            MetricType::Gauge => Some(Self::Gauge(value)),
            MetricType::Untyped => Some(Self::Untyped(value)),
            MetricType::Histogram | MetricType::Summary => None,
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Counter(value) | Self::Gauge(value) | Self::Untyped(value) => Some(*value),
            Self::Histogram(_) | Self::Summary(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub labels: Vec<LabelPair>,
    pub value: MetricValue,
    pub timestamp_ms: Option<i64>,
}

impl Metric {
    pub fn new(labels: Vec<LabelPair>, value: MetricValue) -> Self {
        Self {
            labels,
            value,
            timestamp_ms: None,
        }
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|label| label.name == name)
            .map(|label| label.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    pub name: String,
    pub help: Option<String>,
    /// `None` only for families assembled outside the parser; the parser
    /// always assigns a type, defaulting to untyped.
    pub metric_type: Option<MetricType>,
    pub metrics: Vec<Metric>,
}

impl MetricFamily {
    pub fn new(name: impl Into<String>, metric_type: MetricType) -> Self {
        Self {
            name: name.into(),
            help: None,
            metric_type: Some(metric_type),
            metrics: Vec::new(),
        }
    }
}
