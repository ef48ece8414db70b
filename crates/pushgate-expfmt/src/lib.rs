//! Prometheus exposition format support.
//!
//! ```text
//! bytes ──parse_text()──▶ Vec<MetricFamily> ──Encoder::encode()──▶ bytes
//!                                             (Format::Text | Format::OpenMetrics)
//! ```

pub mod encoder;
pub mod error;
pub mod format;
pub mod parser;
pub mod types;

pub use encoder::{Encoder, FamilyHeader};
pub use error::{ParseError, ParseErrorKind};
pub use format::Format;
pub use parser::parse_text;
pub use types::{
    Bucket, Histogram, LabelPair, Metric, MetricFamily, MetricType, MetricValue, Quantile,
    Summary,
};
