//! Parse error types for the text exposition format.

use thiserror::Error;

/// A parse failure together with the 1-indexed line it occurred on.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("text format parsing error in line {line}: {kind}")]
pub struct ParseError {
    pub line: usize,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub fn new(line: usize, kind: ParseErrorKind) -> Self {
        Self { line, kind }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseErrorKind {
    #[error("invalid UTF-8")]
    InvalidUtf8,
    #[error("invalid metric name {0:?}")]
    InvalidMetricName(String),
    #[error("invalid label name {0:?}")]
    InvalidLabelName(String),
    #[error("duplicate label name {0:?}")]
    DuplicateLabel(String),
    #[error("unterminated label set")]
    UnterminatedLabels,
    #[error("invalid escape sequence in label value")]
    InvalidEscape,
    #[error("expected {expected}, found {found:?}")]
    Unexpected {
        expected: &'static str,
        found: String,
    },
    #[error("invalid sample value {0:?}")]
    InvalidValue(String),
    #[error("invalid count {0:?}")]
    InvalidCount(String),
    #[error("invalid timestamp {0:?}")]
    InvalidTimestamp(String),
    #[error("unknown metric type {0:?}")]
    UnknownType(String),
    #[error("second TYPE line for metric family {0:?}")]
    DuplicateType(String),
    #[error("second HELP line for metric family {0:?}")]
    DuplicateHelp(String),
    #[error("TYPE line for metric family {0:?} after its samples")]
    TypeAfterSamples(String),
    #[error("bucket sample {0:?} is missing the \"le\" label")]
    MissingBucketBound(String),
    #[error("summary sample {0:?} is missing the \"quantile\" label")]
    MissingQuantile(String),
    #[error("sample {sample:?} is not valid for {family_type} family {family:?}")]
    UnexpectedSample {
        sample: String,
        family: String,
        family_type: &'static str,
    },
}
