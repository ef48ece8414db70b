use thiserror::Error;

#[derive(Debug, Error)]
pub enum PushgateError {
    #[error("decode error: {0}")]
    Decode(String),
    #[error("labels must be defined in pairs")]
    OddLabelParts,
    #[error("invalid metric family {family:?}: {reason}")]
    InvalidFamily { family: String, reason: String },
    #[error("metric family {family:?} type mismatch: stored {stored}, pushed {pushed}")]
    TypeMismatch {
        family: String,
        stored: &'static str,
        pushed: &'static str,
    },
    #[error("metric family {family:?} histogram buckets do not match the stored buckets")]
    BucketMismatch { family: String },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PushgateError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::OddLabelParts => "odd_label_parts",
            Self::InvalidFamily { .. } => "invalid_family",
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::BucketMismatch { .. } => "bucket_mismatch",
            Self::InvalidConfig(_) => "invalid_config",
            Self::Internal(_) => "internal",
            Self::Io(_) => "io",
        }
    }

    /// Whether the error was caused by the request rather than the gateway.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Decode(_)
                | Self::OddLabelParts
                | Self::InvalidFamily { .. }
                | Self::TypeMismatch { .. }
                | Self::BucketMismatch { .. }
        )
    }

    pub fn invalid_family(family: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidFamily {
            family: family.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PushgateError>;
