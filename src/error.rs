use crate::{Point, Size};
use thiserror::Error;

/// Why the viewport sizer gave up on a requested size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeFailure {
    /// The browser never honored a window resize request
    MechanismUnusable,
    /// Two consecutive candidate window sizes were identical
    SearchStalled,
    /// The pixel search ran out of attempts or was out of range
    SearchExhausted,
}

impl std::fmt::Display for ResizeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ResizeFailure::MechanismUnusable => "window resize not honored",
            ResizeFailure::SearchStalled => "search stalled",
            ResizeFailure::SearchExhausted => "search exhausted",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    #[error("Measurement unavailable: {0}")]
    MeasurementUnavailable(String),

    #[error("Viewport {target} unachievable ({reason}), got {achieved}")]
    ResizeUnachievable {
        target: Size,
        achieved: Size,
        reason: ResizeFailure,
    },

    #[error("Image decode failed: {0}")]
    Decode(String),

    #[error("Image encode failed: {0}")]
    Encode(String),

    #[error("Image decoding is disabled")]
    DecodingDisabled,

    #[error("Scroll to {requested} landed at {achieved}")]
    ScrollFailure { requested: Point, achieved: Point },

    #[error("Script error: {0}")]
    Script(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Capture cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl CaptureError {
    /// Errors the pipeline can absorb and continue in degraded form
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CaptureError::MeasurementUnavailable(_)
                | CaptureError::ResizeUnachievable { .. }
                | CaptureError::ScrollFailure { .. }
        )
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            CaptureError::MeasurementUnavailable(_) => ErrorSeverity::Low,
            CaptureError::ScrollFailure { .. } => ErrorSeverity::Low,
            CaptureError::ResizeUnachievable { .. } => ErrorSeverity::Medium,
            CaptureError::InvalidArgument(_) => ErrorSeverity::High,
            CaptureError::Decode(_) | CaptureError::Encode(_) => ErrorSeverity::High,
            CaptureError::Cancelled => ErrorSeverity::Low,
            _ => ErrorSeverity::Medium,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
}

impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        CaptureError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for CaptureError {
    fn from(err: serde_json::Error) -> Self {
        CaptureError::SerializationError(err.to_string())
    }
}

impl From<image::ImageError> for CaptureError {
    fn from(err: image::ImageError) -> Self {
        CaptureError::Decode(err.to_string())
    }
}
