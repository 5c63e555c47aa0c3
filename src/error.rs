//! Error types shared across the crate.
//!
//! Remote failures are split so callers can special-case quota exhaustion:
//! [`AiError::QuotaExceeded`] trips the circuit breaker, everything else is
//! reported once and dropped.

use thiserror::Error;

/// Failure of a remote vision call.
#[derive(Debug, Clone, Error)]
pub enum AiError {
    /// The retry budget was spent on rate-limit/quota failures.
    #[error("AI quota exceeded after {attempts} attempt(s)")]
    QuotaExceeded { attempts: u32 },

    /// The backend answered with an error (or the request never completed).
    #[error("{}", describe_remote(*.status, *.code, .message))]
    Remote {
        status: Option<u16>,
        code: Option<i64>,
        message: String,
    },

    /// The backend answered but the payload was unusable.
    #[error("malformed AI response: {0}")]
    MalformedResponse(String),

    /// The call could not be made at all (no client, unreadable source, ...).
    #[error("AI unavailable: {0}")]
    Unavailable(String),
}

fn describe_remote(status: Option<u16>, code: Option<i64>, message: &str) -> String {
    match (status, code) {
        (Some(s), _) => format!("AI service error ({s}): {message}"),
        (None, Some(c)) => format!("AI service error (code {c}): {message}"),
        (None, None) => format!("AI service error: {message}"),
    }
}

impl AiError {
    /// Shorthand for a transport-level failure without status information.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Remote {
            status: None,
            code: None,
            message: message.into(),
        }
    }

    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}

/// Failure inside the compositing pipeline.
#[derive(Debug, Error)]
pub enum CompositeError {
    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("invalid detection region [{ymin}, {xmin}, {ymax}, {xmax}]")]
    InvalidRegion {
        ymin: i32,
        xmin: i32,
        ymax: i32,
        xmax: i32,
    },

    #[error("overlay would need a {width}x{height} buffer")]
    OverlayTooLarge { width: u32, height: u32 },

    #[error("failed to encode image: {0}")]
    Encode(#[source] image::ImageError),
}

/// Failure of a batch export. No partial deliverable exists when this is returned.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("nothing to export")]
    Empty,

    #[error("failed to process image {index} ({name}): {source}")]
    Composite {
        index: usize,
        name: String,
        #[source]
        source: CompositeError,
    },

    #[error("failed to read source for {name}: {source}")]
    Source {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("export I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("export task failed: {0}")]
    Task(String),
}
