//! Error types for the capture controller.

use thiserror::Error;

/// Result type for capture operations.
pub type Result<T> = std::result::Result<T, CaptureError>;

/// Errors that can occur while capturing or publishing a profile.
///
/// `Clone` because every caller of [`Capture::emit`](crate::Capture::emit)
/// receives the outcome of the single publish attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// The local sink could not be opened or the profiler could not start.
    #[error("failed to start capture: {reason}")]
    Init { reason: String },

    /// Reading or writing the local sink failed.
    #[error("capture I/O error: {reason}")]
    Io { reason: String },

    /// The upload could not be delivered.
    #[error("failure during the sending of the profile dump: {reason}")]
    Transport { reason: String },

    /// The collector answered with something other than 200.
    #[error("unexpected status code response from profiling server: {status}")]
    Rejected { status: u16, body: String },

    /// The caller cancelled the emit before the upload completed.
    #[error("profile emit cancelled")]
    Cancelled,

    /// Invalid client configuration.
    #[error("configuration error: {reason}")]
    Config { reason: String },
}

impl CaptureError {
    /// Create an init error.
    pub fn init(reason: impl Into<String>) -> Self {
        Self::Init {
            reason: reason.into(),
        }
    }

    /// Create an I/O error.
    pub fn io(reason: impl Into<String>) -> Self {
        Self::Io {
            reason: reason.into(),
        }
    }

    /// Create a transport error.
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Create a rejected error.
    pub fn rejected(status: u16, body: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            body: body.into(),
        }
    }

    /// Create a config error.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Status code returned by the collector, if it answered at all.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

/// Render an error with its whole source chain, `outer: inner: root`.
pub(crate) fn chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
