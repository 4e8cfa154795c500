//! Error types for profile storage.
//!
//! Absence of a profile is its own variant so callers can tell "nothing stored
//! under this tag" apart from a backend failure.

use thiserror::Error;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur while storing or loading a profile.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No profile has been stored for the tag.
    #[error("no profile for given tag: {tag}")]
    NoProfile { tag: String },

    /// The tag was empty.
    #[error("No tag supplied")]
    EmptyTag,

    /// The store has been closed.
    #[error("store is closed")]
    Closed,

    /// The incoming profile stream failed before it was fully read.
    #[error("failed to read profile stream: {reason}")]
    Stream { reason: String },

    /// The backing database rejected the operation.
    #[error("database error: {reason}")]
    Database { reason: String },

    /// A blocking database task could not be joined.
    #[error("storage task failed: {reason}")]
    Task { reason: String },
}

impl StoreError {
    /// Create a no-profile error.
    pub fn no_profile(tag: impl Into<String>) -> Self {
        Self::NoProfile { tag: tag.into() }
    }

    /// Create a stream error.
    pub fn stream(reason: impl Into<String>) -> Self {
        Self::Stream {
            reason: reason.into(),
        }
    }

    /// Create a database error.
    pub fn database(reason: impl Into<String>) -> Self {
        Self::Database {
            reason: reason.into(),
        }
    }

    /// Create a task error.
    pub fn task(reason: impl Into<String>) -> Self {
        Self::Task {
            reason: reason.into(),
        }
    }

    /// Check whether this error means the tag has no stored profile.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NoProfile { .. })
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::database(err.to_string())
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::task(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_profile_is_not_found() {
        let err = StoreError::no_profile("release-1");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "no profile for given tag: release-1");
    }

    #[test]
    fn test_other_errors_are_not_not_found() {
        assert!(!StoreError::Closed.is_not_found());
        assert!(!StoreError::database("disk I/O error").is_not_found());
        assert!(!StoreError::stream("connection reset").is_not_found());
    }

    #[test]
    fn test_empty_tag_message() {
        assert_eq!(StoreError::EmptyTag.to_string(), "No tag supplied");
    }
}
