//! Error types for testrig.
//!
//! The taxonomy follows one rule: failures that occur while *discarding*
//! state (closing an old instance, killing strays) are absorbed by the
//! caller that triggered them, while failures that occur while
//! *establishing* state (locating, spawning, waiting for readiness) are
//! surfaced.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for testrig operations.
#[derive(Debug, Error)]
pub enum RigError {
    // Locator errors
    #[error("No install registered for version {version}")]
    InstallNotFound { version: String },

    #[error("Locator error: {message}")]
    Locator { message: String },

    // Launch errors
    #[error("Launch failed: {message}")]
    Launch { message: String },

    #[error("Instance did not become ready within {0:?}")]
    ReadyTimeout(Duration),

    #[error("Readiness wait was cancelled")]
    Cancelled,

    // Automation endpoint errors
    #[error("Automation endpoint error: {message}")]
    Automation { message: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for testrig operations.
pub type Result<T> = std::result::Result<T, RigError>;

impl From<std::io::Error> for RigError {
    fn from(err: std::io::Error) -> Self {
        RigError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for RigError {
    fn from(err: serde_json::Error) -> Self {
        RigError::Locator {
            message: format!("invalid install registry: {}", err),
        }
    }
}

impl From<reqwest::Error> for RigError {
    fn from(err: reqwest::Error) -> Self {
        RigError::Automation {
            message: err.to_string(),
        }
    }
}

impl RigError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        RigError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// True for errors that mean "no new instance could be produced".
    ///
    /// Reuse probes and teardown never yield these; only the fresh-launch
    /// path does.
    pub fn is_launch_fatal(&self) -> bool {
        matches!(
            self,
            RigError::InstallNotFound { .. }
                | RigError::Locator { .. }
                | RigError::Launch { .. }
                | RigError::ReadyTimeout(_)
                | RigError::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RigError::InstallNotFound {
            version: "2024.1".into(),
        };
        assert_eq!(err.to_string(), "No install registered for version 2024.1");
    }

    #[test]
    fn test_launch_fatal_classification() {
        assert!(RigError::Launch {
            message: "spawn failed".into()
        }
        .is_launch_fatal());
        assert!(RigError::ReadyTimeout(Duration::from_secs(5)).is_launch_fatal());
        assert!(!RigError::Automation {
            message: "endpoint unreachable".into()
        }
        .is_launch_fatal());
    }

    #[test]
    fn test_io_with_path() {
        let err = RigError::io_with_path(
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
            "/tmp/missing",
        );
        assert!(err.to_string().contains("/tmp/missing"));
    }
}
