//! Custom error types for the application.
//!
//! This module defines the primary error type, `ScopeError`, for the entire
//! application. Using the `thiserror` crate, it provides a centralized and
//! consistent way to handle the different failure classes the capture path
//! can hit, from instrument communication to path validation and file I/O.
//!
//! ## Error taxonomy
//!
//! - **`NotConnected`**: `capture()` was called without an open instrument
//!   session. No instrument I/O is attempted in this case.
//! - **`Connection`**: device discovery or session open failed, or the
//!   device was lost mid-operation.
//! - **`InstrumentBusy`**: the scope reported a pending-trigger state; the
//!   capture is refused instead of blocking.
//! - **`InstrumentTimeout`**: the instrument layer timed out.
//! - **`Instrument`**: any other instrument-side failure, surfaced verbatim.
//! - **`Naming`**: invalid filename or layout field values. These abort a
//!   capture before any file is touched and never advance the counter.
//! - **`FileWrite`**: the resolved path could not be written. The temp+rename
//!   discipline guarantees no partial file is left behind.
//! - **`Config`** / **`ConfigValidation`**: settings file parsing and
//!   semantic validation failures.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, ScopeError>;

#[derive(Error, Debug)]
pub enum ScopeError {
    #[error("No oscilloscope connected")]
    NotConnected,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Instrument busy: waiting for trigger")]
    InstrumentBusy,

    #[error("Instrument timed out")]
    InstrumentTimeout,

    #[error("Instrument error: {0}")]
    Instrument(String),

    #[error("Naming error: {0}")]
    Naming(String),

    #[error("Failed to write '{}': {source}", .path.display())]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Configuration validation error: {0}")]
    ConfigValidation(String),

    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ScopeError::Instrument("hardcopy failed".to_string());
        assert_eq!(err.to_string(), "Instrument error: hardcopy failed");
    }

    #[test]
    fn test_file_write_error_names_path() {
        let err = ScopeError::FileWrite {
            path: PathBuf::from("/data/capture_001.png"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("capture_001.png"));
    }
}
