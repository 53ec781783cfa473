//! Error types for audioprobe

use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Result type alias for audioprobe operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error classification, string-tagged so it can appear in diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No registered parser was willing to handle the input
    UnsupportedFormat,
    /// A required magic/shape check failed at a known offset
    InvalidHeader,
    /// Fewer bytes were available than a declared size required
    TruncatedData,
    /// Internal offsets or sizes contradict the container spec
    InconsistentContainer,
    /// Tag-vocabulary decode failed where the outer format is valid
    InvalidTagPayload,
    /// Underlying source raised, or a request violated reader bounds
    IoFailure,
    /// A condition that should never occur at runtime
    InternalInvariant,
}

impl ErrorKind {
    /// Stable string tag for diagnostics output
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnsupportedFormat => "unsupportedFormat",
            ErrorKind::InvalidHeader => "invalidHeader",
            ErrorKind::TruncatedData => "truncatedData",
            ErrorKind::InconsistentContainer => "inconsistentContainer",
            ErrorKind::InvalidTagPayload => "invalidTagPayload",
            ErrorKind::IoFailure => "ioFailure",
            ErrorKind::InternalInvariant => "internalInvariant",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for audioprobe
///
/// Every error carries a human message, an optional byte offset into the
/// source, and a string key/value context map.
#[derive(Error, Debug)]
#[error("{kind}: {message}")]
pub struct Error {
    /// Error classification
    pub kind: ErrorKind,
    /// Human-readable message
    pub message: String,
    /// Byte offset into the source where the error was detected
    pub offset: Option<u64>,
    /// Additional context (requested sizes, chunk ids, ...)
    pub context: HashMap<String, String>,
}

impl Error {
    /// Create an error of the given kind
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S) -> Self {
        Error {
            kind,
            message: message.into(),
            offset: None,
            context: HashMap::new(),
        }
    }

    /// Create an unsupported-format error
    pub fn unsupported_format<S: Into<String>>(message: S) -> Self {
        Error::new(ErrorKind::UnsupportedFormat, message)
    }

    /// Create an invalid-header error
    pub fn invalid_header<S: Into<String>>(message: S) -> Self {
        Error::new(ErrorKind::InvalidHeader, message)
    }

    /// Create a truncated-data error
    pub fn truncated_data<S: Into<String>>(message: S) -> Self {
        Error::new(ErrorKind::TruncatedData, message)
    }

    /// Create an inconsistent-container error
    pub fn inconsistent_container<S: Into<String>>(message: S) -> Self {
        Error::new(ErrorKind::InconsistentContainer, message)
    }

    /// Create an invalid-tag-payload error
    pub fn invalid_tag_payload<S: Into<String>>(message: S) -> Self {
        Error::new(ErrorKind::InvalidTagPayload, message)
    }

    /// Create an I/O-failure error
    pub fn io_failure<S: Into<String>>(message: S) -> Self {
        Error::new(ErrorKind::IoFailure, message)
    }

    /// Create an internal-invariant error
    pub fn internal_invariant<S: Into<String>>(message: S) -> Self {
        Error::new(ErrorKind::InternalInvariant, message)
    }

    /// Attach the byte offset where the error was detected
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Attach a context key/value pair
    pub fn with_context<V: Into<String>>(mut self, key: &str, value: V) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::io_failure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags() {
        assert_eq!(ErrorKind::UnsupportedFormat.as_str(), "unsupportedFormat");
        assert_eq!(ErrorKind::IoFailure.as_str(), "ioFailure");
        assert_eq!(ErrorKind::TruncatedData.to_string(), "truncatedData");
    }

    #[test]
    fn test_error_display() {
        let err = Error::invalid_header("bad magic").with_offset(12);
        assert_eq!(err.to_string(), "invalidHeader: bad magic");
        assert_eq!(err.offset, Some(12));
    }

    #[test]
    fn test_error_context() {
        let err = Error::io_failure("read too large")
            .with_context("requested", "1000")
            .with_context("max", "16");
        assert_eq!(err.context.get("requested"), Some(&"1000".to_string()));
        assert_eq!(err.context.get("max"), Some(&"16".to_string()));
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io.into();
        assert_eq!(err.kind, ErrorKind::IoFailure);
    }
}
