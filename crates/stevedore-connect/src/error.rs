//! Error types for stevedore-connect
//!
//! Provides structured error handling for the conversion pipeline and the
//! per-record error taxonomy destination writers report against.

use std::fmt;
use thiserror::Error;

/// Result type alias for stevedore-connect operations
pub type Result<T> = std::result::Result<T, SinkError>;

/// Classification of a per-record failure.
///
/// The first group covers failures produced while decoding, validating, and
/// templating a message; the `Sink*` group is reserved for failures reported
/// by a destination during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Empty key/value where one was required
    InvalidMessage,
    /// Disallowed undecoded wire data was present
    UnknownFields,
    /// Malformed payload
    Deserialization,
    /// Nested JSON where only flat objects are supported
    UnsupportedNesting,
    /// A template or mapping referenced a field absent from the schema
    InvalidFieldPath,
    /// Compile-time pattern/argument mismatch
    InvalidTemplate,
    /// Destination rejected the record with a client error
    Sink4xx,
    /// Destination failed with a server error
    Sink5xx,
    /// Destination failure that may succeed on retry
    SinkRetryable,
    /// Destination failure of unknown shape
    SinkUnknown,
    /// Unclassified failure
    Default,
}

impl ErrorKind {
    /// String form used in logs and error descriptions
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidMessage => "invalid_message",
            Self::UnknownFields => "unknown_fields",
            Self::Deserialization => "deserialization",
            Self::UnsupportedNesting => "unsupported_nesting",
            Self::InvalidFieldPath => "invalid_field_path",
            Self::InvalidTemplate => "invalid_template",
            Self::Sink4xx => "sink_4xx",
            Self::Sink5xx => "sink_5xx",
            Self::SinkRetryable => "sink_retryable",
            Self::SinkUnknown => "sink_unknown",
            Self::Default => "default",
        }
    }

    /// Check if a failure of this kind may succeed on redelivery
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Sink5xx | Self::SinkRetryable)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type for the conversion pipeline
#[derive(Debug, Error)]
pub enum SinkError {
    /// Configuration error (fatal, surfaces at writer construction)
    #[error("configuration error: {0}")]
    Config(String),

    /// The selected side of the message carried no bytes
    #[error("empty message: {0}")]
    EmptyMessage(String),

    /// Undecoded wire data not accounted for by the schema
    #[error("unknown fields in message: {0}")]
    UnknownFields(String),

    /// The payload could not be decoded against its descriptor
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Malformed JSON payload
    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    /// Nested JSON objects are not supported by the flat JSON format
    #[error("unsupported nesting: {0}")]
    UnsupportedNesting(String),

    /// A field path did not resolve against the schema
    #[error("invalid field path: {0}")]
    InvalidFieldPath(String),

    /// A template pattern failed to compile
    #[error("invalid template: {0}")]
    InvalidTemplate(String),

    /// A metadata entry could not be coerced to its configured column type
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    /// Failure reported by a destination during reconciliation
    #[error("sink error ({kind}): {message}")]
    Sink {
        /// Destination-side classification
        kind: ErrorKind,
        /// Destination-reported detail
        message: String,
    },
}

impl SinkError {
    /// Classify this error into the per-record taxonomy.
    ///
    /// Pure function of the variant; destination writers use it to build
    /// [`ErrorInfo`] entries without inspecting error internals.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Default,
            Self::EmptyMessage(_) => ErrorKind::InvalidMessage,
            Self::UnknownFields(_) => ErrorKind::UnknownFields,
            Self::Deserialization(_) | Self::InvalidPayload(_) => ErrorKind::Deserialization,
            Self::UnsupportedNesting(_) => ErrorKind::UnsupportedNesting,
            Self::InvalidFieldPath(_) => ErrorKind::InvalidFieldPath,
            Self::InvalidTemplate(_) => ErrorKind::InvalidTemplate,
            Self::InvalidMetadata(_) => ErrorKind::Default,
            Self::Sink { kind, .. } => *kind,
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a destination-reported error
    pub fn sink(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self::Sink {
            kind,
            message: msg.into(),
        }
    }
}

/// A classified per-record failure carried through a [`SinkResponse`].
///
/// [`SinkResponse`]: crate::partition::SinkResponse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Taxonomy bucket for the failure
    pub kind: ErrorKind,
    /// Human-readable cause
    pub cause: String,
}

impl ErrorInfo {
    /// Create an error info from a kind and cause
    pub fn new(kind: ErrorKind, cause: impl Into<String>) -> Self {
        Self {
            kind,
            cause: cause.into(),
        }
    }
}

impl From<SinkError> for ErrorInfo {
    fn from(err: SinkError) -> Self {
        Self {
            kind: err.kind(),
            cause: err.to_string(),
        }
    }
}

impl From<&SinkError> for ErrorInfo {
    fn from(err: &SinkError) -> Self {
        Self {
            kind: err.kind(),
            cause: err.to_string(),
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.cause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            SinkError::EmptyMessage("key".into()).kind(),
            ErrorKind::InvalidMessage
        );
        assert_eq!(
            SinkError::UnknownFields("5 (varint)".into()).kind(),
            ErrorKind::UnknownFields
        );
        assert_eq!(
            SinkError::InvalidFieldPath("order_id".into()).kind(),
            ErrorKind::InvalidFieldPath
        );
        assert_eq!(
            SinkError::sink(ErrorKind::Sink5xx, "internal").kind(),
            ErrorKind::Sink5xx
        );
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(ErrorKind::Sink5xx.is_retryable());
        assert!(ErrorKind::SinkRetryable.is_retryable());
        assert!(!ErrorKind::Sink4xx.is_retryable());
        assert!(!ErrorKind::Deserialization.is_retryable());
    }

    #[test]
    fn test_error_info_from_error() {
        let info = ErrorInfo::from(SinkError::Deserialization("truncated varint".into()));
        assert_eq!(info.kind, ErrorKind::Deserialization);
        assert!(info.cause.contains("truncated varint"));
    }

    #[test]
    fn test_error_display() {
        let err = SinkError::sink(ErrorKind::Sink4xx, "row too large");
        assert_eq!(err.to_string(), "sink error (sink_4xx): row too large");
    }
}
