//! Error types for converter dispatch and individual converters.

use thiserror::Error;

use super::{ConverterKind, InputShape};
use crate::error::ErrorKind;
use crate::fetch::FetchError;

/// Failure inside one converter. Contained by the registry into a failed result.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Content shape does not match what the converter accepts.
    #[error("{kind} converter expects {expected} input, got {actual}")]
    InvalidInput {
        /// Converter that rejected the input.
        kind: ConverterKind,
        /// Shape it accepts.
        expected: InputShape,
        /// Shape it received.
        actual: &'static str,
    },

    /// The document could not be parsed.
    #[error("malformed {format} document '{name}': {message}")]
    Malformed {
        /// Item name.
        name: String,
        /// Format label (e.g. "docx").
        format: &'static str,
        /// Parser message.
        message: String,
    },

    /// Converter needs an API key and none was supplied.
    #[error("{kind} conversion requires an API key")]
    MissingApiKey {
        /// Converter that needs the key.
        kind: ConverterKind,
    },

    /// Upstream rejected the supplied credentials.
    #[error("authentication failed: {message}")]
    Authentication {
        /// Upstream message.
        message: String,
    },

    /// Input is well-formed but not something this converter handles.
    #[error("unsupported input: {message}")]
    Unsupported {
        /// Details.
        message: String,
    },

    /// A network call made by the converter failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Unexpected converter failure.
    #[error("internal converter error: {message}")]
    Internal {
        /// Details.
        message: String,
    },
}

impl ConvertError {
    /// Creates a malformed-document error.
    pub fn malformed(
        name: impl Into<String>,
        format: &'static str,
        message: impl std::fmt::Display,
    ) -> Self {
        Self::Malformed {
            name: name.into(),
            format,
            message: message.to_string(),
        }
    }

    /// Creates an unsupported-input error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Service-level classification.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput { .. } => ErrorKind::Validation,
            Self::Malformed { .. } => ErrorKind::Conversion,
            Self::MissingApiKey { .. } | Self::Authentication { .. } => ErrorKind::Authentication,
            Self::Unsupported { .. } => ErrorKind::Resource,
            Self::Fetch(source) => source.kind(),
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }
}

/// Dispatch failure: no converter can be found for the requested key.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    /// The key does not name any converter.
    #[error("unknown converter type '{key}'")]
    UnknownType {
        /// The unrecognized key.
        key: String,
    },

    /// The key is known but no converter was registered for it.
    #[error("no converter registered for '{kind}'")]
    NotRegistered {
        /// The unregistered kind.
        kind: ConverterKind,
    },
}

impl ConfigurationError {
    /// Always a validation problem for the item.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_input_message() {
        let error = ConvertError::InvalidInput {
            kind: ConverterKind::Pdf,
            expected: InputShape::Binary,
            actual: "text",
        };
        assert_eq!(error.to_string(), "pdf converter expects binary input, got text");
        assert_eq!(error.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_fetch_errors_keep_their_kind() {
        let error = ConvertError::from(FetchError::too_large("https://a.test/x", 10));
        assert_eq!(error.kind(), ErrorKind::Resource);
        let error = ConvertError::from(FetchError::http_status("https://a.test/x", 404));
        assert_eq!(error.kind(), ErrorKind::Conversion);
    }

    #[test]
    fn test_configuration_error_messages() {
        let unknown = ConfigurationError::UnknownType {
            key: "ppt".to_string(),
        };
        assert_eq!(unknown.to_string(), "unknown converter type 'ppt'");
        let missing = ConfigurationError::NotRegistered {
            kind: ConverterKind::Doc,
        };
        assert_eq!(missing.to_string(), "no converter registered for 'doc'");
        assert_eq!(missing.kind(), ErrorKind::Validation);
    }
}
