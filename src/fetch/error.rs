//! Error types for outbound HTTP calls.

use thiserror::Error;

use crate::error::ErrorKind;

/// Errors from fetching pages, images, metadata and transcriptions.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL being fetched.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// The Retry-After header value, if present.
        retry_after: Option<String>,
    },

    /// The provided URL is malformed or not http(s).
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// Body exceeded the configured byte cap.
    #[error("response from {url} exceeds the {limit} byte limit")]
    TooLarge {
        /// The URL being fetched.
        url: String,
        /// The cap in bytes.
        limit: u64,
    },

    /// The response arrived but could not be interpreted.
    #[error("unexpected response from {url}: {message}")]
    Decode {
        /// The URL being fetched.
        url: String,
        /// What was wrong.
        message: String,
    },
}

impl FetchError {
    /// Creates a network error, mapping reqwest timeouts to [`FetchError::Timeout`].
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        let url = url.into();
        if source.is_timeout() {
            return Self::Timeout { url };
        }
        Self::Network { url, source }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after: None,
        }
    }

    /// Creates an HTTP status error with a Retry-After header value.
    pub fn http_status_with_retry_after(
        url: impl Into<String>,
        status: u16,
        retry_after: Option<String>,
    ) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a size-limit error.
    pub fn too_large(url: impl Into<String>, limit: u64) -> Self {
        Self::TooLarge {
            url: url.into(),
            limit,
        }
    }

    /// Creates a decode error.
    pub fn decode(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            url: url.into(),
            message: message.into(),
        }
    }

    /// HTTP status, when the failure was an error response.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Service-level classification.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::HttpStatus {
                status: 401 | 403, ..
            } => ErrorKind::Authentication,
            Self::InvalidUrl { .. } => ErrorKind::Validation,
            Self::TooLarge { .. } => ErrorKind::Resource,
            _ => ErrorKind::Conversion,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_timeout_display() {
        let error = FetchError::timeout("https://example.com/page");
        assert!(error.to_string().contains("timeout"));
        assert!(error.to_string().contains("https://example.com/page"));
    }

    #[test]
    fn test_fetch_error_http_status_display() {
        let error = FetchError::http_status("https://example.com/missing", 404);
        let msg = error.to_string();
        assert!(msg.contains("404"), "Expected '404' in: {msg}");
        assert!(msg.contains("https://example.com/missing"), "Expected URL in: {msg}");
        assert_eq!(error.status(), Some(404));
    }

    #[test]
    fn test_fetch_error_too_large_display() {
        let error = FetchError::too_large("https://example.com/huge", 1024);
        assert!(error.to_string().contains("1024 byte limit"));
        assert_eq!(error.kind(), ErrorKind::Resource);
    }

    #[test]
    fn test_fetch_error_kinds() {
        assert_eq!(
            FetchError::http_status("u", 401).kind(),
            ErrorKind::Authentication
        );
        assert_eq!(FetchError::invalid_url("nope").kind(), ErrorKind::Validation);
        assert_eq!(FetchError::http_status("u", 500).kind(), ErrorKind::Conversion);
    }
}
