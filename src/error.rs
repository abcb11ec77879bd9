//! Service-wide error taxonomy.
//!
//! Module errors (`FetchError`, `ConvertError`, `JobError`, ...) each report an
//! [`ErrorKind`]. The kind decides two things: the HTTP status a client sees
//! and whether the failure is fatal to a whole job or contained to one item.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification shared by every failure the service can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input shape, unsupported type, missing required field.
    Validation,
    /// A specific converter failed. Contained per item.
    Conversion,
    /// Missing or rejected API key.
    Authentication,
    /// Payload too large or otherwise over a resource bound.
    Resource,
    /// Anything unexpected.
    Internal,
}

impl ErrorKind {
    /// Returns the stable string label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Conversion => "conversion",
            Self::Authentication => "authentication",
            Self::Resource => "resource",
            Self::Internal => "internal",
        }
    }

    /// HTTP status code used when this kind reaches a client directly.
    #[must_use]
    pub fn http_status(self) -> u16 {
        match self {
            Self::Validation | Self::Resource => 400,
            Self::Conversion => 422,
            Self::Authentication => 401,
            Self::Internal => 500,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified, client-visible failure.
///
/// The message is preserved verbatim all the way to the job status payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ServiceError {
    /// Classification of the failure.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
}

impl ServiceError {
    /// Creates an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Creates an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, message)
    }

    /// Creates a resource error.
    pub fn resource(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Resource, message)
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}
