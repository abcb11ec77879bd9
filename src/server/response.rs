//! Response payloads and the handler error type.

use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::error::{ErrorKind, ServiceError};
use crate::job::{JobError, JobId};

/// Body of a `202 Accepted` submission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    /// Id to poll.
    pub job_id: JobId,
    /// Absolute status URL.
    pub status_url: String,
}

/// Body of `DELETE /job/:job_id`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobActionResponse {
    /// Target job.
    pub job_id: JobId,
    /// `cancelled` or `evicted`.
    pub action: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: String,
    kind: &'a str,
}

/// Handler failures, rendered as `{error, kind}` JSON.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request rejected before a job was created.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Job table lookup or storage failure.
    #[error(transparent)]
    Job(#[from] JobError),

    /// Malformed multipart body.
    #[error("invalid multipart body: {0}")]
    Multipart(#[from] MultipartError),

    /// Path segment that is not a job id.
    #[error("invalid job id '{0}'")]
    InvalidJobId(String),

    /// Stored archive could not be opened.
    #[error("failed to open result for job {id}: {source}")]
    Io {
        /// Job id.
        id: JobId,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl ApiError {
    /// Service-level classification.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Service(error) => error.kind,
            Self::Job(error) => error.kind(),
            Self::Multipart(_) | Self::InvalidJobId(_) => ErrorKind::Validation,
            Self::Io { .. } => ErrorKind::Internal,
        }
    }

    /// HTTP status. Unknown jobs and results are 404.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Job(error) if error.is_not_found() => StatusCode::NOT_FOUND,
            Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                StatusCode::NOT_FOUND
            }
            Self::Multipart(error) => error.status(),
            other => StatusCode::from_u16(other.kind().http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = %self, "request failed");
        }
        let kind = self.kind();
        let body = ErrorBody {
            error: self.to_string(),
            kind: kind.as_str(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let id = JobId::new();
        assert_eq!(
            ApiError::from(JobError::not_found(id)).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(ServiceError::authentication("missing key")).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::InvalidJobId("nope".into()).status(),
            StatusCode::BAD_REQUEST
        );
        let io = std::io::Error::other("disk gone");
        assert_eq!(
            ApiError::Io { id, source: io }.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
