//! Job table and result storage errors.

use thiserror::Error;

use super::{JobId, JobStatus};
use crate::error::ErrorKind;

/// Errors from [`JobManager`](super::JobManager) operations.
#[derive(Debug, Error)]
pub enum JobError {
    /// No job with this id.
    #[error("job {id} not found")]
    NotFound {
        /// Requested id.
        id: JobId,
    },

    /// The lifecycle forbids this move.
    #[error("job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Job id.
        id: JobId,
        /// Current state.
        from: JobStatus,
        /// Requested state.
        to: JobStatus,
    },

    /// The job already finished; no further mutation.
    #[error("job {id} is already {status}")]
    Terminal {
        /// Job id.
        id: JobId,
        /// Terminal state.
        status: JobStatus,
    },

    /// The job has no archive under this name.
    #[error("job {id} has no result named '{filename}'")]
    ResultMissing {
        /// Job id.
        id: JobId,
        /// Requested file name.
        filename: String,
    },

    /// A result file name that is not a single safe path segment.
    #[error("invalid result file name '{filename}'")]
    InvalidFilename {
        /// Rejected name.
        filename: String,
    },

    /// Reading or writing the result store failed.
    #[error("result storage failed for job {id}: {source}")]
    Storage {
        /// Job id.
        id: JobId,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl JobError {
    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(id: JobId) -> Self {
        Self::NotFound { id }
    }

    /// Creates a storage error.
    #[must_use]
    pub fn storage(id: JobId, source: std::io::Error) -> Self {
        Self::Storage { id, source }
    }

    /// Service-level classification.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. }
            | Self::InvalidTransition { .. }
            | Self::Terminal { .. }
            | Self::ResultMissing { .. }
            | Self::InvalidFilename { .. } => ErrorKind::Validation,
            Self::Storage { .. } => ErrorKind::Internal,
        }
    }

    /// True for lookups of something that does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::ResultMissing { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_context() {
        let id = JobId::new();
        let err = JobError::InvalidTransition {
            id,
            from: JobStatus::Completed,
            to: JobStatus::Processing,
        };
        assert_eq!(
            err.to_string(),
            format!("job {id} cannot move from completed to processing")
        );
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_kinds() {
        let id = JobId::new();
        assert_eq!(JobError::not_found(id).kind(), ErrorKind::Validation);
        assert!(JobError::not_found(id).is_not_found());
        let io = std::io::Error::other("disk full");
        assert_eq!(JobError::storage(id, io).kind(), ErrorKind::Internal);
    }
}
