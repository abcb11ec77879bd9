//! Asynchronous job tracking.
//!
//! [`JobManager`] owns the job table: one [`Job`] per accepted submission,
//! keyed by [`JobId`] in a concurrent map so pollers and the background
//! tasks owning different jobs never contend on one lock. Each job also
//! carries a cancellation token and, once completed, the path of its
//! persisted archive. [`JobRunner`] drives a job through its lifecycle.

mod error;
mod runner;
mod store;
mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::ServiceError;

pub use error::JobError;
pub use runner::{JobRunner, JobWork, SizeLimits, validate_work};
pub use store::ResultStore;
pub use types::{Job, JobId, JobSnapshot, JobStatus};

#[derive(Debug)]
struct JobEntry {
    job: Job,
    cancel: CancellationToken,
}

/// Concurrent job table plus result storage.
#[derive(Debug)]
pub struct JobManager {
    jobs: DashMap<JobId, JobEntry>,
    store: ResultStore,
    public_base_url: String,
}

impl JobManager {
    /// Creates a manager persisting archives in `store` and building download
    /// URLs under `public_base_url`.
    pub fn new(store: ResultStore, public_base_url: impl Into<String>) -> Self {
        Self {
            jobs: DashMap::new(),
            store,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Result storage.
    #[must_use]
    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Number of tracked jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// True when no jobs are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Allocates a `pending` job and returns its id.
    #[instrument(skip(self))]
    pub fn create_job(&self) -> JobId {
        let id = JobId::new();
        self.jobs.insert(
            id,
            JobEntry {
                job: Job::new(id),
                cancel: CancellationToken::new(),
            },
        );
        info!(job_id = %id, "job created");
        id
    }

    /// Snapshot for pollers.
    #[must_use]
    pub fn get_job(&self, id: JobId) -> Option<JobSnapshot> {
        self.jobs.get(&id).map(|entry| entry.job.snapshot())
    }

    /// Full record copy.
    #[must_use]
    pub fn job(&self, id: JobId) -> Option<Job> {
        self.jobs.get(&id).map(|entry| entry.job.clone())
    }

    /// Token the job's background task watches.
    #[must_use]
    pub fn cancellation_token(&self, id: JobId) -> Option<CancellationToken> {
        self.jobs.get(&id).map(|entry| entry.cancel.clone())
    }

    /// Moves a live job to `status` with a new message.
    ///
    /// # Errors
    ///
    /// [`JobError::NotFound`], [`JobError::Terminal`] or
    /// [`JobError::InvalidTransition`].
    pub fn update_job_status(
        &self,
        id: JobId,
        status: JobStatus,
        message: impl Into<String>,
    ) -> Result<(), JobError> {
        self.mutate(id, |job| {
            if !job.status.can_transition_to(status) {
                return Err(JobError::InvalidTransition {
                    id,
                    from: job.status,
                    to: status,
                });
            }
            if job.status != status {
                debug!(job_id = %id, from = %job.status, to = %status, "job status changed");
            }
            job.status = status;
            job.message = message.into();
            Ok(())
        })
    }

    /// Raises progress to `percent`, clamped to 0..=100.
    ///
    /// Lower values than the current progress are ignored. Returns the
    /// progress after the update.
    ///
    /// # Errors
    ///
    /// [`JobError::NotFound`] or [`JobError::Terminal`].
    pub fn update_job_progress(&self, id: JobId, percent: i64) -> Result<u8, JobError> {
        let clamped = u8::try_from(percent.clamp(0, 100)).unwrap_or(100);
        self.mutate(id, |job| {
            if clamped > job.progress {
                job.progress = clamped;
            }
            Ok(job.progress)
        })
    }

    /// Marks a job completed with its download URL and progress 100.
    ///
    /// # Errors
    ///
    /// [`JobError::NotFound`], [`JobError::Terminal`] or
    /// [`JobError::InvalidTransition`] when the job is not processing.
    pub fn complete_job(&self, id: JobId, download_url: impl Into<String>) -> Result<(), JobError> {
        self.mutate(id, |job| {
            if !job.status.can_transition_to(JobStatus::Completed) {
                return Err(JobError::InvalidTransition {
                    id,
                    from: job.status,
                    to: JobStatus::Completed,
                });
            }
            job.status = JobStatus::Completed;
            job.progress = 100;
            job.message = "Conversion completed".to_string();
            job.download_url = Some(download_url.into());
            Ok(())
        })?;
        info!(job_id = %id, "job completed");
        Ok(())
    }

    /// Marks a job failed, keeping the message verbatim.
    ///
    /// # Errors
    ///
    /// [`JobError::NotFound`] or [`JobError::Terminal`].
    pub fn fail_job(&self, id: JobId, error: &ServiceError) -> Result<(), JobError> {
        self.mutate(id, |job| {
            job.status = JobStatus::Failed;
            job.message = "Conversion failed".to_string();
            job.error = Some(error.message.clone());
            job.error_kind = Some(error.kind);
            Ok(())
        })?;
        warn!(job_id = %id, kind = %error.kind, error = %error.message, "job failed");
        Ok(())
    }

    /// Persists a job's archive and binds it to the job. `buffer` is dropped
    /// once written.
    ///
    /// # Errors
    ///
    /// [`JobError::NotFound`], [`JobError::Terminal`],
    /// [`JobError::InvalidFilename`] or [`JobError::Storage`].
    pub async fn save_job_result(
        &self,
        id: JobId,
        buffer: Vec<u8>,
        filename: &str,
    ) -> Result<PathBuf, JobError> {
        self.mutate(id, |_| Ok(()))?;
        let path = self.store.save(id, filename, &buffer).await?;
        drop(buffer);
        self.bind_result(id, filename, &path).await?;
        Ok(path)
    }

    // The job may have been evicted or settled while the archive was being
    // written; its stored directory must not outlive the entry.
    async fn bind_result(&self, id: JobId, filename: &str, path: &Path) -> Result<(), JobError> {
        let bound = path.to_path_buf();
        let outcome = self.mutate(id, move |job| {
            job.filename = Some(filename.to_string());
            job.result_path = Some(bound);
            Ok(())
        });
        if outcome.is_err() {
            if let Err(error) = self.store.remove(id).await {
                warn!(job_id = %id, error = %error, "failed to remove unbound result");
            }
        }
        outcome
    }

    /// Resolves the stored archive for a download request.
    ///
    /// # Errors
    ///
    /// [`JobError::NotFound`] for unknown jobs, [`JobError::ResultMissing`]
    /// when the job has no archive under `filename`.
    pub fn get_job_result_path(&self, id: JobId, filename: &str) -> Result<PathBuf, JobError> {
        let entry = self.jobs.get(&id).ok_or_else(|| JobError::not_found(id))?;
        match (&entry.job.filename, &entry.job.result_path) {
            (Some(stored), Some(path)) if stored == filename => Ok(path.clone()),
            _ => Err(JobError::ResultMissing {
                id,
                filename: filename.to_string(),
            }),
        }
    }

    /// `<base>/download/<job id>/<filename>`. Depends only on its inputs.
    #[must_use]
    pub fn generate_download_url(&self, id: JobId, filename: &str) -> String {
        format!(
            "{}/download/{id}/{}",
            self.public_base_url,
            urlencoding::encode(filename)
        )
    }

    /// `<base>/job/<job id>/status`.
    #[must_use]
    pub fn status_url(&self, id: JobId) -> String {
        format!("{}/job/{id}/status", self.public_base_url)
    }

    /// Requests cancellation of a live job. Returns false when it already
    /// finished.
    ///
    /// # Errors
    ///
    /// [`JobError::NotFound`].
    pub fn cancel_job(&self, id: JobId) -> Result<bool, JobError> {
        let entry = self.jobs.get(&id).ok_or_else(|| JobError::not_found(id))?;
        if entry.job.status.is_terminal() {
            return Ok(false);
        }
        entry.cancel.cancel();
        info!(job_id = %id, "job cancellation requested");
        Ok(true)
    }

    /// Removes a job and its stored archive, cancelling it if still live.
    /// Returns false when the job was unknown.
    ///
    /// # Errors
    ///
    /// [`JobError::Storage`] when the archive cannot be deleted.
    pub async fn evict_job(&self, id: JobId) -> Result<bool, JobError> {
        let Some((_, entry)) = self.jobs.remove(&id) else {
            return Ok(false);
        };
        entry.cancel.cancel();
        self.store.remove(id).await?;
        debug!(job_id = %id, "job evicted");
        Ok(true)
    }

    /// Evicts terminal jobs last updated more than `older_than` ago.
    /// Returns how many were evicted.
    pub async fn prune_finished(&self, older_than: Duration) -> usize {
        let window = chrono::Duration::from_std(older_than).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now().checked_sub_signed(window);
        let stale: Vec<JobId> = self
            .jobs
            .iter()
            .filter(|entry| {
                entry.job.status.is_terminal()
                    && cutoff.is_some_and(|cutoff| entry.job.updated_at <= cutoff)
            })
            .map(|entry| *entry.key())
            .collect();

        let mut evicted = 0;
        for id in stale {
            match self.evict_job(id).await {
                Ok(true) => evicted += 1,
                Ok(false) => {}
                Err(error) => warn!(job_id = %id, error = %error, "failed to evict job"),
            }
        }
        if evicted > 0 {
            info!(evicted, "pruned finished jobs");
        }
        evicted
    }

    /// Runs [`prune_finished`](Self::prune_finished) periodically.
    pub fn spawn_pruner(self: &Arc<Self>, retention: Duration) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let period = (retention / 4).clamp(Duration::from_secs(1), Duration::from_secs(300));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                manager.prune_finished(retention).await;
            }
        })
    }

    // Applies `f` to a live job, stamping `updated_at` on success.
    fn mutate<T>(
        &self,
        id: JobId,
        f: impl FnOnce(&mut Job) -> Result<T, JobError>,
    ) -> Result<T, JobError> {
        let mut entry = self.jobs.get_mut(&id).ok_or_else(|| JobError::not_found(id))?;
        let job = &mut entry.job;
        if job.status.is_terminal() {
            return Err(JobError::Terminal {
                id,
                status: job.status,
            });
        }
        let value = f(job)?;
        job.updated_at = Utc::now();
        Ok(value)
    }
}
