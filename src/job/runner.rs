//! Background execution of accepted jobs.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, warn};

use super::{JobError, JobId, JobManager, JobStatus};
use crate::archive::{ArchiveBuilder, batch_archive_filename, single_archive_filename};
use crate::batch::{BatchCoordinator, BatchError, package};
use crate::convert::youtube_video_id;
use crate::error::{ErrorKind, ServiceError};
use crate::fetch::parse_http_url;
use crate::model::{ConversionRequest, ConversionResult, RequestType};
use crate::service::category_of;

const MIB: f64 = 1024.0 * 1024.0;

/// Per-item payload bounds checked before any converter runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeLimits {
    /// Bound for every binary input except video.
    pub max_file_size: u64,
    /// Bound for video input.
    pub max_video_size: u64,
}

impl SizeLimits {
    fn limit_for(&self, request_type: RequestType) -> u64 {
        match request_type {
            RequestType::Video => self.max_video_size,
            _ => self.max_file_size,
        }
    }
}

impl Default for SizeLimits {
    fn default() -> Self {
        Self {
            max_file_size: 50 * 1024 * 1024,
            max_video_size: 500 * 1024 * 1024,
        }
    }
}

/// What a job converts.
#[derive(Debug, Clone)]
pub enum JobWork {
    /// One item, packaged as `<stem>.zip`.
    Single(ConversionRequest),
    /// Several items, packaged as `batch_<timestamp>.zip`.
    Batch(Vec<ConversionRequest>),
}

impl JobWork {
    /// The requests this work covers.
    #[must_use]
    pub fn requests(&self) -> &[ConversionRequest] {
        match self {
            Self::Single(request) => std::slice::from_ref(request),
            Self::Batch(requests) => requests,
        }
    }

    fn into_requests(self) -> Vec<ConversionRequest> {
        match self {
            Self::Single(request) => vec![request],
            Self::Batch(requests) => requests,
        }
    }
}

/// Checks a job's requests before conversion starts.
///
/// Returns the batch items that were rejected, by position, so they can be
/// reported as failed results while the rest of the batch converts.
///
/// # Errors
///
/// Problems fatal to the whole job:
/// - `Validation` for an empty batch.
/// - `Authentication` when audio or video has no API key.
/// - Any rejection of a single-item job: `Validation` for an empty upload or
///   a malformed URL, `Resource` when a payload exceeds its size bound.
pub fn validate_work(
    work: &JobWork,
    limits: &SizeLimits,
) -> Result<Vec<(usize, ServiceError)>, ServiceError> {
    match work {
        JobWork::Single(request) => validate_request(request, limits).map(|()| Vec::new()),
        JobWork::Batch(requests) => {
            if requests.is_empty() {
                return Err(ServiceError::validation("batch contains no items"));
            }
            let mut rejected = Vec::new();
            for (index, request) in requests.iter().enumerate() {
                match validate_request(request, limits) {
                    Ok(()) => {}
                    Err(error) if error.kind == ErrorKind::Authentication => return Err(error),
                    Err(error) => rejected.push((index, error)),
                }
            }
            Ok(rejected)
        }
    }
}

fn validate_request(request: &ConversionRequest, limits: &SizeLimits) -> Result<(), ServiceError> {
    let name = &request.name;
    if request.request_type.requires_api_key() && request.options.api_key().is_none() {
        return Err(ServiceError::authentication(format!(
            "{} conversion requires an API key",
            request.request_type
        )));
    }
    if request.request_type.is_web() {
        let raw = request
            .content
            .url()
            .ok_or_else(|| ServiceError::validation(format!("'{name}' does not carry a URL")))?;
        let url = parse_http_url(raw)
            .map_err(|_| ServiceError::validation(format!("invalid URL '{raw}'")))?;
        if request.request_type == RequestType::Youtube && youtube_video_id(&url).is_none() {
            return Err(ServiceError::validation(format!(
                "'{raw}' is not a YouTube video URL"
            )));
        }
        return Ok(());
    }

    let size = request.content.len() as u64;
    let limit = limits.limit_for(request.request_type);
    if size > limit {
        return Err(ServiceError::resource(format!(
            "file '{name}' is {:.1} MiB, limit is {:.1} MiB",
            size as f64 / MIB,
            limit as f64 / MIB
        )));
    }
    if request.content.is_empty() {
        return Err(ServiceError::validation(format!("file '{name}' is empty")));
    }
    Ok(())
}

fn rejected_result(request: &ConversionRequest, error: &ServiceError) -> ConversionResult {
    warn!(item = %request.name, error = %error, "item rejected before conversion");
    ConversionResult::failure(
        &request.name,
        request.request_type,
        category_of(request),
        error.kind,
        error.message.clone(),
    )
}

/// Accepts work, returns a job id at once and converts in the background.
#[derive(Debug, Clone)]
pub struct JobRunner {
    manager: Arc<JobManager>,
    coordinator: BatchCoordinator,
    limits: SizeLimits,
}

impl JobRunner {
    /// Creates a runner over a shared job table and coordinator.
    pub fn new(manager: Arc<JobManager>, coordinator: BatchCoordinator, limits: SizeLimits) -> Self {
        Self {
            manager,
            coordinator,
            limits,
        }
    }

    /// Job table the runner reports into.
    #[must_use]
    pub fn manager(&self) -> &Arc<JobManager> {
        &self.manager
    }

    /// Creates a `pending` job and spawns its background task.
    ///
    /// The task body runs inside a nested task so a panic is observed as a
    /// join error and recorded as an internal failure of this job only.
    pub fn submit(&self, work: JobWork) -> JobId {
        let id = self.manager.create_job();
        let cancel = self
            .manager
            .cancellation_token(id)
            .unwrap_or_default();
        let span = info_span!("job", job_id = %id);
        let runner = self.clone();

        tokio::spawn(
            async move {
                let worker = runner.clone();
                let outcome = tokio::spawn(
                    async move { worker.run(id, work, cancel).await }.in_current_span(),
                )
                .await;
                let failure = match outcome {
                    Ok(Ok(())) => return,
                    Ok(Err(error)) => error,
                    Err(join) => ServiceError::internal(format!("job task failed: {join}")),
                };
                if let Err(error) = runner.manager.fail_job(id, &failure) {
                    debug!(error = %error, "job already settled");
                }
            }
            .instrument(span),
        );
        id
    }

    async fn run(
        &self,
        id: JobId,
        work: JobWork,
        cancel: CancellationToken,
    ) -> Result<(), ServiceError> {
        let manager = &self.manager;
        manager
            .update_job_status(id, JobStatus::Validating, "Validating request")
            .map_err(job_failure)?;
        let rejected = validate_work(&work, &self.limits)?;
        ensure_live(&cancel)?;

        let total = work.requests().len();
        manager
            .update_job_status(id, JobStatus::Processing, format!("Converting {total} item(s)"))
            .map_err(job_failure)?;
        manager.update_job_progress(id, 10).map_err(job_failure)?;

        let generated_at = Utc::now();
        let filename = match &work {
            JobWork::Single(request) => single_archive_filename(&request.name),
            JobWork::Batch(_) => batch_archive_filename(generated_at),
        };

        // Rejected items take their slot up front; the rest convert.
        let mut slots: Vec<Option<ConversionResult>> = vec![None; total];
        let mut accepted = Vec::with_capacity(total - rejected.len());
        let mut rejected = rejected.into_iter().peekable();
        for (index, request) in work.into_requests().into_iter().enumerate() {
            match rejected.next_if(|(at, _)| *at == index) {
                Some((_, error)) => slots[index] = Some(rejected_result(&request, &error)),
                None => accepted.push(request),
            }
        }
        let settled_early = total - accepted.len();

        let reporter = Arc::clone(manager);
        let converted = self
            .coordinator
            .convert_all(accepted, &cancel, move |settled, _| {
                let done = settled_early + settled;
                let percent = i64::try_from(10 + 80 * done / total.max(1)).unwrap_or(90);
                if let Err(error) = reporter.update_job_progress(id, percent) {
                    debug!(error = %error, "progress update ignored");
                }
            })
            .await
            .map_err(batch_failure)?;
        let mut converted = converted.into_iter();
        let results: Vec<ConversionResult> = slots
            .into_iter()
            .filter_map(|slot| slot.or_else(|| converted.next()))
            .collect();

        manager
            .update_job_status(id, JobStatus::Processing, "Packaging archive")
            .map_err(job_failure)?;
        manager.update_job_progress(id, 95).map_err(job_failure)?;

        let archive = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(cancelled()),
            packaged = package(results, ArchiveBuilder::new(generated_at), filename) => {
                packaged.map_err(batch_failure)?
            }
        };
        ensure_live(&cancel)?;

        let filename = archive.filename;
        manager
            .save_job_result(id, archive.buffer, &filename)
            .await
            .map_err(job_failure)?;
        let url = manager.generate_download_url(id, &filename);
        manager.complete_job(id, url).map_err(job_failure)?;
        Ok(())
    }
}

fn cancelled() -> ServiceError {
    ServiceError::internal("job cancelled")
}

fn ensure_live(cancel: &CancellationToken) -> Result<(), ServiceError> {
    if cancel.is_cancelled() {
        Err(cancelled())
    } else {
        Ok(())
    }
}

fn batch_failure(error: BatchError) -> ServiceError {
    match error {
        BatchError::Cancelled => cancelled(),
        other => {
            warn!(error = %other, "batch failed");
            ServiceError::new(other.kind(), other.to_string())
        }
    }
}

fn job_failure(error: JobError) -> ServiceError {
    ServiceError::new(error.kind(), error.to_string())
}
