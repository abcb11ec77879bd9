//! Bounded-parallel batch conversion.
//!
//! [`BatchCoordinator`] fans requests out to the [`ConversionService`], one
//! Tokio task per item, with a per-batch semaphore capping how many of its
//! items convert at once. Every request yields exactly one result, in input
//! order, whatever order the tasks finish in.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::archive::{
    ArchiveBuilder, ArchiveError, PackagedArchive, batch_archive_filename, single_archive_filename,
};
use crate::error::ErrorKind;
use crate::model::{ConversionRequest, ConversionResult};
use crate::service::{ConversionService, category_of};

/// Minimum allowed concurrency value.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
const MAX_CONCURRENCY: usize = 100;

/// Default number of items converted at once.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Batch failures. Item failures are never batch failures.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The rejected value.
        value: usize,
    },

    /// The batch was cancelled before every item settled.
    #[error("batch cancelled")]
    Cancelled,

    /// Packaging failed.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// The packaging task died.
    #[error("archive task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl BatchError {
    /// Service-level classification.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConcurrency { .. } => ErrorKind::Validation,
            Self::Cancelled | Self::Join(_) => ErrorKind::Internal,
            Self::Archive(source) => source.kind(),
        }
    }
}

/// Counters for one batch run, updated from concurrent item tasks.
#[derive(Debug, Default)]
pub struct BatchStats {
    succeeded: AtomicUsize,
    failed: AtomicUsize,
}

impl BatchStats {
    /// Items that converted.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.succeeded.load(Ordering::SeqCst)
    }

    /// Items that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Items settled so far.
    #[must_use]
    pub fn total(&self) -> usize {
        self.succeeded() + self.failed()
    }

    fn record(&self, result: &ConversionResult) {
        if result.success {
            self.succeeded.fetch_add(1, Ordering::SeqCst);
        } else {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Converts many requests with bounded parallelism.
///
/// Each [`convert_all`](Self::convert_all) call gets its own limit, so one
/// job's slow items never hold permits another job is waiting for.
#[derive(Debug, Clone)]
pub struct BatchCoordinator {
    service: Arc<ConversionService>,
    concurrency: usize,
}

impl BatchCoordinator {
    /// Creates a coordinator running at most `concurrency` items at once.
    ///
    /// # Errors
    ///
    /// [`BatchError::InvalidConcurrency`] outside 1..=100.
    pub fn new(service: Arc<ConversionService>, concurrency: usize) -> Result<Self, BatchError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(BatchError::InvalidConcurrency { value: concurrency });
        }
        Ok(Self {
            service,
            concurrency,
        })
    }

    /// Items converted at once within one batch.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Converts every request and returns the results in input order.
    ///
    /// `on_progress(settled, total)` runs after each item settles, on the
    /// calling task, in settle order. A panicking item becomes an internal
    /// failure result.
    ///
    /// # Errors
    ///
    /// [`BatchError::Cancelled`] when `cancel` fires first. Outstanding item
    /// tasks are aborted and their permits released.
    #[instrument(skip_all, fields(items = requests.len(), concurrency = self.concurrency))]
    pub async fn convert_all<P>(
        &self,
        requests: Vec<ConversionRequest>,
        cancel: &CancellationToken,
        mut on_progress: P,
    ) -> Result<Vec<ConversionResult>, BatchError>
    where
        P: FnMut(usize, usize) + Send,
    {
        let total = requests.len();
        let stats = BatchStats::default();
        info!("starting batch");

        let mut slots: Vec<Option<ConversionResult>> = vec![None; total];
        let mut labels = Vec::with_capacity(total);
        let mut aborts = Vec::with_capacity(total);
        let mut pending = FuturesUnordered::new();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        for (index, request) in requests.into_iter().enumerate() {
            labels.push((request.name.clone(), request.request_type, category_of(&request)));

            let service = Arc::clone(&self.service);
            let semaphore = Arc::clone(&semaphore);
            let handle = tokio::spawn(async move {
                // Permit is released when the task ends or is aborted.
                let _permit = semaphore.acquire_owned().await.ok();
                service.convert(&request).await
            });
            aborts.push(handle.abort_handle());
            pending.push(async move { (index, handle.await) });
        }

        while !pending.is_empty() {
            let (index, joined) = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    for abort in &aborts {
                        abort.abort();
                    }
                    warn!(settled = stats.total(), total, "batch cancelled");
                    return Err(BatchError::Cancelled);
                }
                Some(next) = pending.next() => next,
            };

            let result = joined.unwrap_or_else(|error| {
                let (name, request_type, category) = &labels[index];
                warn!(item = %name, error = %error, "item task panicked");
                ConversionResult::failure(
                    name,
                    *request_type,
                    *category,
                    ErrorKind::Internal,
                    format!("conversion task failed: {error}"),
                )
            });
            debug!(item = %result.name, success = result.success, "item settled");
            stats.record(&result);
            slots[index] = Some(result);
            on_progress(stats.total(), total);
        }

        info!(
            succeeded = stats.succeeded(),
            failed = stats.failed(),
            total,
            "batch finished"
        );
        Ok(slots.into_iter().flatten().collect())
    }

    /// Converts `requests` and packages the results.
    ///
    /// One request gives `<stem>.zip`; several give `batch_<timestamp>.zip`.
    ///
    /// # Errors
    ///
    /// [`BatchError`] when cancelled or when packaging fails.
    pub async fn convert_batch(
        &self,
        requests: Vec<ConversionRequest>,
        generated_at: DateTime<Utc>,
    ) -> Result<PackagedArchive, BatchError> {
        let filename = match requests.as_slice() {
            [single] => single_archive_filename(&single.name),
            _ => batch_archive_filename(generated_at),
        };
        let results = self
            .convert_all(requests, &CancellationToken::new(), |_, _| {})
            .await?;
        package(results, ArchiveBuilder::new(generated_at), filename).await
    }
}

/// Builds the ZIP for `results` on the blocking pool.
///
/// # Errors
///
/// [`BatchError::Archive`] or [`BatchError::Join`].
pub async fn package(
    results: Vec<ConversionResult>,
    builder: ArchiveBuilder,
    filename: String,
) -> Result<PackagedArchive, BatchError> {
    let buffer = tokio::task::spawn_blocking(move || builder.build(&results)).await??;
    Ok(PackagedArchive { buffer, filename })
}
