//! mdpack core library
//!
//! Turns uploaded documents, web pages, crawls, YouTube links and media into
//! Markdown notes and packages them as categorized ZIP archives. Work is
//! accepted as jobs that run in the background and are polled for progress.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`model`] - Requests, results and image assets
//! - [`classify`] - Request type and extension to output category
//! - [`fetch`] - Shared HTTP client with retry policy and byte cap
//! - [`convert`] - Converter catalogue and the registry dispatching to it
//! - [`crawl`] - Same-host crawler and crawl index rendering
//! - [`enrich`] - Optional best-effort note enrichment
//! - [`service`] - Single-item conversion, never failing outright
//! - [`batch`] - Bounded-parallel conversion of many items
//! - [`archive`] - ZIP layout, summary and error notes
//! - [`job`] - Job table, result storage and background runner
//! - [`server`] - axum routes over the job runner
//! - [`config`] - Layered service configuration

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod archive;
pub mod batch;
pub mod classify;
pub mod config;
pub mod convert;
pub mod crawl;
pub mod enrich;
pub mod error;
pub mod fetch;
pub mod job;
pub mod model;
pub mod server;
pub mod service;

// Re-export commonly used types
pub use archive::{ArchiveBuilder, ArchiveError, ArchivePlan, PackagedArchive};
pub use batch::{BatchCoordinator, BatchError, DEFAULT_CONCURRENCY};
pub use classify::{Category, classify};
pub use config::{ConfigError, FileConfig, ServiceConfig};
pub use convert::{
    ConfigurationError, ConvertError, Converter, ConverterKind, ConverterRegistry,
    OpenAiTranscriber, Transcriber,
};
pub use crawl::{Crawler, HttpCrawler};
pub use enrich::{Enricher, OpenAiEnricher};
pub use error::{ErrorKind, ServiceError};
pub use fetch::{FetchError, FetchSettings, HttpFetcher, RetryPolicy};
pub use job::{Job, JobError, JobId, JobManager, JobRunner, JobSnapshot, JobStatus, JobWork, ResultStore};
pub use model::{
    ConversionOptions, ConversionRequest, ConversionResult, ImageAsset, PageResult,
    RequestContent, RequestType,
};
pub use service::ConversionService;
