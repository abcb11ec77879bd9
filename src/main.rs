//! HTTP service entry point for mdpack.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use mdpack_core::{
    BatchCoordinator, ConversionService, ConverterRegistry, FileConfig, HttpCrawler, HttpFetcher,
    JobManager, JobRunner, OpenAiEnricher, OpenAiTranscriber, ResultStore, ServiceConfig,
    server::{self, AppState},
};
use tracing::{debug, info};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    let mut config = ServiceConfig::default();
    if let Some(path) = &args.config {
        config.apply_file(FileConfig::load(path)?);
        info!(path = %path.display(), "loaded config file");
    }
    args.apply_to(&mut config);
    config.validate()?;

    tokio::fs::create_dir_all(&config.storage_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create storage directory '{}'",
                config.storage_dir.display()
            )
        })?;

    let fetcher = HttpFetcher::new(config.fetch_settings()).context("Failed to build HTTP client")?;
    let transcriber = Arc::new(OpenAiTranscriber::new(
        fetcher.clone(),
        &config.transcription_endpoint,
        &config.transcription_model,
    ));
    let crawler = Arc::new(HttpCrawler::new(fetcher.clone()));
    let registry = ConverterRegistry::with_defaults(fetcher.clone(), transcriber, crawler);
    let enricher = Arc::new(OpenAiEnricher::new(
        fetcher,
        &config.enrichment_endpoint,
        &config.enrichment_model,
    ));
    let service = ConversionService::new(Arc::new(registry)).with_enricher(enricher);
    let coordinator = BatchCoordinator::new(Arc::new(service), config.concurrency)?;

    let manager = Arc::new(JobManager::new(
        ResultStore::new(&config.storage_dir),
        config.base_url(),
    ));
    if let Some(retention) = config.retention() {
        manager.spawn_pruner(retention);
        info!(retention_secs = retention.as_secs(), "job retention enabled");
    }

    let runner = JobRunner::new(manager, coordinator, config.size_limits());
    let app = server::router(AppState::new(runner, config.max_payload()));

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    info!(
        bind = %config.bind,
        base_url = %config.base_url(),
        concurrency = config.concurrency,
        "mdpack listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("mdpack stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %error, "failed to listen for shutdown signal");
    }
}
