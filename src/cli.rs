//! CLI argument definitions using clap derive macros.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use mdpack_core::ServiceConfig;

/// Convert documents, web pages and media into Markdown archives.
///
/// Starts an HTTP service that accepts conversion jobs, runs them in the
/// background and serves the resulting ZIP archives.
#[derive(Parser, Debug)]
#[command(name = "mdpack")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// TOML config file
    #[arg(long, env = "MDPACK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Listen address
    #[arg(short, long, env = "MDPACK_BIND")]
    pub bind: Option<SocketAddr>,

    /// Base URL used in status and download links
    #[arg(long, env = "MDPACK_PUBLIC_BASE_URL")]
    pub public_base_url: Option<String>,

    /// Directory for result archives
    #[arg(long, env = "MDPACK_STORAGE_DIR")]
    pub storage_dir: Option<PathBuf>,

    /// Items converted at once within one job (1-100)
    #[arg(short = 'c', long, env = "MDPACK_CONCURRENCY", value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Upload limit in MiB for documents and audio
    #[arg(long, env = "MDPACK_MAX_FILE_SIZE_MB")]
    pub max_file_size_mb: Option<u64>,

    /// Upload limit in MiB for video
    #[arg(long, env = "MDPACK_MAX_VIDEO_SIZE_MB")]
    pub max_video_size_mb: Option<u64>,

    /// Maximum attempts for transient failures of external calls (0-10)
    #[arg(short = 'r', long, env = "MDPACK_MAX_RETRIES", value_parser = clap::value_parser!(u8).range(0..=10))]
    pub max_retries: Option<u8>,

    /// HTTP connect timeout in seconds
    #[arg(long, env = "MDPACK_CONNECT_TIMEOUT_SECS")]
    pub connect_timeout_secs: Option<u64>,

    /// HTTP read timeout in seconds
    #[arg(long, env = "MDPACK_READ_TIMEOUT_SECS")]
    pub read_timeout_secs: Option<u64>,

    /// Transcription endpoint (OpenAI-compatible)
    #[arg(long, env = "MDPACK_TRANSCRIPTION_ENDPOINT")]
    pub transcription_endpoint: Option<String>,

    /// Transcription model
    #[arg(long, env = "MDPACK_TRANSCRIPTION_MODEL")]
    pub transcription_model: Option<String>,

    /// Evict finished jobs after this many seconds (default: keep)
    #[arg(long, env = "MDPACK_RETENTION_SECS")]
    pub retention_secs: Option<u64>,
}

impl Args {
    /// Overlays every flag that was given.
    pub fn apply_to(&self, config: &mut ServiceConfig) {
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(url) = &self.public_base_url {
            config.public_base_url = Some(url.clone());
        }
        if let Some(dir) = &self.storage_dir {
            config.storage_dir.clone_from(dir);
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = usize::from(concurrency);
        }
        if let Some(mb) = self.max_file_size_mb {
            config.max_file_size = mb.saturating_mul(1024 * 1024);
        }
        if let Some(mb) = self.max_video_size_mb {
            config.max_video_size = mb.saturating_mul(1024 * 1024);
        }
        if let Some(retries) = self.max_retries {
            config.max_retries = u32::from(retries);
        }
        if let Some(secs) = self.connect_timeout_secs {
            config.connect_timeout_secs = secs;
        }
        if let Some(secs) = self.read_timeout_secs {
            config.read_timeout_secs = secs;
        }
        if let Some(endpoint) = &self.transcription_endpoint {
            config.transcription_endpoint.clone_from(endpoint);
        }
        if let Some(model) = &self.transcription_model {
            config.transcription_model.clone_from(model);
        }
        if self.retention_secs.is_some() {
            config.retention_secs = self.retention_secs;
        }
    }
}
