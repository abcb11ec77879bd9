//! Service configuration.
//!
//! Values come from three layers, highest priority first: command-line flags
//! (each also readable from an `MDPACK_*` environment variable), an optional
//! TOML file, and the built-in defaults below. The binary folds the layers
//! into one [`ServiceConfig`] and calls [`ServiceConfig::validate`] before
//! anything starts.

use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::batch::DEFAULT_CONCURRENCY;
use crate::enrich::DEFAULT_ENRICH_MODEL;
use crate::fetch::{
    CONNECT_TIMEOUT_SECS, DEFAULT_MAX_RETRIES, FetchSettings, READ_TIMEOUT_SECS, RetryPolicy,
};
use crate::job::SizeLimits;

const MIB: u64 = 1024 * 1024;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default storage directory for result archives.
pub const DEFAULT_STORAGE_DIR: &str = "./mdpack-data";

/// Default transcription endpoint.
pub const DEFAULT_TRANSCRIPTION_ENDPOINT: &str = "https://api.openai.com/v1/audio/transcriptions";

/// Default transcription model.
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";

/// Default enrichment endpoint.
pub const DEFAULT_ENRICHMENT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Configuration loading and validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file '{}': {source}", path.display())]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`FileConfig`].
    #[error("failed to parse config file '{}': {source}", path.display())]
    Parse {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: toml::de::Error,
    },

    /// A value outside its accepted range.
    #[error("invalid config value for `{field}`: {value}. Expected {expected}")]
    Invalid {
        /// Offending key.
        field: &'static str,
        /// Rejected value.
        value: String,
        /// Accepted range or shape.
        expected: &'static str,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, value: impl ToString, expected: &'static str) -> Self {
        Self::Invalid {
            field,
            value: value.to_string(),
            expected,
        }
    }
}

/// TOML file layer. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Listen address.
    pub bind: Option<SocketAddr>,
    /// Base URL used in status and download links.
    pub public_base_url: Option<String>,
    /// Where result archives are stored.
    pub storage_dir: Option<PathBuf>,
    /// Items converted at once within one job.
    pub concurrency: Option<usize>,
    /// Upload bound in MiB for everything except video.
    pub max_file_size_mb: Option<u64>,
    /// Upload bound in MiB for video.
    pub max_video_size_mb: Option<u64>,
    /// Attempts per external call.
    pub max_retries: Option<u32>,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// HTTP read timeout in seconds.
    pub read_timeout_secs: Option<u64>,
    /// Transcription endpoint.
    pub transcription_endpoint: Option<String>,
    /// Transcription model.
    pub transcription_model: Option<String>,
    /// Enrichment endpoint.
    pub enrichment_endpoint: Option<String>,
    /// Enrichment model.
    pub enrichment_model: Option<String>,
    /// Finished jobs older than this are evicted. Unset keeps them.
    pub retention_secs: Option<u64>,
}

impl FileConfig {
    /// Reads and parses a TOML config file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Fully resolved service configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Listen address.
    pub bind: SocketAddr,
    /// Base URL for links; derived from `bind` when unset.
    pub public_base_url: Option<String>,
    /// Where result archives are stored.
    pub storage_dir: PathBuf,
    /// Items converted at once within one job (1..=100).
    pub concurrency: usize,
    /// Upload bound in bytes for everything except video.
    pub max_file_size: u64,
    /// Upload bound in bytes for video.
    pub max_video_size: u64,
    /// Attempts per external call (0..=10, 0 means a single attempt).
    pub max_retries: u32,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// HTTP read timeout in seconds.
    pub read_timeout_secs: u64,
    /// Transcription endpoint.
    pub transcription_endpoint: String,
    /// Transcription model.
    pub transcription_model: String,
    /// Enrichment endpoint.
    pub enrichment_endpoint: String,
    /// Enrichment model.
    pub enrichment_model: String,
    /// Retention window in seconds for finished jobs.
    pub retention_secs: Option<u64>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            public_base_url: None,
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            concurrency: DEFAULT_CONCURRENCY,
            max_file_size: 50 * MIB,
            max_video_size: 500 * MIB,
            max_retries: DEFAULT_MAX_RETRIES,
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
            transcription_endpoint: DEFAULT_TRANSCRIPTION_ENDPOINT.to_string(),
            transcription_model: DEFAULT_TRANSCRIPTION_MODEL.to_string(),
            enrichment_endpoint: DEFAULT_ENRICHMENT_ENDPOINT.to_string(),
            enrichment_model: DEFAULT_ENRICH_MODEL.to_string(),
            retention_secs: None,
        }
    }
}

impl ServiceConfig {
    /// Overlays every key the file sets.
    pub fn apply_file(&mut self, file: FileConfig) {
        if let Some(bind) = file.bind {
            self.bind = bind;
        }
        if file.public_base_url.is_some() {
            self.public_base_url = file.public_base_url;
        }
        if let Some(dir) = file.storage_dir {
            self.storage_dir = dir;
        }
        if let Some(concurrency) = file.concurrency {
            self.concurrency = concurrency;
        }
        if let Some(mb) = file.max_file_size_mb {
            self.max_file_size = mb.saturating_mul(MIB);
        }
        if let Some(mb) = file.max_video_size_mb {
            self.max_video_size = mb.saturating_mul(MIB);
        }
        if let Some(retries) = file.max_retries {
            self.max_retries = retries;
        }
        if let Some(secs) = file.connect_timeout_secs {
            self.connect_timeout_secs = secs;
        }
        if let Some(secs) = file.read_timeout_secs {
            self.read_timeout_secs = secs;
        }
        if let Some(endpoint) = file.transcription_endpoint {
            self.transcription_endpoint = endpoint;
        }
        if let Some(model) = file.transcription_model {
            self.transcription_model = model;
        }
        if let Some(endpoint) = file.enrichment_endpoint {
            self.enrichment_endpoint = endpoint;
        }
        if let Some(model) = file.enrichment_model {
            self.enrichment_model = model;
        }
        if file.retention_secs.is_some() {
            self.retention_secs = file.retention_secs;
        }
    }

    /// Checks every value against its accepted range.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.concurrency) {
            return Err(ConfigError::invalid("concurrency", self.concurrency, "range 1..=100"));
        }
        if self.max_retries > 10 {
            return Err(ConfigError::invalid("max_retries", self.max_retries, "range 0..=10"));
        }
        if self.max_file_size == 0 {
            return Err(ConfigError::invalid("max_file_size", 0, "a positive size"));
        }
        if self.max_video_size == 0 {
            return Err(ConfigError::invalid("max_video_size", 0, "a positive size"));
        }
        validate_timeout("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout("read_timeout_secs", self.read_timeout_secs)?;
        if self.retention_secs == Some(0) {
            return Err(ConfigError::invalid("retention_secs", 0, "a positive number of seconds"));
        }
        if let Some(base) = &self.public_base_url {
            let valid = url::Url::parse(base)
                .is_ok_and(|url| matches!(url.scheme(), "http" | "https"));
            if !valid {
                return Err(ConfigError::invalid(
                    "public_base_url",
                    base,
                    "an absolute http(s) URL",
                ));
            }
        }
        for (field, value) in [
            ("transcription_endpoint", &self.transcription_endpoint),
            ("enrichment_endpoint", &self.enrichment_endpoint),
        ] {
            if url::Url::parse(value).is_err() {
                return Err(ConfigError::invalid(field, value, "an absolute URL"));
            }
        }
        Ok(())
    }

    /// Base URL for status and download links.
    #[must_use]
    pub fn base_url(&self) -> String {
        self.public_base_url
            .clone()
            .unwrap_or_else(|| format!("http://{}", self.bind))
    }

    /// Settings for the shared HTTP fetcher.
    #[must_use]
    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            max_bytes: self.max_file_size,
            retry: RetryPolicy::with_max_attempts(self.max_retries),
        }
    }

    /// Upload bounds enforced before conversion.
    #[must_use]
    pub fn size_limits(&self) -> SizeLimits {
        SizeLimits {
            max_file_size: self.max_file_size,
            max_video_size: self.max_video_size,
        }
    }

    /// Largest payload any endpoint accepts.
    #[must_use]
    pub fn max_payload(&self) -> u64 {
        self.max_file_size.max(self.max_video_size)
    }

    /// Retention window, when configured.
    #[must_use]
    pub fn retention(&self) -> Option<Duration> {
        self.retention_secs.map(Duration::from_secs)
    }
}

fn validate_timeout(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if (1..=3600).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, value, "range 1..=3600"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ServiceConfig::default();
        config.validate().unwrap();
        assert_eq!(config.bind.to_string(), "127.0.0.1:3000");
        assert_eq!(config.base_url(), "http://127.0.0.1:3000");
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.max_file_size, 50 * MIB);
        assert_eq!(config.max_video_size, 500 * MIB);
        assert!(config.retention().is_none());
    }

    #[test]
    fn test_file_layer_overrides_defaults() {
        let file: FileConfig = toml::from_str(
            r#"
            bind = "0.0.0.0:8080"
            concurrency = 8
            max_file_size_mb = 10
            retention_secs = 3600
            "#,
        )
        .unwrap();
        let mut config = ServiceConfig::default();
        config.apply_file(file);
        assert_eq!(config.bind.port(), 8080);
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.max_file_size, 10 * MIB);
        assert_eq!(config.max_video_size, 500 * MIB);
        assert_eq!(config.retention(), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(toml::from_str::<FileConfig>("concurrancy = 3").is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let config = ServiceConfig {
            concurrency: 0,
            ..ServiceConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid config value for `concurrency`: 0. Expected range 1..=100"
        );

        let config = ServiceConfig {
            max_retries: 11,
            ..ServiceConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ServiceConfig {
            public_base_url: Some("not a url".into()),
            ..ServiceConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mdpack.toml");
        std::fs::write(&path, "concurrency = \"many\"").unwrap();
        let err = FileConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("mdpack.toml"));
    }
}
