//! HTTP client wrapper for fetching pages, images and metadata.
//!
//! [`HttpFetcher`] owns one pooled reqwest client, applies the configured
//! timeouts and user agent, caps response sizes while streaming, and runs
//! every request through the shared [`RetryPolicy`].

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, RETRY_AFTER};
use tracing::{debug, instrument};
use url::Url;

use super::{FetchError, RetryPolicy};

/// Connection establishment timeout in seconds.
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Whole-request timeout in seconds.
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Default cap on a fetched body (50 MiB).
pub const DEFAULT_MAX_BYTES: u64 = 50 * 1024 * 1024;

const PROJECT_UA_URL: &str = "https://github.com/fierce/mdpack";

/// User agent sent with every outbound request.
#[must_use]
pub fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("mdpack/{version} (markdown-converter; +{PROJECT_UA_URL})")
}

/// Settings for [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Connect timeout.
    pub connect_timeout: Duration,
    /// Whole-request timeout.
    pub read_timeout: Duration,
    /// Largest body accepted.
    pub max_bytes: u64,
    /// Retry behaviour for every request.
    pub retry: RetryPolicy,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
            max_bytes: DEFAULT_MAX_BYTES,
            retry: RetryPolicy::default(),
        }
    }
}

/// A fetched body plus the response metadata converters care about.
#[derive(Debug, Clone)]
pub struct FetchedResource {
    /// URL after redirects.
    pub final_url: Url,
    /// Content-Type header without parameters, lowercased.
    pub content_type: Option<String>,
    /// Body bytes.
    pub bytes: Bytes,
}

impl FetchedResource {
    /// Body decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    /// True when the server declared an HTML body.
    #[must_use]
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct == "text/html" || ct == "application/xhtml+xml")
    }
}

/// Shared HTTP client. Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    retry: RetryPolicy,
    max_bytes: u64,
}

impl HttpFetcher {
    /// Builds a fetcher.
    ///
    /// # Errors
    ///
    /// Returns the reqwest builder error when the TLS backend cannot be initialised.
    pub fn new(settings: FetchSettings) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.read_timeout)
            .gzip(true)
            .user_agent(default_user_agent())
            .build()?;
        Ok(Self {
            client,
            retry: settings.retry,
            max_bytes: settings.max_bytes,
        })
    }

    /// Underlying reqwest client, for calls that are not plain GETs.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Retry policy applied by this fetcher.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Body size cap.
    #[must_use]
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// GETs `url` with retries and the byte cap.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] for invalid URLs, network failures, error
    /// statuses, and bodies larger than the cap.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch(&self, url: &str) -> Result<FetchedResource, FetchError> {
        let parsed = parse_http_url(url)?;
        self.retry
            .run(url, || self.fetch_once(parsed.clone()))
            .await
    }

    /// GETs `url` and decodes the body as text.
    ///
    /// # Errors
    ///
    /// See [`fetch`](Self::fetch).
    pub async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        Ok(self.fetch(url).await?.text())
    }

    async fn fetch_once(&self, url: Url) -> Result<FetchedResource, FetchError> {
        let url_str = url.to_string();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::network(&url_str, e))?;
        let response = check_status(&url_str, response)?;

        if let Some(length) = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            && length > self.max_bytes
        {
            return Err(FetchError::too_large(&url_str, self.max_bytes));
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase());

        let bytes = read_capped(&url_str, response, self.max_bytes).await?;
        debug!(bytes = bytes.len(), content_type = ?content_type, "fetched");

        Ok(FetchedResource {
            final_url,
            content_type,
            bytes,
        })
    }
}

/// Parses `url`, accepting only http and https.
///
/// # Errors
///
/// Returns [`FetchError::InvalidUrl`] otherwise.
pub fn parse_http_url(url: &str) -> Result<Url, FetchError> {
    let parsed = Url::parse(url.trim()).map_err(|_| FetchError::invalid_url(url))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(parsed),
        _ => Err(FetchError::invalid_url(url)),
    }
}

/// Turns a non-success response into [`FetchError::HttpStatus`], keeping Retry-After.
///
/// # Errors
///
/// Returns the status error for any non-2xx response.
pub fn check_status(url: &str, response: reqwest::Response) -> Result<reqwest::Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(std::string::ToString::to_string);
    Err(FetchError::http_status_with_retry_after(
        url,
        status.as_u16(),
        retry_after,
    ))
}

async fn read_capped(
    url: &str,
    response: reqwest::Response,
    max_bytes: u64,
) -> Result<Bytes, FetchError> {
    let mut stream = response.bytes_stream();
    let mut buffer = BytesMut::new();

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| FetchError::network(url, e))?;
        if buffer.len() as u64 + chunk.len() as u64 > max_bytes {
            return Err(FetchError::too_large(url, max_bytes));
        }
        buffer.extend_from_slice(&chunk);
    }

    Ok(buffer.freeze())
}
