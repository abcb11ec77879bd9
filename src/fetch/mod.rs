//! Outbound HTTP: the shared client, its error type, and the retry loop.

mod client;
mod error;
mod retry;

pub use client::{
    CONNECT_TIMEOUT_SECS, DEFAULT_MAX_BYTES, FetchSettings, FetchedResource, HttpFetcher,
    READ_TIMEOUT_SECS, check_status, default_user_agent, parse_http_url,
};
pub use error::FetchError;
pub use retry::{
    DEFAULT_MAX_RETRIES, FailureType, MAX_RETRY_AFTER, RetryDecision, RetryPolicy, classify_error,
    parse_retry_after,
};
