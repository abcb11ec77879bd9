//! Speech-to-text collaborator used by the audio and video converters.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};

use super::ConvertError;
use crate::fetch::{FetchError, HttpFetcher, check_status};

/// Transcription failures.
#[derive(Debug, Error)]
pub enum TranscriptionError {
    /// The service rejected the API key.
    #[error("transcription service rejected the API key (HTTP {status})")]
    Unauthorized {
        /// HTTP status returned.
        status: u16,
    },

    /// Network or protocol failure.
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl From<TranscriptionError> for ConvertError {
    fn from(error: TranscriptionError) -> Self {
        match error {
            TranscriptionError::Unauthorized { .. } => Self::Authentication {
                message: error.to_string(),
            },
            TranscriptionError::Fetch(source) => Self::Fetch(source),
        }
    }
}

/// Turns recorded speech into text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribes `audio` (named `file_name`, of type `mime_type`) using `api_key`.
    async fn transcribe(
        &self,
        audio: Bytes,
        file_name: &str,
        mime_type: &str,
        api_key: &str,
    ) -> Result<String, TranscriptionError>;
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Client for OpenAI-compatible `/v1/audio/transcriptions` endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiTranscriber {
    fetcher: HttpFetcher,
    endpoint: String,
    model: String,
}

impl OpenAiTranscriber {
    /// Creates a transcriber posting to `endpoint` with `model`.
    pub fn new(fetcher: HttpFetcher, endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            fetcher,
            endpoint: endpoint.into(),
            model: model.into(),
        }
    }

    async fn post_once(
        &self,
        audio: Bytes,
        file_name: &str,
        mime_type: &str,
        api_key: &str,
    ) -> Result<String, FetchError> {
        let part = Part::stream(reqwest::Body::from(audio))
            .file_name(file_name.to_string())
            .mime_str(mime_type)
            .map_err(|e| FetchError::network(&self.endpoint, e))?;
        let form = Form::new()
            .text("model", self.model.clone())
            .text("response_format", "json")
            .part("file", part);

        let response = self
            .fetcher
            .client()
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| FetchError::network(&self.endpoint, e))?;
        let response = check_status(&self.endpoint, response)?;

        let body: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| FetchError::decode(&self.endpoint, e.to_string()))?;
        Ok(body.text)
    }
}

#[async_trait]
impl Transcriber for OpenAiTranscriber {
    #[instrument(skip(self, audio, api_key), fields(bytes = audio.len(), model = %self.model))]
    async fn transcribe(
        &self,
        audio: Bytes,
        file_name: &str,
        mime_type: &str,
        api_key: &str,
    ) -> Result<String, TranscriptionError> {
        let result = self
            .fetcher
            .retry_policy()
            .run("transcription", || {
                self.post_once(audio.clone(), file_name, mime_type, api_key)
            })
            .await;

        match result {
            Ok(text) => {
                debug!(chars = text.len(), "transcription complete");
                Ok(text)
            }
            Err(FetchError::HttpStatus {
                status: status @ (401 | 403),
                ..
            }) => Err(TranscriptionError::Unauthorized { status }),
            Err(other) => Err(other.into()),
        }
    }
}
