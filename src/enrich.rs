//! Optional note enrichment (front matter, cross-reference links).
//!
//! The [`Enricher`] collaborator rewrites a converted note. Enrichment is
//! best-effort: [`enrich_or_fallback`] keeps the unenriched content and
//! records a warning whenever the collaborator fails.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::error::ErrorKind;
use crate::fetch::{FetchError, HttpFetcher, check_status};

/// Default model used by [`OpenAiEnricher`].
pub const DEFAULT_ENRICH_MODEL: &str = "gpt-4o-mini";

const SYSTEM_PROMPT: &str = "You improve Markdown notes for a personal knowledge base. \
Add a YAML front matter block with title, tags and a one-sentence summary, turn key \
concepts into [[wiki links]], and keep every other part of the note unchanged. \
Reply with the complete note only.";

/// Enrichment failures. Never fatal to a conversion.
#[derive(Debug, Error)]
pub enum EnrichError {
    /// The service rejected the API key.
    #[error("enrichment service rejected the API key (HTTP {status})")]
    Unauthorized {
        /// HTTP status returned.
        status: u16,
    },

    /// The service answered without any content.
    #[error("enrichment service returned an empty note")]
    EmptyResponse,

    /// Network or protocol failure.
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl EnrichError {
    /// Service-level classification.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized { .. } => ErrorKind::Authentication,
            Self::EmptyResponse => ErrorKind::Conversion,
            Self::Fetch(source) => source.kind(),
        }
    }
}

/// Post-processes a converted Markdown note.
#[async_trait]
pub trait Enricher: Send + Sync {
    /// Returns the enriched version of `markdown`.
    async fn enrich(
        &self,
        markdown: &str,
        file_name: &str,
        api_key: &str,
    ) -> Result<String, EnrichError>;
}

/// Runs `enricher`, falling back to `markdown` on failure.
///
/// Returns the note to keep and, on fallback, a warning describing why.
pub async fn enrich_or_fallback(
    enricher: &dyn Enricher,
    markdown: String,
    file_name: &str,
    api_key: &str,
) -> (String, Option<String>) {
    match enricher.enrich(&markdown, file_name, api_key).await {
        Ok(enriched) => (enriched, None),
        Err(error) => {
            warn!(item = file_name, error = %error, "enrichment failed, keeping original note");
            (markdown, Some(format!("enrichment skipped: {error}")))
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Client for OpenAI-compatible `/v1/chat/completions` endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiEnricher {
    fetcher: HttpFetcher,
    endpoint: String,
    model: String,
}

impl OpenAiEnricher {
    /// Creates an enricher posting to `endpoint` with `model`.
    pub fn new(fetcher: HttpFetcher, endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            fetcher,
            endpoint: endpoint.into(),
            model: model.into(),
        }
    }

    async fn post_once(&self, prompt: &str, api_key: &str) -> Result<ChatResponse, FetchError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.2,
        };
        let response = self
            .fetcher
            .client()
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| FetchError::network(&self.endpoint, e))?;
        let response = check_status(&self.endpoint, response)?;
        response
            .json()
            .await
            .map_err(|e| FetchError::decode(&self.endpoint, e.to_string()))
    }
}

#[async_trait]
impl Enricher for OpenAiEnricher {
    #[instrument(skip(self, markdown, api_key), fields(item = file_name, chars = markdown.len()))]
    async fn enrich(
        &self,
        markdown: &str,
        file_name: &str,
        api_key: &str,
    ) -> Result<String, EnrichError> {
        let prompt = format!("File name: {file_name}\n\n{markdown}");
        let result = self
            .fetcher
            .retry_policy()
            .run("enrichment", || self.post_once(&prompt, api_key))
            .await;

        let response = match result {
            Ok(response) => response,
            Err(FetchError::HttpStatus {
                status: status @ (401 | 403),
                ..
            }) => return Err(EnrichError::Unauthorized { status }),
            Err(other) => return Err(other.into()),
        };

        let content = response
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .map(|content| strip_code_fence(&content))
            .filter(|content| !content.trim().is_empty())
            .ok_or(EnrichError::EmptyResponse)?;
        debug!(chars = content.len(), "note enriched");
        Ok(content)
    }
}

// Models sometimes wrap the whole note in a ```markdown fence.
fn strip_code_fence(content: &str) -> String {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return format!("{trimmed}\n");
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    let body = body.trim_end().strip_suffix("```").unwrap_or(body);
    format!("{}\n", body.trim())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct Failing;

    #[async_trait]
    impl Enricher for Failing {
        async fn enrich(&self, _: &str, _: &str, _: &str) -> Result<String, EnrichError> {
            Err(EnrichError::Unauthorized { status: 401 })
        }
    }

    struct Upper;

    #[async_trait]
    impl Enricher for Upper {
        async fn enrich(&self, markdown: &str, _: &str, _: &str) -> Result<String, EnrichError> {
            Ok(markdown.to_uppercase())
        }
    }

    #[tokio::test]
    async fn test_fallback_keeps_original_and_warns() {
        let (note, warning) = enrich_or_fallback(&Failing, "# a\n".to_string(), "a.txt", "k").await;
        assert_eq!(note, "# a\n");
        assert!(warning.unwrap().contains("HTTP 401"));
    }

    #[tokio::test]
    async fn test_success_replaces_note() {
        let (note, warning) = enrich_or_fallback(&Upper, "# a\n".to_string(), "a.txt", "k").await;
        assert_eq!(note, "# A\n");
        assert!(warning.is_none());
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```markdown\n# Note\nbody\n```"), "# Note\nbody\n");
        assert_eq!(strip_code_fence("# Note\n"), "# Note\n");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(EnrichError::Unauthorized { status: 403 }.kind(), ErrorKind::Authentication);
        assert_eq!(EnrichError::EmptyResponse.kind(), ErrorKind::Conversion);
    }
}
