//! Conversion request types.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declared type of an incoming conversion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    /// Uploaded file; the converter is picked from its extension.
    File,
    /// Single web page.
    Url,
    /// Recursive crawl starting from a parent page.
    #[serde(rename = "parenturl", alias = "parent-url", alias = "parent_url")]
    ParentUrl,
    /// YouTube video link.
    Youtube,
    /// Uploaded audio file (transcribed).
    Audio,
    /// Uploaded video file (transcribed).
    Video,
}

impl RequestType {
    /// Returns the wire label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Url => "url",
            Self::ParentUrl => "parenturl",
            Self::Youtube => "youtube",
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }

    /// True for the request types whose content is a web address.
    #[must_use]
    pub fn is_web(self) -> bool {
        matches!(self, Self::Url | Self::ParentUrl | Self::Youtube)
    }

    /// True for the request types that can only be served with an API key.
    #[must_use]
    pub fn requires_api_key(self) -> bool {
        matches!(self, Self::Audio | Self::Video)
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RequestType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "url" => Ok(Self::Url),
            "parenturl" | "parent-url" | "parent_url" => Ok(Self::ParentUrl),
            "youtube" => Ok(Self::Youtube),
            "audio" => Ok(Self::Audio),
            "video" => Ok(Self::Video),
            other => Err(format!("unsupported request type: {other}")),
        }
    }
}

/// Payload of a request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestContent {
    /// Raw bytes (uploads).
    Binary(Bytes),
    /// Text (URLs, inline documents).
    Text(String),
    /// Structured JSON (e.g. `{"url": ...}` for crawls).
    Structured(serde_json::Value),
}

impl RequestContent {
    /// Payload size in bytes, used for limit checks before conversion.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Binary(bytes) => bytes.len(),
            Self::Text(text) => text.len(),
            Self::Structured(value) => value.to_string().len(),
        }
    }

    /// True when the payload carries no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short label for logs and error messages.
    #[must_use]
    pub fn shape(&self) -> &'static str {
        match self {
            Self::Binary(_) => "binary",
            Self::Text(_) => "text",
            Self::Structured(_) => "structured",
        }
    }

    /// Returns the URL carried by a text payload or an object with a `url` field.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text.trim()),
            Self::Structured(value) => value.get("url").and_then(serde_json::Value::as_str),
            Self::Binary(_) => None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_depth() -> u32 {
    1
}

fn default_max_pages() -> usize {
    10
}

/// Per-request options. Unrecognized keys are kept in `extra` and otherwise ignored.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionOptions {
    /// Keep images found in the source.
    #[serde(default = "default_true")]
    pub include_images: bool,
    /// Prepend a front matter block describing the source.
    #[serde(default = "default_true")]
    pub include_meta: bool,
    /// Rewrite relative links to absolute ones (web sources).
    #[serde(default = "default_true")]
    pub convert_links: bool,
    /// Crawl depth (parent URL only).
    #[serde(default = "default_depth")]
    pub depth: u32,
    /// Crawl page budget (parent URL only).
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    /// API key for transcription and enrichment.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Run the enrichment step when an API key is present.
    #[serde(default)]
    pub enhance: bool,
    /// Unrecognized keys, passed through inertly.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            include_images: true,
            include_meta: true,
            convert_links: true,
            depth: default_depth(),
            max_pages: default_max_pages(),
            api_key: None,
            enhance: false,
            extra: serde_json::Map::new(),
        }
    }
}

impl fmt::Debug for ConversionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionOptions")
            .field("include_images", &self.include_images)
            .field("include_meta", &self.include_meta)
            .field("convert_links", &self.convert_links)
            .field("depth", &self.depth)
            .field("max_pages", &self.max_pages)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("enhance", &self.enhance)
            .field("extra", &self.extra)
            .finish()
    }
}

impl ConversionOptions {
    /// Returns the API key when one was supplied and is not blank.
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

/// One unit of work submitted to the service. Immutable once dispatched.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    /// Unique request id.
    pub id: String,
    /// Declared request type.
    pub request_type: RequestType,
    /// Payload.
    pub content: RequestContent,
    /// Display name (file name or URL).
    pub name: String,
    /// Client-supplied or sniffed MIME type.
    pub mime_type: Option<String>,
    /// Options for this item.
    pub options: ConversionOptions,
}

impl ConversionRequest {
    /// Creates a request with default options and a fresh id.
    pub fn new(request_type: RequestType, name: impl Into<String>, content: RequestContent) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            request_type,
            content,
            name: name.into(),
            mime_type: None,
            options: ConversionOptions::default(),
        }
    }

    /// Uploaded file.
    pub fn file(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self::new(RequestType::File, name, RequestContent::Binary(data.into()))
    }

    /// Uploaded audio.
    pub fn audio(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self::new(RequestType::Audio, name, RequestContent::Binary(data.into()))
    }

    /// Uploaded video.
    pub fn video(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self::new(RequestType::Video, name, RequestContent::Binary(data.into()))
    }

    /// Single page URL.
    pub fn url(url: impl Into<String>) -> Self {
        let url = url.into();
        Self::new(RequestType::Url, url.clone(), RequestContent::Text(url))
    }

    /// Crawl starting at `url`.
    pub fn parent_url(url: impl Into<String>) -> Self {
        let url = url.into();
        Self::new(RequestType::ParentUrl, url.clone(), RequestContent::Text(url))
    }

    /// YouTube link.
    pub fn youtube(url: impl Into<String>) -> Self {
        let url = url.into();
        Self::new(RequestType::Youtube, url.clone(), RequestContent::Text(url))
    }

    /// Replaces the options.
    #[must_use]
    pub fn with_options(mut self, options: ConversionOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the MIME type.
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Lowercased file extension of `name`, without the dot.
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        if self.request_type.is_web() {
            return None;
        }
        crate::classify::extension_of(&self.name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_request_type_round_trips_through_str() {
        for ty in [
            RequestType::File,
            RequestType::Url,
            RequestType::ParentUrl,
            RequestType::Youtube,
            RequestType::Audio,
            RequestType::Video,
        ] {
            assert_eq!(ty.as_str().parse::<RequestType>().unwrap(), ty);
        }
        assert_eq!(
            "parent-url".parse::<RequestType>().unwrap(),
            RequestType::ParentUrl
        );
        assert!("ftp".parse::<RequestType>().is_err());
    }

    #[test]
    fn test_options_defaults_from_empty_json() {
        let options: ConversionOptions = serde_json::from_str("{}").unwrap();
        assert!(options.include_images);
        assert!(options.include_meta);
        assert!(options.convert_links);
        assert_eq!(options.depth, 1);
        assert_eq!(options.max_pages, 10);
        assert!(options.api_key.is_none());
        assert!(!options.enhance);
    }

    #[test]
    fn test_options_keep_unrecognized_keys() {
        let options: ConversionOptions =
            serde_json::from_str(r#"{"depth": 2, "theme": "dark"}"#).unwrap();
        assert_eq!(options.depth, 2);
        assert_eq!(options.extra.get("theme").unwrap(), "dark");
    }

    #[test]
    fn test_options_debug_redacts_api_key() {
        let options = ConversionOptions {
            api_key: Some("sk-secret".to_string()),
            ..ConversionOptions::default()
        };
        let debug = format!("{options:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_blank_api_key_is_absent() {
        let options = ConversionOptions {
            api_key: Some("   ".to_string()),
            ..ConversionOptions::default()
        };
        assert_eq!(options.api_key(), None);
    }

    #[test]
    fn test_structured_content_exposes_url() {
        let content = RequestContent::Structured(serde_json::json!({"url": "https://a.test/"}));
        assert_eq!(content.url(), Some("https://a.test/"));
        assert_eq!(RequestContent::Binary(Bytes::new()).url(), None);
    }

    #[test]
    fn test_web_requests_have_no_extension() {
        let request = ConversionRequest::url("https://example.com/report.pdf");
        assert_eq!(request.extension(), None);
        let request = ConversionRequest::file("Report.PDF", b"x".to_vec());
        assert_eq!(request.extension().as_deref(), Some("pdf"));
    }
}
