//! Converter catalogue and the uniform conversion contract.
//!
//! Every format is a [`ConverterKind`]. A kind declares the [`InputShape`] it
//! accepts and is served by one [`Converter`] registered in the
//! [`ConverterRegistry`]. Converters return [`Converted`] or a
//! [`ConvertError`]; the registry turns errors into failed outputs so nothing
//! past it has to deal with converter exceptions.

mod data;
mod error;
mod html;
mod media;
mod office;
mod pdf;
mod registry;
mod text;
mod transcribe;
mod web;
mod youtube;

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;

use crate::model::{ConversionOptions, ImageAsset, PageResult, RequestContent};

pub use data::{CsvConverter, JsonConverter, YamlConverter};
pub use error::{ConfigurationError, ConvertError};
pub use html::{
    HtmlConverter, absolutize_links, extract_image_urls, extract_links, extract_title,
    html_to_markdown,
};
pub use media::MediaConverter;
pub use office::OfficeConverter;
pub use pdf::PdfConverter;
pub use registry::{ConverterRegistry, RegistryOutput};
pub use text::{RtfConverter, TextConverter, strip_rtf};
pub use transcribe::{OpenAiTranscriber, Transcriber, TranscriptionError};
pub use web::{MAX_PAGE_IMAGES, UrlConverter, fetch_images, image_file_name};
pub(crate) use web::render_page;
pub use youtube::{DEFAULT_OEMBED_ENDPOINT, YoutubeConverter, youtube_video_id};

/// Every converter key the service knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConverterKind {
    Txt,
    Md,
    Html,
    Csv,
    Json,
    Yaml,
    Rtf,
    Pdf,
    Docx,
    /// Legacy Word; known key without a default converter.
    Doc,
    Pptx,
    Xlsx,
    Odt,
    Epub,
    Url,
    ParentUrl,
    Youtube,
    Audio,
    Video,
}

impl ConverterKind {
    /// All kinds, in declaration order.
    pub const ALL: [Self; 19] = [
        Self::Txt,
        Self::Md,
        Self::Html,
        Self::Csv,
        Self::Json,
        Self::Yaml,
        Self::Rtf,
        Self::Pdf,
        Self::Docx,
        Self::Doc,
        Self::Pptx,
        Self::Xlsx,
        Self::Odt,
        Self::Epub,
        Self::Url,
        Self::ParentUrl,
        Self::Youtube,
        Self::Audio,
        Self::Video,
    ];

    /// Registry key.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::Txt => "txt",
            Self::Md => "md",
            Self::Html => "html",
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Rtf => "rtf",
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Doc => "doc",
            Self::Pptx => "pptx",
            Self::Xlsx => "xlsx",
            Self::Odt => "odt",
            Self::Epub => "epub",
            Self::Url => "url",
            Self::ParentUrl => "parenturl",
            Self::Youtube => "youtube",
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }

    /// Looks up a kind by registry key (case-insensitive).
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|kind| kind.key() == key)
    }

    /// Maps a file extension to a kind.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
        let kind = match ext.as_str() {
            "txt" | "text" => Self::Txt,
            "md" | "markdown" => Self::Md,
            "html" | "htm" | "xhtml" => Self::Html,
            "csv" => Self::Csv,
            "json" => Self::Json,
            "yaml" | "yml" => Self::Yaml,
            "rtf" => Self::Rtf,
            "pdf" => Self::Pdf,
            "docx" => Self::Docx,
            "doc" => Self::Doc,
            "pptx" => Self::Pptx,
            "xlsx" => Self::Xlsx,
            "odt" => Self::Odt,
            "epub" => Self::Epub,
            "mp3" | "wav" | "ogg" | "m4a" | "flac" => Self::Audio,
            "mp4" | "mov" | "avi" | "webm" | "mkv" => Self::Video,
            _ => return None,
        };
        Some(kind)
    }

    /// Maps a MIME type (parameters ignored) to a kind.
    #[must_use]
    pub fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        let kind = match mime.as_str() {
            "text/plain" => Self::Txt,
            "text/markdown" | "text/x-markdown" => Self::Md,
            "text/html" | "application/xhtml+xml" => Self::Html,
            "text/csv" => Self::Csv,
            "application/json" => Self::Json,
            "application/yaml" | "application/x-yaml" | "text/yaml" | "text/x-yaml" => Self::Yaml,
            "application/rtf" | "text/rtf" => Self::Rtf,
            "application/pdf" => Self::Pdf,
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                Self::Docx
            }
            "application/msword" => Self::Doc,
            "application/vnd.openxmlformats-officedocument.presentationml.presentation" => {
                Self::Pptx
            }
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => Self::Xlsx,
            "application/vnd.oasis.opendocument.text" => Self::Odt,
            "application/epub+zip" => Self::Epub,
            m if m.starts_with("audio/") => Self::Audio,
            m if m.starts_with("video/") => Self::Video,
            _ => return None,
        };
        Some(kind)
    }

    /// Input shape the kind's converter accepts.
    #[must_use]
    pub fn input_shape(self) -> InputShape {
        match self {
            Self::Txt | Self::Md | Self::Html | Self::Csv | Self::Json | Self::Yaml | Self::Rtf => {
                InputShape::Textual
            }
            Self::Pdf
            | Self::Docx
            | Self::Doc
            | Self::Pptx
            | Self::Xlsx
            | Self::Odt
            | Self::Epub
            | Self::Audio
            | Self::Video => InputShape::Binary,
            Self::Url | Self::Youtube => InputShape::Url,
            Self::ParentUrl => InputShape::UrlOrObject,
        }
    }
}

impl fmt::Display for ConverterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Content shape a converter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputShape {
    /// Raw bytes only.
    Binary,
    /// Text only.
    Textual,
    /// A URL string.
    Url,
    /// A URL string or an object carrying a `url` field.
    UrlOrObject,
}

impl InputShape {
    /// Whether `content` has this shape.
    #[must_use]
    pub fn accepts(self, content: &RequestContent) -> bool {
        match (self, content) {
            (Self::Binary, RequestContent::Binary(_))
            | (Self::Textual | Self::Url | Self::UrlOrObject, RequestContent::Text(_)) => true,
            (Self::UrlOrObject, RequestContent::Structured(value)) => {
                value.get("url").is_some_and(serde_json::Value::is_string)
            }
            _ => false,
        }
    }
}

impl fmt::Display for InputShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Binary => "binary",
            Self::Textual => "text",
            Self::Url => "url",
            Self::UrlOrObject => "url or {url} object",
        })
    }
}

/// Borrowed view of one request handed to a converter.
#[derive(Debug, Clone, Copy)]
pub struct ConverterInput<'a> {
    /// Payload.
    pub content: &'a RequestContent,
    /// Item name.
    pub name: &'a str,
    /// API key, when one was supplied.
    pub api_key: Option<&'a str>,
    /// Item options.
    pub options: &'a ConversionOptions,
}

impl<'a> ConverterInput<'a> {
    /// Text payload.
    ///
    /// # Errors
    ///
    /// [`ConvertError::InvalidInput`] for non-text content.
    pub fn text(&self, kind: ConverterKind) -> Result<&'a str, ConvertError> {
        match self.content {
            RequestContent::Text(text) => Ok(text),
            other => Err(ConvertError::InvalidInput {
                kind,
                expected: kind.input_shape(),
                actual: other.shape(),
            }),
        }
    }

    /// Binary payload.
    ///
    /// # Errors
    ///
    /// [`ConvertError::InvalidInput`] for non-binary content.
    pub fn bytes(&self, kind: ConverterKind) -> Result<&'a Bytes, ConvertError> {
        match self.content {
            RequestContent::Binary(bytes) => Ok(bytes),
            other => Err(ConvertError::InvalidInput {
                kind,
                expected: kind.input_shape(),
                actual: other.shape(),
            }),
        }
    }

    /// URL carried by a text payload or a `{url}` object.
    ///
    /// # Errors
    ///
    /// [`ConvertError::InvalidInput`] when no URL is present.
    pub fn url(&self, kind: ConverterKind) -> Result<&'a str, ConvertError> {
        self.content
            .url()
            .filter(|url| !url.is_empty())
            .ok_or(ConvertError::InvalidInput {
                kind,
                expected: kind.input_shape(),
                actual: self.content.shape(),
            })
    }
}

/// Successful converter output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Converted {
    /// Markdown body.
    pub content: String,
    /// Images owned by the item.
    pub images: Vec<ImageAsset>,
    /// Crawl pages.
    pub pages: Vec<PageResult>,
    /// URL the content came from.
    pub source_url: Option<String>,
    /// Contained non-fatal problems (e.g. an image that failed to download).
    pub warnings: Vec<String>,
}

impl Converted {
    /// Output with only a Markdown body.
    pub fn markdown(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// Adds images.
    #[must_use]
    pub fn with_images(mut self, images: Vec<ImageAsset>) -> Self {
        self.images = images;
        self
    }

    /// Sets the source URL.
    #[must_use]
    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }
}

/// A converter for one or more [`ConverterKind`]s.
///
/// Uses `async_trait` so the registry can hold `Arc<dyn Converter>`.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Converts one item. `kind` is the key the registry dispatched on.
    async fn convert(
        &self,
        kind: ConverterKind,
        input: ConverterInput<'_>,
    ) -> Result<Converted, ConvertError>;
}

/// File stem of an item name, used for titles.
#[must_use]
pub fn title_from_name(name: &str) -> String {
    let file_name = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let stem = match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    };
    let stem = stem.trim();
    if stem.is_empty() {
        "Untitled".to_string()
    } else {
        stem.to_string()
    }
}
