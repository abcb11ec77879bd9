//! Key-to-converter dispatch with input validation and failure containment.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::{debug, instrument, warn};

use super::{
    ConfigurationError, ConvertError, Converted, Converter, ConverterInput, ConverterKind,
    CsvConverter, HtmlConverter, JsonConverter, MediaConverter, OfficeConverter, PdfConverter,
    RtfConverter, TextConverter, Transcriber, UrlConverter, YamlConverter, YoutubeConverter,
    DEFAULT_OEMBED_ENDPOINT,
};
use crate::crawl::{CrawlConverter, Crawler};
use crate::error::ErrorKind;
use crate::fetch::HttpFetcher;
use crate::model::{ImageAsset, PageResult, error_note_body};

/// Uniform registry result. Converter failures arrive here as `success: false`.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryOutput {
    /// Whether the converter succeeded.
    pub success: bool,
    /// Markdown body, or an error note.
    pub content: String,
    /// Images (empty on failure).
    pub images: Vec<ImageAsset>,
    /// Crawl pages.
    pub pages: Vec<PageResult>,
    /// Source URL for web kinds.
    pub source_url: Option<String>,
    /// Contained non-fatal problems.
    pub warnings: Vec<String>,
    /// Failure message.
    pub error: Option<String>,
    /// Failure classification.
    pub error_kind: Option<ErrorKind>,
}

impl RegistryOutput {
    fn converted(converted: Converted) -> Self {
        Self {
            success: true,
            content: converted.content,
            images: converted.images,
            pages: converted.pages,
            source_url: converted.source_url,
            warnings: converted.warnings,
            error: None,
            error_kind: None,
        }
    }

    fn failed(name: &str, kind: ErrorKind, message: String) -> Self {
        Self {
            success: false,
            content: error_note_body(name, &message),
            images: Vec::new(),
            pages: Vec::new(),
            source_url: None,
            warnings: Vec::new(),
            error: Some(message),
            error_kind: Some(kind),
        }
    }
}

/// Maps each [`ConverterKind`] to its converter.
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    converters: HashMap<ConverterKind, Arc<dyn Converter>>,
}

impl std::fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConverterRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl ConverterRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in converter. `doc` stays unregistered.
    #[must_use]
    pub fn with_defaults(
        fetcher: HttpFetcher,
        transcriber: Arc<dyn Transcriber>,
        crawler: Arc<dyn Crawler>,
    ) -> Self {
        let mut registry = Self::new();

        let text: Arc<dyn Converter> = Arc::new(TextConverter);
        registry.register(ConverterKind::Txt, Arc::clone(&text));
        registry.register(ConverterKind::Md, text);
        registry.register(ConverterKind::Rtf, Arc::new(RtfConverter));
        registry.register(ConverterKind::Html, Arc::new(HtmlConverter));
        registry.register(ConverterKind::Csv, Arc::new(CsvConverter));
        registry.register(ConverterKind::Json, Arc::new(JsonConverter));
        registry.register(ConverterKind::Yaml, Arc::new(YamlConverter));
        registry.register(ConverterKind::Pdf, Arc::new(PdfConverter));

        let office: Arc<dyn Converter> = Arc::new(OfficeConverter);
        for kind in [
            ConverterKind::Docx,
            ConverterKind::Pptx,
            ConverterKind::Xlsx,
            ConverterKind::Odt,
            ConverterKind::Epub,
        ] {
            registry.register(kind, Arc::clone(&office));
        }

        registry.register(ConverterKind::Url, Arc::new(UrlConverter::new(fetcher.clone())));
        registry.register(
            ConverterKind::Youtube,
            Arc::new(YoutubeConverter::new(fetcher, DEFAULT_OEMBED_ENDPOINT)),
        );
        registry.register(ConverterKind::ParentUrl, Arc::new(CrawlConverter::new(crawler)));

        let media: Arc<dyn Converter> = Arc::new(MediaConverter::new(transcriber));
        registry.register(ConverterKind::Audio, Arc::clone(&media));
        registry.register(ConverterKind::Video, media);

        registry
    }

    /// Registers (or replaces) the converter for `kind`.
    pub fn register(&mut self, kind: ConverterKind, converter: Arc<dyn Converter>) {
        self.converters.insert(kind, converter);
    }

    /// Whether `kind` has a converter.
    #[must_use]
    pub fn is_registered(&self, kind: ConverterKind) -> bool {
        self.converters.contains_key(&kind)
    }

    /// Registered kinds, sorted.
    #[must_use]
    pub fn kinds(&self) -> Vec<ConverterKind> {
        let mut kinds: Vec<_> = self.converters.keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// Converts `input` with the converter registered under `key`.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError`] when the key is unknown or unregistered. Every
    /// converter failure, panics included, is returned as a failed output.
    pub async fn convert(
        &self,
        key: &str,
        input: ConverterInput<'_>,
    ) -> Result<RegistryOutput, ConfigurationError> {
        let kind = ConverterKind::from_key(key).ok_or_else(|| ConfigurationError::UnknownType {
            key: key.to_string(),
        })?;
        self.convert_kind(kind, input).await
    }

    /// Like [`convert`](Self::convert) with an already resolved kind.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::NotRegistered`] when nothing serves `kind`.
    #[instrument(skip(self, input), fields(kind = %kind, item = input.name))]
    pub async fn convert_kind(
        &self,
        kind: ConverterKind,
        input: ConverterInput<'_>,
    ) -> Result<RegistryOutput, ConfigurationError> {
        let converter = self
            .converters
            .get(&kind)
            .ok_or(ConfigurationError::NotRegistered { kind })?;

        let shape = kind.input_shape();
        if !shape.accepts(input.content) {
            let error = ConvertError::InvalidInput {
                kind,
                expected: shape,
                actual: input.content.shape(),
            };
            warn!(error = %error, "input rejected");
            return Ok(RegistryOutput::failed(input.name, error.kind(), error.to_string()));
        }

        let outcome = AssertUnwindSafe(converter.convert(kind, input))
            .catch_unwind()
            .await;

        Ok(match outcome {
            Ok(Ok(converted)) => {
                debug!(
                    chars = converted.content.len(),
                    images = converted.images.len(),
                    "converted"
                );
                RegistryOutput::converted(converted)
            }
            Ok(Err(error)) => {
                warn!(error = %error, "conversion failed");
                RegistryOutput::failed(input.name, error.kind(), error.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(panic = %message, "converter panicked");
                RegistryOutput::failed(
                    input.name,
                    ErrorKind::Internal,
                    format!("converter panicked: {message}"),
                )
            }
        })
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
