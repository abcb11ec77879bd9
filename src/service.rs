//! Single-item conversion with failure containment.
//!
//! [`ConversionService::convert`] always returns a [`ConversionResult`]:
//! converter errors, dispatch errors and panics all end up as
//! `success: false` results carrying an error note.

use std::borrow::Cow;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::classify::{Category, classify};
use crate::convert::{
    ConfigurationError, ConverterInput, ConverterKind, ConverterRegistry, InputShape,
    title_from_name,
};
use crate::enrich::{Enricher, enrich_or_fallback};
use crate::error::ErrorKind;
use crate::model::{ConversionRequest, ConversionResult, RequestContent, RequestType};

/// Resolves the converter for a request.
///
/// Web, audio and video requests map to their own kind. Files use the
/// extension first and fall back to the MIME type only when the extension
/// is missing or unknown.
///
/// # Errors
///
/// [`ConfigurationError::UnknownType`] when neither names a converter.
pub fn effective_kind(request: &ConversionRequest) -> Result<ConverterKind, ConfigurationError> {
    let kind = match request.request_type {
        RequestType::Url => ConverterKind::Url,
        RequestType::ParentUrl => ConverterKind::ParentUrl,
        RequestType::Youtube => ConverterKind::Youtube,
        RequestType::Audio => ConverterKind::Audio,
        RequestType::Video => ConverterKind::Video,
        RequestType::File => {
            let extension = request.extension();
            let from_extension = extension.as_deref().and_then(ConverterKind::from_extension);
            let from_mime = || request.mime_type.as_deref().and_then(ConverterKind::from_mime);
            return from_extension
                .or_else(from_mime)
                .ok_or_else(|| ConfigurationError::UnknownType {
                    key: extension
                        .or_else(|| request.mime_type.clone())
                        .unwrap_or_else(|| "file".to_string()),
                });
        }
    };
    Ok(kind)
}

/// Archive category of a request.
#[must_use]
pub fn category_of(request: &ConversionRequest) -> Category {
    classify(request.request_type, request.extension().as_deref())
}

/// Converts one request at a time. Stateless and safe to share across tasks.
#[derive(Clone)]
pub struct ConversionService {
    registry: Arc<ConverterRegistry>,
    enricher: Option<Arc<dyn Enricher>>,
}

impl std::fmt::Debug for ConversionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionService")
            .field("registry", &self.registry)
            .field("enricher", &self.enricher.is_some())
            .finish()
    }
}

impl ConversionService {
    /// Creates a service dispatching through `registry`.
    #[must_use]
    pub fn new(registry: Arc<ConverterRegistry>) -> Self {
        Self {
            registry,
            enricher: None,
        }
    }

    /// Enables the enrichment step for requests with `enhance` set.
    #[must_use]
    pub fn with_enricher(mut self, enricher: Arc<dyn Enricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    /// Converts `request`. Never fails; failures are results.
    #[instrument(skip(self, request), fields(item = %request.name, request_type = %request.request_type))]
    pub async fn convert(&self, request: &ConversionRequest) -> ConversionResult {
        let category = category_of(request);

        let kind = match effective_kind(request) {
            Ok(kind) => kind,
            Err(error) => return configuration_failure(request, category, &error),
        };

        let content = textual_content(kind, &request.content);
        let input = ConverterInput {
            content: &content,
            name: &request.name,
            api_key: request.options.api_key(),
            options: &request.options,
        };

        let output = match self.registry.convert_kind(kind, input).await {
            Ok(output) => output,
            Err(error) => return configuration_failure(request, category, &error),
        };

        if !output.success {
            let message = output.error.unwrap_or_else(|| "conversion failed".to_string());
            warn!(kind = %kind, error = %message, "item failed");
            let mut result = ConversionResult::failure(
                &request.name,
                request.request_type,
                category,
                output.error_kind.unwrap_or(ErrorKind::Conversion),
                message,
            );
            result.content = output.content;
            return result;
        }

        let mut warnings = output.warnings;
        let mut body = output.content;

        if request.options.enhance {
            match (&self.enricher, request.options.api_key()) {
                (Some(enricher), Some(api_key)) => {
                    let (enriched, warning) =
                        enrich_or_fallback(enricher.as_ref(), body, &request.name, api_key).await;
                    body = enriched;
                    warnings.extend(warning);
                }
                (None, _) => warnings.push("enrichment requested but not configured".to_string()),
                (_, None) => warnings.push("enrichment requested without an API key".to_string()),
            }
        }

        if request.options.include_meta && !body.starts_with("---\n") {
            body = with_front_matter(&body, request, category, output.source_url.as_deref());
        }

        debug!(kind = %kind, images = output.images.len(), pages = output.pages.len(), "item converted");
        ConversionResult {
            success: true,
            content: body,
            images: if request.options.include_images {
                output.images
            } else {
                Vec::new()
            },
            name: request.name.clone(),
            category,
            request_type: request.request_type,
            error: None,
            error_kind: None,
            source_url: output.source_url,
            pages: output.pages,
            warnings,
        }
    }
}

fn configuration_failure(
    request: &ConversionRequest,
    category: Category,
    error: &ConfigurationError,
) -> ConversionResult {
    warn!(error = %error, "no converter for item");
    ConversionResult::failure(
        &request.name,
        request.request_type,
        category,
        error.kind(),
        error.to_string(),
    )
}

// Uploads of text formats arrive as bytes; textual converters want a string.
fn textual_content(kind: ConverterKind, content: &RequestContent) -> Cow<'_, RequestContent> {
    match (kind.input_shape(), content) {
        (InputShape::Textual | InputShape::Url, RequestContent::Binary(bytes)) => Cow::Owned(
            RequestContent::Text(String::from_utf8_lossy(bytes).into_owned()),
        ),
        _ => Cow::Borrowed(content),
    }
}

fn with_front_matter(
    body: &str,
    request: &ConversionRequest,
    category: Category,
    source_url: Option<&str>,
) -> String {
    let title = body
        .lines()
        .find_map(|line| line.strip_prefix("# "))
        .map_or_else(|| title_from_name(&request.name), |t| t.trim().to_string());
    let source = source_url.unwrap_or(&request.name);

    // JSON strings are valid YAML scalars.
    let quote = |value: &str| serde_json::to_string(value).unwrap_or_default();
    format!(
        "---\ntitle: {}\nsource: {}\ntype: {}\ncategory: {}\n---\n\n{body}",
        quote(&title),
        quote(source),
        request.request_type,
        category,
    )
}
