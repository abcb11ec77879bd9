//! Conversion result types.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::classify::Category;
use crate::error::ErrorKind;
use crate::model::RequestType;

/// An image carried by a conversion result.
///
/// `path` is relative to the folder the owning result is written to, e.g.
/// `assets/img-1a2b3c4d.png`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAsset {
    /// File name inside the assets folder.
    pub name: String,
    /// Base64-encoded image bytes.
    pub data: String,
    /// MIME type.
    #[serde(rename = "type")]
    pub mime_type: String,
    /// Archive path relative to the owning item's folder.
    pub path: String,
    /// Original URL, when the image was fetched from the web.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

impl ImageAsset {
    /// Builds an asset stored under `assets/<name>`.
    pub fn from_bytes(name: impl Into<String>, bytes: &[u8], mime_type: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            path: format!("assets/{name}"),
            name,
            data: STANDARD.encode(bytes),
            mime_type: mime_type.into(),
            source_url: None,
        }
    }

    /// Records the URL the image was fetched from.
    #[must_use]
    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    /// Decodes the base64 payload.
    ///
    /// # Errors
    ///
    /// Returns the decode error when `data` is not valid base64.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(self.data.as_bytes())
    }
}

/// One page produced by a crawl.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult {
    /// File stem used for `pages/<name>.md`.
    pub name: String,
    /// Page URL.
    pub url: String,
    /// Page title (falls back to the URL).
    pub title: String,
    /// Markdown body; empty for failed pages.
    pub content: String,
    /// Images owned by this page (usually empty; crawls share `discovered_images`).
    pub images: Vec<ImageAsset>,
    /// Whether the page converted.
    pub success: bool,
    /// Failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PageResult {
    /// A converted page.
    pub fn converted(
        name: impl Into<String>,
        url: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            title: title.into(),
            content: content.into(),
            images: Vec::new(),
            success: true,
            error: None,
        }
    }

    /// A page that could not be fetched or converted.
    pub fn failed(name: impl Into<String>, url: impl Into<String>, error: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            name: name.into(),
            title: url.clone(),
            url,
            content: String::new(),
            images: Vec::new(),
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Terminal outcome for one conversion request. Failures are values, not errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResult {
    /// Whether the conversion succeeded.
    pub success: bool,
    /// Markdown body (or an error note for failures).
    pub content: String,
    /// Images owned by this result.
    pub images: Vec<ImageAsset>,
    /// Request name.
    pub name: String,
    /// Archive category.
    pub category: Category,
    /// Declared request type.
    #[serde(rename = "type")]
    pub request_type: RequestType,
    /// Failure message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Failure classification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Source URL for web results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Crawl pages (parent URL results only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pages: Vec<PageResult>,
    /// Non-fatal problems that were contained (e.g. enrichment fallback).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ConversionResult {
    /// Builds a failure result with an error note as its body.
    pub fn failure(
        name: impl Into<String>,
        request_type: RequestType,
        category: Category,
        kind: ErrorKind,
        error: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let error = error.into();
        Self {
            success: false,
            content: error_note_body(&name, &error),
            images: Vec::new(),
            name,
            category,
            request_type,
            error: Some(error),
            error_kind: Some(kind),
            source_url: None,
            pages: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Number of images across the result and its pages.
    #[must_use]
    pub fn image_count(&self) -> usize {
        self.images.len() + self.pages.iter().map(|p| p.images.len()).sum::<usize>()
    }
}

/// Markdown body used for failed conversions.
#[must_use]
pub fn error_note_body(name: &str, error: &str) -> String {
    format!("# Conversion Error\n\nFailed to convert `{name}`.\n\n{error}\n")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_image_asset_from_bytes_sets_assets_path() {
        let asset = ImageAsset::from_bytes("logo.png", b"\x89PNG", "image/png");
        assert_eq!(asset.path, "assets/logo.png");
        assert_eq!(asset.decode().unwrap(), b"\x89PNG");
    }

    #[test]
    fn test_failure_result_carries_error_note() {
        let result = ConversionResult::failure(
            "broken.docx",
            RequestType::File,
            Category::Documents,
            ErrorKind::Conversion,
            "not a zip archive",
        );
        assert!(!result.success);
        assert!(result.content.starts_with("# Conversion Error"));
        assert!(result.content.contains("not a zip archive"));
        assert_eq!(result.error_kind, Some(ErrorKind::Conversion));
    }

    #[test]
    fn test_result_serializes_type_field() {
        let result = ConversionResult::failure(
            "x",
            RequestType::ParentUrl,
            Category::Web,
            ErrorKind::Validation,
            "bad",
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["type"], "parenturl");
        assert_eq!(json["category"], "web");
    }
}
