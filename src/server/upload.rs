//! Multipart and JSON request bodies.

use axum::extract::Multipart;
use bytes::Bytes;
use serde::Deserialize;
use tracing::debug;

use super::response::ApiError;
use crate::error::ServiceError;
use crate::model::{ConversionOptions, ConversionRequest, RequestContent, RequestType};

/// One uploaded file part.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Client file name.
    pub name: String,
    /// Declared content type, when not the generic octet stream.
    pub content_type: Option<String>,
    /// Payload.
    pub data: Bytes,
}

impl UploadedFile {
    /// Request of `request_type` for this file.
    #[must_use]
    pub fn into_request(self, request_type: RequestType, options: ConversionOptions) -> ConversionRequest {
        let request = ConversionRequest::new(
            request_type,
            self.name,
            RequestContent::Binary(self.data),
        )
        .with_options(options);
        match self.content_type {
            Some(mime) => request.with_mime_type(mime),
            None => request,
        }
    }
}

/// A web entry in a batch `items` field.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchItem {
    /// `url`, `parenturl` or `youtube`.
    #[serde(rename = "type")]
    pub item_type: RequestType,
    /// Target address.
    pub url: String,
    /// Display name; defaults to the URL.
    #[serde(default)]
    pub name: Option<String>,
    /// Per-item options; default to the upload's options.
    #[serde(default)]
    pub options: Option<ConversionOptions>,
}

impl BatchItem {
    /// Request for this entry.
    ///
    /// # Errors
    ///
    /// A validation error when the entry is not a web type.
    pub fn into_request(self, defaults: &ConversionOptions) -> Result<ConversionRequest, ServiceError> {
        if !self.item_type.is_web() {
            return Err(ServiceError::validation(format!(
                "batch item type '{}' must be uploaded as a file",
                self.item_type
            )));
        }
        let name = self.name.unwrap_or_else(|| self.url.clone());
        Ok(
            ConversionRequest::new(self.item_type, name, RequestContent::Text(self.url))
                .with_options(self.options.unwrap_or_else(|| defaults.clone())),
        )
    }
}

/// JSON body of the `/web/*` endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct WebRequest {
    /// Target address.
    pub url: String,
    /// Display name; defaults to the URL.
    #[serde(default)]
    pub name: Option<String>,
    /// Conversion options.
    #[serde(default)]
    pub options: ConversionOptions,
}

impl WebRequest {
    /// Request of `request_type` for this body.
    #[must_use]
    pub fn into_request(self, request_type: RequestType) -> ConversionRequest {
        let name = self.name.unwrap_or_else(|| self.url.clone());
        ConversionRequest::new(request_type, name, RequestContent::Text(self.url))
            .with_options(self.options)
    }
}

/// Everything a multipart submission carried.
#[derive(Debug, Default)]
pub struct Upload {
    /// File parts, in body order.
    pub files: Vec<UploadedFile>,
    /// Web entries from the `items` field.
    pub items: Vec<BatchItem>,
    /// Options from the `options` field.
    pub options: ConversionOptions,
}

impl Upload {
    /// Drains a multipart body.
    ///
    /// Any part with a file name is a file. Text parts named `options` and
    /// `items` hold JSON; other text parts are ignored.
    ///
    /// # Errors
    ///
    /// [`ApiError::Multipart`] for a malformed body, a validation error for
    /// unparsable JSON fields.
    pub async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut upload = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let field_name = field.name().unwrap_or_default().to_string();
            if let Some(file_name) = field.file_name().map(str::to_string) {
                let content_type = field
                    .content_type()
                    .filter(|mime| *mime != "application/octet-stream")
                    .map(str::to_string);
                let data = field.bytes().await?;
                debug!(field = %field_name, file = %file_name, bytes = data.len(), "received file part");
                upload.files.push(UploadedFile {
                    name: file_name,
                    content_type,
                    data,
                });
                continue;
            }

            match field_name.as_str() {
                "options" => {
                    let text = field.text().await?;
                    upload.options = parse_json_field("options", &text)?;
                }
                "items" => {
                    let text = field.text().await?;
                    upload.items = parse_json_field("items", &text)?;
                }
                other => debug!(field = %other, "ignoring multipart field"),
            }
        }
        Ok(upload)
    }

    /// The single file of a one-file endpoint.
    ///
    /// # Errors
    ///
    /// A validation error when no file part was sent.
    pub fn single_file(&mut self) -> Result<UploadedFile, ServiceError> {
        if self.files.is_empty() {
            return Err(ServiceError::validation("request has no file part"));
        }
        Ok(self.files.remove(0))
    }
}

fn parse_json_field<T: serde::de::DeserializeOwned>(field: &str, text: &str) -> Result<T, ServiceError> {
    serde_json::from_str(text)
        .map_err(|e| ServiceError::validation(format!("field '{field}' is not valid JSON: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_item_defaults_name_to_url() {
        let item: BatchItem =
            serde_json::from_str(r#"{"type":"youtube","url":"https://youtu.be/dQw4w9WgXcQ"}"#).unwrap();
        let request = item.into_request(&ConversionOptions::default()).unwrap();
        assert_eq!(request.request_type, RequestType::Youtube);
        assert_eq!(request.name, "https://youtu.be/dQw4w9WgXcQ");
    }

    #[test]
    fn test_batch_item_rejects_binary_types() {
        let item: BatchItem = serde_json::from_str(r#"{"type":"audio","url":"x"}"#).unwrap();
        assert!(item.into_request(&ConversionOptions::default()).is_err());
    }

    #[test]
    fn test_web_request_parses_options() {
        let body: WebRequest = serde_json::from_str(
            r#"{"url":"https://example.com","options":{"depth":2,"maxPages":5}}"#,
        )
        .unwrap();
        let request = body.into_request(RequestType::ParentUrl);
        assert_eq!(request.options.depth, 2);
        assert_eq!(request.options.max_pages, 5);
        assert_eq!(request.content.url(), Some("https://example.com"));
    }

    #[test]
    fn test_uploaded_file_keeps_mime() {
        let file = UploadedFile {
            name: "notes.txt".into(),
            content_type: Some("text/plain".into()),
            data: Bytes::from_static(b"hi"),
        };
        let request = file.into_request(RequestType::File, ConversionOptions::default());
        assert_eq!(request.mime_type.as_deref(), Some("text/plain"));
    }
}
