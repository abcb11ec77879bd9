//! Audio and video converters: upload to the transcriber, wrap the transcript.

use std::sync::Arc;

use async_trait::async_trait;

use super::{
    ConvertError, Converted, Converter, ConverterInput, ConverterKind, Transcriber,
    title_from_name,
};

/// Transcribes audio and video uploads.
#[derive(Clone)]
pub struct MediaConverter {
    transcriber: Arc<dyn Transcriber>,
}

impl std::fmt::Debug for MediaConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaConverter").finish_non_exhaustive()
    }
}

impl MediaConverter {
    /// Creates a converter backed by `transcriber`.
    #[must_use]
    pub fn new(transcriber: Arc<dyn Transcriber>) -> Self {
        Self { transcriber }
    }
}

#[async_trait]
impl Converter for MediaConverter {
    async fn convert(
        &self,
        kind: ConverterKind,
        input: ConverterInput<'_>,
    ) -> Result<Converted, ConvertError> {
        let bytes = input.bytes(kind)?;
        let api_key = input.api_key.ok_or(ConvertError::MissingApiKey { kind })?;
        if bytes.is_empty() {
            return Err(ConvertError::malformed(input.name, "media", "empty upload"));
        }

        let mime = mime_guess::from_path(input.name)
            .first()
            .map_or_else(|| default_mime(kind).to_string(), |m| m.essence_str().to_string());

        let transcript = self
            .transcriber
            .transcribe(bytes.clone(), input.name, &mime, api_key)
            .await?;

        let title = title_from_name(input.name);
        let label = if kind == ConverterKind::Video { "Video" } else { "Audio" };
        let body = transcript.trim();
        let body = if body.is_empty() { "_No speech detected._" } else { body };

        Ok(Converted::markdown(format!(
            "# {title}\n\n- **Source:** {label} file `{}`\n\n## Transcript\n\n{body}\n",
            input.name
        )))
    }
}

fn default_mime(kind: ConverterKind) -> &'static str {
    if kind == ConverterKind::Video {
        "video/mp4"
    } else {
        "audio/mpeg"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use bytes::Bytes;

    use super::*;
    use crate::convert::TranscriptionError;
    use crate::error::ErrorKind;
    use crate::model::{ConversionOptions, RequestContent};

    #[derive(Default)]
    struct RecordingTranscriber {
        calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Transcriber for RecordingTranscriber {
        async fn transcribe(
            &self,
            _audio: Bytes,
            file_name: &str,
            mime_type: &str,
            _api_key: &str,
        ) -> Result<String, TranscriptionError> {
            self.calls
                .lock()
                .unwrap()
                .push((file_name.to_string(), mime_type.to_string()));
            Ok("hello there".to_string())
        }
    }

    #[tokio::test]
    async fn test_transcript_note() {
        let transcriber = Arc::new(RecordingTranscriber::default());
        let converter = MediaConverter::new(transcriber.clone());
        let content = RequestContent::Binary(Bytes::from_static(b"ID3"));
        let options = ConversionOptions::default();
        let out = converter
            .convert(
                ConverterKind::Audio,
                ConverterInput {
                    content: &content,
                    name: "talk.mp3",
                    api_key: Some("sk-test"),
                    options: &options,
                },
            )
            .await
            .unwrap();
        assert!(out.content.starts_with("# talk\n"));
        assert!(out.content.contains("## Transcript\n\nhello there"));
        assert_eq!(
            transcriber.calls.lock().unwrap()[0],
            ("talk.mp3".to_string(), "audio/mpeg".to_string())
        );
    }

    #[tokio::test]
    async fn test_missing_api_key_is_authentication_error() {
        let converter = MediaConverter::new(Arc::new(RecordingTranscriber::default()));
        let content = RequestContent::Binary(Bytes::from_static(b"data"));
        let options = ConversionOptions::default();
        let err = converter
            .convert(
                ConverterKind::Video,
                ConverterInput {
                    content: &content,
                    name: "clip.mp4",
                    api_key: None,
                    options: &options,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
    }
}
