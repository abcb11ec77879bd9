//! PDF text extraction.

use async_trait::async_trait;
use tracing::debug;

use super::{ConvertError, Converted, Converter, ConverterInput, ConverterKind, title_from_name};

/// Extracts the text layer of a PDF on the blocking pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfConverter;

#[async_trait]
impl Converter for PdfConverter {
    async fn convert(
        &self,
        kind: ConverterKind,
        input: ConverterInput<'_>,
    ) -> Result<Converted, ConvertError> {
        let bytes = input.bytes(kind)?.clone();
        if !bytes.starts_with(b"%PDF-") {
            return Err(ConvertError::malformed(input.name, "pdf", "missing %PDF header"));
        }

        let extracted = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await
            .map_err(|e| {
                if e.is_panic() {
                    ConvertError::malformed(input.name, "pdf", "parser rejected the document")
                } else {
                    ConvertError::internal(format!("pdf extraction task failed: {e}"))
                }
            })?
            .map_err(|e| ConvertError::malformed(input.name, "pdf", e))?;

        debug!(chars = extracted.len(), "extracted pdf text");
        let title = title_from_name(input.name);
        Ok(Converted::markdown(format!(
            "# {title}\n\n{}\n",
            tidy_pdf_text(&extracted)
        )))
    }
}

/// Normalizes extracted text: trims lines, collapses blank runs, turns form feeds into rules.
fn tidy_pdf_text(text: &str) -> String {
    let mut out = Vec::new();
    let mut blank = false;
    for raw in text.replace('\u{c}', "\n---\n").lines() {
        let line = raw.trim();
        if line.is_empty() {
            if !blank && !out.is_empty() {
                out.push(String::new());
            }
            blank = true;
            continue;
        }
        blank = false;
        out.push(line.to_string());
    }
    while out.last().is_some_and(|line| line.is_empty() || line == "---") {
        out.pop();
    }
    out.join("\n")
}
