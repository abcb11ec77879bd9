//! `summary.md` and error note rendering.

use chrono::{DateTime, Utc};

use crate::model::ConversionResult;

/// One result as it was placed in the archive.
#[derive(Debug, Clone)]
pub(crate) struct SummaryRow<'a> {
    pub result: &'a ConversionResult,
    /// Archive path of the item's main note.
    pub path: String,
}

/// Human-readable timestamp used in every generated note.
pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Renders the root manifest.
pub(crate) fn render_summary(
    rows: &[SummaryRow<'_>],
    warnings: &[String],
    generated_at: DateTime<Utc>,
) -> String {
    let (succeeded, failed): (Vec<_>, Vec<_>) = rows.iter().partition(|row| row.result.success);

    let mut out = String::from("# Conversion Summary\n\n");
    out.push_str(&format!("- **Generated:** {}\n", format_timestamp(generated_at)));
    out.push_str(&format!("- **Total items:** {}\n", rows.len()));
    out.push_str(&format!(
        "- **Outcome:** {} successful, {} failed\n",
        succeeded.len(),
        failed.len()
    ));

    out.push_str("\n## Successful Items\n\n");
    if succeeded.is_empty() {
        out.push_str("_None._\n");
    }
    for row in &succeeded {
        let result = row.result;
        let mut detail = plural(result.image_count(), "image");
        if !result.pages.is_empty() {
            let converted = result.pages.iter().filter(|p| p.success).count();
            detail = format!(
                "{}, {} failed, {detail}",
                plural(converted, "page"),
                result.pages.len() - converted
            );
        }
        out.push_str(&format!(
            "- `{}` ({}): {detail} -> `{}`\n",
            inline(&result.name),
            result.request_type,
            row.path
        ));
    }

    out.push_str("\n## Failed Items\n\n");
    if failed.is_empty() {
        out.push_str("_None._\n");
    }
    for row in &failed {
        out.push_str(&format!(
            "- `{}` ({}): {} -> `{}`\n",
            inline(&row.result.name),
            row.result.request_type,
            inline(row.result.error.as_deref().unwrap_or("unknown error")),
            row.path
        ));
    }

    let item_warnings: Vec<String> = rows
        .iter()
        .flat_map(|row| {
            row.result
                .warnings
                .iter()
                .map(move |w| format!("`{}`: {}", inline(&row.result.name), inline(w)))
        })
        .chain(warnings.iter().map(|w| inline(w)))
        .collect();
    if !item_warnings.is_empty() {
        out.push_str("\n## Warnings\n\n");
        for warning in item_warnings {
            out.push_str(&format!("- {warning}\n"));
        }
    }
    out
}

/// Error note written to `errors/<stem>_error.md`.
pub(crate) fn render_error_note(result: &ConversionResult, generated_at: DateTime<Utc>) -> String {
    let mut out = format!(
        "# Conversion Error\n\n- **Item:** `{}`\n- **Type:** {}\n- **Category:** {}\n",
        inline(&result.name),
        result.request_type,
        result.category
    );
    if let Some(kind) = result.error_kind {
        out.push_str(&format!("- **Error kind:** {kind}\n"));
    }
    out.push_str(&format!("- **Time:** {}\n\n", format_timestamp(generated_at)));
    out.push_str(result.error.as_deref().unwrap_or("unknown error").trim());
    out.push('\n');
    out
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("1 {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

// Keeps one list entry on one line.
fn inline(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ").replace('`', "'")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::classify::Category;
    use crate::error::ErrorKind;
    use crate::model::{PageResult, RequestType};

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 8, 30, 0).unwrap()
    }

    fn ok(name: &str) -> ConversionResult {
        ConversionResult {
            success: true,
            content: "# x\n".to_string(),
            images: Vec::new(),
            name: name.to_string(),
            category: Category::Documents,
            request_type: RequestType::File,
            error: None,
            error_kind: None,
            source_url: None,
            pages: Vec::new(),
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_summary_counts_and_lines() {
        let good = ok("notes.txt");
        let bad = ConversionResult::failure(
            "item2.docx",
            RequestType::File,
            Category::Documents,
            ErrorKind::Conversion,
            "malformed docx\ndocument",
        );
        let rows = vec![
            SummaryRow { result: &good, path: "documents/notes.md".to_string() },
            SummaryRow { result: &bad, path: "errors/item2_error.md".to_string() },
        ];
        let summary = render_summary(&rows, &[], at());
        assert!(summary.starts_with("# Conversion Summary\n"));
        assert!(summary.contains("- **Generated:** 2026-10-19 08:30:00 UTC\n"));
        assert!(summary.contains("- **Total items:** 2\n"));
        assert!(summary.contains("1 successful, 1 failed"));
        assert!(summary.contains("- `notes.txt` (file): 0 images -> `documents/notes.md`\n"));
        assert!(summary.contains("- `item2.docx` (file): malformed docx document -> `errors/item2_error.md`\n"));
        assert!(!summary.contains("## Warnings"));
    }

    #[test]
    fn test_summary_reports_pages_and_warnings() {
        let mut crawl = ok("https://site.test/");
        crawl.request_type = RequestType::ParentUrl;
        crawl.pages = vec![
            PageResult::converted("home", "https://site.test/", "Home", "x"),
            PageResult::failed("gone", "https://site.test/gone", "HTTP 404"),
        ];
        crawl.warnings = vec!["image https://site.test/a.png: HTTP 500".to_string()];
        let rows = vec![SummaryRow { result: &crawl, path: "web/site.test/index.md".to_string() }];
        let summary = render_summary(&rows, &["asset skipped".to_string()], at());
        assert!(summary.contains("1 page, 1 failed, 0 images"));
        assert!(summary.contains("## Failed Items\n\n_None._\n"));
        assert!(summary.contains("- `https://site.test/`: image https://site.test/a.png: HTTP 500\n"));
        assert!(summary.contains("- asset skipped\n"));
    }

    #[test]
    fn test_error_note_has_message_and_time() {
        let bad = ConversionResult::failure(
            "clip.mp4",
            RequestType::Video,
            Category::Multimedia,
            ErrorKind::Authentication,
            "video conversion requires an API key",
        );
        let note = render_error_note(&bad, at());
        assert!(note.starts_with("# Conversion Error\n"));
        assert!(note.contains("- **Error kind:** authentication\n"));
        assert!(note.contains("- **Time:** 2026-10-19 08:30:00 UTC\n"));
        assert!(note.ends_with("video conversion requires an API key\n"));
    }
}
