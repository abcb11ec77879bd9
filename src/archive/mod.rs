//! Archive layout and ZIP packaging.
//!
//! [`ArchiveBuilder::plan`] lays results out as a logical file tree:
//!
//! - `<category>/<stem>.md` plus `<category>/assets/<image>` for files
//! - `web/<host>/index.md` plus `web/<host>/assets/` for single pages
//! - `web/<host>/pages/<page>.md` for every converted crawl page
//! - `errors/<stem>_error.md` for failed items
//! - `summary.md` at the root
//!
//! The plan only depends on the results and the builder's `generated_at`,
//! so the same input always yields the same tree and text.
//! [`ArchiveBuilder::build`] serializes the plan into a ZIP buffer.

mod sanitize;
mod summary;

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Timelike, Utc};
use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

use crate::error::ErrorKind;
use crate::model::{ConversionResult, ImageAsset, RequestType};

pub use sanitize::{NameAllocator, sanitize_segment, sanitize_stem};
use summary::{SummaryRow, render_error_note, render_summary};

#[allow(clippy::expect_used)]
static PAGE_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[pages/([^|\]]+)([|\]])").expect("page link regex is valid")
});

/// Name of the root manifest.
pub const SUMMARY_FILE: &str = "summary.md";

/// Folder holding failed-item notes.
pub const ERRORS_FOLDER: &str = "errors";

/// Archive serialization failures.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The ZIP writer failed.
    #[error("failed to write archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Writing an entry body failed.
    #[error("failed to write archive entry '{path}': {source}")]
    Io {
        /// Entry path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl ArchiveError {
    /// Always internal.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Internal
    }
}

/// One file in the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Path inside the archive, `/`-separated.
    pub path: String,
    /// File body.
    pub data: Vec<u8>,
}

/// Logical archive tree, in write order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchivePlan {
    /// Entries, `summary.md` last.
    pub entries: Vec<ArchiveEntry>,
}

impl ArchivePlan {
    /// Entry paths in write order.
    #[must_use]
    pub fn paths(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.path.as_str()).collect()
    }

    /// Body of the entry at `path`.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|e| e.path == path)
            .map(|e| e.data.as_slice())
    }

    /// Body of the entry at `path` as text.
    #[must_use]
    pub fn text(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(|data| std::str::from_utf8(data).ok())
    }

    fn push(&mut self, path: String, data: impl Into<Vec<u8>>) {
        self.entries.push(ArchiveEntry {
            path,
            data: data.into(),
        });
    }
}

/// A finished archive ready for storage.
#[derive(Debug, Clone)]
pub struct PackagedArchive {
    /// ZIP bytes.
    pub buffer: Vec<u8>,
    /// Download file name.
    pub filename: String,
}

/// Archive name for a single item: `<sanitized-stem>.zip`.
#[must_use]
pub fn single_archive_filename(name: &str) -> String {
    format!("{}.zip", sanitize_stem(name))
}

/// Archive name for a batch: `batch_<YYYYMMDD_HHMMSS>.zip`.
#[must_use]
pub fn batch_archive_filename(generated_at: DateTime<Utc>) -> String {
    format!("batch_{}.zip", generated_at.format("%Y%m%d_%H%M%S"))
}

/// Lays out and serializes conversion results.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveBuilder {
    generated_at: DateTime<Utc>,
}

impl ArchiveBuilder {
    /// Creates a builder stamping notes with `generated_at`.
    #[must_use]
    pub fn new(generated_at: DateTime<Utc>) -> Self {
        Self { generated_at }
    }

    /// Timestamp written into generated notes.
    #[must_use]
    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    /// Builds the logical tree for `results`, in input order.
    #[must_use]
    pub fn plan(&self, results: &[ConversionResult]) -> ArchivePlan {
        let mut plan = ArchivePlan::default();
        let mut names = NameAllocator::new();
        let mut rows = Vec::with_capacity(results.len());
        let mut warnings = Vec::new();

        for result in results {
            let path = if !result.success {
                self.place_failure(&mut plan, &mut names, result)
            } else if result.request_type.is_web() {
                place_web(&mut plan, &mut names, &mut warnings, result)
            } else {
                place_file(&mut plan, &mut names, &mut warnings, result)
            };
            rows.push(SummaryRow { result, path });
        }

        plan.push(
            SUMMARY_FILE.to_string(),
            render_summary(&rows, &warnings, self.generated_at),
        );
        plan
    }

    /// Plans and serializes `results` into a ZIP buffer.
    ///
    /// # Errors
    ///
    /// [`ArchiveError`] when the ZIP writer fails.
    pub fn build(&self, results: &[ConversionResult]) -> Result<Vec<u8>, ArchiveError> {
        let plan = self.plan(results);
        self.write_zip(&plan)
    }

    /// Serializes a plan. Entries are deflated and stamped with `generated_at`.
    ///
    /// # Errors
    ///
    /// [`ArchiveError`] when the ZIP writer fails.
    pub fn write_zip(&self, plan: &ArchivePlan) -> Result<Vec<u8>, ArchiveError> {
        let mut options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        if let Some(stamp) = zip_timestamp(self.generated_at) {
            options = options.last_modified_time(stamp);
        }

        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for entry in &plan.entries {
            writer.start_file(entry.path.as_str(), options)?;
            writer.write_all(&entry.data).map_err(|source| ArchiveError::Io {
                path: entry.path.clone(),
                source,
            })?;
        }
        let buffer = writer.finish()?.into_inner();
        debug!(entries = plan.entries.len(), bytes = buffer.len(), "archive written");
        Ok(buffer)
    }

    fn place_failure(
        &self,
        plan: &mut ArchivePlan,
        names: &mut NameAllocator,
        result: &ConversionResult,
    ) -> String {
        let stem = format!("{}_error", sanitize_stem(&result.name));
        let file = names.claim(ERRORS_FOLDER, &stem, ".md");
        let path = format!("{ERRORS_FOLDER}/{file}");
        plan.push(path.clone(), render_error_note(result, self.generated_at));
        path
    }
}

fn place_file(
    plan: &mut ArchivePlan,
    names: &mut NameAllocator,
    warnings: &mut Vec<String>,
    result: &ConversionResult,
) -> String {
    let folder = result.category.as_str();
    let file = names.claim(folder, &sanitize_stem(&result.name), ".md");
    let path = format!("{folder}/{file}");

    let rewrites = place_assets(plan, names, warnings, folder, result, &result.images);
    let body = rewrite_references(&result.content, &rewrites, "");
    plan.push(path.clone(), body);
    path
}

fn place_web(
    plan: &mut ArchivePlan,
    names: &mut NameAllocator,
    warnings: &mut Vec<String>,
    result: &ConversionResult,
) -> String {
    let category = result.category.as_str();
    let site = names.claim(category, &site_folder_name(result), "");
    let folder = format!("{category}/{site}");

    let mut images: Vec<ImageAsset> = result.images.clone();
    for page in &result.pages {
        images.extend(page.images.iter().cloned());
    }
    let rewrites = place_assets(plan, names, warnings, &folder, result, &images);

    let mut index = rewrite_references(&result.content, &rewrites, "");
    let mut page_entries = Vec::new();
    if result.request_type == RequestType::ParentUrl {
        let pages_folder = format!("{folder}/pages");
        let mut renamed = HashMap::new();
        for page in result.pages.iter().filter(|p| p.success) {
            let file = names.claim(&pages_folder, &sanitize_segment(&page.name), ".md");
            let stem = file.trim_end_matches(".md");
            if stem != page.name {
                renamed.insert(page.name.clone(), stem.to_string());
            }
            page_entries.push((
                format!("{pages_folder}/{file}"),
                rewrite_references(&page.content, &rewrites, "../"),
            ));
        }
        index = rewrite_page_links(&index, &renamed);
    }

    let index_path = format!("{folder}/index.md");
    plan.push(index_path.clone(), index);
    for (path, body) in page_entries {
        plan.push(path, body);
    }
    index_path
}

/// Points `[[pages/<name>...]]` links at the file names the archive assigned.
fn rewrite_page_links(index: &str, renamed: &HashMap<String, String>) -> String {
    if renamed.is_empty() {
        return index.to_string();
    }
    PAGE_LINK
        .replace_all(index, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            let target = renamed.get(name).map_or(name, String::as_str);
            format!("[[pages/{target}{}", &caps[2])
        })
        .into_owned()
}

/// Writes images under `<folder>/assets/` and returns the reference rewrites
/// (original reference, local path relative to `folder`).
fn place_assets(
    plan: &mut ArchivePlan,
    names: &mut NameAllocator,
    warnings: &mut Vec<String>,
    folder: &str,
    result: &ConversionResult,
    images: &[ImageAsset],
) -> Vec<(String, String)> {
    let assets_folder = format!("{folder}/assets");
    let mut rewrites = Vec::new();

    for image in images {
        let data = match image.decode() {
            Ok(data) => data,
            Err(error) => {
                warn!(item = %result.name, image = %image.name, error = %error, "skipping undecodable image");
                warnings.push(format!(
                    "image '{}' of '{}' skipped: {error}",
                    image.name, result.name
                ));
                continue;
            }
        };

        let file = names.claim_file(&assets_folder, &sanitize_segment(&image.name));
        let local = format!("assets/{file}");
        if image.path != local {
            rewrites.push((image.path.clone(), local.clone()));
        }
        if let Some(source) = &image.source_url {
            rewrites.push((source.clone(), local.clone()));
        }
        plan.push(format!("{assets_folder}/{file}"), data);
    }
    rewrites
}

/// Replaces image references in link targets and `src` attributes.
fn rewrite_references(markdown: &str, rewrites: &[(String, String)], prefix: &str) -> String {
    let mut out = markdown.to_string();
    for (from, to) in rewrites {
        for (open, close) in [("(", ")"), ("(", " "), ("\"", "\""), ("<", ">")] {
            out = out.replace(
                &format!("{open}{from}{close}"),
                &format!("{open}{prefix}{to}{close}"),
            );
        }
    }
    out
}

fn site_folder_name(result: &ConversionResult) -> String {
    let host = result
        .source_url
        .as_deref()
        .or(Some(result.name.as_str()))
        .and_then(|raw| Url::parse(raw.trim()).ok())
        .and_then(|url| url.host_str().map(str::to_ascii_lowercase));
    host.map_or_else(|| sanitize_stem(&result.name), |h| sanitize_segment(&h))
}

fn zip_timestamp(at: DateTime<Utc>) -> Option<zip::DateTime> {
    zip::DateTime::from_date_and_time(
        u16::try_from(at.year()).ok()?,
        u8::try_from(at.month()).ok()?,
        u8::try_from(at.day()).ok()?,
        u8::try_from(at.hour()).ok()?,
        u8::try_from(at.minute()).ok()?,
        u8::try_from(at.second()).ok()?,
    )
    .ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Read;

    use chrono::TimeZone;

    use super::*;
    use crate::classify::Category;
    use crate::model::PageResult;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 8, 30, 5).unwrap()
    }

    fn ok(name: &str, request_type: RequestType, category: Category, content: &str) -> ConversionResult {
        ConversionResult {
            success: true,
            content: content.to_string(),
            images: Vec::new(),
            name: name.to_string(),
            category,
            request_type,
            error: None,
            error_kind: None,
            source_url: None,
            pages: Vec::new(),
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_single_text_file_layout() {
        let results = vec![ok("notes.txt", RequestType::File, Category::Documents, "# notes\n")];
        let plan = ArchiveBuilder::new(at()).plan(&results);
        assert_eq!(plan.paths(), vec!["documents/notes.md", "summary.md"]);
        assert!(plan.text("summary.md").unwrap().contains("1 successful, 0 failed"));
    }

    #[test]
    fn test_failures_go_to_errors_folder() {
        let results = vec![
            ok("item1.docx", RequestType::File, Category::Documents, "a"),
            ConversionResult::failure(
                "item2.docx",
                RequestType::File,
                Category::Documents,
                ErrorKind::Conversion,
                "malformed docx document",
            ),
            ok("item3.docx", RequestType::File, Category::Documents, "c"),
        ];
        let plan = ArchiveBuilder::new(at()).plan(&results);
        assert_eq!(
            plan.paths(),
            vec![
                "documents/item1.md",
                "errors/item2_error.md",
                "documents/item3.md",
                "summary.md"
            ]
        );
        let note = plan.text("errors/item2_error.md").unwrap();
        assert!(note.contains("malformed docx document"));
        assert!(note.contains("2026-10-19 08:30:05 UTC"));
        assert!(plan.text("summary.md").unwrap().contains("2 successful, 1 failed"));
    }

    #[test]
    fn test_name_collisions_get_suffixes() {
        let results = vec![
            ok("notes.txt", RequestType::File, Category::Documents, "a"),
            ok("notes.md", RequestType::File, Category::Others, "b"),
            ok("notes.pdf", RequestType::File, Category::Documents, "c"),
        ];
        let plan = ArchiveBuilder::new(at()).plan(&results);
        assert_eq!(
            plan.paths(),
            vec!["documents/notes.md", "others/notes.md", "documents/notes_1.md", "summary.md"]
        );
    }

    #[test]
    fn test_traversal_names_stay_in_category() {
        let results = vec![ok("../../etc/passwd", RequestType::File, Category::Others, "x")];
        let plan = ArchiveBuilder::new(at()).plan(&results);
        assert_eq!(plan.paths()[0], "others/etc_passwd.md");
    }

    #[test]
    fn test_file_images_land_at_declared_path() {
        let mut result = ok("deck.pptx", RequestType::File, Category::Documents, "![a](assets/image1.png)");
        result.images = vec![ImageAsset::from_bytes("image1.png", b"\x89PNG", "image/png")];
        let mut second = ok("other.pptx", RequestType::File, Category::Documents, "![a](assets/image1.png)");
        second.images = vec![ImageAsset::from_bytes("image1.png", b"GIF8", "image/png")];

        let plan = ArchiveBuilder::new(at()).plan(&[result, second]);
        assert_eq!(plan.get("documents/assets/image1.png").unwrap(), b"\x89PNG");
        assert_eq!(plan.get("documents/assets/image1_1.png").unwrap(), b"GIF8");
        assert_eq!(plan.text("documents/other.md").unwrap(), "![a](assets/image1_1.png)");
    }

    #[test]
    fn test_url_result_rewrites_image_urls() {
        let mut result = ok(
            "https://Example.com/post",
            RequestType::Url,
            Category::Web,
            "# Post\n\n![logo](https://example.com/logo.png)\n",
        );
        result.source_url = Some("https://example.com/post".to_string());
        result.images = vec![
            ImageAsset::from_bytes("img-1a2b3c4d.png", b"png", "image/png")
                .with_source_url("https://example.com/logo.png"),
        ];
        let plan = ArchiveBuilder::new(at()).plan(&[result]);
        assert_eq!(
            plan.paths(),
            vec!["web/example.com/assets/img-1a2b3c4d.png", "web/example.com/index.md", "summary.md"]
        );
        assert_eq!(
            plan.text("web/example.com/index.md").unwrap(),
            "# Post\n\n![logo](assets/img-1a2b3c4d.png)\n"
        );
    }

    #[test]
    fn test_crawl_layout() {
        let mut result = ok(
            "https://site.test/",
            RequestType::ParentUrl,
            Category::Web,
            "# Site\n\n- [[pages/home|Home]]\n- [[pages/docs|Docs]]\n",
        );
        result.source_url = Some("https://site.test/".to_string());
        result.pages = vec![
            PageResult::converted("home", "https://site.test/", "Home", "![x](https://site.test/x.png)"),
            PageResult::converted("docs", "https://site.test/docs", "Docs", "docs"),
            PageResult::failed("gone", "https://site.test/gone", "HTTP 404"),
        ];
        result.images = vec![
            ImageAsset::from_bytes("img-00000000.png", b"png", "image/png")
                .with_source_url("https://site.test/x.png"),
        ];

        let plan = ArchiveBuilder::new(at()).plan(&[result]);
        assert_eq!(
            plan.paths(),
            vec![
                "web/site.test/assets/img-00000000.png",
                "web/site.test/index.md",
                "web/site.test/pages/home.md",
                "web/site.test/pages/docs.md",
                "summary.md"
            ]
        );
        assert_eq!(
            plan.text("web/site.test/pages/home.md").unwrap(),
            "![x](../assets/img-00000000.png)"
        );
    }

    #[test]
    fn test_crawl_index_links_follow_assigned_page_names() {
        let long = "a".repeat(150);
        let mut result = ok(
            "https://site.test/",
            RequestType::ParentUrl,
            Category::Web,
            &format!("# Site\n\n- [[pages/Docs|Upper]]\n- [[pages/docs|Lower]]\n- [[pages/{long}|Long]]\n"),
        );
        result.source_url = Some("https://site.test/".to_string());
        result.pages = vec![
            PageResult::converted("Docs", "https://site.test/Docs", "Upper", "upper"),
            PageResult::converted("docs", "https://site.test/docs", "Lower", "lower"),
            PageResult::converted(long.clone(), format!("https://site.test/{long}"), "Long", "long"),
        ];

        let plan = ArchiveBuilder::new(at()).plan(&[result]);
        let index = plan.text("web/site.test/index.md").unwrap();
        let short = "a".repeat(120);
        assert!(index.contains("[[pages/Docs|Upper]]"), "{index}");
        assert!(index.contains("[[pages/docs_1|Lower]]"), "{index}");
        assert!(index.contains(&format!("[[pages/{short}|Long]]")), "{index}");
        assert_eq!(plan.text("web/site.test/pages/docs_1.md").unwrap(), "lower");
        assert_eq!(plan.text(&format!("web/site.test/pages/{short}.md")).unwrap(), "long");
    }

    #[test]
    fn test_undecodable_image_is_reported() {
        let mut result = ok("a.docx", RequestType::File, Category::Documents, "x");
        result.images = vec![ImageAsset {
            name: "bad.png".to_string(),
            data: "***".to_string(),
            mime_type: "image/png".to_string(),
            path: "assets/bad.png".to_string(),
            source_url: None,
        }];
        let plan = ArchiveBuilder::new(at()).plan(&[result]);
        assert_eq!(plan.paths(), vec!["documents/a.md", "summary.md"]);
        assert!(plan.text("summary.md").unwrap().contains("image 'bad.png' of 'a.docx' skipped"));
    }

    #[test]
    fn test_plan_is_deterministic() {
        let results = vec![
            ok("a.txt", RequestType::File, Category::Documents, "a"),
            ok("b.csv", RequestType::File, Category::Data, "b"),
        ];
        let builder = ArchiveBuilder::new(at());
        assert_eq!(builder.plan(&results), builder.plan(&results));
    }

    #[test]
    fn test_build_writes_readable_zip() {
        let results = vec![ok("notes.txt", RequestType::File, Category::Documents, "# notes\n")];
        let buffer = ArchiveBuilder::new(at()).build(&results).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(buffer)).unwrap();
        let mut body = String::new();
        archive
            .by_name("documents/notes.md")
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        assert_eq!(body, "# notes\n");
        assert!(archive.by_name("summary.md").is_ok());
    }

    #[test]
    fn test_archive_filenames() {
        assert_eq!(single_archive_filename("My Report.docx"), "My_Report.zip");
        assert_eq!(batch_archive_filename(at()), "batch_20261019_083005.zip");
    }
}
