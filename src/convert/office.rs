//! Converters for ZIP-container document formats: DOCX, PPTX, XLSX, ODT and EPUB.
//!
//! Each format is a ZIP archive of XML parts. Text is pulled out of the parts
//! with targeted patterns; embedded media becomes [`ImageAsset`]s. Parsing is
//! CPU-bound and runs on the blocking pool.

use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read};
use std::sync::LazyLock;

use async_trait::async_trait;
use bytes::Bytes;
use regex::Regex;
use tracing::debug;
use zip::ZipArchive;

use super::data::markdown_table;
use super::html::{extract_title, html_to_markdown};
use super::{ConvertError, Converted, Converter, ConverterInput, ConverterKind, title_from_name};
use crate::model::ImageAsset;

/// Largest decompressed size read from a single archive entry (64 MiB).
const MAX_ENTRY_BYTES: u64 = 64 * 1024 * 1024;

const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "svg", "webp", "tif", "tiff", "emf", "wmf",
];

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        #[allow(clippy::expect_used)]
        static $name: LazyLock<Regex> =
            LazyLock::new(|| Regex::new($re).expect("office regex is valid"));
    };
}

pattern!(TAG, r"<[^>]+>");
pattern!(
    DOCX_PARAGRAPH,
    r"(?s)<w:p(?:\s[^>]*?)?(?:/>|>(.*?)</w:p>)"
);
pattern!(
    DOCX_HEADING,
    r#"<w:pStyle w:val="(?:[Hh]eading\s?(\d)|(Title))""#
);
pattern!(
    DOCX_TOKEN,
    r"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>|<w:tab/>|<w:br/>"
);
pattern!(PPTX_SLIDE, r"^ppt/slides/slide(\d+)\.xml$");
pattern!(PPTX_PARAGRAPH, r"(?s)<a:p(?:\s[^>]*)?>(.*?)</a:p>");
pattern!(PPTX_TEXT, r"(?s)<a:t>(.*?)</a:t>");
pattern!(XLSX_SHARED, r"(?s)<si>(.*?)</si>");
pattern!(XLSX_TEXT, r"(?s)<t(?:\s[^>]*)?>(.*?)</t>");
pattern!(XLSX_SHEET_NAME, r#"<sheet\b[^>]*?\bname="([^"]*)""#);
pattern!(XLSX_SHEET_PART, r"^xl/worksheets/sheet(\d+)\.xml$");
pattern!(XLSX_ROW, r"(?s)<row\b[^>]*>(.*?)</row>");
pattern!(XLSX_CELL, r"(?s)<c\b([^>]*?)(?:/>|>(.*?)</c>)");
pattern!(XLSX_CELL_REF, r#"\br="([A-Z]+)\d+""#);
pattern!(XLSX_CELL_TYPE, r#"\bt="([^"]+)""#);
pattern!(XLSX_VALUE, r"(?s)<v>(.*?)</v>");
pattern!(
    ODT_BLOCK,
    r"(?s)<text:h\b([^>]*?)(?:/>|>(.*?)</text:h>)|<text:p\b[^>]*?(?:/>|>(.*?)</text:p>)"
);
pattern!(ODT_LEVEL, r#"text:outline-level="(\d)""#);
pattern!(EPUB_ROOTFILE, r#"full-path="([^"]+)""#);
pattern!(EPUB_ITEM, r"<item\b[^>]*>");
pattern!(EPUB_ATTR, r#"\b(id|href|media-type)="([^"]*)""#);
pattern!(EPUB_ITEMREF, r#"<itemref\b[^>]*?\bidref="([^"]*)""#);
pattern!(EPUB_TITLE, r"(?s)<dc:title[^>]*>(.*?)</dc:title>");

/// Converts DOCX, PPTX, XLSX, ODT and EPUB uploads.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfficeConverter;

#[async_trait]
impl Converter for OfficeConverter {
    async fn convert(
        &self,
        kind: ConverterKind,
        input: ConverterInput<'_>,
    ) -> Result<Converted, ConvertError> {
        let bytes = input.bytes(kind)?.clone();
        let name = input.name.to_string();
        let include_images = input.options.include_images;

        tokio::task::spawn_blocking(move || extract(kind, &bytes, &name, include_images))
            .await
            .map_err(|e| ConvertError::internal(format!("{kind} extraction task failed: {e}")))?
    }
}

fn extract(
    kind: ConverterKind,
    bytes: &Bytes,
    name: &str,
    include_images: bool,
) -> Result<Converted, ConvertError> {
    let format = format_label(kind);
    let mut archive = ZipArchive::new(Cursor::new(bytes.as_ref()))
        .map_err(|e| ConvertError::malformed(name, format, e))?;

    let (title, body, media_paths) = match kind {
        ConverterKind::Docx => {
            let xml = require_entry(&mut archive, "word/document.xml", name, format)?;
            (title_from_name(name), docx_body(&xml), media_under(&archive, "word/media/"))
        }
        ConverterKind::Pptx => (
            title_from_name(name),
            pptx_body(&mut archive, name)?,
            media_under(&archive, "ppt/media/"),
        ),
        ConverterKind::Xlsx => (
            title_from_name(name),
            xlsx_body(&mut archive, name)?,
            media_under(&archive, "xl/media/"),
        ),
        ConverterKind::Odt => {
            let xml = require_entry(&mut archive, "content.xml", name, format)?;
            (title_from_name(name), odt_body(&xml), media_under(&archive, "Pictures/"))
        }
        ConverterKind::Epub => epub_parts(&mut archive, name)?,
        other => {
            return Err(ConvertError::unsupported(format!(
                "{other} is not a ZIP document format"
            )));
        }
    };

    let images = if include_images {
        collect_images(&mut archive, &media_paths)
    } else {
        Vec::new()
    };
    debug!(format, images = images.len(), "extracted document");

    let mut content = format!("# {title}\n\n{}\n", body.trim());
    if !images.is_empty() {
        content.push_str("\n## Images\n\n");
        for image in &images {
            content.push_str(&format!("![{}]({})\n", image.name, image.path));
        }
    }

    Ok(Converted::markdown(content).with_images(images))
}

fn format_label(kind: ConverterKind) -> &'static str {
    match kind {
        ConverterKind::Docx => "docx",
        ConverterKind::Pptx => "pptx",
        ConverterKind::Xlsx => "xlsx",
        ConverterKind::Odt => "odt",
        ConverterKind::Epub => "epub",
        _ => "document",
    }
}

type Archive<'a> = ZipArchive<Cursor<&'a [u8]>>;

fn read_entry(archive: &mut Archive<'_>, path: &str) -> Option<Vec<u8>> {
    let entry = archive.by_name(path).ok()?;
    let mut buffer = Vec::new();
    entry.take(MAX_ENTRY_BYTES).read_to_end(&mut buffer).ok()?;
    Some(buffer)
}

fn read_entry_text(archive: &mut Archive<'_>, path: &str) -> Option<String> {
    read_entry(archive, path).map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

fn require_entry(
    archive: &mut Archive<'_>,
    path: &str,
    name: &str,
    format: &'static str,
) -> Result<String, ConvertError> {
    read_entry_text(archive, path)
        .ok_or_else(|| ConvertError::malformed(name, format, format!("missing {path}")))
}

fn media_under(archive: &Archive<'_>, prefix: &str) -> Vec<String> {
    let mut paths: Vec<String> = archive
        .file_names()
        .filter(|path| path.starts_with(prefix) && is_image_path(path))
        .map(str::to_string)
        .collect();
    paths.sort();
    paths
}

fn is_image_path(path: &str) -> bool {
    crate::classify::extension_of(path)
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

fn collect_images(archive: &mut Archive<'_>, paths: &[String]) -> Vec<ImageAsset> {
    let mut used = HashSet::new();
    let mut images = Vec::new();
    for path in paths {
        let Some(bytes) = read_entry(archive, path) else {
            continue;
        };
        let base = path.rsplit('/').next().unwrap_or(path);
        let mut file_name = base.to_string();
        let mut counter = 1;
        while !used.insert(file_name.clone()) {
            file_name = format!("{counter}_{base}");
            counter += 1;
        }
        let mime = mime_guess::from_path(base).first_or_octet_stream();
        images.push(ImageAsset::from_bytes(file_name, &bytes, mime.essence_str()));
    }
    images
}

/// Decodes the five XML entities plus numeric character references.
pub(crate) fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let Some(end) = tail.find(';').filter(|&end| end <= 10) else {
            out.push('&');
            rest = &tail[1..];
            continue;
        };
        let entity = &tail[1..end];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some('\u{a0}'),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };
        if let Some(ch) = decoded {
            out.push(ch);
            rest = &tail[end + 1..];
        } else {
            out.push('&');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

fn strip_tags(xml: &str) -> String {
    decode_entities(&TAG.replace_all(xml, ""))
}

fn docx_body(xml: &str) -> String {
    let mut lines = Vec::new();
    for paragraph in DOCX_PARAGRAPH.captures_iter(xml) {
        let Some(inner) = paragraph.get(1).map(|m| m.as_str()) else {
            lines.push(String::new());
            continue;
        };

        let mut text = String::new();
        for token in DOCX_TOKEN.captures_iter(inner) {
            match token.get(1) {
                Some(run) => text.push_str(&decode_entities(run.as_str())),
                None if token[0].starts_with("<w:tab") => text.push('\t'),
                None => text.push('\n'),
            }
        }
        let text = text.trim_end().to_string();
        if text.is_empty() {
            lines.push(String::new());
            continue;
        }

        let prefix = match DOCX_HEADING.captures(inner) {
            Some(caps) if caps.get(2).is_some() => "# ".to_string(),
            Some(caps) => {
                let level: usize = caps[1].parse().unwrap_or(1);
                format!("{} ", "#".repeat((level + 1).min(6)))
            }
            None if inner.contains("<w:numPr>") => "- ".to_string(),
            None => String::new(),
        };
        lines.push(format!("{prefix}{text}"));
    }
    join_blocks(&lines)
}

fn pptx_body(archive: &mut Archive<'_>, name: &str) -> Result<String, ConvertError> {
    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|path| {
            PPTX_SLIDE
                .captures(path)
                .and_then(|caps| caps[1].parse().ok())
                .map(|number| (number, path.to_string()))
        })
        .collect();
    if slides.is_empty() {
        return Err(ConvertError::malformed(name, "pptx", "no slides found"));
    }
    slides.sort_by_key(|(number, _)| *number);

    let mut sections = Vec::new();
    for (number, path) in slides {
        let Some(xml) = read_entry_text(archive, &path) else {
            continue;
        };
        let paragraphs: Vec<String> = PPTX_PARAGRAPH
            .captures_iter(&xml)
            .map(|caps| {
                PPTX_TEXT
                    .captures_iter(&caps[1])
                    .map(|text| decode_entities(&text[1]))
                    .collect::<String>()
            })
            .filter(|text| !text.trim().is_empty())
            .collect();
        let mut section = format!("## Slide {number}");
        for paragraph in paragraphs {
            section.push_str("\n\n");
            section.push_str(paragraph.trim());
        }
        sections.push(section);
    }
    Ok(sections.join("\n\n"))
}

fn xlsx_body(archive: &mut Archive<'_>, name: &str) -> Result<String, ConvertError> {
    let shared: Vec<String> = read_entry_text(archive, "xl/sharedStrings.xml")
        .map(|xml| {
            XLSX_SHARED
                .captures_iter(&xml)
                .map(|item| {
                    XLSX_TEXT
                        .captures_iter(&item[1])
                        .map(|t| decode_entities(&t[1]))
                        .collect()
                })
                .collect()
        })
        .unwrap_or_default();

    let sheet_names: Vec<String> = read_entry_text(archive, "xl/workbook.xml")
        .map(|xml| {
            XLSX_SHEET_NAME
                .captures_iter(&xml)
                .map(|caps| decode_entities(&caps[1]))
                .collect()
        })
        .unwrap_or_default();

    let mut parts: Vec<(usize, String)> = archive
        .file_names()
        .filter_map(|path| {
            XLSX_SHEET_PART
                .captures(path)
                .and_then(|caps| caps[1].parse().ok())
                .map(|number| (number, path.to_string()))
        })
        .collect();
    if parts.is_empty() {
        return Err(ConvertError::malformed(name, "xlsx", "no worksheets found"));
    }
    parts.sort_by_key(|(number, _)| *number);

    let mut sections = Vec::new();
    for (number, path) in parts {
        let Some(xml) = read_entry_text(archive, &path) else {
            continue;
        };
        let sheet_name = sheet_names
            .get(number.saturating_sub(1))
            .cloned()
            .unwrap_or_else(|| format!("Sheet{number}"));
        let rows = xlsx_rows(&xml, &shared);
        let section = match rows.split_first() {
            Some((header, body)) => format!("## {sheet_name}\n\n{}", markdown_table(header, body)),
            None => format!("## {sheet_name}\n\n_Empty sheet._\n"),
        };
        sections.push(section);
    }
    Ok(sections.join("\n"))
}

fn xlsx_rows(xml: &str, shared: &[String]) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    for row in XLSX_ROW.captures_iter(xml) {
        let mut cells: Vec<String> = Vec::new();
        for cell in XLSX_CELL.captures_iter(&row[1]) {
            let attrs = &cell[1];
            let inner = cell.get(2).map_or("", |m| m.as_str());
            let column = XLSX_CELL_REF
                .captures(attrs)
                .map_or(cells.len(), |caps| column_index(&caps[1]));
            let cell_type = XLSX_CELL_TYPE.captures(attrs).map(|caps| caps[1].to_string());

            let value = match cell_type.as_deref() {
                Some("s") => XLSX_VALUE
                    .captures(inner)
                    .and_then(|v| v[1].trim().parse::<usize>().ok())
                    .and_then(|index| shared.get(index).cloned())
                    .unwrap_or_default(),
                Some("inlineStr") => XLSX_TEXT
                    .captures_iter(inner)
                    .map(|t| decode_entities(&t[1]))
                    .collect(),
                _ => XLSX_VALUE
                    .captures(inner)
                    .map(|v| decode_entities(&v[1]))
                    .unwrap_or_default(),
            };

            if cells.len() <= column {
                cells.resize(column + 1, String::new());
            }
            cells[column] = value;
        }
        if cells.iter().any(|cell| !cell.is_empty()) {
            rows.push(cells);
        }
    }
    rows
}

fn column_index(letters: &str) -> usize {
    letters
        .bytes()
        .fold(0usize, |acc, b| acc * 26 + usize::from(b - b'A') + 1)
        .saturating_sub(1)
}

fn odt_body(xml: &str) -> String {
    let normalized = xml
        .replace("<text:line-break/>", "\n")
        .replace("<text:tab/>", "\t")
        .replace("<text:s/>", " ");

    let mut lines = Vec::new();
    for block in ODT_BLOCK.captures_iter(&normalized) {
        if let Some(attrs) = block.get(1) {
            let text = strip_tags(block.get(2).map_or("", |m| m.as_str()));
            let level: usize = ODT_LEVEL
                .captures(attrs.as_str())
                .and_then(|caps| caps[1].parse().ok())
                .unwrap_or(1);
            if !text.trim().is_empty() {
                lines.push(format!("{} {}", "#".repeat((level + 1).min(6)), text.trim()));
            }
        } else {
            let text = strip_tags(block.get(3).map_or("", |m| m.as_str()));
            lines.push(text.trim_end().to_string());
        }
    }
    join_blocks(&lines)
}

fn epub_parts(
    archive: &mut Archive<'_>,
    name: &str,
) -> Result<(String, String, Vec<String>), ConvertError> {
    let container = require_entry(archive, "META-INF/container.xml", name, "epub")?;
    let opf_path = EPUB_ROOTFILE
        .captures(&container)
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| ConvertError::malformed(name, "epub", "container.xml has no rootfile"))?;
    let opf = require_entry(archive, &opf_path, name, "epub")?;
    let base_dir = opf_path
        .rsplit_once('/')
        .map(|(dir, _)| format!("{dir}/"))
        .unwrap_or_default();

    let mut manifest: HashMap<String, (String, String)> = HashMap::new();
    let mut image_paths = Vec::new();
    for item in EPUB_ITEM.find_iter(&opf) {
        let mut id = None;
        let mut href = None;
        let mut media_type = String::new();
        for attr in EPUB_ATTR.captures_iter(item.as_str()) {
            match &attr[1] {
                "id" => id = Some(attr[2].to_string()),
                "href" => href = Some(attr[2].to_string()),
                _ => media_type = attr[2].to_string(),
            }
        }
        let (Some(id), Some(href)) = (id, href) else {
            continue;
        };
        let href = urlencoding::decode(&decode_entities(&href))
            .map_or_else(|_| href.clone(), std::borrow::Cow::into_owned);
        let path = format!("{base_dir}{href}");
        if media_type.starts_with("image/") {
            image_paths.push(path.clone());
        }
        manifest.insert(id, (path, media_type));
    }

    let title = EPUB_TITLE
        .captures(&opf)
        .map(|caps| strip_tags(&caps[1]).trim().to_string())
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| title_from_name(name));

    let mut chapters = Vec::new();
    for idref in EPUB_ITEMREF.captures_iter(&opf) {
        let Some((path, _)) = manifest.get(&idref[1]) else {
            continue;
        };
        let Some(html) = read_entry_text(archive, path) else {
            debug!(path, "epub spine item missing");
            continue;
        };
        let markdown = html_to_markdown(&html);
        if markdown.is_empty() {
            continue;
        }
        let chapter = match extract_title(&html) {
            Some(chapter_title) if !markdown.contains(&chapter_title) => {
                format!("## {chapter_title}\n\n{markdown}")
            }
            _ => markdown,
        };
        chapters.push(chapter);
    }
    if chapters.is_empty() {
        return Err(ConvertError::malformed(name, "epub", "spine has no readable chapters"));
    }

    image_paths.sort();
    Ok((title, chapters.join("\n\n"), image_paths))
}

fn join_blocks(lines: &[String]) -> String {
    lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n\n")
}
