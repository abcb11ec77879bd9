//! HTML to Markdown conversion and HTML inspection helpers.

use std::collections::HashSet;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::{Captures, Regex};
use scraper::{Html, Selector};
use url::Url;

use super::{ConvertError, Converted, Converter, ConverterInput, ConverterKind, title_from_name};

#[allow(clippy::expect_used)]
static TITLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("title selector is valid"));

#[allow(clippy::expect_used)]
static H1_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1").expect("h1 selector is valid"));

#[allow(clippy::expect_used)]
static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("anchor selector is valid"));

#[allow(clippy::expect_used)]
static IMAGE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img[src]").expect("image selector is valid"));

/// Markdown inline link or image target: `[text](target` or `![alt](target`.
#[allow(clippy::expect_used)]
static MARKDOWN_LINK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(!?\[[^\]]*\]\()([^)\s]+)").expect("markdown link regex is valid")
});

/// Converts an HTML fragment or document to Markdown.
#[must_use]
pub fn html_to_markdown(html: &str) -> String {
    let markdown = html2md::parse_html(html);
    markdown.trim().to_string()
}

/// Returns the document title, falling back to the first `<h1>`.
#[must_use]
pub fn extract_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    [&*TITLE_SELECTOR, &*H1_SELECTOR]
        .into_iter()
        .find_map(|selector| {
            document
                .select(selector)
                .next()
                .map(|node| collapse_whitespace(&node.text().collect::<String>()))
                .filter(|title| !title.is_empty())
        })
}

/// Absolute http(s) link targets in document order, fragments removed, deduplicated.
#[must_use]
pub fn extract_links(html: &str, base: &Url) -> Vec<Url> {
    collect_urls(html, base, &ANCHOR_SELECTOR, "href")
}

/// Absolute http(s) image sources in document order, deduplicated.
#[must_use]
pub fn extract_image_urls(html: &str, base: &Url) -> Vec<Url> {
    collect_urls(html, base, &IMAGE_SELECTOR, "src")
}

fn collect_urls(html: &str, base: &Url, selector: &Selector, attr: &str) -> Vec<Url> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    for element in document.select(selector) {
        let Some(raw) = element.value().attr(attr) else {
            continue;
        };
        let raw = raw.trim();
        if raw.is_empty() || raw.starts_with('#') || raw.starts_with("data:") {
            continue;
        }
        let Ok(mut url) = base.join(raw) else {
            continue;
        };
        if !matches!(url.scheme(), "http" | "https") {
            continue;
        }
        url.set_fragment(None);
        if seen.insert(url.to_string()) {
            urls.push(url);
        }
    }

    urls
}

/// Rewrites relative Markdown link and image targets against `base`.
#[must_use]
pub fn absolutize_links(markdown: &str, base: &Url) -> String {
    MARKDOWN_LINK_PATTERN
        .replace_all(markdown, |caps: &Captures<'_>| {
            let target = &caps[2];
            if target.starts_with('#') || Url::parse(target).is_ok() {
                return caps[0].to_string();
            }
            match base.join(target) {
                Ok(absolute) => format!("{}{absolute}", &caps[1]),
                Err(_) => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Converts uploaded HTML files.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlConverter;

#[async_trait]
impl Converter for HtmlConverter {
    async fn convert(
        &self,
        kind: ConverterKind,
        input: ConverterInput<'_>,
    ) -> Result<Converted, ConvertError> {
        let html = input.text(kind)?;
        let title = extract_title(html).unwrap_or_else(|| title_from_name(input.name));
        let body = html_to_markdown(html);
        let content = if body.starts_with("# ") {
            format!("{body}\n")
        } else {
            format!("# {title}\n\n{body}\n")
        };
        Ok(Converted::markdown(content))
    }
}
