//! Single web page converter and shared image downloading.

use std::collections::HashSet;

use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use url::Url;

use super::html::{absolutize_links, extract_image_urls, extract_title, html_to_markdown};
use super::{ConvertError, Converted, Converter, ConverterInput, ConverterKind};
use crate::fetch::{FetchedResource, HttpFetcher, parse_http_url};
use crate::model::ImageAsset;

/// Most images downloaded for one page.
pub const MAX_PAGE_IMAGES: usize = 20;

/// Image downloads in flight per page.
const IMAGE_FETCH_CONCURRENCY: usize = 4;

/// Fetches one page and converts it to Markdown.
#[derive(Debug, Clone)]
pub struct UrlConverter {
    fetcher: HttpFetcher,
}

impl UrlConverter {
    /// Creates a converter backed by `fetcher`.
    #[must_use]
    pub fn new(fetcher: HttpFetcher) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Converter for UrlConverter {
    async fn convert(
        &self,
        kind: ConverterKind,
        input: ConverterInput<'_>,
    ) -> Result<Converted, ConvertError> {
        let url = input.url(kind)?;
        parse_http_url(url)?;

        let resource = self.fetcher.fetch(url).await?;
        let page = render_page(&resource, input.options.convert_links)?;

        let (images, warnings) = if input.options.include_images {
            let candidates: Vec<Url> = page.image_urls.into_iter().take(MAX_PAGE_IMAGES).collect();
            fetch_images(&self.fetcher, &candidates).await
        } else {
            (Vec::new(), Vec::new())
        };

        Ok(Converted {
            content: page.markdown,
            images,
            pages: Vec::new(),
            source_url: Some(resource.final_url.to_string()),
            warnings,
        })
    }
}

/// A fetched page rendered to Markdown.
#[derive(Debug, Clone)]
pub(crate) struct RenderedPage {
    pub title: String,
    pub markdown: String,
    pub links: Vec<Url>,
    pub image_urls: Vec<Url>,
}

/// Renders an HTML or plain-text response.
///
/// # Errors
///
/// [`ConvertError::Unsupported`] for any other content type.
pub(crate) fn render_page(
    resource: &FetchedResource,
    convert_links: bool,
) -> Result<RenderedPage, ConvertError> {
    let base = &resource.final_url;
    let fallback_title = base.host_str().unwrap_or("page").to_string();

    let is_plain_text = resource
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.starts_with("text/") && ct != "text/html");

    if is_plain_text {
        let text = resource.text();
        return Ok(RenderedPage {
            markdown: format!("# {fallback_title}\n\n{}\n", text.trim()),
            title: fallback_title,
            links: Vec::new(),
            image_urls: Vec::new(),
        });
    }

    if resource.content_type.is_some() && !resource.is_html() {
        return Err(ConvertError::unsupported(format!(
            "{} returned {}",
            base,
            resource.content_type.as_deref().unwrap_or_default()
        )));
    }

    let html = resource.text();
    let title = extract_title(&html).unwrap_or(fallback_title);
    let mut body = html_to_markdown(&html);
    if convert_links {
        body = absolutize_links(&body, base);
    }
    let markdown = if body.starts_with("# ") {
        format!("{body}\n")
    } else {
        format!("# {title}\n\n{body}\n")
    };

    Ok(RenderedPage {
        title,
        markdown,
        links: super::html::extract_links(&html, base),
        image_urls: extract_image_urls(&html, base),
    })
}

/// Stable asset name for an image URL: `img-<first 8 hex of sha256(url)>.<ext>`.
#[must_use]
pub fn image_file_name(url: &Url, content_type: Option<&str>) -> String {
    let digest = Sha256::digest(url.as_str().as_bytes());
    let hash: String = digest.iter().take(4).map(|b| format!("{b:02x}")).collect();

    let ext = content_type
        .and_then(preferred_extension)
        .map(str::to_string)
        .or_else(|| crate::classify::extension_of(url.path()))
        .unwrap_or_else(|| "bin".to_string());

    format!("img-{hash}.{ext}")
}

fn preferred_extension(content_type: &str) -> Option<&'static str> {
    match content_type {
        "image/png" => Some("png"),
        "image/jpeg" => Some("jpg"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/svg+xml" => Some("svg"),
        "image/avif" => Some("avif"),
        "image/bmp" => Some("bmp"),
        "image/x-icon" | "image/vnd.microsoft.icon" => Some("ico"),
        other => mime_guess::get_mime_extensions_str(other).and_then(|exts| exts.first().copied()),
    }
}

/// Downloads images in input order. Failures are returned as warnings.
pub async fn fetch_images(fetcher: &HttpFetcher, urls: &[Url]) -> (Vec<ImageAsset>, Vec<String>) {
    let mut seen = HashSet::new();
    let unique: Vec<Url> = urls
        .iter()
        .filter(|u| seen.insert(u.as_str()))
        .cloned()
        .collect();

    // Futures own their URL and client handle; `async_trait` needs them `Send`.
    let client = fetcher.clone();
    let outcomes: Vec<(Url, Result<_, _>)> = stream::iter(unique)
        .map(move |url| {
            let fetcher = client.clone();
            async move {
                let outcome = fetcher.fetch(url.as_str()).await;
                (url, outcome)
            }
        })
        .buffered(IMAGE_FETCH_CONCURRENCY)
        .collect()
        .await;

    let mut images = Vec::new();
    let mut warnings = Vec::new();
    for (url, outcome) in outcomes {
        match outcome {
            Ok(resource) => {
                let guessed = mime_guess::from_path(url.path()).first();
                let mime = match resource.content_type.as_deref() {
                    Some(ct) if ct.starts_with("image/") => ct.to_string(),
                    _ => match guessed {
                        Some(guess) if guess.type_() == mime_guess::mime::IMAGE => {
                            guess.essence_str().to_string()
                        }
                        _ => {
                            debug!(url = %url, "skipping non-image response");
                            warnings.push(format!("skipped {url}: not an image"));
                            continue;
                        }
                    },
                };
                let name = image_file_name(&url, Some(&mime));
                images.push(
                    ImageAsset::from_bytes(name, &resource.bytes, mime).with_source_url(url.as_str()),
                );
            }
            Err(error) => {
                warn!(url = %url, error = %error, "image download failed");
                warnings.push(format!("image {url} failed: {error}"));
            }
        }
    }
    (images, warnings)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn resource(url: &str, content_type: Option<&str>, body: &str) -> FetchedResource {
        FetchedResource {
            final_url: Url::parse(url).unwrap(),
            content_type: content_type.map(str::to_string),
            bytes: Bytes::from(body.to_string()),
        }
    }

    #[test]
    fn test_image_file_name_is_stable() {
        let url = Url::parse("https://a.test/logo.png").unwrap();
        let first = image_file_name(&url, Some("image/png"));
        assert_eq!(first, image_file_name(&url, Some("image/png")));
        assert!(first.starts_with("img-"));
        assert!(first.ends_with(".png"));
        assert_eq!(first.len(), "img-12345678.png".len());
    }

    #[test]
    fn test_image_file_name_falls_back_to_path_extension() {
        let url = Url::parse("https://a.test/pic.webp?x=1").unwrap();
        assert!(image_file_name(&url, None).ends_with(".webp"));
        let url = Url::parse("https://a.test/pic").unwrap();
        assert!(image_file_name(&url, None).ends_with(".bin"));
    }

    #[test]
    fn test_render_page_html() {
        let page = render_page(
            &resource(
                "https://site.test/docs/",
                Some("text/html"),
                r#"<html><head><title>Docs</title></head><body><p>See <a href="intro">intro</a></p><img src="/a.png"></body></html>"#,
            ),
            true,
        )
        .unwrap();
        assert_eq!(page.title, "Docs");
        assert!(page.markdown.starts_with("# Docs\n\n"));
        assert!(page.markdown.contains("https://site.test/docs/intro"));
        assert_eq!(page.links[0].as_str(), "https://site.test/docs/intro");
        assert_eq!(page.image_urls[0].as_str(), "https://site.test/a.png");
    }

    #[test]
    fn test_render_page_plain_text() {
        let page = render_page(&resource("https://site.test/robots.txt", Some("text/plain"), "hi"), true)
            .unwrap();
        assert_eq!(page.markdown, "# site.test\n\nhi\n");
    }

    #[test]
    fn test_render_page_rejects_binary() {
        let err = render_page(
            &resource("https://site.test/file.zip", Some("application/zip"), "PK"),
            true,
        )
        .unwrap_err();
        assert!(matches!(err, ConvertError::Unsupported { .. }));
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn test_image_and_page_futures_are_send() {
        let fetcher = HttpFetcher::new(crate::fetch::FetchSettings::default()).unwrap();
        let urls = vec![Url::parse("https://a.test/logo.png").unwrap()];
        assert_send(&fetch_images(&fetcher, &urls));

        let converter = UrlConverter::new(fetcher);
        let options = crate::model::ConversionOptions::default();
        let content = crate::model::RequestContent::Text("https://a.test/".to_string());
        let input = ConverterInput {
            content: &content,
            name: "page",
            api_key: None,
            options: &options,
        };
        assert_send(&converter.convert(ConverterKind::Url, input));
    }
}
