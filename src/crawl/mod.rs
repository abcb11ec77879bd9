//! Site crawling for parent URL requests.
//!
//! The [`Crawler`] collaborator turns a start URL into an index page, a list
//! of page results and the images discovered along the way. [`HttpCrawler`]
//! is the built-in breadth-first implementation; [`CrawlConverter`] plugs any
//! crawler into the converter registry.

mod index;

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::archive::{NameAllocator, sanitize_segment};
use crate::convert::{
    ConvertError, Converted, Converter, ConverterInput, ConverterKind, fetch_images, render_page,
};
use crate::fetch::{HttpFetcher, parse_http_url};
use crate::model::{ImageAsset, PageResult, RequestContent};

pub use index::{build_index, page_name};

/// Most images downloaded for a whole crawl.
pub const MAX_CRAWL_IMAGES: usize = 50;

/// Hard ceiling on `max_pages`, whatever the request asks for.
pub const MAX_CRAWL_PAGES: usize = 200;

const SKIPPED_EXTENSIONS: &[&str] = &[
    "pdf", "zip", "gz", "tar", "png", "jpg", "jpeg", "gif", "svg", "webp", "ico", "css", "js",
    "mp3", "mp4", "webm", "woff", "woff2", "xml", "json",
];

/// Crawl limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlOptions {
    /// Link levels followed from the start page (0 = start page only).
    pub depth: u32,
    /// Most pages attempted, failed ones included.
    pub max_pages: usize,
    /// Download discovered images.
    pub include_images: bool,
    /// Absolutize relative links in page bodies.
    pub convert_links: bool,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            depth: 1,
            max_pages: 10,
            include_images: true,
            convert_links: true,
        }
    }
}

/// What a crawl produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawlOutput {
    /// Index page body.
    pub index_markdown: String,
    /// Every page attempted, in visit order.
    pub pages: Vec<PageResult>,
    /// Images shared by the pages.
    pub discovered_images: Vec<ImageAsset>,
    /// Contained problems (failed image downloads).
    pub warnings: Vec<String>,
}

/// Crawls a site from a start URL.
#[async_trait]
pub trait Crawler: Send + Sync {
    /// Crawls from `start`.
    ///
    /// Fails only when the start page itself cannot be fetched; later page
    /// failures are recorded as failed [`PageResult`]s.
    async fn crawl(&self, start: &Url, options: &CrawlOptions) -> Result<CrawlOutput, ConvertError>;
}

/// Breadth-first crawler restricted to the start page's host.
#[derive(Debug, Clone)]
pub struct HttpCrawler {
    fetcher: HttpFetcher,
}

impl HttpCrawler {
    /// Creates a crawler backed by `fetcher`.
    #[must_use]
    pub fn new(fetcher: HttpFetcher) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Crawler for HttpCrawler {
    #[instrument(skip(self, options), fields(start = %start, depth = options.depth, max_pages = options.max_pages))]
    async fn crawl(&self, start: &Url, options: &CrawlOptions) -> Result<CrawlOutput, ConvertError> {
        let max_pages = options.max_pages.clamp(1, MAX_CRAWL_PAGES);
        let host = start.host_str().map(str::to_ascii_lowercase);

        let mut queue: VecDeque<(Url, u32)> = VecDeque::from([(normalize(start), 0)]);
        let mut queued: HashSet<String> = HashSet::from([normalize(start).to_string()]);
        let mut names = NameAllocator::new();
        let mut pages = Vec::new();
        let mut image_urls: Vec<Url> = Vec::new();
        let mut site_title = None;

        while let Some((url, level)) = queue.pop_front() {
            if pages.len() >= max_pages {
                break;
            }
            let name = unique_name(&mut names, &url);

            let rendered = match self.fetcher.fetch(url.as_str()).await {
                Ok(resource) => render_page(&resource, options.convert_links),
                Err(error) => Err(ConvertError::from(error)),
            };

            let page = match rendered {
                Ok(page) => page,
                Err(error) if pages.is_empty() => return Err(error),
                Err(error) => {
                    warn!(url = %url, error = %error, "crawl page failed");
                    pages.push(PageResult::failed(name, url.as_str(), error.to_string()));
                    continue;
                }
            };
            debug!(url = %url, level, links = page.links.len(), "crawled page");

            if site_title.is_none() {
                site_title = Some(page.title.clone());
            }
            if options.include_images {
                for image in page.image_urls {
                    if image_urls.len() < MAX_CRAWL_IMAGES && !image_urls.contains(&image) {
                        image_urls.push(image);
                    }
                }
            }
            if level < options.depth {
                for link in page.links {
                    let link = normalize(&link);
                    if !same_host(&link, host.as_deref()) || is_skipped(&link) {
                        continue;
                    }
                    if queued.insert(link.to_string()) {
                        queue.push_back((link, level + 1));
                    }
                }
            }
            pages.push(PageResult::converted(name, url.as_str(), page.title, page.markdown));
        }

        let (discovered_images, warnings) = if image_urls.is_empty() {
            (Vec::new(), Vec::new())
        } else {
            fetch_images(&self.fetcher, &image_urls).await
        };

        let site_title = site_title.unwrap_or_else(|| host.clone().unwrap_or_default());
        let index_markdown = build_index(start, &site_title, &pages);
        info!(
            pages = pages.len(),
            failed = pages.iter().filter(|p| !p.success).count(),
            images = discovered_images.len(),
            "crawl finished"
        );

        Ok(CrawlOutput {
            index_markdown,
            pages,
            discovered_images,
            warnings,
        })
    }
}

fn normalize(url: &Url) -> Url {
    let mut url = url.clone();
    url.set_fragment(None);
    url
}

fn same_host(url: &Url, host: Option<&str>) -> bool {
    match (url.host_str(), host) {
        (Some(candidate), Some(host)) => candidate.eq_ignore_ascii_case(host),
        _ => false,
    }
}

fn is_skipped(url: &Url) -> bool {
    crate::classify::extension_of(url.path())
        .is_some_and(|ext| SKIPPED_EXTENSIONS.contains(&ext.as_str()))
}

/// Archive-ready page name, unique case-insensitively within this crawl.
fn unique_name(names: &mut NameAllocator, url: &Url) -> String {
    names.claim("pages", &sanitize_segment(&page_name(url)), "")
}

/// Serves `parenturl` requests through a [`Crawler`].
#[derive(Clone)]
pub struct CrawlConverter {
    crawler: Arc<dyn Crawler>,
}

impl std::fmt::Debug for CrawlConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrawlConverter").finish_non_exhaustive()
    }
}

impl CrawlConverter {
    /// Creates a converter backed by `crawler`.
    #[must_use]
    pub fn new(crawler: Arc<dyn Crawler>) -> Self {
        Self { crawler }
    }
}

#[async_trait]
impl Converter for CrawlConverter {
    async fn convert(
        &self,
        kind: ConverterKind,
        input: ConverterInput<'_>,
    ) -> Result<Converted, ConvertError> {
        let raw = input.url(kind)?;
        let start = parse_http_url(raw).map_err(ConvertError::from)?;

        let mut options = CrawlOptions {
            depth: input.options.depth,
            max_pages: input.options.max_pages,
            include_images: input.options.include_images,
            convert_links: input.options.convert_links,
        };
        // `{url, depth, maxPages}` objects override the request options.
        if let RequestContent::Structured(value) = input.content {
            if let Some(depth) = value
                .get("depth")
                .and_then(serde_json::Value::as_u64)
                .and_then(|d| u32::try_from(d).ok())
            {
                options.depth = depth;
            }
            if let Some(max_pages) = value
                .get("maxPages")
                .and_then(serde_json::Value::as_u64)
                .and_then(|m| usize::try_from(m).ok())
            {
                options.max_pages = max_pages;
            }
        }

        let output = self.crawler.crawl(&start, &options).await?;
        Ok(Converted {
            content: output.index_markdown,
            images: output.discovered_images,
            pages: output.pages,
            source_url: Some(start.to_string()),
            warnings: output.warnings,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::model::ConversionOptions;

    #[test]
    fn test_unique_name_is_case_insensitive_and_bounded() {
        let mut names = NameAllocator::new();
        let url = |path: &str| Url::parse(&format!("https://site.test{path}")).unwrap();
        assert_eq!(unique_name(&mut names, &url("/")), "home");
        assert_eq!(unique_name(&mut names, &url("/Docs")), "Docs");
        assert_eq!(unique_name(&mut names, &url("/docs")), "docs_1");

        let long = unique_name(&mut names, &url(&format!("/{}", "a".repeat(150))));
        assert_eq!(long, "a".repeat(120));
        assert_eq!(sanitize_segment(&long), long);
    }

    #[test]
    fn test_same_host_and_skips() {
        let url = Url::parse("https://Site.test/a").unwrap();
        assert!(same_host(&url, Some("site.test")));
        assert!(!same_host(&url, Some("other.test")));
        assert!(is_skipped(&Url::parse("https://site.test/file.PDF").unwrap()));
        assert!(!is_skipped(&Url::parse("https://site.test/page.html").unwrap()));
    }

    struct FixedCrawler {
        seen: Mutex<Option<CrawlOptions>>,
    }

    #[async_trait]
    impl Crawler for FixedCrawler {
        async fn crawl(&self, start: &Url, options: &CrawlOptions) -> Result<CrawlOutput, ConvertError> {
            *self.seen.lock().unwrap() = Some(*options);
            let pages = vec![PageResult::converted("home", start.as_str(), "Home", "# Home")];
            Ok(CrawlOutput {
                index_markdown: build_index(start, "Home", &pages),
                pages,
                ..CrawlOutput::default()
            })
        }
    }

    #[tokio::test]
    async fn test_crawl_converter_reads_object_overrides() {
        let crawler = Arc::new(FixedCrawler {
            seen: Mutex::new(None),
        });
        let converter = CrawlConverter::new(crawler.clone());
        let content = RequestContent::Structured(serde_json::json!({
            "url": "https://site.test/",
            "depth": 3,
            "maxPages": 4
        }));
        let options = ConversionOptions::default();
        let out = converter
            .convert(
                ConverterKind::ParentUrl,
                ConverterInput {
                    content: &content,
                    name: "https://site.test/",
                    api_key: None,
                    options: &options,
                },
            )
            .await
            .unwrap();

        let seen = crawler.seen.lock().unwrap().unwrap();
        assert_eq!(seen.depth, 3);
        assert_eq!(seen.max_pages, 4);
        assert_eq!(out.pages.len(), 1);
        assert_eq!(out.source_url.as_deref(), Some("https://site.test/"));
        assert!(out.content.contains("[[pages/home|Home]]"));
    }
}
