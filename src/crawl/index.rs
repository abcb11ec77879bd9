//! Crawl index page and page naming.

use url::Url;

use crate::model::PageResult;

/// File stem for a crawled page: `/` is `home`, `/docs/intro.html` is `docs_intro`.
#[must_use]
pub fn page_name(url: &Url) -> String {
    let path = url.path().trim_matches('/');
    let path = path
        .strip_suffix(".html")
        .or_else(|| path.strip_suffix(".htm"))
        .unwrap_or(path);

    let mut name: String = path
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect();
    if let Some(query) = url.query().filter(|q| !q.is_empty()) {
        name.push('_');
        name.extend(
            query
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' }),
        );
    }

    let name = name.trim_matches(['_', '.']).to_string();
    if name.is_empty() { "home".to_string() } else { name }
}

/// Index page linking every converted page, followed by the failed ones.
#[must_use]
pub fn build_index(start: &Url, site_title: &str, pages: &[PageResult]) -> String {
    let converted: Vec<&PageResult> = pages.iter().filter(|p| p.success).collect();
    let failed: Vec<&PageResult> = pages.iter().filter(|p| !p.success).collect();

    let mut index = format!(
        "# {site_title}\n\nCrawled from <{start}>: {} pages converted, {} failed.\n\n## Pages\n\n",
        converted.len(),
        failed.len()
    );
    if converted.is_empty() {
        index.push_str("_No pages converted._\n");
    }
    for page in &converted {
        index.push_str(&format!(
            "- [[pages/{}|{}]]\n",
            page.name,
            page.title.replace(['|', ']', '['], " ").trim()
        ));
    }

    if !failed.is_empty() {
        index.push_str("\n## Failed Pages\n\n");
        for page in &failed {
            index.push_str(&format!(
                "- <{}>: {}\n",
                page.url,
                page.error.as_deref().unwrap_or("unknown error")
            ));
        }
    }
    index
}
