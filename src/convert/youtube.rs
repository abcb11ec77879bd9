//! YouTube link converter backed by the oEmbed metadata endpoint.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use url::Url;

use super::web::fetch_images;
use super::{ConvertError, Converted, Converter, ConverterInput, ConverterKind};
use crate::fetch::{FetchError, HttpFetcher, parse_http_url};

/// Public oEmbed endpoint.
pub const DEFAULT_OEMBED_ENDPOINT: &str = "https://www.youtube.com/oembed";

#[allow(clippy::expect_used)]
static VIDEO_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("video id regex is valid"));

const YOUTUBE_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtube-nocookie.com",
    "www.youtube-nocookie.com",
];

/// Extracts the 11-character video id from any common YouTube URL form.
#[must_use]
pub fn youtube_video_id(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    let candidate = if host == "youtu.be" {
        url.path_segments()?.next().map(str::to_string)
    } else if YOUTUBE_HOSTS.contains(&host.as_str()) {
        let mut segments = url.path_segments()?;
        match segments.next() {
            Some("watch") => url
                .query_pairs()
                .find(|(key, _)| key == "v")
                .map(|(_, value)| value.into_owned()),
            Some("shorts" | "embed" | "live" | "v") => segments.next().map(str::to_string),
            _ => None,
        }
    } else {
        None
    };
    candidate.filter(|id| VIDEO_ID.is_match(id))
}

#[derive(Debug, Deserialize)]
struct OEmbed {
    title: String,
    #[serde(default)]
    author_name: Option<String>,
    #[serde(default)]
    author_url: Option<String>,
    #[serde(default)]
    thumbnail_url: Option<String>,
}

/// Turns a YouTube link into a metadata note.
#[derive(Debug, Clone)]
pub struct YoutubeConverter {
    fetcher: HttpFetcher,
    oembed_endpoint: String,
}

impl YoutubeConverter {
    /// Creates a converter that queries `oembed_endpoint`.
    pub fn new(fetcher: HttpFetcher, oembed_endpoint: impl Into<String>) -> Self {
        Self {
            fetcher,
            oembed_endpoint: oembed_endpoint.into(),
        }
    }
}

#[async_trait]
impl Converter for YoutubeConverter {
    async fn convert(
        &self,
        kind: ConverterKind,
        input: ConverterInput<'_>,
    ) -> Result<Converted, ConvertError> {
        let raw = input.url(kind)?;
        let url = parse_http_url(raw)?;
        let video_id = youtube_video_id(&url).ok_or_else(|| {
            ConvertError::Fetch(FetchError::invalid_url(raw))
        })?;
        let watch_url = format!("https://www.youtube.com/watch?v={video_id}");

        let lookup = format!(
            "{}?url={}&format=json",
            self.oembed_endpoint,
            urlencoding::encode(&watch_url)
        );
        let body = self.fetcher.fetch(&lookup).await?;
        let meta: OEmbed = serde_json::from_slice(&body.bytes)
            .map_err(|e| FetchError::decode(&lookup, e.to_string()))?;

        let mut content = format!("# {}\n\n", meta.title.trim());
        if let Some(author) = meta.author_name.as_deref() {
            match meta.author_url.as_deref() {
                Some(author_url) => content.push_str(&format!("- **Channel:** [{author}]({author_url})\n")),
                None => content.push_str(&format!("- **Channel:** {author}\n")),
            }
        }
        content.push_str(&format!("- **Video:** <{watch_url}>\n"));
        content.push_str(&format!("- **Video ID:** `{video_id}`\n"));

        let mut converted = Converted::default();
        if let Some(thumbnail) = meta.thumbnail_url.as_deref().and_then(|t| Url::parse(t).ok()) {
            content.push_str(&format!("\n![Thumbnail]({thumbnail})\n"));
            if input.options.include_images {
                let (images, warnings) = fetch_images(&self.fetcher, &[thumbnail]).await;
                converted.images = images;
                converted.warnings = warnings;
            }
        }

        converted.content = content;
        converted.source_url = Some(watch_url);
        Ok(converted)
    }
}
