//! Archive category classification.
//!
//! Maps a request type plus file extension to the top-level archive folder.
//! Used only for layout, never for picking a converter.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::RequestType;

const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "docx", "doc", "odt", "rtf", "txt", "epub", "pptx"];
const DATA_EXTENSIONS: &[&str] = &["csv", "json", "yaml", "yml", "xlsx"];
const MULTIMEDIA_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "m4a", "mp4", "mov", "avi", "webm"];

/// Top-level archive folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Office documents, PDFs, plain text.
    Documents,
    /// Tabular and structured data.
    Data,
    /// Web pages, crawls, YouTube.
    Web,
    /// Audio and video.
    Multimedia,
    /// Everything else.
    Others,
}

impl Category {
    /// Folder name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Documents => "documents",
            Self::Data => "data",
            Self::Web => "web",
            Self::Multimedia => "multimedia",
            Self::Others => "others",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies an item. Total and pure.
#[must_use]
pub fn classify(request_type: RequestType, extension: Option<&str>) -> Category {
    if request_type.is_web() {
        return Category::Web;
    }

    let Some(ext) = extension.map(normalize_extension) else {
        return Category::Others;
    };

    if DOCUMENT_EXTENSIONS.contains(&ext.as_str()) {
        Category::Documents
    } else if DATA_EXTENSIONS.contains(&ext.as_str()) {
        Category::Data
    } else if MULTIMEDIA_EXTENSIONS.contains(&ext.as_str()) {
        Category::Multimedia
    } else {
        Category::Others
    }
}

/// Lowercased extension of a file name, without the dot.
#[must_use]
pub fn extension_of(name: &str) -> Option<String> {
    let file_name = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > 10 {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}
