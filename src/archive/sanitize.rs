//! Archive path sanitization and per-folder name allocation.

use std::collections::{HashMap, HashSet};

/// Longest sanitized segment, in characters.
const MAX_SEGMENT_CHARS: usize = 120;

/// Names Windows refuses as file names, whatever the extension.
const RESERVED_NAMES: &[&str] = &[
    "con", "prn", "aux", "nul", "com1", "com2", "com3", "com4", "com5", "com6", "com7", "com8",
    "com9", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
];

/// Turns a user-supplied name into one safe archive path segment.
///
/// Separators, control and reserved characters become `_`, runs of `_`
/// collapse, leading and trailing dots and underscores are trimmed. The
/// result never contains `/`, `\`, NUL or `..` on its own, and is never empty.
#[must_use]
pub fn sanitize_segment(value: &str) -> String {
    let mut out = String::new();
    let mut prev_sep = false;
    for ch in value.chars() {
        let mapped = match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_whitespace() || c.is_control() => '_',
            c if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') => c,
            _ => '_',
        };
        if mapped == '_' {
            if !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else {
            out.push(mapped);
            prev_sep = false;
        }
    }

    let trimmed: String = out
        .trim_matches(['_', '.'])
        .chars()
        .take(MAX_SEGMENT_CHARS)
        .collect();
    let trimmed = trimmed.trim_end_matches(['_', '.']).to_string();

    if trimmed.is_empty() {
        return "untitled".to_string();
    }
    let base = trimmed.split('.').next().unwrap_or_default().to_ascii_lowercase();
    if RESERVED_NAMES.contains(&base.as_str()) {
        return format!("_{trimmed}");
    }
    trimmed
}

/// Sanitized stem of a file name: `notes.txt` gives `notes`.
///
/// Only a recognizable extension is dropped, so `v1.2` stays `v1.2`.
#[must_use]
pub fn sanitize_stem(name: &str) -> String {
    let is_extension = |ext: &str| {
        ext.chars().all(|c| c.is_ascii_alphanumeric()) && ext.chars().any(|c| c.is_ascii_alphabetic())
    };
    let stem = match crate::classify::extension_of(name) {
        Some(ext) if is_extension(&ext) => &name[..name.len() - ext.len() - 1],
        _ => name,
    };
    sanitize_segment(stem)
}

/// Hands out unique file names per archive folder.
///
/// The first claim of `notes.md` in a folder gets `notes.md`, later claims
/// get `notes_1.md`, `notes_2.md`, ... in claim order.
#[derive(Debug, Default)]
pub struct NameAllocator {
    taken: HashMap<String, HashSet<String>>,
}

impl NameAllocator {
    /// Creates an empty allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims a unique `stem[_n]ext` inside `folder`. `ext` includes its dot.
    pub fn claim(&mut self, folder: &str, stem: &str, ext: &str) -> String {
        let taken = self.taken.entry(folder.to_string()).or_default();
        let mut candidate = format!("{stem}{ext}");
        let mut suffix = 1;
        while !taken.insert(candidate.to_ascii_lowercase()) {
            candidate = format!("{stem}_{suffix}{ext}");
            suffix += 1;
        }
        candidate
    }

    /// Claims a file name, splitting `name` at its last dot.
    pub fn claim_file(&mut self, folder: &str, name: &str) -> String {
        match name.rfind('.') {
            Some(pos) if pos > 0 => self.claim(folder, &name[..pos], &name[pos..]),
            _ => self.claim(folder, name, ""),
        }
    }
}
