//! Plain text, Markdown and RTF converters.

use async_trait::async_trait;

use super::{ConvertError, Converted, Converter, ConverterInput, ConverterKind, title_from_name};

/// Passes text and Markdown through, adding a title heading when none exists.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextConverter;

#[async_trait]
impl Converter for TextConverter {
    async fn convert(
        &self,
        kind: ConverterKind,
        input: ConverterInput<'_>,
    ) -> Result<Converted, ConvertError> {
        let text = input.text(kind)?;
        Ok(Converted::markdown(with_title(text, input.name)))
    }
}

/// Strips RTF control words and groups down to the document text.
#[derive(Debug, Default, Clone, Copy)]
pub struct RtfConverter;

#[async_trait]
impl Converter for RtfConverter {
    async fn convert(
        &self,
        kind: ConverterKind,
        input: ConverterInput<'_>,
    ) -> Result<Converted, ConvertError> {
        let source = input.text(kind)?;
        if !source.trim_start().starts_with("{\\rtf") {
            return Err(ConvertError::malformed(input.name, "rtf", "missing {\\rtf header"));
        }
        let text = strip_rtf(source);
        Ok(Converted::markdown(with_title(&text, input.name)))
    }
}

fn with_title(text: &str, name: &str) -> String {
    let body = text.trim();
    if body.starts_with("# ") {
        return format!("{body}\n");
    }
    let title = title_from_name(name);
    if body.is_empty() {
        format!("# {title}\n")
    } else {
        format!("# {title}\n\n{body}\n")
    }
}

// Destinations whose contents are metadata, not body text.
const SKIPPED_DESTINATIONS: &[&str] = &[
    "fonttbl",
    "colortbl",
    "stylesheet",
    "info",
    "pict",
    "header",
    "footer",
    "listtable",
    "listoverridetable",
    "generator",
    "themedata",
    "datastore",
    "latentstyles",
];

/// Extracts readable text from an RTF document.
///
/// Paragraph and line breaks become newlines; `\'hh` escapes are decoded as
/// Windows-1252/Latin-1; `\uN` escapes are decoded with their fallback
/// character skipped.
#[must_use]
pub fn strip_rtf(source: &str) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len() / 2);
    // Per-group "skip" flags; a group inherits its parent's flag.
    let mut skip_stack: Vec<bool> = vec![false];
    let mut pending_unicode_skip = 0usize;
    let mut i = 0;

    while i < chars.len() {
        let skipping = skip_stack.last().copied().unwrap_or(false);
        match chars[i] {
            '{' => {
                skip_stack.push(skipping);
                i += 1;
            }
            '}' => {
                if skip_stack.len() > 1 {
                    skip_stack.pop();
                }
                i += 1;
            }
            '\\' => {
                i += 1;
                let Some(&next) = chars.get(i) else { break };
                match next {
                    '\\' | '{' | '}' => {
                        if !skipping {
                            out.push(next);
                        }
                        i += 1;
                    }
                    '*' => {
                        if let Some(flag) = skip_stack.last_mut() {
                            *flag = true;
                        }
                        i += 1;
                    }
                    '\'' => {
                        let hex: String = chars.iter().skip(i + 1).take(2).collect();
                        i += 1 + hex.len();
                        if let Ok(byte) = u8::from_str_radix(&hex, 16)
                            && !skipping
                        {
                            if pending_unicode_skip > 0 {
                                pending_unicode_skip -= 1;
                            } else {
                                out.push(char::from(byte));
                            }
                        }
                    }
                    '~' => {
                        if !skipping {
                            out.push('\u{a0}');
                        }
                        i += 1;
                    }
                    '\n' | '\r' => {
                        if !skipping {
                            out.push('\n');
                        }
                        i += 1;
                    }
                    c if c.is_ascii_alphabetic() => {
                        let start = i;
                        while i < chars.len() && chars[i].is_ascii_alphabetic() {
                            i += 1;
                        }
                        let word: String = chars[start..i].iter().collect();
                        let num_start = i;
                        if i < chars.len() && chars[i] == '-' {
                            i += 1;
                        }
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                        let param: Option<i32> = chars[num_start..i]
                            .iter()
                            .collect::<String>()
                            .parse()
                            .ok();
                        if i < chars.len() && chars[i] == ' ' {
                            i += 1;
                        }

                        if SKIPPED_DESTINATIONS.contains(&word.as_str()) {
                            if let Some(flag) = skip_stack.last_mut() {
                                *flag = true;
                            }
                            continue;
                        }
                        if skipping {
                            continue;
                        }
                        match word.as_str() {
                            "par" | "line" | "sect" | "page" => out.push('\n'),
                            "tab" | "cell" => out.push('\t'),
                            "row" => out.push('\n'),
                            "emdash" => out.push('\u{2014}'),
                            "endash" => out.push('\u{2013}'),
                            "bullet" => out.push('\u{2022}'),
                            "lquote" => out.push('\u{2018}'),
                            "rquote" => out.push('\u{2019}'),
                            "ldblquote" => out.push('\u{201c}'),
                            "rdblquote" => out.push('\u{201d}'),
                            "u" => {
                                if let Some(code) = param {
                                    let code = if code < 0 { code + 65_536 } else { code };
                                    if let Some(ch) = u32::try_from(code).ok().and_then(char::from_u32)
                                    {
                                        out.push(ch);
                                    }
                                    pending_unicode_skip = 1;
                                }
                            }
                            _ => {}
                        }
                    }
                    _ => {
                        i += 1;
                    }
                }
            }
            '\r' | '\n' => {
                i += 1;
            }
            c => {
                if !skipping {
                    if pending_unicode_skip > 0 {
                        pending_unicode_skip -= 1;
                    } else {
                        out.push(c);
                    }
                }
                i += 1;
            }
        }
    }

    collapse_blank_lines(&out)
}

fn collapse_blank_lines(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        result.push_str(line);
        result.push('\n');
    }
    result.trim().to_string()
}
