//! Fragment insertion: links, images, code blocks, diagrams and embeds.
//!
//! Every insertion sub-flow produces an [`InsertionRequest`]; [`build_fragment`] turns it
//! into markup text and [`commit_fragment`] splices that text into the draft body at the
//! cursor range captured when the sub-flow opened.

use crate::drafts::DraftStore;
use crate::models::{CursorRange, DraftPatch};
use std::collections::BTreeMap;
use std::str::FromStr;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, strum::Display, strum::AsRefStr, strum::EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum InsertionKind {
    Link,
    Image,
    Code,
    Diagram,
    Embed,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, strum::Display, strum::AsRefStr, strum::EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum EmbedProvider {
    Youtube,
    Vimeo,
    Codepen,
    Gist,
    Twitter,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InsertionRequest {
    Link {
        text: String,
        url: String,
    },
    Image {
        alt: String,
        url: String,
        caption: Option<String>,
    },
    Code {
        language: String,
        filename: Option<String>,
        code: String,
    },
    Diagram {
        source: String,
    },
    Embed {
        provider: EmbedProvider,
        url: String,
    },
}

fn field<'a>(fields: &'a BTreeMap<String, String>, name: &str) -> &'a str {
    fields.get(name).map(|s| s.trim()).unwrap_or("")
}

fn optional(fields: &BTreeMap<String, String>, name: &str) -> Option<String> {
    let v = field(fields, name);
    if v.is_empty() {
        None
    } else {
        Some(v.to_string())
    }
}

impl InsertionRequest {
    pub fn kind(&self) -> InsertionKind {
        match self {
            InsertionRequest::Link { .. } => InsertionKind::Link,
            InsertionRequest::Image { .. } => InsertionKind::Image,
            InsertionRequest::Code { .. } => InsertionKind::Code,
            InsertionRequest::Diagram { .. } => InsertionKind::Diagram,
            InsertionRequest::Embed { .. } => InsertionKind::Embed,
        }
    }

    /// Build a request from a sub-flow's raw form fields.
    pub fn from_fields(
        kind: InsertionKind,
        fields: &BTreeMap<String, String>,
    ) -> Result<Self, ValidationError> {
        let req = match kind {
            InsertionKind::Link => InsertionRequest::Link {
                text: field(fields, "text").to_string(),
                url: field(fields, "url").to_string(),
            },
            InsertionKind::Image => InsertionRequest::Image {
                alt: field(fields, "alt").to_string(),
                url: field(fields, "url").to_string(),
                caption: optional(fields, "caption"),
            },
            InsertionKind::Code => InsertionRequest::Code {
                language: field(fields, "language").to_string(),
                filename: optional(fields, "filename"),
                // Code keeps its indentation.
                code: fields.get("code").cloned().unwrap_or_default(),
            },
            InsertionKind::Diagram => InsertionRequest::Diagram {
                source: fields.get("source").cloned().unwrap_or_default(),
            },
            InsertionKind::Embed => {
                let provider = EmbedProvider::from_str(field(fields, "type"))
                    .map_err(|_| ValidationError::new("type", "Unsupported embed type"))?;
                InsertionRequest::Embed {
                    provider,
                    url: field(fields, "url").to_string(),
                }
            }
        };
        Ok(req)
    }
}

fn validate_url(field: &str, url: &str, allow_relative: bool) -> Result<(), ValidationError> {
    if url.is_empty() {
        return Err(ValidationError::new(field, "URL is required"));
    }
    if url.chars().any(char::is_whitespace) {
        return Err(ValidationError::new(field, "URL must not contain spaces"));
    }
    let absolute = url.starts_with("https://") || url.starts_with("http://");
    let relative = allow_relative && (url.starts_with('/') || url.starts_with('#'));
    if absolute || relative || (allow_relative && url.starts_with("mailto:")) {
        Ok(())
    } else {
        Err(ValidationError::new(field, "URL must start with http:// or https://"))
    }
}

fn escape_label(s: &str) -> String {
    s.replace('[', "\\[").replace(']', "\\]")
}

fn escape_destination(url: &str) -> String {
    url.replace('(', "%28").replace(')', "%29")
}

/// A fence longer than any backtick run inside `content`.
fn fence_for(content: &str) -> String {
    let mut longest = 0;
    let mut run = 0;
    for c in content.chars() {
        if c == '`' {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    "`".repeat(longest.max(2) + 1)
}

fn fenced_block(info: &str, content: &str) -> String {
    let content = content.trim_end_matches('\n');
    let fence = fence_for(content);
    format!("\n{fence}{info}\n{content}\n{fence}\n")
}

pub fn build_fragment(request: &InsertionRequest) -> Result<String, ValidationError> {
    match request {
        InsertionRequest::Link { text, url } => {
            validate_url("url", url, true)?;
            let label = if text.trim().is_empty() {
                url.as_str()
            } else {
                text.trim()
            };
            Ok(format!(
                "[{}]({})",
                escape_label(label),
                escape_destination(url)
            ))
        }
        InsertionRequest::Image { alt, url, caption } => {
            validate_url("url", url, true)?;
            let dest = escape_destination(url);
            let alt = escape_label(alt.trim());
            match caption.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
                Some(c) => Ok(format!("![{alt}]({dest} \"{}\")", c.replace('"', "\\\""))),
                None => Ok(format!("![{alt}]({dest})")),
            }
        }
        InsertionRequest::Code {
            language,
            filename,
            code,
        } => {
            if code.trim().is_empty() {
                return Err(ValidationError::new("code", "Code is required"));
            }
            let language = language.trim();
            if !language
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '#' | '_' | '.'))
            {
                return Err(ValidationError::new("language", "Invalid language name"));
            }
            let mut info = language.to_string();
            if let Some(name) = filename.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
                if name.contains('"') || name.contains('\n') {
                    return Err(ValidationError::new("filename", "Invalid file name"));
                }
                if !info.is_empty() {
                    info.push(' ');
                }
                info.push_str(&format!("title=\"{name}\""));
            }
            Ok(fenced_block(&info, code))
        }
        InsertionRequest::Diagram { source } => {
            if source.trim().is_empty() {
                return Err(ValidationError::new("source", "Diagram source is required"));
            }
            Ok(fenced_block("mermaid", source))
        }
        InsertionRequest::Embed { provider, url } => {
            validate_url("url", url, false)?;
            Ok(format!(
                "\n::embed{{type=\"{provider}\" url=\"{}\"}}\n",
                url.replace('"', "%22")
            ))
        }
    }
}

pub(crate) fn utf16_to_byte_idx(s: &str, pos_utf16: usize) -> usize {
    if pos_utf16 == 0 {
        return 0;
    }
    let mut acc = 0;
    for (i, ch) in s.char_indices() {
        let w = ch.len_utf16();
        if acc + w > pos_utf16 {
            // Inside a surrogate pair: snap to the char start.
            return i;
        }
        acc += w;
        if acc == pos_utf16 {
            return i + ch.len_utf8();
        }
    }
    s.len()
}

pub(crate) fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count()
}

/// Replace `range` of the body with `fragment` in a single store update.
///
/// A stale range is clamped into the current body. Returns the caret position just
/// after the inserted fragment.
pub fn commit_fragment(store: &mut DraftStore, fragment: &str, range: CursorRange) -> CursorRange {
    let draft = store.get();
    let body = draft.body.as_str();
    let range = range.clamped(utf16_len(body));

    let start = utf16_to_byte_idx(body, range.start);
    let end = utf16_to_byte_idx(body, range.end).max(start);

    let mut next = String::with_capacity(body.len() - (end - start) + fragment.len());
    next.push_str(&body[..start]);
    next.push_str(fragment);
    next.push_str(&body[end..]);

    let caret = utf16_len(&body[..start]) + utf16_len(fragment);
    store.update(DraftPatch::body(next));
    CursorRange::caret(caret)
}
