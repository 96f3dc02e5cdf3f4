//! Link occurrence extraction from document text.
//!
//! Recognizes wikilinks, embeds, markdown links/images, inline tags and
//! frontmatter tags. Fenced code blocks and inline code spans are skipped.
//! Every occurrence keeps the exact raw text it was matched from, which the
//! rewrite subsystem relies on for byte-exact replacement.

use std::ops::Range;

use serde::Serialize;

use crate::types::LinkKind;

/// How a link names its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetForm {
    /// Fragment-only reference into the containing document (`[[#Heading]]`).
    SelfRef,
    /// Starts with `./` or `../`; resolved against the source's directory.
    Relative,
    /// Contains a `/`; resolved from the vault root first.
    PathQualified,
    /// A bare name resolved through the basename index.
    Basename,
    /// A tag label, never a path.
    Tag,
}

/// One link found in a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkOccurrence {
    pub kind: LinkKind,
    /// Exact literal text, e.g. `[[A#H|alias]]` or `[t](A.md#f)`.
    pub raw: String,
    /// Target path or name without fragment or alias; tag name for tags.
    pub target: String,
    pub fragment: Option<String>,
    pub form: TargetForm,
    /// 1-based.
    pub line_start: usize,
    pub line_end: usize,
}

impl LinkOccurrence {
    /// Basename-form links are the ones that become ambiguous when a second
    /// document with the same basename appears.
    pub fn is_basename_form(&self) -> bool {
        self.form == TargetForm::Basename
    }
}

/// Extract every link occurrence from `text`, in document order.
pub fn parse_links(text: &str) -> Vec<LinkOccurrence> {
    let lines: Vec<&str> = text
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .collect();

    let mut out = Vec::new();
    let body_start = parse_frontmatter(&lines, &mut out);

    let mut fence: Option<(char, usize)> = None;
    for (idx, line) in lines.iter().enumerate().skip(body_start) {
        let line_no = idx + 1;
        if let Some(marker) = fence_marker(line) {
            match fence {
                None => fence = Some(marker),
                Some((ch, len)) if marker.0 == ch && marker.1 >= len => fence = None,
                Some(_) => {}
            }
            continue;
        }
        if fence.is_some() {
            continue;
        }
        parse_line(line, line_no, &mut out);
    }
    out
}

/// Re-classify a stored raw link. Returns `None` if `raw` is not a link.
pub fn parse_raw(kind: LinkKind, raw: &str) -> Option<LinkOccurrence> {
    if kind == LinkKind::Tag {
        let name = raw.trim_start_matches('#');
        return (!name.is_empty()).then(|| tag_occurrence(raw, name, 0));
    }
    let mut out = Vec::new();
    parse_line(raw, 0, &mut out);
    out.into_iter().find(|o| o.kind == kind)
}

/// Whether a stored raw link names its target by basename only.
pub fn is_basename_raw(kind: LinkKind, raw: &str) -> bool {
    parse_raw(kind, raw).is_some_and(|o| o.is_basename_form())
}

/// Byte ranges of backtick-delimited inline code spans in a single line.
///
/// A run of N backticks opens a span closed by the next run of exactly N
/// backticks; an unclosed run is literal text.
pub fn code_spans(line: &str) -> Vec<Range<usize>> {
    let bytes = line.as_bytes();
    let mut spans = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'`' {
            i += 1;
            continue;
        }
        let open_len = run_length(bytes, i);
        let mut j = i + open_len;
        let mut closed = None;
        while j < bytes.len() {
            if bytes[j] == b'`' {
                let len = run_length(bytes, j);
                if len == open_len {
                    closed = Some(j + len);
                    break;
                }
                j += len;
            } else {
                j += 1;
            }
        }
        match closed {
            Some(end) => {
                spans.push(i..end);
                i = end;
            }
            None => i += open_len,
        }
    }
    spans
}

fn run_length(bytes: &[u8], start: usize) -> usize {
    bytes[start..].iter().take_while(|&&b| b == b'`').count()
}

fn fence_marker(line: &str) -> Option<(char, usize)> {
    let trimmed = line.trim_start();
    for ch in ['`', '~'] {
        let len = trimmed.chars().take_while(|&c| c == ch).count();
        if len >= 3 {
            return Some((ch, len));
        }
    }
    None
}

fn classify(target: &str) -> TargetForm {
    if target.is_empty() {
        TargetForm::SelfRef
    } else if target == "."
        || target == ".."
        || target.starts_with("./")
        || target.starts_with("../")
    {
        TargetForm::Relative
    } else if target.contains('/') {
        TargetForm::PathQualified
    } else {
        TargetForm::Basename
    }
}

fn is_external(url: &str) -> bool {
    url.contains("://")
        || ["mailto:", "tel:", "data:", "javascript:"]
            .iter()
            .any(|scheme| url.get(..scheme.len()).is_some_and(|p| p.eq_ignore_ascii_case(scheme)))
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Split `Target#Heading|alias` into (target, fragment).
fn split_wiki_body(body: &str) -> (String, Option<String>) {
    let target_part = body.split('|').next().unwrap_or(body);
    // `[[A\|alias]]` inside tables escapes the pipe.
    let target_part = target_part.strip_suffix('\\').unwrap_or(target_part);
    match target_part.split_once('#') {
        Some((target, fragment)) => (target.trim().to_string(), non_empty(fragment)),
        None => (target_part.trim().to_string(), None),
    }
}

/// Split a markdown URL into (decoded path, fragment).
fn split_url(url: &str) -> (String, Option<String>) {
    let (path, fragment) = match url.split_once('#') {
        Some((path, fragment)) => (path, non_empty(fragment)),
        None => (url, None),
    };
    (path.replace("%20", " "), fragment)
}

fn tag_occurrence(raw: &str, name: &str, line_no: usize) -> LinkOccurrence {
    LinkOccurrence {
        kind: LinkKind::Tag,
        raw: raw.to_string(),
        target: name.to_string(),
        fragment: None,
        form: TargetForm::Tag,
        line_start: line_no,
        line_end: line_no,
    }
}

fn is_tag_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '/')
}

fn parse_line(line: &str, line_no: usize, out: &mut Vec<LinkOccurrence>) {
    let spans = code_spans(line);
    let bytes = line.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if let Some(span) = spans.iter().find(|s| s.contains(&i)) {
            i = span.end;
            continue;
        }
        let escaped = i > 0 && bytes[i - 1] == b'\\';
        let rest = &line[i..];

        if !escaped && (rest.starts_with("![[") || rest.starts_with("[[")) {
            let embed = rest.starts_with('!');
            let open = if embed { 3 } else { 2 };
            if let Some(close) = rest[open..].find("]]") {
                let body = &rest[open..open + close];
                let end = open + close + 2;
                if !body.is_empty() && !body.contains('[') {
                    let (target, fragment) = split_wiki_body(body);
                    out.push(LinkOccurrence {
                        kind: if embed { LinkKind::Embed } else { LinkKind::Wikilink },
                        raw: rest[..end].to_string(),
                        form: classify(&target),
                        target,
                        fragment,
                        line_start: line_no,
                        line_end: line_no,
                    });
                }
                i += end;
                continue;
            }
        }

        if !escaped && (rest.starts_with("![") || rest.starts_with('[')) {
            if let Some((occurrence, consumed)) = parse_markdown_link(rest, line_no) {
                if let Some(occ) = occurrence {
                    out.push(occ);
                }
                i += consumed;
                continue;
            }
        }

        if !escaped
            && rest.starts_with('#')
            && (i == 0 || line[..i].ends_with(char::is_whitespace))
        {
            let name: String = rest[1..].chars().take_while(|&c| is_tag_char(c)).collect();
            let name = name.trim_end_matches('/');
            if !name.is_empty() && !name.chars().all(|c| c.is_ascii_digit()) {
                let raw = &rest[..=name.len()];
                out.push(tag_occurrence(raw, name, line_no));
                i += raw.len();
                continue;
            }
        }

        i += rest.chars().next().map_or(1, char::len_utf8);
    }
}

/// Parse `[text](url)` / `![alt](url)` at the start of `rest`.
///
/// Returns the occurrence (if the link is internal) and the number of bytes
/// consumed, or `None` if `rest` does not start a markdown link.
fn parse_markdown_link(rest: &str, line_no: usize) -> Option<(Option<LinkOccurrence>, usize)> {
    let text_start = if rest.starts_with('!') { 2 } else { 1 };
    let text_end = text_start + closing_bracket(&rest[text_start..])?;
    if !rest[text_end + 1..].starts_with('(') {
        return None;
    }
    let url_start = text_end + 2;
    let url_end = url_start + rest[url_start..].find(')')?;
    let consumed = url_end + 1;

    let inner = rest[url_start..url_end].trim();
    let url = if let Some(bracketed) = inner.strip_prefix('<') {
        bracketed.split('>').next().unwrap_or_default()
    } else {
        inner.split_whitespace().next().unwrap_or_default()
    };
    if url.is_empty() || is_external(url) {
        return Some((None, consumed));
    }

    let (target, fragment) = split_url(url);
    let occurrence = LinkOccurrence {
        kind: LinkKind::Markdown,
        raw: rest[..consumed].to_string(),
        form: classify(&target),
        target,
        fragment,
        line_start: line_no,
        line_end: line_no,
    };
    Some((Some(occurrence), consumed))
}

/// Byte offset of the `]` closing link text, skipping nested and escaped brackets.
fn closing_bracket(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'[' => depth += 1,
            b']' if depth == 0 => return Some(i),
            b']' => depth -= 1,
            _ => {}
        }
        i += 1;
    }
    None
}

/// Parse `tags:` entries of a leading YAML frontmatter block.
///
/// Returns the index of the first body line.
fn parse_frontmatter(lines: &[&str], out: &mut Vec<LinkOccurrence>) -> usize {
    if lines.first().map(|l| l.trim_end()) != Some("---") {
        return 0;
    }
    let Some(close) = lines
        .iter()
        .skip(1)
        .position(|l| matches!(l.trim_end(), "---" | "..."))
        .map(|p| p + 1)
    else {
        return 0;
    };

    let mut in_tag_list = false;
    for (idx, line) in lines.iter().enumerate().take(close).skip(1) {
        let line_no = idx + 1;
        let trimmed = line.trim();

        if in_tag_list {
            if let Some(item) = trimmed.strip_prefix("- ") {
                push_frontmatter_tag(item, line_no, out);
                continue;
            }
            if trimmed.is_empty() {
                continue;
            }
            in_tag_list = false;
        }

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        if !matches!(key.trim(), "tags" | "tag") || line.starts_with(char::is_whitespace) {
            continue;
        }
        let value = value.trim();
        if value.is_empty() {
            in_tag_list = true;
            continue;
        }
        let value = value
            .strip_prefix('[')
            .and_then(|v| v.strip_suffix(']'))
            .unwrap_or(value);
        for item in value.split(',') {
            push_frontmatter_tag(item, line_no, out);
        }
    }
    close + 1
}

fn push_frontmatter_tag(item: &str, line_no: usize, out: &mut Vec<LinkOccurrence>) {
    let raw = item.trim();
    let name = raw.trim_matches(|c| c == '"' || c == '\'').trim_start_matches('#');
    if !name.is_empty() && name.chars().all(is_tag_char) {
        out.push(tag_occurrence(raw, name, line_no));
    }
}
