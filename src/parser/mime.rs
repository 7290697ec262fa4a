//! MIME body extraction: turns a raw message into bounded, safe plaintext.
//!
//! Messages are parsed with `mail-parser`. Part selection for `multipart/*`
//! bodies: the first `text/plain` part wins and ends the scan; otherwise the
//! last `text/html` part seen is used, stripped to text. Nested multiparts are
//! searched the same way. A part without a `Content-Type` header is
//! `text/plain` (RFC 2045 §5.1).

use std::panic::{self, AssertUnwindSafe};

use mail_parser::{Message, MessageParser, MessagePart, MessagePartId, MimeHeaders, PartType};
use tracing::{debug, warn};

use crate::parser::encoding::{decode_base64, decode_text, TransferEncoding};
use crate::parser::header::{decode_header_bytes, get_header, split_message, unfold_headers};

/// Maximum number of characters kept from a body.
pub const MAX_CONTENT_CHARS: usize = 5000;

/// Appended to a body cut at the character limit.
pub const TRUNCATION_MARKER: &str = "...";

/// Stored when no usable text could be found.
pub const EMPTY_BODY_PLACEHOLDER: &str = "(no text content)";

/// Stored when extraction itself failed.
pub const ERROR_PLACEHOLDER: &str = "(error processing message)";

/// Maximum depth for nested multipart parsing (to bound work on adversarial input).
const MAX_DEPTH: usize = 10;

/// Extract the body of a raw message as plaintext of at most
/// [`MAX_CONTENT_CHARS`] characters plus [`TRUNCATION_MARKER`].
///
/// Never fails and never returns an empty string.
pub fn extract_body(raw_message: &[u8]) -> String {
    extract_body_bounded(raw_message, MAX_CONTENT_CHARS)
}

/// Like [`extract_body`] with an explicit character limit.
pub fn extract_body_bounded(raw_message: &[u8], max_chars: usize) -> String {
    match panic::catch_unwind(AssertUnwindSafe(|| extract(raw_message, max_chars))) {
        Ok(text) => text,
        Err(_) => {
            warn!(len = raw_message.len(), "Body extraction failed, storing placeholder");
            ERROR_PLACEHOLDER.to_string()
        }
    }
}

fn extract(raw_message: &[u8], max_chars: usize) -> String {
    let Some((header_block, body)) = split_message(raw_message) else {
        debug!("No header/body separator, using whole input as body");
        return finish(&decode_text(raw_message, None), max_chars);
    };

    let headers = unfold_headers(&decode_header_bytes(header_block));
    let content_type = get_header(&headers, "content-type")
        .map(ContentType::parse)
        .unwrap_or_default();

    if content_type.is_multipart() && content_type.param("boundary").is_none() {
        let Some(boundary) = sniff_boundary(body) else {
            debug!("Multipart message without boundary, using raw body");
            return finish(
                &decode_text(body, content_type.param("charset")),
                max_chars,
            );
        };
        debug!(%boundary, "Multipart message without boundary parameter, using sniffed one");
        let mut rebuilt = format!(
            "Content-Type: {}; boundary=\"{boundary}\"\r\n\r\n",
            content_type.mime
        )
        .into_bytes();
        rebuilt.extend_from_slice(body);
        let text = parsed_text(&rebuilt, true).unwrap_or_default();
        return finish(&text, max_chars);
    }

    let text = parsed_text(raw_message, content_type.is_multipart()).unwrap_or_else(|| {
        debug!("mail-parser could not parse message, using fallback");
        extract_body_fallback(&headers, &content_type, body)
    });
    finish(&text, max_chars)
}

/// Parse `raw` and return the text of the selected part, or an empty string
/// when no part qualifies. `None` when `mail-parser` rejects the message.
fn parsed_text(raw: &[u8], multipart: bool) -> Option<String> {
    let message = MessageParser::default().parse(raw)?;

    // A multipart whose delimiters never appear has no parts to offer, and
    // its raw body is not text.
    let root_is_multipart = message
        .part(0)
        .is_some_and(|root| matches!(root.body, PartType::Multipart(_)));
    if multipart && !root_is_multipart {
        debug!("Multipart message without any parts");
        return Some(String::new());
    }

    let text = match select_part(&message, 0, 0) {
        Some((kind, id)) => message
            .part(id)
            .map(|part| part_text(raw, part, kind))
            .unwrap_or_default(),
        None => {
            debug!("No text part found in message");
            String::new()
        }
    };
    Some(text)
}

/// Fallback when `mail-parser` cannot parse the message: the top-level body,
/// decoded according to the top-level headers.
fn extract_body_fallback(
    headers: &[(String, String)],
    content_type: &ContentType,
    body: &[u8],
) -> String {
    if content_type.is_multipart() {
        return String::new();
    }
    let encoding = get_header(headers, "content-transfer-encoding")
        .map(TransferEncoding::parse)
        .unwrap_or(TransferEncoding::Identity);
    let text = decode_text(&encoding.decode(body), content_type.param("charset"));
    if content_type.mime == "text/html" {
        html_to_text(&text)
    } else {
        text
    }
}

/// Trim, bound, and substitute the placeholder for empty text.
fn finish(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return EMPTY_BODY_PLACEHOLDER.to_string();
    }
    truncate_chars(trimmed, max_chars)
}

/// Cut `text` to `max_chars` characters, appending [`TRUNCATION_MARKER`] when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => {
            let mut out = String::with_capacity(cut + TRUNCATION_MARKER.len());
            out.push_str(&text[..cut]);
            out.push_str(TRUNCATION_MARKER);
            out
        }
        None => text.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextKind {
    Plain,
    Html,
}

/// Pick the part that supplies the body, starting at part `id`.
///
/// A non-multipart part is taken as-is: HTML if it parsed as HTML, plain
/// text otherwise. Attached messages are never descended into.
fn select_part(
    message: &Message<'_>,
    id: MessagePartId,
    depth: usize,
) -> Option<(TextKind, MessagePartId)> {
    let part = message.part(id)?;
    match &part.body {
        PartType::Multipart(children) => {
            if depth >= MAX_DEPTH {
                warn!(depth, "Multipart nesting too deep, ignoring inner parts");
                return None;
            }
            let mut html = None;
            for &child_id in children {
                let Some(child) = message.part(child_id) else {
                    continue;
                };
                let found = match &child.body {
                    PartType::Multipart(_) => select_part(message, child_id, depth + 1),
                    PartType::Message(_) => None,
                    _ => text_kind(child).map(|kind| (kind, child_id)),
                };
                match found {
                    Some((TextKind::Plain, _)) => return found,
                    Some(_) => html = found,
                    None => {}
                }
            }
            html
        }
        PartType::Html(_) => Some((TextKind::Html, id)),
        PartType::Message(_) => None,
        _ => Some((TextKind::Plain, id)),
    }
}

/// Whether a part inside a multipart is a text candidate.
fn text_kind(part: &MessagePart<'_>) -> Option<TextKind> {
    let Some(content_type) = part.content_type() else {
        return Some(TextKind::Plain);
    };
    if !content_type.ctype().eq_ignore_ascii_case("text") {
        return None;
    }
    match content_type.subtype() {
        None => Some(TextKind::Plain),
        Some(sub) if sub.eq_ignore_ascii_case("plain") => Some(TextKind::Plain),
        Some(sub) if sub.eq_ignore_ascii_case("html") => Some(TextKind::Html),
        Some(_) => None,
    }
}

/// Decoded text of the selected part, HTML already stripped.
///
/// A part whose encoding does not undo cleanly is read from the raw
/// message instead, so undecodable base64 is kept verbatim.
fn part_text(raw: &[u8], part: &MessagePart<'_>, kind: TextKind) -> String {
    let encoding = part
        .content_transfer_encoding()
        .map(TransferEncoding::parse)
        .unwrap_or(TransferEncoding::Identity);
    let raw_body = raw
        .get(part.raw_body_offset()..part.raw_end_offset())
        .unwrap_or_default();

    let undecodable = part.is_encoding_problem
        || (encoding == TransferEncoding::Base64 && decode_base64(raw_body).is_none());
    let text = if undecodable {
        debug!(len = raw_body.len(), "Part did not decode cleanly, using raw body");
        decode_text(&encoding.decode(raw_body), part_charset(part))
    } else {
        match &part.body {
            PartType::Text(text) | PartType::Html(text) => text.to_string(),
            PartType::Binary(bytes) | PartType::InlineBinary(bytes) => {
                decode_text(bytes, part_charset(part))
            }
            PartType::Message(_) | PartType::Multipart(_) => String::new(),
        }
    };
    match kind {
        TextKind::Plain => text,
        TextKind::Html => html_to_text(&text),
    }
}

fn part_charset<'a>(part: &'a MessagePart<'_>) -> Option<&'a str> {
    part.content_type().and_then(|ct| ct.attribute("charset"))
}

/// Guess the boundary of a multipart body that did not declare one,
/// from its first `--` delimiter line.
fn sniff_boundary(body: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(body);
    text.lines()
        .map(str::trim_end)
        .find_map(|line| line.strip_prefix("--"))
        .map(|b| b.trim_end_matches("--").to_string())
        .filter(|b| !b.is_empty())
}

/// A parsed `Content-Type` value.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentType {
    /// Lowercase `type/subtype`.
    pub mime: String,
    /// Parameters with lowercase names and unquoted values.
    pub params: Vec<(String, String)>,
}

impl Default for ContentType {
    fn default() -> Self {
        Self {
            mime: "text/plain".to_string(),
            params: Vec::new(),
        }
    }
}

impl ContentType {
    /// Parse e.g. `multipart/alternative; boundary="b1"; charset=utf-8`.
    pub fn parse(value: &str) -> Self {
        let mut segments = split_params(value).into_iter();
        let mime = segments
            .next()
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "text/plain".to_string());

        let params = segments
            .filter_map(|segment| {
                let (name, value) = segment.split_once('=')?;
                let value = value.trim();
                let value = value
                    .strip_prefix('"')
                    .and_then(|v| v.strip_suffix('"'))
                    .unwrap_or(value);
                Some((name.trim().to_ascii_lowercase(), value.to_string()))
            })
            .collect();

        Self { mime, params }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_multipart(&self) -> bool {
        self.mime.starts_with("multipart/")
    }
}

/// Split on `;` outside double quotes.
fn split_params(value: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, ch) in value.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                segments.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    segments.push(&value[start..]);
    segments
}

/// Convert HTML to plain text.
///
/// - Removes `<script>` and `<style>` blocks with their content
/// - Turns `<br>` into a line break and `</p>` into a paragraph break
/// - Strips every other tag
/// - Decodes `&nbsp; &amp; &lt; &gt; &quot; &#39; &apos;`
/// - Collapses whitespace runs to one space and blank-line runs to one blank line
pub fn html_to_text(html: &str) -> String {
    let mut text = remove_tag_block(html, "script");
    text = remove_tag_block(&text, "style");

    let mut result = String::with_capacity(text.len());
    let mut rest = text.as_str();
    while let Some(start) = rest.find('<') {
        result.push_str(&rest[..start]);
        let after = &rest[start..];
        let Some(end) = after.find('>') else {
            // A lone `<` is not a tag: drop it and keep the text after it.
            rest = &after[1..];
            continue;
        };
        let tag = after[1..end].trim().to_ascii_lowercase();
        let name = tag
            .trim_start_matches('/')
            .split(|c: char| c.is_whitespace() || c == '/')
            .next()
            .unwrap_or("");
        match name {
            "br" => result.push('\n'),
            "p" if tag.starts_with('/') => result.push_str("\n\n"),
            "div" | "tr" | "li" | "ul" | "ol" | "table" | "blockquote" | "h1" | "h2" | "h3"
            | "h4" | "h5" | "h6" => result.push('\n'),
            "td" | "th" => result.push(' '),
            _ => {}
        }
        rest = &after[end + 1..];
    }
    result.push_str(rest);

    // Tag characters can only reappear through entities.
    let result = result
        .replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&");

    // Collapse whitespace on each line and blank-line runs into one blank line
    let mut prev_was_blank = false;
    let mut cleaned = String::with_capacity(result.len());
    for line in result.lines() {
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() {
            if !prev_was_blank {
                cleaned.push('\n');
                prev_was_blank = true;
            }
        } else {
            cleaned.push_str(&words.join(" "));
            cleaned.push('\n');
            prev_was_blank = false;
        }
    }

    cleaned.trim().to_string()
}

/// Remove an entire tag block (e.g. `<script>…</script>`), case-insensitively.
fn remove_tag_block(html: &str, tag: &str) -> String {
    let mut result = String::with_capacity(html.len());
    // ASCII lowercasing keeps byte offsets aligned with `html`.
    let lower = html.to_ascii_lowercase();
    let open = format!("<{tag}");
    let close = format!("</{tag}");
    let mut pos = 0;

    while let Some(found) = lower[pos..].find(&open) {
        let start = pos + found;
        // `<scripts>` or `<styled>` are different tags.
        let next = lower[start + open.len()..].chars().next();
        if next.is_some_and(|c| c.is_ascii_alphanumeric()) {
            result.push_str(&html[pos..start + open.len()]);
            pos = start + open.len();
            continue;
        }
        result.push_str(&html[pos..start]);
        match lower[start..].find(&close) {
            Some(end) => {
                let close_start = start + end;
                pos = match lower[close_start..].find('>') {
                    Some(gt) => close_start + gt + 1,
                    None => lower.len(),
                };
            }
            None => {
                // No closing tag: remove the rest
                pos = lower.len();
            }
        }
    }
    result.push_str(&html[pos..]);
    result
}
