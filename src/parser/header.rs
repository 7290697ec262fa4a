//! RFC 5322 header parsing: block splitting, folding, and encoded-words (RFC 2047).

use tracing::debug;

use crate::model::address::Sender;
use crate::parser::encoding::{decode_base64, decode_charset, decode_q_encoding};

/// Subject used when the message carries none.
pub const NO_SUBJECT: &str = "(no subject)";

/// Header fields the pipeline keeps from a message.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HeaderFields {
    /// Decoded `Subject`, or [`NO_SUBJECT`].
    pub subject: String,
    /// Parsed `From`, if the header is present and non-blank.
    pub from: Option<Sender>,
    /// Address from `Reply-To`, if present.
    pub reply_to: Option<String>,
}

/// Split a raw message into its header block and body.
///
/// The separator is the first blank line, CRLFCRLF or bare LFLF, whichever
/// comes first. A message that starts with a blank line has an empty
/// header block. Returns `None` when there is no separator at all.
pub fn split_message(data: &[u8]) -> Option<(&[u8], &[u8])> {
    if data.starts_with(b"\r\n") {
        return Some((&data[..0], &data[2..]));
    }
    if data.starts_with(b"\n") {
        return Some((&data[..0], &data[1..]));
    }

    let crlf = find(data, b"\r\n\r\n").map(|pos| (pos, 4));
    let lf = find(data, b"\n\n").map(|pos| (pos, 2));
    let (pos, len) = match (crlf, lf) {
        (Some(a), Some(b)) => {
            if a.0 <= b.0 {
                a
            } else {
                b
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return None,
    };
    Some((&data[..pos], &data[pos + len..]))
}

/// Position of the first occurrence of `needle` in `haystack`.
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to Windows-1252 (which accepts every byte).
pub fn decode_header_bytes(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);

    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Unfold headers: join continuation lines (starting with space or tab) with the previous header.
///
/// Returns a list of `(lowercase_name, raw_value)` pairs.
pub fn unfold_headers(text: &str) -> Vec<(String, String)> {
    let mut result: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = result.last_mut() {
                last.1.push(' ');
                last.1.push_str(line.trim());
            }
        } else if let Some(colon_pos) = line.find(':') {
            let name = line[..colon_pos].trim().to_lowercase();
            let value = line[colon_pos + 1..].trim().to_string();
            result.push((name, value));
        }
    }

    result
}

/// Get the first value for a header name (`name` must be lowercase).
pub fn get_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

/// Extract subject, sender, and reply-to from a raw header block.
///
/// Never fails; missing or malformed headers degrade to defaults.
pub fn extract_header_fields(header_block: &[u8]) -> HeaderFields {
    let headers = unfold_headers(&decode_header_bytes(header_block));

    let subject = get_header(&headers, "subject")
        .map(decode_encoded_words)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| NO_SUBJECT.to_string());

    let from = get_header(&headers, "from")
        .filter(|v| !v.trim().is_empty())
        .map(|v| Sender::parse(&decode_encoded_words(v)));

    let reply_to = get_header(&headers, "reply-to")
        .filter(|v| !v.trim().is_empty())
        .map(|v| Sender::parse(&decode_encoded_words(v)).address)
        .filter(|a| !a.is_empty());

    debug!(
        has_from = from.is_some(),
        has_reply_to = reply_to.is_some(),
        "Extracted header fields"
    );

    HeaderFields {
        subject,
        from,
        reply_to,
    }
}

/// Decode RFC 2047 encoded-words in a header value.
///
/// Example: `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` → `"Hola mundo"`
///
/// If decoding fails for any token, the original text is preserved.
pub fn decode_encoded_words(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut remaining = input;
    let mut last_was_encoded = false;

    while let Some(start) = remaining.find("=?") {
        let before = &remaining[..start];
        // Whitespace between two encoded words is dropped (RFC 2047 §6.2)
        if !last_was_encoded || !before.trim().is_empty() {
            result.push_str(before);
        }

        let after_start = &remaining[start + 2..];

        if let Some(decoded) = try_decode_one_word(after_start) {
            result.push_str(&decoded.text);
            remaining = &after_start[decoded.consumed..];
            last_was_encoded = true;
        } else {
            result.push_str("=?");
            remaining = after_start;
            last_was_encoded = false;
        }
    }

    result.push_str(remaining);
    result
}

struct DecodedWord {
    text: String,
    consumed: usize, // bytes consumed from the string *after* the initial "=?"
}

fn try_decode_one_word(s: &str) -> Option<DecodedWord> {
    // Format: charset?encoding?encoded_text?=
    let first_q = s.find('?')?;
    let charset = &s[..first_q];
    if charset.is_empty() || charset.contains(char::is_whitespace) {
        return None;
    }

    let rest = &s[first_q + 1..];
    let second_q = rest.find('?')?;
    let encoding = &rest[..second_q];

    let rest2 = &rest[second_q + 1..];
    let end = rest2.find("?=")?;
    let encoded_text = &rest2[..end];

    let consumed = first_q + 1 + second_q + 1 + end + 2;

    let bytes = match encoding.to_ascii_uppercase().as_str() {
        "B" => decode_base64(encoded_text.as_bytes())?,
        "Q" => decode_q_encoding(encoded_text),
        _ => return None,
    };

    Some(DecodedWord {
        text: decode_charset(charset, &bytes),
        consumed,
    })
}
