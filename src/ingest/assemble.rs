//! Message assembly and the message identifier policy.

use chrono::{DateTime, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::ingest::Envelope;
use crate::model::message::{EmailMessage, MessageCommon};
use crate::parser::header::HeaderFields;

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Pick the storage identifier for a message.
///
/// A transport-supplied id is always preferred, so a redelivery maps onto
/// the same key. It is used verbatim when it is already a safe object
/// name; otherwise it is hashed. Only without one is a fresh id generated.
pub fn message_id(transport_id: Option<&str>, now: DateTime<Utc>) -> String {
    match transport_id.map(normalize_transport_id).filter(|id| !id.is_empty()) {
        Some(id) if is_safe_id(id) => id.to_string(),
        Some(id) => {
            let digest = Sha256::digest(id.as_bytes());
            let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
            format!("tid-{hex}")
        }
        None => generate_message_id(now),
    }
}

/// `msg-{millis in base36}-{6 random base36 chars}`.
pub fn generate_message_id(now: DateTime<Utc>) -> String {
    let millis = u64::try_from(now.timestamp_millis()).unwrap_or(0);
    let mut rng = rand::rng();
    let suffix: String = (0..6)
        .map(|_| BASE36[rng.random_range(0..BASE36.len())] as char)
        .collect();
    format!("msg-{}-{suffix}", to_base36(millis))
}

fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

/// Strip whitespace and the angle brackets of a `Message-ID` style value.
fn normalize_transport_id(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .unwrap_or(trimmed)
        .trim()
}

/// Safe as a single object name: `[A-Za-z0-9._-]`, not starting with a dot,
/// and short enough for any filesystem.
fn is_safe_id(id: &str) -> bool {
    id.len() <= 200
        && !id.starts_with('.')
        && !id.contains(".tmp-")
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}

/// Build the email record. Pure: no I/O, no clock, no randomness.
///
/// Sender fields come from the `From` header; without one, the envelope
/// sender stands in. `replyTo` falls back to the sender address.
pub fn assemble(
    content: String,
    fields: HeaderFields,
    envelope: &Envelope,
    id: String,
    now: DateTime<Utc>,
) -> EmailMessage {
    let (from, from_name) = match fields.from {
        Some(sender) => (sender.address, sender.display_name),
        None => {
            let sender = crate::model::address::Sender::parse(&envelope.sender);
            (sender.address, sender.display_name)
        }
    };
    let reply_to = fields.reply_to.unwrap_or_else(|| from.clone());

    EmailMessage {
        common: MessageCommon {
            id,
            content,
            is_read: false,
            created_at: now,
        },
        from,
        from_name,
        subject: fields.subject,
        reply_to,
    }
}
