//! Mailbox-owner operations: creating a mailbox, reading and pruning its messages,
//! and accepting anonymous notes.

pub mod anonymous;
pub mod ratelimit;
pub mod slug;

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{debug, info, warn};

use crate::error::{MailslotError, Result};
use crate::ingest::commit;
use crate::model::mailbox::{MailboxKey, MailboxMeta, MessageMode};
use crate::model::message::InboxMessage;
use crate::store::{get_json, put_json, ObjectStore};

pub use anonymous::{submit_anonymous, Submission};
pub use ratelimit::RateLimiter;
pub use slug::{generate_slug, validate_slug};

/// Attempts at finding a free generated slug before giving up.
const GENERATE_ATTEMPTS: usize = 10;

/// Create a mailbox with a chosen slug by writing its `meta.json` with a
/// fresh private token. The slug must pass [`validate_slug`].
pub fn create_mailbox(
    store: &impl ObjectStore,
    key: &MailboxKey,
    mode: MessageMode,
    now: DateTime<Utc>,
) -> Result<MailboxMeta> {
    validate_slug(&key.slug)?;
    if store.get(&key.meta_key())?.is_some() {
        return Err(MailslotError::MailboxExists(key.to_string()));
    }
    write_meta(store, key, mode, now)
}

/// Create a mailbox under `domain` with a generated slug that is not taken yet.
pub fn create_generated_mailbox(
    store: &impl ObjectStore,
    domain: &str,
    mode: MessageMode,
    now: DateTime<Utc>,
) -> Result<MailboxMeta> {
    for _ in 0..GENERATE_ATTEMPTS {
        let key = MailboxKey::new(domain, &generate_slug())?;
        if store.get(&key.meta_key())?.is_none() {
            return write_meta(store, &key, mode, now);
        }
        debug!(mailbox = %key, "Generated slug already taken");
    }
    Err(MailslotError::MailboxExists(format!(
        "no free generated name on {domain} after {GENERATE_ATTEMPTS} attempts"
    )))
}

fn write_meta(
    store: &impl ObjectStore,
    key: &MailboxKey,
    mode: MessageMode,
    now: DateTime<Utc>,
) -> Result<MailboxMeta> {
    let meta = MailboxMeta {
        slug: key.slug.clone(),
        domain: key.domain.clone(),
        token: generate_token(),
        message_mode: mode,
        created_at: now,
    };
    put_json(store, &key.meta_key(), &meta)?;
    info!(mailbox = %key, "Created mailbox");
    Ok(meta)
}

/// Read a mailbox's metadata.
pub fn get_mailbox(store: &impl ObjectStore, key: &MailboxKey) -> Result<Option<MailboxMeta>> {
    get_json(store, &key.meta_key())
}

/// 128 random bits as lowercase hex.
fn generate_token() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Every message in a mailbox, newest first.
///
/// Objects that cannot be read or parsed are skipped with a warning, so one
/// bad record does not hide the rest.
pub fn list_messages(store: &impl ObjectStore, key: &MailboxKey) -> Result<Vec<InboxMessage>> {
    let mut messages = Vec::new();
    for object_key in store.list(&key.messages_prefix())? {
        if !object_key.ends_with(".json") {
            continue;
        }
        match get_json::<InboxMessage>(store, &object_key) {
            Ok(Some(message)) => messages.push(message),
            Ok(None) => {}
            Err(MailslotError::Serialization(e)) => {
                warn!(key = %object_key, error = %e, "Skipping unreadable message");
            }
            Err(e) => return Err(e),
        }
    }
    messages.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
    Ok(messages)
}

/// Read one message.
pub fn get_message(
    store: &impl ObjectStore,
    key: &MailboxKey,
    id: &str,
) -> Result<Option<InboxMessage>> {
    get_json(store, &key.message_key(id))
}

/// Mark a message read or unread.
pub fn set_read(
    store: &impl ObjectStore,
    key: &MailboxKey,
    id: &str,
    read: bool,
) -> Result<InboxMessage> {
    let mut message =
        get_message(store, key, id)?.ok_or_else(|| MailslotError::MessageNotFound(id.to_string()))?;
    message.common_mut().is_read = read;
    commit(store, key, &message)?;
    Ok(message)
}

/// Delete one message. Deleting a missing message succeeds.
pub fn delete_message(store: &impl ObjectStore, key: &MailboxKey, id: &str) -> Result<()> {
    store.delete(&key.message_key(id))
}

/// Delete a mailbox: all of its messages first, then its metadata.
pub fn delete_mailbox(store: &impl ObjectStore, key: &MailboxKey) -> Result<usize> {
    let keys = store.list(&key.messages_prefix())?;
    for object_key in &keys {
        store.delete(object_key)?;
    }
    store.delete(&key.meta_key())?;
    info!(mailbox = %key, messages = keys.len(), "Deleted mailbox");
    Ok(keys.len())
}
