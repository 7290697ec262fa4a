//! The single write of the pipeline.

use tracing::info;

use crate::error::Result;
use crate::model::mailbox::MailboxKey;
use crate::model::message::InboxMessage;
use crate::store::{put_json, ObjectStore};

/// Write a message to `{domain}/{slug}/messages/{id}.json` and return the key.
///
/// Writing the same id twice replaces the object, so a redelivered
/// message never produces a second record.
pub fn commit(store: &impl ObjectStore, key: &MailboxKey, message: &InboxMessage) -> Result<String> {
    let object_key = key.message_key(message.id());
    put_json(store, &object_key, message)?;
    info!(
        mailbox = %key,
        id = message.id(),
        source = message.source(),
        key = %object_key,
        "Stored message"
    );
    Ok(object_key)
}
