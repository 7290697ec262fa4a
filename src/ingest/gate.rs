//! Mailbox existence gate.

use tracing::debug;

use crate::error::Result;
use crate::model::mailbox::MailboxKey;
use crate::store::ObjectStore;

/// Whether the mailbox exists, judged by the presence of its `meta.json`.
///
/// `Ok(false)` is a definitive "no such mailbox"; a store failure is an
/// `Err` so the caller can ask the transport to retry.
pub fn mailbox_exists(store: &impl ObjectStore, key: &MailboxKey) -> Result<bool> {
    let exists = store.get(&key.meta_key())?.is_some();
    debug!(mailbox = %key, exists, "Checked mailbox");
    Ok(exists)
}
