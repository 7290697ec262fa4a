//! Email ingestion: one inbound delivery in, at most one stored message out.
//!
//! ```text
//! envelope recipient ─► MailboxKey ─► existence gate ─┬─► body extraction ──┐
//!                                                     └─► header fields ────┴─► assemble ─► commit
//! ```
//!
//! Each call is independent. Nothing is read back or modified, so concurrent
//! deliveries to the same mailbox need no coordination.

pub mod assemble;
pub mod commit;
pub mod gate;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::{MailslotError, Result};
use crate::model::mailbox::MailboxKey;
use crate::model::message::InboxMessage;
use crate::parser::header::{extract_header_fields, split_message, HeaderFields};
use crate::parser::mime::{extract_body_bounded, MAX_CONTENT_CHARS};
use crate::store::ObjectStore;

pub use assemble::{assemble, generate_message_id, message_id};
pub use commit::commit;
pub use gate::mailbox_exists;

/// Transport-level addressing, independent of the message headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Where the transport is delivering (`slug@domain`). Routing uses only this.
    pub recipient: String,
    /// The envelope sender (`MAIL FROM`).
    pub sender: String,
}

/// Everything the mail transport hands over for one message.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub envelope: Envelope,
    /// The complete raw message: header block, blank line, body.
    pub raw: Vec<u8>,
    /// The transport's own immutable id for this message, when it has one.
    pub transport_id: Option<String>,
}

/// Why a delivery was deliberately not stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// The envelope recipient is not `slug@domain`.
    InvalidRecipient(String),
    /// The recipient's domain is not served here.
    DomainNotAllowed(String),
    /// No mailbox exists for the recipient.
    MailboxNotFound(MailboxKey),
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRecipient(r) => write!(f, "invalid recipient '{r}'"),
            Self::DomainNotAllowed(d) => write!(f, "domain '{d}' not allowed"),
            Self::MailboxNotFound(k) => write!(f, "mailbox {k} does not exist"),
        }
    }
}

/// Result of a delivery that the transport should treat as done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The message was written.
    Stored { key: String, id: String },
    /// The message was dropped on purpose. Not an error, never retried.
    Dropped(DropReason),
}

/// The ingestion pipeline bound to a store and the served domains.
pub struct Ingestor<S> {
    store: S,
    allowed_domains: Vec<String>,
    max_content_chars: usize,
}

impl<S: ObjectStore> Ingestor<S> {
    pub fn new(store: S, allowed_domains: Vec<String>) -> Self {
        Self {
            store,
            allowed_domains,
            max_content_chars: MAX_CONTENT_CHARS,
        }
    }

    /// Override the body character limit.
    pub fn with_max_content_chars(mut self, max_chars: usize) -> Self {
        self.max_content_chars = max_chars;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Ingest a delivery, stamping it with the current time.
    pub fn ingest(&self, delivery: &Delivery) -> Result<Outcome> {
        self.ingest_at(delivery, Utc::now())
    }

    /// Ingest a delivery at a given time.
    ///
    /// `Ok` means the transport is done with the message (stored or dropped);
    /// `Err` is a store failure worth retrying the whole delivery for.
    pub fn ingest_at(&self, delivery: &Delivery, now: DateTime<Utc>) -> Result<Outcome> {
        let recipient = &delivery.envelope.recipient;
        let key = match MailboxKey::parse_allowed(recipient, &self.allowed_domains) {
            Ok(key) => key,
            Err(MailslotError::DomainNotAllowed(domain)) => {
                return Ok(self.dropped(DropReason::DomainNotAllowed(domain)));
            }
            Err(_) => return Ok(self.dropped(DropReason::InvalidRecipient(recipient.clone()))),
        };

        match mailbox_exists(&self.store, &key) {
            Ok(true) => {}
            Ok(false) => return Ok(self.dropped(DropReason::MailboxNotFound(key))),
            // Retrying cannot fix a key the store refuses.
            Err(e) if !e.is_transient() => {
                warn!(mailbox = %key, error = %e, "Store rejected mailbox key");
                return Ok(self.dropped(DropReason::InvalidRecipient(recipient.clone())));
            }
            Err(e) => return Err(e),
        }

        let (content, fields) = self.extract(&delivery.raw);
        let id = message_id(delivery.transport_id.as_deref(), now);
        let message = InboxMessage::Email(assemble(content, fields, &delivery.envelope, id, now));

        let object_key = commit(&self.store, &key, &message).inspect_err(|e| {
            warn!(mailbox = %key, id = message.id(), error = %e, "Failed to store message");
        })?;

        Ok(Outcome::Stored {
            key: object_key,
            id: message.id().to_string(),
        })
    }

    /// Body and header extraction. Both only read the raw bytes and neither can fail.
    fn extract(&self, raw: &[u8]) -> (String, HeaderFields) {
        let header_block = split_message(raw).map(|(headers, _)| headers).unwrap_or(&[]);
        (
            extract_body_bounded(raw, self.max_content_chars),
            extract_header_fields(header_block),
        )
    }

    fn dropped(&self, reason: DropReason) -> Outcome {
        info!(reason = %reason, "Dropping message");
        Outcome::Dropped(reason)
    }
}
