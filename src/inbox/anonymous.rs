//! Anonymous notes submitted through the web form.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::{MailslotError, Result};
use crate::ingest::{commit, generate_message_id, mailbox_exists};
use crate::inbox::ratelimit::RateLimiter;
use crate::model::mailbox::MailboxKey;
use crate::model::message::{AnonymousMessage, InboxMessage, MessageCommon};
use crate::parser::mime::MAX_CONTENT_CHARS;
use crate::store::ObjectStore;

/// A note as submitted, before validation.
#[derive(Debug, Clone)]
pub struct Submission<'a> {
    pub mailbox: &'a MailboxKey,
    pub content: &'a str,
    /// Identifies the submitter for rate limiting (e.g. client IP).
    pub client: &'a str,
}

/// Validate and store an anonymous note.
///
/// Unlike email ingestion, a missing mailbox is an error here: the
/// submitter is a person looking at a form, not a retrying transport.
pub fn submit_anonymous(
    store: &impl ObjectStore,
    limiter: &RateLimiter,
    submission: &Submission<'_>,
    now: DateTime<Utc>,
) -> Result<InboxMessage> {
    if !limiter.check(submission.client, now) {
        return Err(MailslotError::RateLimited(submission.client.to_string()));
    }

    let content = validate_content(submission.content)?;

    let key = submission.mailbox;
    if !mailbox_exists(store, key)? {
        return Err(MailslotError::MailboxNotFound(key.to_string()));
    }

    let message = InboxMessage::Anonymous(AnonymousMessage {
        common: MessageCommon {
            id: generate_message_id(now),
            content: content.to_string(),
            is_read: false,
            created_at: now,
        },
    });
    commit(store, key, &message)?;
    info!(mailbox = %key, id = message.id(), "Accepted anonymous message");
    Ok(message)
}

/// Trimmed content, non-empty and within the character limit.
pub fn validate_content(content: &str) -> Result<&str> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(MailslotError::InvalidMessage("message cannot be empty".into()));
    }
    if trimmed.chars().count() > MAX_CONTENT_CHARS {
        return Err(MailslotError::InvalidMessage(format!(
            "message too long (maximum {MAX_CONTENT_CHARS} characters)"
        )));
    }
    Ok(trimmed)
}
