//! The persisted inbox message.
//!
//! Stored as JSON under `{domain}/{slug}/messages/{id}.json`:
//!
//! ```json
//! {
//!   "source": "email",
//!   "id": "0100018f...",
//!   "content": "Hello world",
//!   "isRead": false,
//!   "createdAt": "2026-10-19T12:00:00.000Z",
//!   "from": "a@b.com",
//!   "fromName": "A B",
//!   "subject": "Hi",
//!   "replyTo": "a@b.com"
//! }
//! ```
//!
//! Email-only fields live on [`EmailMessage`], so an anonymous note can
//! never carry a sender.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fields every message has, whatever its source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageCommon {
    /// Unique within the mailbox; also the storage object name.
    pub id: String,
    /// Bounded plaintext. Never raw HTML or MIME.
    pub content: String,
    /// Toggled by the mailbox owner; `false` at creation.
    pub is_read: bool,
    /// Ingestion time.
    #[serde(with = "iso8601")]
    pub created_at: DateTime<Utc>,
}

/// A message that arrived by email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailMessage {
    #[serde(flatten)]
    pub common: MessageCommon,
    /// Sender address.
    pub from: String,
    /// Sender display name.
    pub from_name: String,
    pub subject: String,
    /// Where replies should go.
    pub reply_to: String,
}

/// A note submitted through the web form. Carries no sender information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnonymousMessage {
    #[serde(flatten)]
    pub common: MessageCommon,
}

/// One entry of a mailbox, tagged by `source`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum InboxMessage {
    Email(EmailMessage),
    Anonymous(AnonymousMessage),
}

impl InboxMessage {
    pub fn common(&self) -> &MessageCommon {
        match self {
            Self::Email(m) => &m.common,
            Self::Anonymous(m) => &m.common,
        }
    }

    pub fn common_mut(&mut self) -> &mut MessageCommon {
        match self {
            Self::Email(m) => &mut m.common,
            Self::Anonymous(m) => &mut m.common,
        }
    }

    pub fn id(&self) -> &str {
        &self.common().id
    }

    pub fn content(&self) -> &str {
        &self.common().content
    }

    pub fn is_read(&self) -> bool {
        self.common().is_read
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.common().created_at
    }

    /// The `source` tag as stored.
    pub fn source(&self) -> &'static str {
        match self {
            Self::Email(_) => "email",
            Self::Anonymous(_) => "anonymous",
        }
    }

    pub fn as_email(&self) -> Option<&EmailMessage> {
        match self {
            Self::Email(m) => Some(m),
            Self::Anonymous(_) => None,
        }
    }
}

impl From<EmailMessage> for InboxMessage {
    fn from(m: EmailMessage) -> Self {
        Self::Email(m)
    }
}

impl From<AnonymousMessage> for InboxMessage {
    fn from(m: AnonymousMessage) -> Self {
        Self::Anonymous(m)
    }
}

/// ISO-8601 timestamps with millisecond precision and a `Z` suffix.
pub(crate) mod iso8601 {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
