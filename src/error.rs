//! Centralized error types for mailslot.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mailslot library.
///
/// Extraction never produces one of these: body and header extraction
/// degrade to best-effort text instead. Errors here are either caller
/// mistakes (bad address, oversized note) or infrastructure failures
/// that a transport should retry.
#[derive(Error, Debug)]
pub enum MailslotError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The object store failed for a reason other than "not found".
    #[error("Storage error on '{key}': {reason}")]
    Storage { key: String, reason: String },

    /// A storage key is empty or contains a forbidden path segment.
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    /// A stored object could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The address is not of the form `slug@domain`.
    #[error("Invalid mailbox address: {0}")]
    InvalidRecipient(String),

    /// A requested mailbox slug breaks the naming rules or is reserved.
    #[error("Invalid mailbox name: {0}")]
    InvalidSlug(String),

    /// The domain is not served by this deployment.
    #[error("Domain not allowed: {0}")]
    DomainNotAllowed(String),

    /// No mailbox exists for the given address.
    #[error("Mailbox not found: {0}")]
    MailboxNotFound(String),

    /// A mailbox already exists for the given address.
    #[error("Mailbox already exists: {0}")]
    MailboxExists(String),

    /// A message with this id does not exist in the mailbox.
    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// A submitted message failed validation.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// The submitting client exceeded its allowance for the current window.
    #[error("Rate limit exceeded for '{0}'")]
    RateLimited(String),
}

/// Convenience alias for `Result<T, MailslotError>`.
pub type Result<T> = std::result::Result<T, MailslotError>;

impl MailslotError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a `Storage` variant for a key.
    pub fn storage(key: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Storage {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether retrying the same operation later could succeed.
    ///
    /// Only infrastructure failures are transient; everything else is a
    /// permanent property of the input.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Storage { .. })
    }
}
