//! Mailbox addressing and the storage key layout.
//!
//! ```text
//! {domain}/{slug}/meta.json              mailbox metadata
//! {domain}/{slug}/messages/{id}.json     one object per message
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MailslotError, Result};
use crate::store::is_key_segment;

/// Identifies a mailbox: `slug@domain`, both lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MailboxKey {
    pub domain: String,
    pub slug: String,
}

impl MailboxKey {
    /// Build a key, lower-casing both parts.
    ///
    /// Each part must be usable as a single key segment on every store
    /// backend and contain no whitespace.
    pub fn new(domain: &str, slug: &str) -> Result<Self> {
        let domain = domain.trim().to_lowercase();
        let slug = slug.trim().to_lowercase();
        if !is_segment(&domain) || !is_segment(&slug) {
            return Err(MailslotError::InvalidRecipient(format!("{slug}@{domain}")));
        }
        Ok(Self { domain, slug })
    }

    /// Parse `slug@domain`. The split happens at the last `@`.
    pub fn parse(address: &str) -> Result<Self> {
        let address = address.trim();
        let address = address
            .strip_prefix('<')
            .and_then(|a| a.strip_suffix('>'))
            .unwrap_or(address);
        match address.rfind('@') {
            Some(pos) => Self::new(&address[pos + 1..], &address[..pos]),
            None => Err(MailslotError::InvalidRecipient(address.to_string())),
        }
    }

    /// Parse `slug@domain` and require the domain to be served here.
    pub fn parse_allowed(address: &str, allowed_domains: &[String]) -> Result<Self> {
        let key = Self::parse(address)?;
        if !allowed_domains.iter().any(|d| d.eq_ignore_ascii_case(&key.domain)) {
            return Err(MailslotError::DomainNotAllowed(key.domain));
        }
        Ok(key)
    }

    /// `{domain}/{slug}/`
    pub fn prefix(&self) -> String {
        format!("{}/{}/", self.domain, self.slug)
    }

    /// `{domain}/{slug}/meta.json`
    pub fn meta_key(&self) -> String {
        format!("{}meta.json", self.prefix())
    }

    /// `{domain}/{slug}/messages/`
    pub fn messages_prefix(&self) -> String {
        format!("{}messages/", self.prefix())
    }

    /// `{domain}/{slug}/messages/{id}.json`
    pub fn message_key(&self, id: &str) -> String {
        format!("{}{id}.json", self.messages_prefix())
    }
}

impl std::fmt::Display for MailboxKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.slug, self.domain)
    }
}

fn is_segment(s: &str) -> bool {
    is_key_segment(s) && !s.contains(char::is_whitespace)
}

/// Who may write to a mailbox through the web form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageMode {
    /// Notes carry no sender information.
    Anonymous,
    /// The mailbox is meant for email with sender details.
    Identified,
}

/// Contents of `meta.json`. Its presence is what makes a mailbox exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailboxMeta {
    pub slug: String,
    pub domain: String,
    /// Private inbox token held by the owner.
    pub token: String,
    pub message_mode: MessageMode,
    #[serde(with = "crate::model::message::iso8601")]
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lowercases() {
        let key = MailboxKey::parse("MeuNome@Xablau.Email").unwrap();
        assert_eq!(key.slug, "meunome");
        assert_eq!(key.domain, "xablau.email");
        assert_eq!(key.to_string(), "meunome@xablau.email");
    }

    #[test]
    fn test_parse_angle_brackets() {
        let key = MailboxKey::parse("<box@xablau.email>").unwrap();
        assert_eq!(key.slug, "box");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(MailboxKey::parse("no-at-sign").is_err());
        assert!(MailboxKey::parse("@xablau.email").is_err());
        assert!(MailboxKey::parse("box@").is_err());
        assert!(MailboxKey::parse("../x@xablau.email").is_err());
        assert!(MailboxKey::parse("..@xablau.email").is_err());
        assert!(MailboxKey::parse("a.tmp-b@xablau.email").is_err());
    }

    #[test]
    fn test_parse_allowed() {
        let allowed = vec!["xablau.email".to_string()];
        assert!(MailboxKey::parse_allowed("box@xablau.email", &allowed).is_ok());
        assert!(matches!(
            MailboxKey::parse_allowed("box@other.com", &allowed),
            Err(MailslotError::DomainNotAllowed(d)) if d == "other.com"
        ));
    }

    #[test]
    fn test_key_layout() {
        let key = MailboxKey::new("xablau.email", "meunome").unwrap();
        assert_eq!(key.meta_key(), "xablau.email/meunome/meta.json");
        assert_eq!(
            key.message_key("abc123"),
            "xablau.email/meunome/messages/abc123.json"
        );
    }
}
