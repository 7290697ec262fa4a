//! `mailslot`: disposable `slug@domain` mailboxes.
//!
//! Raw MIME email from a mail transport and anonymous notes from a web
//! form both end up as one [`model::message::InboxMessage`] per object in
//! an [`store::ObjectStore`], keyed by domain and slug. The interesting
//! part is [`ingest`]: turning an arbitrary RFC 5322 byte stream into a
//! bounded plaintext record, exactly once per delivery.

pub mod config;
pub mod error;
pub mod inbox;
pub mod ingest;
pub mod model;
pub mod parser;
pub mod store;
