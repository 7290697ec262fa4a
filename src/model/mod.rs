//! Core data model types: mailboxes, messages, and senders.

pub mod address;
pub mod mailbox;
pub mod message;
