//! Email parsing: header fields, MIME body extraction, and transfer/charset decoding.

pub mod encoding;
pub mod header;
pub mod mime;
