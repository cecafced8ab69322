//! MIME parsing of raw RFC 5322 messages fetched from a mail source.

pub mod mime;
