//! `attachpoll`: poll a mailbox and save new attachments to disk.
//!
//! The library holds the incremental sync engine and its collaborators:
//! mail sources (IMAP, in-memory), cursor stores (SQLite, in-memory) and
//! attachment sinks (directory, in-memory). The binary wires them together
//! and drives the engine on a fixed interval.

pub mod config;
pub mod error;
pub mod export;
pub mod model;
pub mod parser;
pub mod scheduler;
pub mod source;
pub mod store;
pub mod sync;
