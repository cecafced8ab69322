//! Attachment output: file naming and the sinks attachments are written to.

pub mod filename;
pub mod sink;

pub use sink::{AttachmentSink, DirectorySink, MemorySink, SavedAttachment};
