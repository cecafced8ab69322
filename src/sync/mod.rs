//! Incremental sync engine.
//!
//! One cycle picks a predicate from the stored cursor, searches the source,
//! drops what was already processed, extracts qualifying attachments in
//! timestamp order and advances the cursor only when something was saved.

mod engine;
mod select;

pub use engine::{CycleReport, ResetOutcome, SyncEngine, SyncOptions};
pub use select::{latest_message, qualifying_parts, select_messages};
