//! Cursor persistence.
//!
//! The cursor is a single record. Stores only support reading it and
//! overwriting it as a whole.

mod memory;
mod sqlite;

pub use memory::InMemoryCursorStore;
pub use sqlite::SqliteCursorStore;

use crate::error::Result;
use crate::model::Cursor;

/// Durable home of the sync cursor.
pub trait CursorStore: Send {
    /// Read the current cursor. An unset cursor reads as [`Cursor::default`].
    fn read(&self) -> Result<Cursor>;

    /// Replace the cursor. All fields are written together.
    fn write(&mut self, cursor: &Cursor) -> Result<()>;
}
