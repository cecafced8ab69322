//! In-memory cursor store for tests.

use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::model::Cursor;

use super::CursorStore;

/// Cursor store backed by shared memory.
///
/// Clones share the same cursor, so a test can keep a handle while the
/// engine owns another.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCursorStore {
    cursor: Arc<Mutex<Cursor>>,
    writes: Arc<Mutex<usize>>,
}

impl InMemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing cursor.
    pub fn with_cursor(cursor: Cursor) -> Self {
        Self {
            cursor: Arc::new(Mutex::new(cursor)),
            writes: Arc::default(),
        }
    }

    /// How many times the cursor was overwritten.
    pub fn write_count(&self) -> usize {
        *self.writes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CursorStore for InMemoryCursorStore {
    fn read(&self) -> Result<Cursor> {
        Ok(self.cursor.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn write(&mut self, cursor: &Cursor) -> Result<()> {
        *self.cursor.lock().unwrap_or_else(|e| e.into_inner()) = cursor.clone();
        *self.writes.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }
}
