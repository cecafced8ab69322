//! Mail sources: where candidate messages come from.
//!
//! A source hands out sessions. The engine opens one session per cycle
//! (plus one for the diagnostic fallback) and logs out when done.

mod imap;
mod memory;

pub use self::imap::ImapSource;
pub use self::memory::InMemorySource;

use crate::error::Result;
use crate::model::{CandidateMessage, Part, SearchPredicate};

/// Something that can open mail sessions.
pub trait MailSource: Send {
    /// Connect and authenticate.
    ///
    /// Fails with `Network` or `Auth`.
    fn connect(&self) -> Result<Box<dyn MailSession>>;
}

/// One authenticated connection to a mail source.
pub trait MailSession {
    /// Select a mailbox read-only. Fails with `MailboxNotFound`.
    fn open_mailbox(&mut self, name: &str) -> Result<()>;

    /// Messages matching `predicate`, in no particular order.
    ///
    /// Fails with `UnsupportedPredicate` when the source rejects the
    /// predicate itself, `Network` otherwise.
    fn search(&mut self, predicate: &SearchPredicate) -> Result<Vec<CandidateMessage>>;

    /// Number of messages matching `predicate`. Nothing is fetched.
    fn count(&mut self, predicate: &SearchPredicate) -> Result<usize>;

    /// Like [`search`](Self::search), but only identity, sequence and
    /// timestamp are filled in. `parts` is always empty.
    fn scan(&mut self, predicate: &SearchPredicate) -> Result<Vec<CandidateMessage>>;

    /// Decoded bytes of one part of a message returned by `search`.
    fn fetch_part(&mut self, message: &CandidateMessage, part: &Part) -> Result<Vec<u8>>;

    /// The engine is done with `message`. Anything cached for it may go.
    fn release(&mut self, _message: &CandidateMessage) {}

    /// Close the session. Best effort.
    fn logout(self: Box<Self>);
}
