//! Search predicates and how they are chosen from the cursor.

use std::fmt;

use chrono::NaiveDate;
use tracing::debug;

use super::cursor::Cursor;
use super::message::CandidateMessage;

/// Which remote messages to retrieve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPredicate {
    /// Every message in the mailbox.
    All,
    /// Messages received on or after this day. Day precision only.
    /// Chosen one day before the cursor's UTC day.
    SinceDate(NaiveDate),
    /// Messages whose sequence number is strictly greater than this.
    SequenceGreaterThan(u32),
}

impl SearchPredicate {
    /// Pick the most specific predicate the cursor supports.
    ///
    /// Unparseable cursor fields fall through to the next, wider predicate.
    pub fn from_cursor(cursor: &Cursor) -> Self {
        if let Some(seq) = cursor.sequence() {
            return Self::SequenceGreaterThan(seq);
        }
        if cursor.last_sequence.is_some() {
            debug!(value = ?cursor.last_sequence, "Ignoring unusable stored sequence number");
        }

        // SINCE compares against the server's local day, which may be
        // behind UTC. Starting a day early keeps that day's later mail.
        if let Some(day) = cursor.processed_on() {
            return Self::SinceDate(day.pred_opt().unwrap_or(day));
        }
        if cursor.last_processed_at.is_some() {
            debug!(value = ?cursor.last_processed_at, "Ignoring unusable stored timestamp");
        }

        Self::All
    }

    /// Client-side check, for sources that cannot express the predicate
    /// exactly. Only the sequence threshold is enforced here; date matches
    /// are left to deduplication.
    pub fn admits(&self, message: &CandidateMessage) -> bool {
        match self {
            Self::SequenceGreaterThan(threshold) => {
                message.sequence.is_some_and(|seq| seq > *threshold)
            }
            Self::All | Self::SinceDate(_) => true,
        }
    }
}

impl fmt::Display for SearchPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "ALL"),
            Self::SinceDate(day) => write!(f, "SINCE {}", day.format("%Y-%m-%d")),
            Self::SequenceGreaterThan(n) => write!(f, "SEQ > {n}"),
        }
    }
}
