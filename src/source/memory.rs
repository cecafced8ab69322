//! In-memory mail source for tests and local experiments.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::error::{Result, SyncError};
use crate::model::{CandidateMessage, Part, SearchPredicate};
use crate::parser::mime;

use super::{MailSession, MailSource};

/// A mailbox held in memory.
///
/// Clones share state, so a test can add messages, inject failures and
/// inspect the searches made while the engine owns another handle.
#[derive(Debug, Clone)]
pub struct InMemorySource {
    inner: Arc<Mutex<Mailbox>>,
}

#[derive(Debug)]
struct Mailbox {
    name: String,
    messages: Vec<StoredMessage>,
    reject_date_search: bool,
    reject_sequence_search: bool,
    fail_connect: bool,
    fail_fetch: bool,
    connections: usize,
    searches: Vec<SearchPredicate>,
    counts: Vec<SearchPredicate>,
    scans: Vec<SearchPredicate>,
    released: Vec<u32>,
}

#[derive(Debug, Clone)]
struct StoredMessage {
    uid: u32,
    received_at: DateTime<Utc>,
    raw: Vec<u8>,
}

impl Default for InMemorySource {
    fn default() -> Self {
        Self::new("INBOX")
    }
}

impl InMemorySource {
    /// Empty mailbox called `mailbox`.
    pub fn new(mailbox: &str) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Mailbox {
                name: mailbox.to_string(),
                messages: Vec::new(),
                reject_date_search: false,
                reject_sequence_search: false,
                fail_connect: false,
                fail_fetch: false,
                connections: 0,
                searches: Vec::new(),
                counts: Vec::new(),
                scans: Vec::new(),
                released: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Mailbox> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Deliver a raw RFC 5322 message with the given UID and receipt time.
    pub fn deliver(&self, uid: u32, received_at: DateTime<Utc>, raw: impl Into<Vec<u8>>) {
        self.lock().messages.push(StoredMessage {
            uid,
            received_at,
            raw: raw.into(),
        });
    }

    /// Make `SINCE` searches fail as rejected predicates.
    pub fn reject_date_search(&self, reject: bool) {
        self.lock().reject_date_search = reject;
    }

    /// Make sequence-threshold searches fail as rejected predicates.
    pub fn reject_sequence_search(&self, reject: bool) {
        self.lock().reject_sequence_search = reject;
    }

    /// Make `connect` fail with a network error.
    pub fn fail_connect(&self, fail: bool) {
        self.lock().fail_connect = fail;
    }

    /// Make `fetch_part` fail with a network error.
    pub fn fail_fetch(&self, fail: bool) {
        self.lock().fail_fetch = fail;
    }

    /// Number of sessions opened so far.
    pub fn connections(&self) -> usize {
        self.lock().connections
    }

    /// Every predicate passed to `search` so far, in order.
    pub fn searches(&self) -> Vec<SearchPredicate> {
        self.lock().searches.clone()
    }

    /// Every predicate passed to `count` so far, in order.
    pub fn counts(&self) -> Vec<SearchPredicate> {
        self.lock().counts.clone()
    }

    /// Every predicate passed to `scan` so far, in order.
    pub fn scans(&self) -> Vec<SearchPredicate> {
        self.lock().scans.clone()
    }

    /// UIDs the engine released, in order.
    pub fn released(&self) -> Vec<u32> {
        self.lock().released.clone()
    }
}

impl Mailbox {
    /// Messages matching `predicate`, or the injected rejection.
    fn matching(&self, predicate: &SearchPredicate) -> Result<Vec<&StoredMessage>> {
        let rejected = match predicate {
            SearchPredicate::All => false,
            SearchPredicate::SinceDate(_) => self.reject_date_search,
            SearchPredicate::SequenceGreaterThan(_) => self.reject_sequence_search,
        };
        if rejected {
            return Err(SyncError::UnsupportedPredicate(format!(
                "{predicate}: unsupported search option"
            )));
        }

        let highest_uid = self.messages.iter().map(|m| m.uid).max();
        Ok(self
            .messages
            .iter()
            .filter(|m| match predicate {
                SearchPredicate::All => true,
                SearchPredicate::SinceDate(day) => m.received_at.date_naive() >= *day,
                // Same quirk as IMAP `UID n:*`: the highest UID always matches.
                SearchPredicate::SequenceGreaterThan(n) => {
                    m.uid > *n || Some(m.uid) == highest_uid
                }
            })
            .collect())
    }
}

impl MailSource for InMemorySource {
    fn connect(&self) -> Result<Box<dyn MailSession>> {
        let mut mailbox = self.lock();
        if mailbox.fail_connect {
            return Err(SyncError::Network("connection refused".into()));
        }
        mailbox.connections += 1;
        Ok(Box::new(InMemorySession {
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct InMemorySession {
    inner: Arc<Mutex<Mailbox>>,
}

impl InMemorySession {
    fn lock(&self) -> MutexGuard<'_, Mailbox> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl MailSession for InMemorySession {
    fn open_mailbox(&mut self, name: &str) -> Result<()> {
        if self.lock().name == name {
            Ok(())
        } else {
            Err(SyncError::MailboxNotFound(name.to_string()))
        }
    }

    fn search(&mut self, predicate: &SearchPredicate) -> Result<Vec<CandidateMessage>> {
        let mut mailbox = self.lock();
        mailbox.searches.push(*predicate);

        Ok(mailbox
            .matching(predicate)?
            .into_iter()
            .map(|m| {
                let parsed = mime::parse_message(&m.raw);
                CandidateMessage {
                    id: parsed.as_ref().and_then(|p| p.message_id.clone()),
                    sequence: Some(m.uid),
                    timestamp: m.received_at,
                    parts: parsed.map(|p| p.parts).unwrap_or_default(),
                }
            })
            .collect())
    }

    fn count(&mut self, predicate: &SearchPredicate) -> Result<usize> {
        let mut mailbox = self.lock();
        mailbox.counts.push(*predicate);
        Ok(mailbox.matching(predicate)?.len())
    }

    fn scan(&mut self, predicate: &SearchPredicate) -> Result<Vec<CandidateMessage>> {
        let mut mailbox = self.lock();
        mailbox.scans.push(*predicate);

        Ok(mailbox
            .matching(predicate)?
            .into_iter()
            .map(|m| CandidateMessage {
                id: mime::parse_message(&m.raw).and_then(|p| p.message_id),
                sequence: Some(m.uid),
                timestamp: m.received_at,
                parts: Vec::new(),
            })
            .collect())
    }

    fn fetch_part(&mut self, message: &CandidateMessage, part: &Part) -> Result<Vec<u8>> {
        let mailbox = self.lock();
        if mailbox.fail_fetch {
            return Err(SyncError::Network("fetch timed out".into()));
        }
        let stored = mailbox
            .messages
            .iter()
            .find(|m| Some(m.uid) == message.sequence)
            .ok_or_else(|| SyncError::Network(format!("no message {:?}", message.sequence)))?;
        mime::extract_part(&stored.raw, part.part_ref)
    }

    fn release(&mut self, message: &CandidateMessage) {
        if let Some(uid) = message.sequence {
            self.lock().released.push(uid);
        }
    }

    fn logout(self: Box<Self>) {}
}
