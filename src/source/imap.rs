//! IMAP over TLS.

use std::collections::HashMap;
use std::net::{TcpStream, ToSocketAddrs};

use chrono::{DateTime, Utc};
use native_tls::{TlsConnector, TlsStream};
use tracing::{debug, warn};

use crate::config::ImapConfig;
use crate::error::{Result, SyncError};
use crate::model::{CandidateMessage, Disposition, Part, SearchPredicate};
use crate::parser::mime;

use super::{MailSession, MailSource};

/// UIDs fetched per `UID FETCH` round trip.
const FETCH_CHUNK: usize = 50;

/// Raw bodies kept between `search` and `fetch_part`. Bodies past this are
/// dropped after parsing and fetched again when their parts are needed.
const BODY_CACHE_BYTES: usize = 32 * 1024 * 1024;

/// Identity and timestamp only, for scans.
const SCAN_QUERY: &str = "(UID INTERNALDATE ENVELOPE)";

type ImapStream = TlsStream<TcpStream>;

/// IMAP mailbox reached over implicit TLS.
pub struct ImapSource {
    config: ImapConfig,
}

impl ImapSource {
    pub fn new(config: ImapConfig) -> Self {
        Self { config }
    }

    fn open_stream(&self) -> Result<ImapStream> {
        let host = self.config.host.as_str();
        let addr = (host, self.config.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| SyncError::Network(format!("Could not resolve {host}")))?;

        let tcp = TcpStream::connect_timeout(&addr, self.config.connect_timeout())?;
        tcp.set_read_timeout(Some(self.config.io_timeout()))?;
        tcp.set_write_timeout(Some(self.config.io_timeout()))?;

        let tls = TlsConnector::builder()
            .danger_accept_invalid_certs(self.config.accept_invalid_certs)
            .build()
            .map_err(|e| SyncError::Network(format!("TLS connector build failed: {e}")))?;

        tls.connect(host, tcp)
            .map_err(|e| SyncError::Network(format!("TLS handshake with {host} failed: {e}")))
    }
}

impl MailSource for ImapSource {
    fn connect(&self) -> Result<Box<dyn MailSession>> {
        let stream = self.open_stream()?;
        let mut client = imap::Client::new(stream);
        client.read_greeting().map_err(network_error)?;

        let session = client
            .login(&self.config.username, &self.config.password)
            .map_err(|(e, _)| SyncError::Auth(e.to_string()))?;

        debug!(host = %self.config.host, user = %self.config.username, "IMAP session established");
        Ok(Box::new(ImapSession {
            session,
            bodies: BodyCache::new(BODY_CACHE_BYTES),
        }))
    }
}

struct ImapSession {
    session: imap::Session<ImapStream>,
    /// Raw bodies of messages that have attachment parts, by UID.
    bodies: BodyCache,
}

impl ImapSession {
    /// Sorted UIDs matching `predicate`.
    fn search_uids(&mut self, predicate: &SearchPredicate) -> Result<Vec<u32>> {
        let query = search_query(predicate);
        debug!(%query, "UID SEARCH");

        let uids = match self.session.uid_search(&query) {
            Ok(uids) => uids,
            Err(imap::error::Error::Bad(msg)) | Err(imap::error::Error::No(msg)) => {
                return Err(SyncError::UnsupportedPredicate(format!("{query}: {msg}")));
            }
            Err(e) => return Err(network_error(e)),
        };

        let mut uids: Vec<u32> = uids.into_iter().collect();
        uids.sort_unstable();
        Ok(uids)
    }

    fn fetch_candidates(&mut self, uids: &[u32]) -> Result<Vec<CandidateMessage>> {
        let mut candidates = Vec::with_capacity(uids.len());

        for chunk in uids.chunks(FETCH_CHUNK) {
            let set = uid_set(chunk);
            let fetches = self
                .session
                .uid_fetch(&set, "(UID INTERNALDATE BODY.PEEK[])")
                .map_err(network_error)?;

            for fetch in fetches.iter() {
                let Some(uid) = fetch.uid else {
                    warn!(seq = fetch.message, "FETCH response without UID, skipping");
                    continue;
                };
                let Some(raw) = fetch.body() else {
                    warn!(uid, "FETCH response without body, skipping");
                    continue;
                };

                let parsed = mime::parse_message(raw);
                let timestamp = fetch
                    .internal_date()
                    .map(|d| d.with_timezone(&Utc))
                    .or_else(|| parsed.as_ref().and_then(|p| p.date))
                    .unwrap_or(DateTime::UNIX_EPOCH);
                let (message_id, parts) = match parsed {
                    Some(p) => (p.message_id, p.parts),
                    None => {
                        warn!(uid, "Message could not be parsed, treating it as partless");
                        (None, Vec::new())
                    }
                };

                if parts.iter().any(|p| p.disposition == Disposition::Attachment)
                    && !self.bodies.offer(uid, raw)
                {
                    debug!(uid, size = raw.len(), "Body cache full, will fetch again on demand");
                }

                candidates.push(CandidateMessage {
                    id: message_id,
                    sequence: Some(uid),
                    timestamp,
                    parts,
                });
            }
        }

        Ok(candidates)
    }

    fn fetch_body(&mut self, uid: u32) -> Result<Vec<u8>> {
        let fetches = self
            .session
            .uid_fetch(uid.to_string(), "BODY.PEEK[]")
            .map_err(network_error)?;
        fetches
            .iter()
            .find_map(|f| f.body().map(<[u8]>::to_vec))
            .ok_or_else(|| SyncError::Network(format!("UID {uid} vanished before its parts were fetched")))
    }
}

impl MailSession for ImapSession {
    fn open_mailbox(&mut self, name: &str) -> Result<()> {
        // EXAMINE is read-only: nothing gets marked \Seen.
        match self.session.examine(name) {
            Ok(mailbox) => {
                debug!(mailbox = name, exists = mailbox.exists, "Mailbox opened");
                Ok(())
            }
            Err(imap::error::Error::No(msg)) => {
                Err(SyncError::MailboxNotFound(format!("{name}: {msg}")))
            }
            Err(e) => Err(network_error(e)),
        }
    }

    fn search(&mut self, predicate: &SearchPredicate) -> Result<Vec<CandidateMessage>> {
        let uids = self.search_uids(predicate)?;
        self.bodies.clear();
        self.fetch_candidates(&uids)
    }

    fn count(&mut self, predicate: &SearchPredicate) -> Result<usize> {
        Ok(self.search_uids(predicate)?.len())
    }

    fn scan(&mut self, predicate: &SearchPredicate) -> Result<Vec<CandidateMessage>> {
        let uids = self.search_uids(predicate)?;
        let mut scanned = Vec::with_capacity(uids.len());

        for chunk in uids.chunks(FETCH_CHUNK) {
            let fetches = self
                .session
                .uid_fetch(uid_set(chunk), SCAN_QUERY)
                .map_err(network_error)?;

            for fetch in fetches.iter() {
                let Some(uid) = fetch.uid else {
                    warn!(seq = fetch.message, "FETCH response without UID, skipping");
                    continue;
                };
                let id = fetch
                    .envelope()
                    .and_then(|e| e.message_id.as_deref())
                    .and_then(|raw| std::str::from_utf8(raw).ok())
                    .map(|id| id.trim().trim_matches(['<', '>']).to_string())
                    .filter(|id| !id.is_empty());

                scanned.push(CandidateMessage {
                    id,
                    sequence: Some(uid),
                    timestamp: fetch
                        .internal_date()
                        .map(|d| d.with_timezone(&Utc))
                        .unwrap_or(DateTime::UNIX_EPOCH),
                    parts: Vec::new(),
                });
            }
        }

        Ok(scanned)
    }

    fn fetch_part(&mut self, message: &CandidateMessage, part: &Part) -> Result<Vec<u8>> {
        let uid = message
            .sequence
            .ok_or_else(|| SyncError::Network("Message has no UID".into()))?;

        if self.bodies.get(uid).is_none() {
            let body = self.fetch_body(uid)?;
            self.bodies.insert(uid, body);
        }
        match self.bodies.get(uid) {
            Some(raw) => mime::extract_part(raw, part.part_ref),
            None => Err(SyncError::Network(format!("UID {uid} body not available"))),
        }
    }

    fn release(&mut self, message: &CandidateMessage) {
        if let Some(uid) = message.sequence {
            self.bodies.remove(uid);
        }
    }

    fn logout(mut self: Box<Self>) {
        if let Err(e) = self.session.logout() {
            debug!(error = %e, "IMAP logout failed");
        }
    }
}

/// Raw message bodies by UID, bounded by total size.
#[derive(Debug)]
struct BodyCache {
    bodies: HashMap<u32, Vec<u8>>,
    bytes: usize,
    limit: usize,
}

impl BodyCache {
    fn new(limit: usize) -> Self {
        Self {
            bodies: HashMap::new(),
            bytes: 0,
            limit,
        }
    }

    /// Keep a copy of `body` if it fits in the budget.
    fn offer(&mut self, uid: u32, body: &[u8]) -> bool {
        if self.bytes + body.len() > self.limit {
            return false;
        }
        self.insert(uid, body.to_vec());
        true
    }

    /// Keep `body` regardless of the budget. Used for the message being
    /// extracted right now, which is released right after.
    fn insert(&mut self, uid: u32, body: Vec<u8>) {
        self.bytes += body.len();
        if let Some(old) = self.bodies.insert(uid, body) {
            self.bytes -= old.len();
        }
    }

    fn get(&self, uid: u32) -> Option<&[u8]> {
        self.bodies.get(&uid).map(Vec::as_slice)
    }

    fn remove(&mut self, uid: u32) {
        if let Some(old) = self.bodies.remove(&uid) {
            self.bytes -= old.len();
        }
    }

    fn clear(&mut self) {
        self.bodies.clear();
        self.bytes = 0;
    }
}

/// IMAP `SEARCH` criteria for a predicate.
///
/// `UID n:*` always matches the highest UID even when it is below `n`, so
/// callers must still filter the result.
fn search_query(predicate: &SearchPredicate) -> String {
    match predicate {
        SearchPredicate::All => "ALL".to_string(),
        SearchPredicate::SinceDate(day) => format!("SINCE {}", day.format("%d-%b-%Y")),
        SearchPredicate::SequenceGreaterThan(n) => format!("UID {}:*", n.saturating_add(1)),
    }
}

/// Comma-separated UID set.
fn uid_set(uids: &[u32]) -> String {
    uids.iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn network_error(error: imap::error::Error) -> SyncError {
    SyncError::Network(format!("IMAP error: {error}"))
}
