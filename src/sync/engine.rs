//! The incremental sync engine.

use std::time::Instant;

use chrono::Utc;
use humansize::{format_size, BINARY};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::export::filename::{sanitize_filename, stored_name};
use crate::export::{AttachmentSink, SavedAttachment};
use crate::model::{CandidateMessage, Cursor, SearchPredicate};
use crate::source::{MailSession, MailSource};
use crate::store::CursorStore;

use super::select::{latest_message, qualifying_parts, select_messages};

/// Knobs for the engine that do not belong to any collaborator.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Mailbox to search.
    pub mailbox: String,
    /// Only attachments with this extension are saved. `None` saves all.
    pub extension: Option<String>,
    /// First component of stored attachment names.
    pub filename_prefix: String,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            mailbox: "INBOX".to_string(),
            extension: Some("pdf".to_string()),
            filename_prefix: "attachment".to_string(),
        }
    }
}

impl SyncOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            mailbox: config.imap.mailbox.clone(),
            extension: config.sync.accepted_extension(),
            filename_prefix: config.sync.filename_prefix.clone(),
        }
    }
}

/// Outcome of one cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Predicate the cycle searched with.
    pub predicate: SearchPredicate,
    /// Messages the source returned.
    pub messages_found: usize,
    /// Messages left after deduplication and threshold filtering.
    pub messages_new: usize,
    /// Messages with at least one attachment saved.
    pub messages_processed: usize,
    pub attachments_saved: Vec<SavedAttachment>,
    /// Attachments whose bytes were fetched but could not be written.
    pub attachments_failed: usize,
    /// Cursor pointing at the last examined message, if any was examined.
    pub next_cursor: Option<Cursor>,
    /// Whether `next_cursor` was written to the store.
    pub cursor_advanced: bool,
    /// Total mailbox size seen by the diagnostic search after the predicate
    /// was rejected.
    pub fallback_total: Option<usize>,
    pub duration_ms: u64,
}

impl CycleReport {
    fn new(predicate: SearchPredicate) -> Self {
        Self {
            predicate,
            messages_found: 0,
            messages_new: 0,
            messages_processed: 0,
            attachments_saved: Vec::new(),
            attachments_failed: 0,
            next_cursor: None,
            cursor_advanced: false,
            fallback_total: None,
            duration_ms: 0,
        }
    }
}

/// Result of [`SyncEngine::reset`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetOutcome {
    /// The cursor now points at the newest message.
    Reset(Cursor),
    /// Nothing to point at; the cursor was left alone.
    EmptyMailbox,
}

/// Runs poll cycles against injected collaborators.
///
/// The engine is the only writer of the cursor. It must not run two cycles
/// at once; `&mut self` on every operation enforces that.
pub struct SyncEngine {
    source: Box<dyn MailSource>,
    store: Box<dyn CursorStore>,
    sink: Box<dyn AttachmentSink>,
    options: SyncOptions,
}

impl SyncEngine {
    pub fn new(
        source: Box<dyn MailSource>,
        store: Box<dyn CursorStore>,
        sink: Box<dyn AttachmentSink>,
        options: SyncOptions,
    ) -> Self {
        Self {
            source,
            store,
            sink,
            options,
        }
    }

    /// The cursor as currently stored.
    pub fn cursor(&self) -> Result<Cursor> {
        self.store.read()
    }

    /// Run one cycle: search, deduplicate, extract, advance.
    ///
    /// On `Err` the cursor is untouched. A rejected predicate is not an
    /// error: the report then carries `fallback_total` and zero processed.
    pub fn run_cycle(&mut self) -> Result<CycleReport> {
        let start = Instant::now();
        let cursor = self.store.read()?;
        let predicate = SearchPredicate::from_cursor(&cursor);
        let mut report = CycleReport::new(predicate);
        info!(%predicate, "Checking for new attachments");

        let mut session = self.open_session()?;
        let found = match session.search(&predicate) {
            Ok(found) => found,
            Err(SyncError::UnsupportedPredicate(reason)) => {
                session.logout();
                warn!(%predicate, %reason, "Search rejected, retrying with ALL for diagnostics");
                report.fallback_total = self.count_all();
                report.duration_ms = start.elapsed().as_millis() as u64;
                return Ok(report);
            }
            Err(e) => {
                session.logout();
                return Err(e);
            }
        };

        report.messages_found = found.len();
        let messages = select_messages(&cursor, &predicate, found);
        report.messages_new = messages.len();
        debug!(
            found = report.messages_found,
            new = report.messages_new,
            "Filtered candidate messages"
        );

        let extracted = self.extract_all(session.as_mut(), &messages, &mut report);
        session.logout();
        extracted?;

        report.next_cursor = messages
            .last()
            .map(|latest| Cursor::covering(latest, &messages));
        if report.messages_processed > 0 {
            if let Some(next) = &report.next_cursor {
                self.store.write(next)?;
                report.cursor_advanced = true;
            }
            info!(
                messages = report.messages_processed,
                attachments = report.attachments_saved.len(),
                "Processed messages with attachments"
            );
        } else if report.messages_new == 0 {
            info!("No new messages found");
        } else {
            info!(
                examined = report.messages_new,
                "No new messages with qualifying attachments found"
            );
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        Ok(report)
    }

    /// Point the cursor at the newest message without extracting anything.
    ///
    /// The stored sequence is the highest in the mailbox, so nothing that
    /// exists now is extracted later.
    pub fn reset(&mut self) -> Result<ResetOutcome> {
        let mut session = self.open_session()?;
        let found = session.scan(&SearchPredicate::All);
        session.logout();
        let found = found?;

        let Some(latest) = latest_message(&found) else {
            info!("No messages in mailbox, cursor left unchanged");
            return Ok(ResetOutcome::EmptyMailbox);
        };

        let cursor = Cursor::covering(latest, &found);
        self.store.write(&cursor)?;
        info!(
            id = ?cursor.last_message_id,
            uid = ?cursor.last_sequence,
            at = ?cursor.last_processed_at,
            "Reset cursor to latest message"
        );
        Ok(ResetOutcome::Reset(cursor))
    }

    fn open_session(&self) -> Result<Box<dyn MailSession>> {
        let mut session = self.source.connect()?;
        if let Err(e) = session.open_mailbox(&self.options.mailbox) {
            session.logout();
            return Err(e);
        }
        Ok(session)
    }

    /// Diagnostic-only `ALL` search on a fresh session. Never fails the cycle.
    fn count_all(&self) -> Option<usize> {
        let outcome = self.open_session().and_then(|mut session| {
            let total = session.count(&SearchPredicate::All);
            session.logout();
            total
        });
        match outcome {
            Ok(total) => {
                info!(total, "Found messages using ALL search");
                Some(total)
            }
            Err(e) => {
                warn!(error = %e, "Diagnostic ALL search failed");
                None
            }
        }
    }

    fn extract_all(
        &mut self,
        session: &mut dyn MailSession,
        messages: &[CandidateMessage],
        report: &mut CycleReport,
    ) -> Result<()> {
        for message in messages {
            let outcome = self.extract_message(session, message, report);
            session.release(message);
            outcome?;
        }
        Ok(())
    }

    fn extract_message(
        &mut self,
        session: &mut dyn MailSession,
        message: &CandidateMessage,
        report: &mut CycleReport,
    ) -> Result<()> {
        let parts = qualifying_parts(message, self.options.extension.as_deref());
        if parts.is_empty() {
            return Ok(());
        }
        info!(
            id = %message.identity(),
            uid = ?message.sequence,
            date = %message.timestamp,
            parts = parts.len(),
            "Processing message"
        );

        let mut saved_any = false;
        for (part, declared) in parts {
            let data = session.fetch_part(message, part)?;
            let sanitized = sanitize_filename(&declared, self.options.extension.as_deref());
            let name = stored_name(&self.options.filename_prefix, Utc::now(), &sanitized);

            match self.sink.save(&name, &data) {
                Ok(saved) => {
                    info!(
                        location = %saved.location,
                        size = %format_size(saved.size, BINARY),
                        "Attachment saved"
                    );
                    report.attachments_saved.push(saved);
                    saved_any = true;
                }
                Err(e) => {
                    warn!(name = %name, error = %e, "Failed to save attachment");
                    report.attachments_failed += 1;
                }
            }
        }

        if saved_any {
            report.messages_processed += 1;
        }
        Ok(())
    }
}
