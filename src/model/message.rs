//! Transient views of remote messages and their parts.
//!
//! These live for a single cycle only. Nothing here is persisted.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

/// One remote message as seen by the sync engine.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateMessage {
    /// Source-assigned stable identifier (the `Message-ID` header for IMAP).
    pub id: Option<String>,

    /// Mailbox-local sequence number (the IMAP UID).
    pub sequence: Option<u32>,

    /// Receipt timestamp.
    pub timestamp: DateTime<Utc>,

    /// Leaf parts of the message structure, in document order.
    pub parts: Vec<Part>,
}

impl CandidateMessage {
    /// The identity compared against the cursor: the id when present,
    /// otherwise the sequence number, otherwise an empty string.
    pub fn identity(&self) -> String {
        match (&self.id, self.sequence) {
            (Some(id), _) if !id.is_empty() => id.clone(),
            (_, Some(seq)) => seq.to_string(),
            _ => String::new(),
        }
    }

    /// Processing order: timestamp, then sequence number, then identity.
    pub fn cycle_order(a: &Self, b: &Self) -> Ordering {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.sequence.cmp(&b.sequence))
            .then_with(|| a.identity().cmp(&b.identity()))
    }

    /// Parts whose disposition is `attachment`.
    pub fn attachment_parts(&self) -> impl Iterator<Item = &Part> {
        self.parts
            .iter()
            .filter(|p| p.disposition == Disposition::Attachment)
    }
}

/// `Content-Disposition` kind of a part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Attachment,
    Inline,
    /// No `Content-Disposition` header (or an unknown kind).
    Unspecified,
}

impl Disposition {
    /// Interpret a disposition type token, case-insensitively.
    pub fn parse(kind: &str) -> Self {
        if kind.eq_ignore_ascii_case("attachment") {
            Self::Attachment
        } else if kind.eq_ignore_ascii_case("inline") {
            Self::Inline
        } else {
            Self::Unspecified
        }
    }
}

/// Opaque handle a source uses to fetch a part's bytes later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartRef(pub usize);

/// A leaf of the message's MIME tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    pub disposition: Disposition,

    /// Declared filename. Untrusted: comes straight from the sender.
    pub filename: Option<String>,

    /// `type/subtype`, when declared.
    pub content_type: Option<String>,

    pub part_ref: PartRef,
}

impl Part {
    /// Whether the declared filename has extension `ext` (without the dot),
    /// compared case-insensitively. Parts without a filename never match.
    pub fn has_extension(&self, ext: &str) -> bool {
        let Some(name) = self.filename.as_deref() else {
            return false;
        };
        match name.rsplit_once('.') {
            Some((stem, found)) => !stem.is_empty() && found.eq_ignore_ascii_case(ext),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn part(filename: Option<&str>) -> Part {
        Part {
            disposition: Disposition::Attachment,
            filename: filename.map(String::from),
            content_type: None,
            part_ref: PartRef(0),
        }
    }

    fn msg(id: Option<&str>, seq: Option<u32>, hour: u32) -> CandidateMessage {
        CandidateMessage {
            id: id.map(String::from),
            sequence: seq,
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap(),
            parts: Vec::new(),
        }
    }

    #[test]
    fn test_identity_fallbacks() {
        assert_eq!(msg(Some("<x@y>"), Some(3), 0).identity(), "<x@y>");
        assert_eq!(msg(Some(""), Some(3), 0).identity(), "3");
        assert_eq!(msg(None, Some(3), 0).identity(), "3");
        assert_eq!(msg(None, None, 0).identity(), "");
    }

    #[test]
    fn test_cycle_order_breaks_ties() {
        let mut messages = vec![
            msg(Some("c"), Some(9), 10),
            msg(Some("b"), Some(4), 10),
            msg(Some("a"), Some(8), 8),
            msg(Some("d"), None, 10),
        ];
        messages.sort_by(CandidateMessage::cycle_order);
        let ids: Vec<String> = messages.iter().map(|m| m.identity()).collect();
        assert_eq!(ids, vec!["a", "d", "b", "c"]);
    }

    #[test]
    fn test_disposition_parse() {
        assert_eq!(Disposition::parse("ATTACHMENT"), Disposition::Attachment);
        assert_eq!(Disposition::parse("inline"), Disposition::Inline);
        assert_eq!(Disposition::parse("form-data"), Disposition::Unspecified);
    }

    #[test]
    fn test_has_extension() {
        assert!(part(Some("report.pdf")).has_extension("pdf"));
        assert!(part(Some("REPORT.PDF")).has_extension("pdf"));
        assert!(part(Some("archive.tar.pdf")).has_extension("pdf"));
        assert!(!part(Some("report.pdf.exe")).has_extension("pdf"));
        assert!(!part(Some("pdf")).has_extension("pdf"));
        assert!(!part(Some(".pdf")).has_extension("pdf"));
        assert!(!part(None).has_extension("pdf"));
    }
}
