//! The durable progress marker.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::message::CandidateMessage;

/// Position of the last successfully processed message.
///
/// Fields are kept as raw text exactly as they were stored. They are only
/// interpreted when a search predicate is chosen, so a corrupt value widens
/// the search instead of failing the cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Identity of the last examined message (see [`CandidateMessage::identity`]).
    pub last_message_id: Option<String>,

    /// Highest mailbox-local sequence number (IMAP UID) examined so far.
    /// Not necessarily the sequence of `last_message_id`.
    pub last_sequence: Option<String>,

    /// RFC 3339 timestamp of that message.
    pub last_processed_at: Option<String>,
}

impl Cursor {
    /// Build the cursor that points at `message`.
    pub fn from_message(message: &CandidateMessage) -> Self {
        let identity = message.identity();
        Self {
            last_message_id: (!identity.is_empty()).then_some(identity),
            last_sequence: message.sequence.map(|seq| seq.to_string()),
            last_processed_at: Some(message.timestamp.to_rfc3339()),
        }
    }

    /// Cursor past every message in `examined`: identity and time of
    /// `latest`, sequence of the highest-numbered message.
    ///
    /// Date order and UID order can disagree (APPEND and moves keep the old
    /// date but get a new UID), so the threshold must cover all of them.
    pub fn covering(latest: &CandidateMessage, examined: &[CandidateMessage]) -> Self {
        let mut cursor = Self::from_message(latest);
        let highest = examined
            .iter()
            .filter_map(|m| m.sequence)
            .chain(latest.sequence)
            .max();
        if let Some(highest) = highest {
            cursor.last_sequence = Some(highest.to_string());
        }
        cursor
    }

    /// `true` until the first advancing cycle or reset.
    pub fn is_empty(&self) -> bool {
        self.last_message_id.is_none()
            && self.last_sequence.is_none()
            && self.last_processed_at.is_none()
    }

    /// The stored sequence number, if it parses as a positive integer.
    pub fn sequence(&self) -> Option<u32> {
        self.last_sequence
            .as_deref()
            .and_then(|s| s.trim().parse::<u32>().ok())
            .filter(|&n| n > 0)
    }

    /// The stored timestamp, if it parses as RFC 3339.
    pub fn processed_at(&self) -> Option<DateTime<Utc>> {
        self.last_processed_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Calendar day of [`Cursor::processed_at`], in UTC.
    pub fn processed_on(&self) -> Option<NaiveDate> {
        self.processed_at().map(|dt| dt.date_naive())
    }

    /// Whether `message` is the one this cursor points at.
    pub fn is_last_message(&self, message: &CandidateMessage) -> bool {
        match self.last_message_id.as_deref() {
            Some(id) if !id.is_empty() => message.identity() == id,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn message(id: Option<&str>, seq: Option<u32>) -> CandidateMessage {
        CandidateMessage {
            id: id.map(String::from),
            sequence: seq,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            parts: Vec::new(),
        }
    }

    #[test]
    fn test_default_is_empty() {
        assert!(Cursor::default().is_empty());
        assert_eq!(Cursor::default().sequence(), None);
        assert_eq!(Cursor::default().processed_at(), None);
    }

    #[test]
    fn test_from_message() {
        let cursor = Cursor::from_message(&message(Some("<m3@example.com>"), Some(7)));
        assert_eq!(cursor.last_message_id.as_deref(), Some("<m3@example.com>"));
        assert_eq!(cursor.last_sequence.as_deref(), Some("7"));
        assert_eq!(
            cursor.processed_at(),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_from_message_falls_back_to_sequence_identity() {
        let cursor = Cursor::from_message(&message(None, Some(42)));
        assert_eq!(cursor.last_message_id.as_deref(), Some("42"));
    }

    #[test]
    fn test_covering_takes_highest_sequence() {
        let mut late = message(Some("<late@x>"), Some(3));
        late.timestamp = Utc.with_ymd_and_hms(2024, 3, 9, 0, 0, 0).unwrap();
        let examined = vec![
            message(Some("<moved@x>"), Some(11)),
            message(Some("<b@x>"), Some(4)),
            late.clone(),
        ];

        let cursor = Cursor::covering(&late, &examined);
        assert_eq!(cursor.last_message_id.as_deref(), Some("<late@x>"));
        assert_eq!(cursor.last_sequence.as_deref(), Some("11"));
        assert_eq!(cursor.processed_at(), Some(late.timestamp));
    }

    #[test]
    fn test_covering_without_sequences() {
        let latest = message(Some("<a@x>"), None);
        let cursor = Cursor::covering(&latest, std::slice::from_ref(&latest));
        assert_eq!(cursor.last_sequence, None);
        assert_eq!(cursor.last_message_id.as_deref(), Some("<a@x>"));
    }

    #[test]
    fn test_sequence_parsing() {
        let mut cursor = Cursor {
            last_sequence: Some("17".into()),
            ..Cursor::default()
        };
        assert_eq!(cursor.sequence(), Some(17));

        cursor.last_sequence = Some("0".into());
        assert_eq!(cursor.sequence(), None);

        cursor.last_sequence = Some("-3".into());
        assert_eq!(cursor.sequence(), None);

        cursor.last_sequence = Some("abc".into());
        assert_eq!(cursor.sequence(), None);

        cursor.last_sequence = Some(String::new());
        assert_eq!(cursor.sequence(), None);
    }

    #[test]
    fn test_processed_on_uses_utc_day() {
        let cursor = Cursor {
            last_processed_at: Some("2024-01-01T23:30:00-02:00".into()),
            ..Cursor::default()
        };
        assert_eq!(
            cursor.processed_on(),
            Some(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())
        );
    }

    #[test]
    fn test_is_last_message() {
        let cursor = Cursor {
            last_message_id: Some("<a@x>".into()),
            ..Cursor::default()
        };
        assert!(cursor.is_last_message(&message(Some("<a@x>"), Some(1))));
        assert!(!cursor.is_last_message(&message(Some("<b@x>"), Some(1))));
        assert!(!Cursor::default().is_last_message(&message(None, None)));
    }
}
