//! Pure selection logic: which messages a cycle looks at, in what order,
//! and which of their parts qualify.

use crate::export::filename::placeholder_name;
use crate::model::{CandidateMessage, Cursor, Part, SearchPredicate};

/// Drop already-processed and out-of-range messages, then sort the rest
/// into processing order.
///
/// Equality with the cursor's last identity is the only duplicate barrier:
/// predicates are inclusive or imprecise.
pub fn select_messages(
    cursor: &Cursor,
    predicate: &SearchPredicate,
    found: Vec<CandidateMessage>,
) -> Vec<CandidateMessage> {
    let mut selected: Vec<CandidateMessage> = found
        .into_iter()
        .filter(|m| predicate.admits(m))
        .filter(|m| !cursor.is_last_message(m))
        .collect();
    selected.sort_by(CandidateMessage::cycle_order);
    selected
}

/// Attachment parts worth saving, paired with the name they declared.
///
/// With an extension filter, only parts whose declared filename carries that
/// extension qualify. Without one, every attachment qualifies and nameless
/// parts get a placeholder.
pub fn qualifying_parts<'a>(
    message: &'a CandidateMessage,
    extension: Option<&str>,
) -> Vec<(&'a Part, String)> {
    message
        .attachment_parts()
        .enumerate()
        .filter_map(|(idx, part)| match extension {
            Some(ext) => part
                .filename
                .clone()
                .filter(|_| part.has_extension(ext))
                .map(|name| (part, name)),
            None => Some((
                part,
                part.filename.clone().unwrap_or_else(|| placeholder_name(idx)),
            )),
        })
        .collect()
}

/// The most recent message by processing order.
pub fn latest_message(found: &[CandidateMessage]) -> Option<&CandidateMessage> {
    found.iter().max_by(|a, b| CandidateMessage::cycle_order(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Disposition, PartRef};
    use chrono::{TimeZone, Utc};

    fn part(disposition: Disposition, filename: Option<&str>, idx: usize) -> Part {
        Part {
            disposition,
            filename: filename.map(String::from),
            content_type: None,
            part_ref: PartRef(idx),
        }
    }

    fn msg(id: &str, seq: u32, day: u32, parts: Vec<Part>) -> CandidateMessage {
        CandidateMessage {
            id: Some(id.to_string()),
            sequence: Some(seq),
            timestamp: Utc.with_ymd_and_hms(2024, 1, day, 9, 0, 0).unwrap(),
            parts,
        }
    }

    #[test]
    fn test_select_drops_last_processed_and_sorts() {
        let cursor = Cursor {
            last_message_id: Some("m2".into()),
            last_sequence: None,
            last_processed_at: Some("2024-01-02T09:00:00+00:00".into()),
        };
        let found = vec![
            msg("m4", 4, 4, vec![]),
            msg("m2", 2, 2, vec![]),
            msg("m3", 3, 3, vec![]),
        ];
        let selected = select_messages(&cursor, &SearchPredicate::All, found);
        let ids: Vec<String> = selected.iter().map(|m| m.identity()).collect();
        assert_eq!(ids, vec!["m3", "m4"]);
    }

    #[test]
    fn test_select_applies_sequence_threshold() {
        let found = vec![msg("m7", 7, 7, vec![]), msg("m8", 8, 8, vec![])];
        let selected = select_messages(
            &Cursor::default(),
            &SearchPredicate::SequenceGreaterThan(7),
            found,
        );
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].sequence, Some(8));
    }

    #[test]
    fn test_qualifying_parts_with_extension() {
        let m = msg(
            "m",
            1,
            1,
            vec![
                part(Disposition::Attachment, Some("a.pdf"), 1),
                part(Disposition::Attachment, Some("b.PDF"), 2),
                part(Disposition::Attachment, Some("c.docx"), 3),
                part(Disposition::Attachment, None, 4),
                part(Disposition::Inline, Some("d.pdf"), 5),
            ],
        );
        let names: Vec<String> = qualifying_parts(&m, Some("pdf"))
            .into_iter()
            .map(|(_, n)| n)
            .collect();
        assert_eq!(names, vec!["a.pdf", "b.PDF"]);
    }

    #[test]
    fn test_qualifying_parts_unrestricted() {
        let m = msg(
            "m",
            1,
            1,
            vec![
                part(Disposition::Attachment, Some("c.docx"), 1),
                part(Disposition::Attachment, None, 2),
                part(Disposition::Unspecified, Some("e.txt"), 3),
            ],
        );
        let names: Vec<String> = qualifying_parts(&m, None)
            .into_iter()
            .map(|(_, n)| n)
            .collect();
        assert_eq!(names, vec!["c.docx", "attachment-1"]);
    }

    #[test]
    fn test_latest_message() {
        let found = vec![
            msg("a", 1, 5, vec![]),
            msg("b", 2, 9, vec![]),
            msg("c", 3, 2, vec![]),
        ];
        assert_eq!(latest_message(&found).map(|m| m.identity()), Some("b".into()));
        assert!(latest_message(&[]).is_none());
    }
}
