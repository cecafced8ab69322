//! MIME structure walking: part listing and on-demand part extraction.

use chrono::{DateTime, Utc};
use mail_parser::{MessageParser, MimeHeaders, PartType};

use crate::error::{Result, SyncError};
use crate::model::{Disposition, Part, PartRef};

/// Header-level facts about a message plus its leaf parts.
#[derive(Debug, Clone)]
pub struct ParsedMessage {
    /// `Message-ID` without angle brackets, as mail-parser reports it.
    pub message_id: Option<String>,
    /// Parsed `Date:` header.
    pub date: Option<DateTime<Utc>>,
    pub parts: Vec<Part>,
}

/// Parse a complete raw message (headers + body) and list its leaf parts.
///
/// Returns `None` when the bytes are not a parseable message at all.
pub fn parse_message(raw_message: &[u8]) -> Option<ParsedMessage> {
    let msg = MessageParser::default().parse(skip_bom(raw_message))?;

    let date = msg
        .date()
        .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0));

    Some(ParsedMessage {
        message_id: msg.message_id().map(String::from),
        date,
        parts: list_parts_from_parsed(&msg),
    })
}

/// List leaf parts of a raw message. Unparseable input yields no parts.
pub fn list_parts(raw_message: &[u8]) -> Vec<Part> {
    parse_message(raw_message)
        .map(|parsed| parsed.parts)
        .unwrap_or_default()
}

/// Decode the content of the part `part_ref` points at.
pub fn extract_part(raw_message: &[u8], part_ref: PartRef) -> Result<Vec<u8>> {
    let msg = MessageParser::default()
        .parse(skip_bom(raw_message))
        .ok_or_else(|| SyncError::Network("Fetched message could not be parsed".into()))?;

    msg.parts
        .get(part_ref.0)
        .filter(|part| !matches!(part.body, PartType::Multipart(_)))
        .map(|part| part.contents().to_vec())
        .ok_or_else(|| SyncError::Network(format!("Part {} not found in message", part_ref.0)))
}

fn list_parts_from_parsed(msg: &mail_parser::Message<'_>) -> Vec<Part> {
    msg.parts
        .iter()
        .enumerate()
        .filter(|(_, part)| !matches!(part.body, PartType::Multipart(_)))
        .map(|(idx, part)| {
            let disposition = part
                .content_disposition()
                .map(|d| Disposition::parse(d.ctype()))
                .unwrap_or(Disposition::Unspecified);

            let content_type = part.content_type().map(|ct| match ct.subtype() {
                Some(sub) => format!("{}/{}", ct.ctype(), sub),
                None => ct.ctype().to_string(),
            });

            Part {
                disposition,
                filename: part
                    .attachment_name()
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(String::from),
                content_type,
                part_ref: PartRef(idx),
            }
        })
        .collect()
}

/// Drop a UTF-8 byte-order mark some servers leave in front of the message.
fn skip_bom(data: &[u8]) -> &[u8] {
    data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTIPART: &str = "From: Sender <sender@example.com>\r\n\
To: me@example.com\r\n\
Subject: Invoice\r\n\
Message-ID: <inv-1@example.com>\r\n\
Date: Tue, 02 Jan 2024 10:00:00 +0000\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"XYZ\"\r\n\
\r\n\
--XYZ\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
See attached.\r\n\
--XYZ\r\n\
Content-Type: application/pdf; name=\"invoice.pdf\"\r\n\
Content-Disposition: attachment; filename=\"invoice.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0xLjQK\r\n\
--XYZ\r\n\
Content-Type: image/png\r\n\
Content-Disposition: inline; filename=\"logo.png\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
iVBORw0K\r\n\
--XYZ--\r\n";

    #[test]
    fn test_parse_headers() {
        let parsed = parse_message(MULTIPART.as_bytes()).unwrap();
        assert_eq!(parsed.message_id.as_deref(), Some("inv-1@example.com"));
        assert_eq!(
            parsed.date.map(|d| d.to_rfc3339()),
            Some("2024-01-02T10:00:00+00:00".to_string())
        );
    }

    #[test]
    fn test_list_parts_dispositions() {
        let parts = list_parts(MULTIPART.as_bytes());
        let attachments: Vec<&Part> = parts
            .iter()
            .filter(|p| p.disposition == Disposition::Attachment)
            .collect();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].filename.as_deref(), Some("invoice.pdf"));
        assert_eq!(
            attachments[0].content_type.as_deref(),
            Some("application/pdf")
        );

        let inline = parts
            .iter()
            .find(|p| p.disposition == Disposition::Inline)
            .unwrap();
        assert_eq!(inline.filename.as_deref(), Some("logo.png"));
    }

    #[test]
    fn test_extract_part_decodes_base64() {
        let parts = list_parts(MULTIPART.as_bytes());
        let pdf = parts
            .iter()
            .find(|p| p.filename.as_deref() == Some("invoice.pdf"))
            .unwrap();
        let data = extract_part(MULTIPART.as_bytes(), pdf.part_ref).unwrap();
        assert_eq!(data, b"%PDF-1.4\n");
    }

    #[test]
    fn test_extract_missing_part() {
        assert!(extract_part(MULTIPART.as_bytes(), PartRef(99)).is_err());
    }

    #[test]
    fn test_plain_message_has_no_attachments() {
        let raw = b"Subject: hi\r\n\r\nJust text\r\n";
        let parts = list_parts(raw);
        assert!(parts
            .iter()
            .all(|p| p.disposition != Disposition::Attachment));
    }
}
