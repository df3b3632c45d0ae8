//! Raw message parser.
//!
//! The blob is split at the first blank line. The header block is decoded
//! with `mail-parser` (which also handles RFC 2047 encoded words); the body
//! is kept as-is apart from line-ending normalization.

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use mail_parser::MessageParser;

use crate::error::MailError;
use crate::message::Message;

/// Parse a raw RFC 822 style message.
///
/// Only empty input fails. A missing blank line yields an empty body and a
/// missing or unreadable `Date` falls back to the current time.
pub fn parse(raw: &[u8]) -> Result<Message, MailError> {
    let text = String::from_utf8_lossy(raw);
    if text.trim().is_empty() {
        return Err(MailError::Parse("empty message".into()));
    }

    let (header_block, body) = split_header_block(&text);

    let mut headers = header_block.to_string();
    headers.push_str("\r\n");
    let parsed = MessageParser::default().parse(headers.as_bytes());

    let (sender, recipient, subject, sent_at) = match parsed.as_ref() {
        Some(parsed) => (
            extract_addresses(parsed.from()).into_iter().next().unwrap_or_default(),
            extract_addresses(parsed.to()).join(", "),
            parsed.subject().unwrap_or_default().to_string(),
            parsed.date().and_then(to_utc),
        ),
        None => (String::new(), String::new(), String::new(), None),
    };

    Ok(Message {
        sender,
        recipient,
        subject,
        sent_at: sent_at.unwrap_or_else(Utc::now),
        body: body.map(normalize_body).unwrap_or_default(),
        read: false,
    })
}

/// Split at the first empty line. The body is `None` when there is none.
fn split_header_block(text: &str) -> (&str, Option<&str>) {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']).is_empty() {
            return (&text[..offset], Some(&text[offset + line.len()..]));
        }
        offset += line.len();
    }
    (text, None)
}

fn normalize_body(body: &str) -> String {
    body.replace("\r\n", "\n")
        .trim_end_matches('\n')
        .to_string()
}

/// Collect the addresses of an address header, skipping display-only entries.
fn extract_addresses(addr: Option<&mail_parser::Address>) -> Vec<String> {
    let Some(addr) = addr else {
        return Vec::new();
    };
    match addr {
        mail_parser::Address::List(addrs) => addrs
            .iter()
            .filter_map(|a| a.address.as_ref().map(|s| s.to_string()))
            .collect(),
        mail_parser::Address::Group(groups) => groups
            .iter()
            .flat_map(|g| {
                g.addresses
                    .iter()
                    .filter_map(|a| a.address.as_ref().map(|s| s.to_string()))
            })
            .collect(),
    }
}

fn to_utc(d: &mail_parser::DateTime) -> Option<DateTime<Utc>> {
    let naive = NaiveDate::from_ymd_opt(i32::from(d.year), u32::from(d.month), u32::from(d.day))?
        .and_hms_opt(u32::from(d.hour), u32::from(d.minute), u32::from(d.second))?;
    let mut offset_secs = i32::from(d.tz_hour) * 3600 + i32::from(d.tz_minute) * 60;
    if d.tz_before_gmt {
        offset_secs = -offset_secs;
    }
    let offset = FixedOffset::east_opt(offset_secs)?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use chrono::Datelike;

    use super::*;

    const SAMPLE: &str = "From: Alice <alice@example.com>\r\n\
                          To: bob@example.com\r\n\
                          Subject: Lunch\r\n\
                          Date: Mon, 02 Jan 2006 15:04:05 -0700\r\n\
                          X-Mailer: test\r\n\
                          \r\n\
                          See you at noon.\r\n\
                          Bring a jacket.\r\n";

    #[test]
    fn parses_recognized_headers_and_body() {
        let msg = parse(SAMPLE.as_bytes()).unwrap();
        assert_eq!(msg.sender, "alice@example.com");
        assert_eq!(msg.recipient, "bob@example.com");
        assert_eq!(msg.subject, "Lunch");
        assert_eq!(msg.body, "See you at noon.\nBring a jacket.");
        assert!(!msg.read);
    }

    #[test]
    fn date_respects_numeric_zone() {
        let msg = parse(SAMPLE.as_bytes()).unwrap();
        let expected = Utc.with_ymd_and_hms(2006, 1, 2, 22, 4, 5).unwrap();
        assert_eq!(msg.sent_at, expected);
    }

    #[test]
    fn missing_date_falls_back_to_now() {
        let before = Utc::now();
        let msg = parse(b"From: a@example.com\r\nSubject: x\r\n\r\nbody\r\n").unwrap();
        assert!(msg.sent_at >= before - chrono::Duration::seconds(1));
        assert!(msg.sent_at <= Utc::now() + chrono::Duration::seconds(1));
    }

    #[test]
    fn garbage_date_falls_back_to_now() {
        let msg = parse(b"From: a@example.com\r\nDate: sometime last week\r\n\r\nbody\r\n").unwrap();
        assert!(msg.sent_at.year() >= 2024);
        assert_eq!(msg.body, "body");
    }

    #[test]
    fn no_blank_line_gives_empty_body() {
        let msg = parse(b"From: a@example.com\r\nSubject: headers only\r\n").unwrap();
        assert_eq!(msg.subject, "headers only");
        assert_eq!(msg.body, "");
    }

    #[test]
    fn empty_input_is_a_parse_error() {
        assert!(matches!(parse(b""), Err(MailError::Parse(_))));
        assert!(matches!(parse(b"\r\n  \r\n"), Err(MailError::Parse(_))));
    }

    #[test]
    fn body_keeps_later_blank_lines_and_leading_dots() {
        let msg = parse(b"Subject: s\r\n\r\nfirst\r\n\r\n.hello\r\n").unwrap();
        assert_eq!(msg.body, "first\n\n.hello");
    }

    #[test]
    fn multiple_recipients_are_joined() {
        let msg = parse(b"To: a@example.com, Bob <b@example.com>\r\n\r\nhi\r\n").unwrap();
        assert_eq!(msg.recipient, "a@example.com, b@example.com");
    }

    #[test]
    fn encoded_subject_is_decoded() {
        let msg = parse(b"Subject: =?UTF-8?Q?Caf=C3=A9?=\r\n\r\nhi\r\n").unwrap();
        assert_eq!(msg.subject, "Café");
    }

    #[test]
    fn split_header_block_handles_bare_lf() {
        let (headers, body) = split_header_block("A: 1\nB: 2\n\nbody\n");
        assert_eq!(headers, "A: 1\nB: 2\n");
        assert_eq!(body, Some("body\n"));
    }
}
