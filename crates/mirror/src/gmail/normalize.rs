//! Gmail API response normalization
//!
//! Converts Gmail message metadata to the mirrored [`Message`] model.
//! Normalization never fails: missing headers become empty strings and
//! unparseable dates fall back to the processing time.

use chrono::{DateTime, NaiveDateTime, Utc};

use super::api::GmailMessage;
use crate::models::{Message, MessageId, label};

/// Result of normalizing one Gmail message
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    /// The message belongs in the mirror
    Message(Message),
    /// The message must not be mirrored
    Skip(SkipReason),
}

/// Why a message was left out of the mirror
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Trash,
    Spam,
}

/// Fallback date layout, applied to the first 31 characters of the header
const FALLBACK_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S";
const FALLBACK_DATE_LEN: usize = 31;

/// Normalize a Gmail API message to a mirrored Message
pub fn normalize_message(gmail_msg: GmailMessage) -> Normalized {
    let labels = &gmail_msg.label_ids;
    if labels.iter().any(|l| l == label::TRASH) {
        return Normalized::Skip(SkipReason::Trash);
    }
    if labels.iter().any(|l| l == label::SPAM) {
        return Normalized::Skip(SkipReason::Spam);
    }

    let is_starred = label::is_starred(labels);
    let date = extract_header(&gmail_msg, "Date");

    Normalized::Message(
        Message::builder(MessageId::new(&gmail_msg.id))
            .subject(extract_header(&gmail_msg, "Subject"))
            .sender(extract_header(&gmail_msg, "From"))
            .recipient(extract_header(&gmail_msg, "To"))
            .received_at(parse_date(&date))
            .snippet(gmail_msg.snippet)
            .starred(is_starred)
            .build(),
    )
}

/// Extract a header value by name, or an empty string if absent
fn extract_header(gmail_msg: &GmailMessage, name: &str) -> String {
    gmail_msg
        .payload
        .as_ref()
        .and_then(|payload| {
            payload
                .headers
                .iter()
                .find(|h| h.name.eq_ignore_ascii_case(name))
        })
        .map(|h| h.value.clone())
        .unwrap_or_default()
}

/// Parse a Date header
///
/// Tries RFC 2822 first, then the fixed fallback layout on the truncated
/// header (interpreted as UTC), then gives up and returns the current time.
pub fn parse_date(value: &str) -> DateTime<Utc> {
    let value = value.trim();
    if value.is_empty() {
        return Utc::now();
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return dt.with_timezone(&Utc);
    }

    let truncated: String = value.chars().take(FALLBACK_DATE_LEN).collect();
    if let Ok((naive, _rest)) = NaiveDateTime::parse_and_remainder(&truncated, FALLBACK_DATE_FORMAT) {
        return naive.and_utc();
    }

    Utc::now()
}
