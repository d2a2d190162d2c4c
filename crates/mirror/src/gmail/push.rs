//! Pub/Sub push notification decoding
//!
//! Gmail publishes `{"emailAddress": ..., "historyId": ...}` to a Pub/Sub
//! topic, and Pub/Sub pushes it wrapped in an envelope with base64 `data`.
//! Delivery is at-least-once; empty bodies are subscription verification pings.

use base64::prelude::*;
use serde::Deserialize;

use crate::models::HistoryId;

/// Decoded form of one push delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushNotification {
    /// Empty body (verification ping)
    Empty,
    /// Envelope without a `message.data` payload
    NoData,
    /// Body or payload that could not be decoded
    Undecodable,
    /// A mailbox change notification
    Notification {
        email_address: Option<String>,
        history_id: HistoryId,
    },
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    message: Option<EnvelopeMessage>,
}

#[derive(Deserialize)]
struct EnvelopeMessage {
    #[serde(default)]
    data: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailPushData {
    #[serde(default)]
    email_address: Option<String>,
    history_id: HistoryId,
}

impl PushNotification {
    /// Decode a raw push request body
    pub fn decode(body: &[u8]) -> Self {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Self::Empty;
        }

        let Ok(envelope) = serde_json::from_slice::<Envelope>(body) else {
            return Self::Undecodable;
        };

        let data = envelope
            .message
            .and_then(|m| m.data)
            .filter(|d| !d.is_empty());
        let Some(data) = data else {
            return Self::NoData;
        };

        let Some(decoded) = decode_base64(&data) else {
            return Self::Undecodable;
        };

        match serde_json::from_slice::<GmailPushData>(&decoded) {
            Ok(push) => Self::Notification {
                email_address: push.email_address,
                history_id: push.history_id,
            },
            Err(_) => Self::Undecodable,
        }
    }

    /// History position carried by a change notification
    pub fn history_id(&self) -> Option<&HistoryId> {
        match self {
            Self::Notification { history_id, .. } => Some(history_id),
            _ => None,
        }
    }
}

/// Pub/Sub uses standard base64, but accept the URL-safe alphabet too
fn decode_base64(data: &str) -> Option<Vec<u8>> {
    let engines: [&base64::engine::GeneralPurpose; 3] =
        [&BASE64_STANDARD, &BASE64_URL_SAFE, &BASE64_URL_SAFE_NO_PAD];

    engines.iter().find_map(|engine| engine.decode(data.trim()).ok())
}
