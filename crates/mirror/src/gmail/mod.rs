//! Gmail API integration
//!
//! This module provides:
//! - The `MailService` seam the sync engine talks to
//! - A Gmail REST client implementing it
//! - Credential providers for that client
//! - Normalization of Gmail message metadata to domain models
//! - Decoding of Pub/Sub push notifications

mod auth;
mod client;
mod normalize;
mod push;

pub use auth::{CredentialProvider, StaticToken, TokenFile};
pub use client::{GmailClient, GmailError};
pub use normalize::{Normalized, SkipReason, normalize_message, parse_date};
pub use push::PushNotification;

use anyhow::Result;

use crate::models::{HistoryId, MessageId};
use api::{GmailMessage, HistoryResponse, ListMessagesResponse, ProfileResponse, WatchRequest, WatchResponse};

/// Headers requested when fetching message metadata
pub const METADATA_HEADERS: [&str; 4] = ["Subject", "From", "To", "Date"];

/// History record types the reconciler consumes
pub const HISTORY_TYPES: [&str; 4] = ["messageAdded", "messageDeleted", "labelAdded", "labelRemoved"];

/// One fetch from the history endpoint
///
/// Expiry is a result variant rather than an error so the fallback path is
/// visible to every caller.
#[derive(Debug)]
pub enum HistoryPage {
    /// A page of history, possibly with a continuation token
    Page(HistoryResponse),
    /// The start position is older than the retained history (HTTP 404)
    Expired,
}

/// Remote mailbox operations used by the sync engine
///
/// Implemented by [`GmailClient`] for the real API. Every call is blocking.
pub trait MailService: Send + Sync {
    /// Whether a credential is currently available
    fn has_credentials(&self) -> bool;

    /// List one page of message references carrying `label`
    fn list_messages(
        &self,
        label: &str,
        query: Option<&str>,
        max_results: usize,
        page_token: Option<&str>,
    ) -> Result<ListMessagesResponse>;

    /// Fetch labels, snippet and the metadata headers of one message
    fn get_message_metadata(&self, id: &MessageId) -> Result<GmailMessage>;

    /// Fetch one page of history starting at `start_history_id`
    fn list_history(
        &self,
        start_history_id: &HistoryId,
        page_token: Option<&str>,
    ) -> Result<HistoryPage>;

    /// Fetch the account profile, including the current history position
    fn get_profile(&self) -> Result<ProfileResponse>;

    /// Register the mailbox for push notifications
    fn watch(&self, request: &WatchRequest) -> Result<WatchResponse>;
}

/// Gmail API response types
pub mod api {
    use serde::{Deserialize, Serialize};

    use crate::models::HistoryId;

    /// Response from listing messages
    #[derive(Debug, Clone, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ListMessagesResponse {
        pub messages: Option<Vec<MessageRef>>,
        pub next_page_token: Option<String>,
        pub result_size_estimate: Option<u32>,
    }

    /// Reference to a message (just ID and thread ID)
    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessageRef {
        pub id: String,
        #[serde(default)]
        pub thread_id: Option<String>,
    }

    impl MessageRef {
        pub fn new(id: impl Into<String>) -> Self {
            Self {
                id: id.into(),
                thread_id: None,
            }
        }
    }

    /// Message fetched with `format=metadata`
    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct GmailMessage {
        pub id: String,
        #[serde(default)]
        pub thread_id: Option<String>,
        #[serde(default)]
        pub label_ids: Vec<String>,
        #[serde(default)]
        pub snippet: String,
        #[serde(default)]
        pub internal_date: Option<String>,
        #[serde(default)]
        pub payload: Option<MessagePayload>,
    }

    /// Message payload; only headers are requested
    #[derive(Debug, Clone, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessagePayload {
        #[serde(default)]
        pub headers: Vec<Header>,
        pub mime_type: Option<String>,
    }

    /// Email header (name-value pair)
    #[derive(Debug, Clone, Deserialize, Serialize)]
    pub struct Header {
        pub name: String,
        pub value: String,
    }

    impl Header {
        pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                value: value.into(),
            }
        }
    }

    /// Response from `users.history.list`
    ///
    /// `history` is absent when Gmail has no change detail for the range.
    #[derive(Debug, Clone, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct HistoryResponse {
        pub history: Option<Vec<HistoryRecord>>,
        pub next_page_token: Option<String>,
        pub history_id: Option<HistoryId>,
    }

    /// A single mailbox change event
    #[derive(Debug, Clone, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct HistoryRecord {
        pub id: Option<HistoryId>,
        #[serde(default)]
        pub messages_added: Vec<HistoryMessage>,
        #[serde(default)]
        pub messages_deleted: Vec<HistoryMessage>,
        #[serde(default)]
        pub labels_added: Vec<HistoryLabelChange>,
        #[serde(default)]
        pub labels_removed: Vec<HistoryLabelChange>,
    }

    /// Message added to or deleted from the mailbox
    #[derive(Debug, Clone, Deserialize)]
    pub struct HistoryMessage {
        pub message: MessageRef,
    }

    impl HistoryMessage {
        pub fn new(id: impl Into<String>) -> Self {
            Self {
                message: MessageRef::new(id),
            }
        }
    }

    /// Labels added to or removed from a message
    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct HistoryLabelChange {
        pub message: MessageRef,
        #[serde(default)]
        pub label_ids: Vec<String>,
    }

    impl HistoryLabelChange {
        pub fn new(id: impl Into<String>, label_ids: &[&str]) -> Self {
            Self {
                message: MessageRef::new(id),
                label_ids: label_ids.iter().map(|l| l.to_string()).collect(),
            }
        }

        pub fn contains(&self, label: &str) -> bool {
            self.label_ids.iter().any(|l| l == label)
        }
    }

    /// Response from `users.getProfile`
    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ProfileResponse {
        pub email_address: String,
        #[serde(default)]
        pub messages_total: Option<u64>,
        #[serde(default)]
        pub threads_total: Option<u64>,
        pub history_id: HistoryId,
    }

    /// Body of `users.watch`
    #[derive(Debug, Clone, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct WatchRequest {
        pub topic_name: String,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        pub label_ids: Vec<String>,
        pub label_filter_action: String,
    }

    impl WatchRequest {
        /// Watch the whole mailbox and publish to `topic_name`
        pub fn new(topic_name: impl Into<String>) -> Self {
            Self {
                topic_name: topic_name.into(),
                label_ids: Vec::new(),
                label_filter_action: "include".to_string(),
            }
        }
    }

    /// Response from `users.watch`
    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct WatchResponse {
        pub history_id: HistoryId,
        /// Expiration of the watch in milliseconds since epoch
        #[serde(default)]
        pub expiration: Option<String>,
    }

}
