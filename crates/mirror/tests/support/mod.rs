//! Scripted Gmail fake shared by the integration tests
#![allow(dead_code)]

use anyhow::Result;
use base64::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use mirror::gmail::api::{
    GmailMessage, Header, HistoryLabelChange, HistoryMessage, HistoryRecord, HistoryResponse,
    ListMessagesResponse, MessagePayload, MessageRef, ProfileResponse, WatchRequest, WatchResponse,
};
use mirror::{GmailError, HistoryId, HistoryPage, MailService, MessageId};

/// Calls made against the fake
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Calls {
    pub list_messages: usize,
    pub get_message: usize,
    pub list_history: usize,
    pub get_profile: usize,
    pub watch: usize,
    /// `startHistoryId` of every history call
    pub history_starts: Vec<HistoryId>,
}

struct FakeState {
    /// Every message that exists remotely
    messages: HashMap<String, GmailMessage>,
    /// Listing order of the inbox
    inbox: Vec<String>,
    /// History pages served in order for any start position
    history: Vec<HistoryResponse>,
    /// Ids whose metadata fetch fails with a server error
    failing: HashSet<String>,
    expired: bool,
    authenticated: bool,
    profile_history_id: HistoryId,
    /// Time each history call takes
    history_delay: Option<Duration>,
    calls: Calls,
}

/// In-memory stand-in for the Gmail API
pub struct FakeGmail {
    email: String,
    state: Mutex<FakeState>,
    /// History calls in progress right now
    in_flight: AtomicUsize,
    /// Most history calls ever in progress at once
    peak_in_flight: AtomicUsize,
}

/// Marks one history call as in progress until dropped
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeGmail {
    pub fn new(email: &str) -> Self {
        Self {
            email: email.to_string(),
            state: Mutex::new(FakeState {
                messages: HashMap::new(),
                inbox: Vec::new(),
                history: Vec::new(),
                failing: HashSet::new(),
                expired: false,
                authenticated: true,
                profile_history_id: HistoryId::new("1000"),
                history_delay: None,
                calls: Calls::default(),
            }),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Add a message to the remote mailbox and the inbox listing
    pub fn add_inbox_message(&self, id: &str, labels: &[&str]) {
        let mut state = self.state();
        state.messages.insert(id.to_string(), gmail_message(id, labels));
        if !state.inbox.iter().any(|m| m == id) {
            state.inbox.push(id.to_string());
        }
    }

    /// Add `count` inbox messages named `{prefix}{n}`
    pub fn add_inbox_messages(&self, prefix: &str, count: usize) {
        for n in 0..count {
            self.add_inbox_message(&format!("{}{:03}", prefix, n), &["INBOX"]);
        }
    }

    /// Add a message that exists remotely but is not listed in the inbox
    pub fn add_remote_message(&self, id: &str, labels: &[&str]) {
        self.state()
            .messages
            .insert(id.to_string(), gmail_message(id, labels));
    }

    /// Replace the raw message served for its id
    pub fn put_raw_message(&self, message: GmailMessage) {
        self.state().messages.insert(message.id.clone(), message);
    }

    /// Remove a message from the inbox listing; it still exists remotely
    pub fn remove_from_inbox(&self, id: &str) {
        self.state().inbox.retain(|m| m != id);
    }

    /// Remove a message entirely
    pub fn delete_message(&self, id: &str) {
        let mut state = self.state();
        state.inbox.retain(|m| m != id);
        state.messages.remove(id);
    }

    pub fn fail_message(&self, id: &str) {
        self.state().failing.insert(id.to_string());
    }

    /// Append a history page
    pub fn push_history(&self, history_id: &str, records: Vec<HistoryRecord>) {
        self.state().history.push(HistoryResponse {
            history: Some(records),
            next_page_token: None,
            history_id: Some(HistoryId::new(history_id)),
        });
    }

    /// Append a page that carries no history detail
    pub fn push_empty_history(&self, history_id: &str) {
        self.state().history.push(HistoryResponse {
            history: None,
            next_page_token: None,
            history_id: Some(HistoryId::new(history_id)),
        });
    }

    pub fn set_expired(&self, expired: bool) {
        self.state().expired = expired;
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.state().authenticated = authenticated;
    }

    pub fn set_profile_history_id(&self, history_id: &str) {
        self.state().profile_history_id = HistoryId::new(history_id);
    }

    /// Make every history call take `delay`, outside the state lock
    pub fn set_history_delay(&self, delay: Duration) {
        self.state().history_delay = Some(delay);
    }

    /// Most history calls that were ever running at the same time
    pub fn peak_history_calls(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Calls {
        self.state().calls.clone()
    }

    fn enter_history(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = self.state().history_delay;
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        InFlight(&self.in_flight)
    }

    fn require_auth(&self) -> Result<()> {
        if self.state().authenticated {
            Ok(())
        } else {
            Err(GmailError::Unauthenticated.into())
        }
    }
}

impl MailService for FakeGmail {
    fn has_credentials(&self) -> bool {
        self.state().authenticated
    }

    fn list_messages(
        &self,
        label: &str,
        _query: Option<&str>,
        max_results: usize,
        page_token: Option<&str>,
    ) -> Result<ListMessagesResponse> {
        self.require_auth()?;
        let mut state = self.state();
        state.calls.list_messages += 1;
        assert_eq!(label, "INBOX");

        let offset: usize = page_token.map(|t| t.parse().unwrap()).unwrap_or(0);
        let end = (offset + max_results).min(state.inbox.len());
        let refs: Vec<MessageRef> = state.inbox[offset..end].iter().map(MessageRef::new).collect();

        Ok(ListMessagesResponse {
            messages: if refs.is_empty() { None } else { Some(refs) },
            next_page_token: (end < state.inbox.len()).then(|| end.to_string()),
            result_size_estimate: Some(state.inbox.len() as u32),
        })
    }

    fn get_message_metadata(&self, id: &MessageId) -> Result<GmailMessage> {
        self.require_auth()?;
        let mut state = self.state();
        state.calls.get_message += 1;

        if state.failing.contains(id.as_str()) {
            return Err(GmailError::Status {
                status: 500,
                operation: "get message",
            }
            .into());
        }

        state.messages.get(id.as_str()).cloned().ok_or_else(|| {
            GmailError::Status {
                status: 404,
                operation: "get message",
            }
            .into()
        })
    }

    fn list_history(&self, start_history_id: &HistoryId, page_token: Option<&str>) -> Result<HistoryPage> {
        self.require_auth()?;
        let _in_flight = self.enter_history();
        let mut state = self.state();
        state.calls.list_history += 1;
        state.calls.history_starts.push(start_history_id.clone());

        if state.expired {
            return Ok(HistoryPage::Expired);
        }

        let index: usize = page_token.map(|t| t.parse().unwrap()).unwrap_or(0);
        let Some(page) = state.history.get(index) else {
            return Ok(HistoryPage::Page(HistoryResponse {
                history: Some(Vec::new()),
                next_page_token: None,
                history_id: Some(state.profile_history_id.clone()),
            }));
        };

        let mut page = page.clone();
        if index + 1 < state.history.len() {
            page.next_page_token = Some((index + 1).to_string());
        }
        Ok(HistoryPage::Page(page))
    }

    fn get_profile(&self) -> Result<ProfileResponse> {
        self.require_auth()?;
        let mut state = self.state();
        state.calls.get_profile += 1;
        Ok(ProfileResponse {
            email_address: self.email.clone(),
            messages_total: Some(state.messages.len() as u64),
            threads_total: None,
            history_id: state.profile_history_id.clone(),
        })
    }

    fn watch(&self, request: &WatchRequest) -> Result<WatchResponse> {
        self.require_auth()?;
        let mut state = self.state();
        state.calls.watch += 1;
        assert!(!request.topic_name.is_empty());
        Ok(WatchResponse {
            history_id: state.profile_history_id.clone(),
            expiration: Some("1767225600000".to_string()),
        })
    }
}

/// Metadata for a message with standard headers
pub fn gmail_message(id: &str, labels: &[&str]) -> GmailMessage {
    GmailMessage {
        id: id.to_string(),
        thread_id: Some(format!("t-{}", id)),
        label_ids: labels.iter().map(|l| l.to_string()).collect(),
        snippet: format!("Snippet of {}", id),
        internal_date: None,
        payload: Some(MessagePayload {
            headers: vec![
                Header::new("Subject", format!("Subject {}", id)),
                Header::new("From", "Alice <alice@example.com>"),
                Header::new("To", "me@example.com"),
                Header::new("Date", "Mon, 06 Jan 2025 09:15:00 +0000"),
            ],
            mime_type: Some("text/plain".to_string()),
        }),
    }
}

pub fn added(id: &str) -> HistoryRecord {
    HistoryRecord {
        messages_added: vec![HistoryMessage::new(id)],
        ..Default::default()
    }
}

pub fn deleted(id: &str) -> HistoryRecord {
    HistoryRecord {
        messages_deleted: vec![HistoryMessage::new(id)],
        ..Default::default()
    }
}

pub fn labels_added(id: &str, labels: &[&str]) -> HistoryRecord {
    HistoryRecord {
        labels_added: vec![HistoryLabelChange::new(id, labels)],
        ..Default::default()
    }
}

pub fn labels_removed(id: &str, labels: &[&str]) -> HistoryRecord {
    HistoryRecord {
        labels_removed: vec![HistoryLabelChange::new(id, labels)],
        ..Default::default()
    }
}

/// Pub/Sub push body carrying a Gmail notification
pub fn push_body(email: &str, history_id: u64) -> Vec<u8> {
    let data = format!(r#"{{"emailAddress": "{}", "historyId": {}}}"#, email, history_id);
    format!(
        r#"{{"message": {{"data": "{}", "messageId": "42"}}, "subscription": "projects/p/subscriptions/s"}}"#,
        BASE64_STANDARD.encode(data)
    )
    .into_bytes()
}
