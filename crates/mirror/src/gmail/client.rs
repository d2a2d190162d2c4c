//! Gmail API HTTP client
//!
//! Provides the remote half of the sync engine over the Gmail REST API.
//! Uses synchronous HTTP (ureq) to be executor-agnostic.

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use std::sync::Arc;

use super::api::{GmailMessage, HistoryResponse, ListMessagesResponse, ProfileResponse, WatchRequest, WatchResponse};
use super::{CredentialProvider, HISTORY_TYPES, HistoryPage, METADATA_HEADERS, MailService};
use crate::models::{HistoryId, MessageId};

/// Errors raised by the Gmail client
#[derive(Debug, thiserror::Error)]
pub enum GmailError {
    /// The credential provider has no token
    #[error("No Gmail credential available")]
    Unauthenticated,
    /// Gmail answered with a non-success status
    #[error("Gmail API returned HTTP {status} for {operation}")]
    Status { status: u16, operation: &'static str },
}

impl GmailError {
    /// Whether `err` carries a Gmail 404
    pub fn is_not_found(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<GmailError>(),
            Some(GmailError::Status { status: 404, .. })
        )
    }
}

/// Gmail API client for one mailbox (`users/me` of the supplied token)
pub struct GmailClient {
    credentials: Arc<dyn CredentialProvider>,
    base_url: String,
}

impl GmailClient {
    /// Gmail API base URL
    const BASE_URL: &'static str = "https://gmail.googleapis.com/gmail/v1";

    /// Largest page size Gmail accepts for message listing
    const MAX_PAGE_SIZE: usize = 500;

    /// Create a new Gmail client
    pub fn new(credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            credentials,
            base_url: Self::BASE_URL.to_string(),
        }
    }

    /// Point the client at a different API root (e.g. a local stub server)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn bearer(&self) -> Result<String> {
        let token = self
            .credentials
            .access_token()?
            .ok_or(GmailError::Unauthenticated)?;
        Ok(format!("Bearer {}", token))
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str, operation: &'static str) -> Result<T> {
        let auth = self.bearer()?;
        debug!("GET {}", url);

        let response = ureq::get(url).header("Authorization", &auth).call();
        read_json(response, operation)
    }

    fn messages_url(&self, label: &str, query: Option<&str>, max_results: usize, page_token: Option<&str>) -> String {
        let mut url = format!(
            "{}/users/me/messages?maxResults={}&labelIds={}",
            self.base_url,
            max_results.clamp(1, Self::MAX_PAGE_SIZE),
            urlencoding::encode(label)
        );

        if let Some(q) = query {
            url.push_str(&format!("&q={}", urlencoding::encode(q)));
        }
        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
        }
        url
    }

    fn metadata_url(&self, id: &MessageId) -> String {
        let mut url = format!(
            "{}/users/me/messages/{}?format=metadata",
            self.base_url,
            urlencoding::encode(id.as_str())
        );
        for header in METADATA_HEADERS {
            url.push_str(&format!("&metadataHeaders={}", header));
        }
        url
    }

    fn history_url(&self, start_history_id: &HistoryId, page_token: Option<&str>) -> String {
        let mut url = format!(
            "{}/users/me/history?startHistoryId={}",
            self.base_url,
            urlencoding::encode(start_history_id.as_str())
        );
        for history_type in HISTORY_TYPES {
            url.push_str(&format!("&historyTypes={}", history_type));
        }
        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
        }
        url
    }
}

/// Decode a JSON response, turning HTTP failures into [`GmailError::Status`]
fn read_json<T: DeserializeOwned>(
    response: Result<ureq::http::Response<ureq::Body>, ureq::Error>,
    operation: &'static str,
) -> Result<T> {
    match response {
        Ok(mut resp) => resp
            .body_mut()
            .read_json()
            .with_context(|| format!("Failed to parse {} response", operation)),
        Err(ureq::Error::StatusCode(status)) => Err(GmailError::Status { status, operation }.into()),
        Err(e) => Err(anyhow::Error::new(e).context(format!("Failed to send {} request", operation))),
    }
}

impl MailService for GmailClient {
    fn has_credentials(&self) -> bool {
        match self.credentials.access_token() {
            Ok(token) => token.is_some(),
            Err(e) => {
                warn!("Failed to load Gmail credential: {:#}", e);
                false
            }
        }
    }

    fn list_messages(
        &self,
        label: &str,
        query: Option<&str>,
        max_results: usize,
        page_token: Option<&str>,
    ) -> Result<ListMessagesResponse> {
        let url = self.messages_url(label, query, max_results, page_token);
        self.get_json(&url, "list messages")
    }

    fn get_message_metadata(&self, id: &MessageId) -> Result<GmailMessage> {
        let url = self.metadata_url(id);
        self.get_json(&url, "get message")
    }

    fn list_history(
        &self,
        start_history_id: &HistoryId,
        page_token: Option<&str>,
    ) -> Result<HistoryPage> {
        let url = self.history_url(start_history_id, page_token);
        match self.get_json::<HistoryResponse>(&url, "list history") {
            Ok(history) => Ok(HistoryPage::Page(history)),
            // Gmail answers 404 when startHistoryId is outside the retained range
            Err(e) if GmailError::is_not_found(&e) => Ok(HistoryPage::Expired),
            Err(e) => Err(e),
        }
    }

    fn get_profile(&self) -> Result<ProfileResponse> {
        let url = format!("{}/users/me/profile", self.base_url);
        self.get_json(&url, "get profile")
    }

    fn watch(&self, request: &WatchRequest) -> Result<WatchResponse> {
        let auth = self.bearer()?;
        let url = format!("{}/users/me/watch", self.base_url);
        debug!("POST {}", url);

        let response = ureq::post(&url)
            .header("Authorization", &auth)
            .send_json(request);
        read_json(response, "watch")
    }
}
