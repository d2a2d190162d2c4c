//! Per-call sync context

use anyhow::{Context, Result};
use log::debug;

use crate::gmail::{MailService, Normalized, normalize_message};
use crate::models::{Message, MessageId, label};
use crate::storage::MailStore;

/// Tunables for enumeration and reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Messages requested per listing page
    pub page_size: usize,
    /// Label whose messages make up the mirror
    pub inbox_label: String,
    /// Gmail search query applied to the listing
    pub inbox_query: Option<String>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            page_size: 100,
            inbox_label: label::INBOX.to_string(),
            inbox_query: Some("category:primary".to_string()),
        }
    }
}

/// Everything one sync run needs for one account
///
/// Built per call; nothing here is global.
#[derive(Clone, Copy)]
pub struct SyncContext<'a> {
    pub account_id: &'a str,
    pub service: &'a dyn MailService,
    pub store: &'a dyn MailStore,
    pub options: &'a SyncOptions,
}

impl<'a> SyncContext<'a> {
    pub fn new(
        account_id: &'a str,
        service: &'a dyn MailService,
        store: &'a dyn MailStore,
        options: &'a SyncOptions,
    ) -> Self {
        Self {
            account_id,
            service,
            store,
            options,
        }
    }
}

/// Fetch and normalize one message
///
/// Returns `None` for trash and spam. Every remote error propagates,
/// including a 404 for a message that no longer exists.
pub(crate) fn fetch_normalized(ctx: &SyncContext<'_>, id: &MessageId) -> Result<Option<Message>> {
    let raw = ctx
        .service
        .get_message_metadata(id)
        .with_context(|| format!("Failed to fetch message {}", id))?;

    match normalize_message(raw) {
        Normalized::Message(message) => Ok(Some(message)),
        Normalized::Skip(reason) => {
            debug!("[{}] message {} skipped: {:?}", ctx.account_id, id, reason);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = SyncOptions::default();
        assert_eq!(options.page_size, 100);
        assert_eq!(options.inbox_label, "INBOX");
        assert_eq!(options.inbox_query.as_deref(), Some("category:primary"));
    }
}
