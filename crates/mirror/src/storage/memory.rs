//! In-memory storage implementation
//!
//! Used in tests and for throwaway mirrors. A single lock covers messages
//! and watermarks so a page commit is atomic like the SQLite backend.

use anyhow::{Result, anyhow};
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{LocalChange, MailStore};
use crate::models::{Message, MessageId, Watermark};

#[derive(Default)]
struct State {
    /// Messages per account, keyed by id; BTreeMap keeps id listing ordered
    messages: HashMap<String, BTreeMap<String, Message>>,
    /// Watermark per account
    watermarks: HashMap<String, Watermark>,
}

impl State {
    fn account(&self, account_id: &str) -> Option<&BTreeMap<String, Message>> {
        self.messages.get(account_id)
    }
}

/// In-memory implementation of MailStore
#[derive(Default)]
pub struct InMemoryMailStore {
    state: RwLock<State>,
}

impl InMemoryMailStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

impl MailStore for InMemoryMailStore {
    fn commit_page(
        &self,
        account_id: &str,
        changes: Vec<LocalChange>,
        checkpoint: Option<Watermark>,
    ) -> Result<usize> {
        let mut state = self.write()?;
        let messages = state.messages.entry(account_id.to_string()).or_default();
        let mut created = 0;

        for change in changes {
            match change {
                LocalChange::Insert(message) => {
                    if !messages.contains_key(message.id.as_str()) {
                        messages.insert(message.id.0.clone(), message);
                        created += 1;
                    }
                }
                LocalChange::Delete(id) => {
                    messages.remove(id.as_str());
                }
                LocalChange::SetStarred(id, starred) => {
                    if let Some(message) = messages.get_mut(id.as_str()) {
                        message.is_starred = starred;
                    }
                }
            }
        }

        if let Some(watermark) = checkpoint {
            state.watermarks.insert(watermark.account_id.clone(), watermark);
        }

        Ok(created)
    }

    fn has_message(&self, account_id: &str, id: &MessageId) -> Result<bool> {
        let state = self.read()?;
        Ok(state
            .account(account_id)
            .is_some_and(|messages| messages.contains_key(id.as_str())))
    }

    fn get_message(&self, account_id: &str, id: &MessageId) -> Result<Option<Message>> {
        let state = self.read()?;
        Ok(state
            .account(account_id)
            .and_then(|messages| messages.get(id.as_str()))
            .cloned())
    }

    fn list_messages(&self, account_id: &str, limit: usize, offset: usize) -> Result<Vec<Message>> {
        let state = self.read()?;
        let mut messages: Vec<Message> = state
            .account(account_id)
            .map(|messages| messages.values().cloned().collect())
            .unwrap_or_default();

        // Sort by received_at descending, id as tie-break to match SQLite
        messages.sort_by(|a, b| {
            b.received_at
                .cmp(&a.received_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        Ok(messages.into_iter().skip(offset).take(limit).collect())
    }

    fn list_message_ids(&self, account_id: &str) -> Result<Vec<MessageId>> {
        let state = self.read()?;
        Ok(state
            .account(account_id)
            .map(|messages| messages.keys().map(|id| MessageId::new(id.as_str())).collect())
            .unwrap_or_default())
    }

    fn count_messages(&self, account_id: &str) -> Result<usize> {
        let state = self.read()?;
        Ok(state.account(account_id).map_or(0, BTreeMap::len))
    }

    fn get_watermark(&self, account_id: &str) -> Result<Option<Watermark>> {
        Ok(self.read()?.watermarks.get(account_id).cloned())
    }

    fn save_watermark(&self, watermark: Watermark) -> Result<()> {
        self.write()?
            .watermarks
            .insert(watermark.account_id.clone(), watermark);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut state = self.write()?;
        state.messages.clear();
        state.watermarks.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HistoryId;

    const ACCOUNT: &str = "user@gmail.com";

    fn make_message(id: &str) -> Message {
        Message::builder(MessageId::new(id)).subject(id).build()
    }

    #[test]
    fn test_commit_page_counts_new_rows_only() {
        let store = InMemoryMailStore::new();
        store.insert_message(ACCOUNT, make_message("m1")).unwrap();

        let created = store
            .commit_page(
                ACCOUNT,
                vec![
                    LocalChange::Insert(make_message("m1")),
                    LocalChange::Insert(make_message("m2")),
                ],
                None,
            )
            .unwrap();

        assert_eq!(created, 1);
        assert_eq!(store.count_messages(ACCOUNT).unwrap(), 2);
    }

    #[test]
    fn test_star_round_trip() {
        let store = InMemoryMailStore::new();
        let id = MessageId::new("m1");
        store.insert_message(ACCOUNT, make_message("m1")).unwrap();

        store.set_starred(ACCOUNT, &id, true).unwrap();
        assert!(store.get_message(ACCOUNT, &id).unwrap().unwrap().is_starred);

        store.set_starred(ACCOUNT, &id, false).unwrap();
        assert!(!store.get_message(ACCOUNT, &id).unwrap().unwrap().is_starred);
        assert_eq!(store.count_messages(ACCOUNT).unwrap(), 1);
    }

    #[test]
    fn test_delete_and_checkpoint() {
        let store = InMemoryMailStore::new();
        store.insert_message(ACCOUNT, make_message("m1")).unwrap();

        store
            .commit_page(
                ACCOUNT,
                vec![LocalChange::Delete(MessageId::new("m1"))],
                Some(Watermark::new(ACCOUNT, "9")),
            )
            .unwrap();

        assert!(!store.has_message(ACCOUNT, &MessageId::new("m1")).unwrap());
        assert_eq!(
            store.get_watermark(ACCOUNT).unwrap().unwrap().history_id,
            Some(HistoryId::new("9"))
        );
    }

    #[test]
    fn test_unknown_account_is_empty() {
        let store = InMemoryMailStore::new();
        assert_eq!(store.count_messages("nobody").unwrap(), 0);
        assert!(store.list_messages("nobody", 10, 0).unwrap().is_empty());
        assert!(store.list_message_ids("nobody").unwrap().is_empty());
    }
}
