//! Storage trait definitions

use crate::models::{Message, MessageId, Watermark};
use anyhow::Result;

/// A single mutation of one account's mirror
#[derive(Debug, Clone, PartialEq)]
pub enum LocalChange {
    /// Create a message; a no-op if the id is already stored
    Insert(Message),
    /// Delete a message; a no-op if the id is not stored
    Delete(MessageId),
    /// Set the starred flag; a no-op if the id is not stored
    SetStarred(MessageId, bool),
}

/// Trait for mirror storage operations
///
/// Messages are scoped by account. Implementations enforce one message per
/// (account, id) and one watermark per account.
pub trait MailStore: Send + Sync {
    /// Apply a batch of changes to one account, in order, as one transaction
    ///
    /// If `checkpoint` is given it is saved in the same transaction, so a
    /// page of changes and the watermark that covers it land together.
    /// Returns the number of messages newly created.
    fn commit_page(
        &self,
        account_id: &str,
        changes: Vec<LocalChange>,
        checkpoint: Option<Watermark>,
    ) -> Result<usize>;

    /// Check if a message exists
    fn has_message(&self, account_id: &str, id: &MessageId) -> Result<bool>;

    /// Get a message by ID
    fn get_message(&self, account_id: &str, id: &MessageId) -> Result<Option<Message>>;

    /// List messages ordered by received_at descending
    fn list_messages(&self, account_id: &str, limit: usize, offset: usize) -> Result<Vec<Message>>;

    /// List every stored message ID in ascending order
    fn list_message_ids(&self, account_id: &str) -> Result<Vec<MessageId>>;

    /// Count stored messages
    fn count_messages(&self, account_id: &str) -> Result<usize>;

    /// Get the watermark for an account
    fn get_watermark(&self, account_id: &str) -> Result<Option<Watermark>>;

    /// Save a watermark (upsert by account)
    fn save_watermark(&self, watermark: Watermark) -> Result<()>;

    /// Clear all data (for testing)
    fn clear(&self) -> Result<()>;

    /// Create a single message; returns false if it already existed
    fn insert_message(&self, account_id: &str, message: Message) -> Result<bool> {
        Ok(self.commit_page(account_id, vec![LocalChange::Insert(message)], None)? == 1)
    }

    /// Delete a single message
    fn delete_message(&self, account_id: &str, id: &MessageId) -> Result<()> {
        self.commit_page(account_id, vec![LocalChange::Delete(id.clone())], None)?;
        Ok(())
    }

    /// Set the starred flag of a single message
    fn set_starred(&self, account_id: &str, id: &MessageId, starred: bool) -> Result<()> {
        self.commit_page(
            account_id,
            vec![LocalChange::SetStarred(id.clone(), starred)],
            None,
        )?;
        Ok(())
    }
}
