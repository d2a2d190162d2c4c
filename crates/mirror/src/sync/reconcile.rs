//! Incremental reconciliation from the Gmail change log
//!
//! Walks history pages starting at a known position and replays each record
//! against the mirror. Within a record, changes apply in a fixed order:
//! deletions, labels added, labels removed, then additions. Each page is
//! committed together with its checkpoint. When the change log can no longer
//! serve the requested range, the mirror is rebuilt by enumeration.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::time::Instant;

use super::context::{SyncContext, fetch_normalized};
use super::enumerate::{Enumeration, rebuild};
use super::watermark;
use crate::gmail::{GmailError, HistoryPage};
use crate::gmail::api::HistoryRecord;
use crate::models::{HistoryId, MessageId, label};
use crate::storage::LocalChange;

/// Statistics from a reconciliation run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileStats {
    /// History pages applied
    pub pages: usize,
    /// Messages created from `messagesAdded`
    pub added: usize,
    /// Messages deleted, or removed from the inbox
    pub removed: usize,
    /// Messages created because they re-entered the inbox
    pub restored: usize,
    pub starred: usize,
    pub unstarred: usize,
    /// Messages left out because they are in trash or spam
    pub filtered: usize,
    /// Duration of the run
    pub duration_ms: u64,
}

/// How a reconciliation run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// History was replayed up to `history_id`
    Applied {
        history_id: HistoryId,
        stats: ReconcileStats,
    },
    /// The change log had expired and the mirror was rebuilt
    Rebased {
        history_id: HistoryId,
        enumeration: Enumeration,
    },
}

impl ReconcileOutcome {
    /// Watermark position after the run
    pub fn history_id(&self) -> &HistoryId {
        match self {
            Self::Applied { history_id, .. } | Self::Rebased { history_id, .. } => history_id,
        }
    }

    pub fn is_rebased(&self) -> bool {
        matches!(self, Self::Rebased { .. })
    }
}

/// Result of creating a message inside a page
enum Created {
    Inserted,
    Present,
    Filtered,
}

/// Changes staged for one history page
///
/// Tracks which ids the staged changes create or delete, so later records in
/// the same page see the effect of earlier ones before anything is committed.
struct PageBatch<'c, 'a> {
    ctx: &'c SyncContext<'a>,
    changes: Vec<LocalChange>,
    presence: HashMap<String, bool>,
}

impl<'c, 'a> PageBatch<'c, 'a> {
    fn new(ctx: &'c SyncContext<'a>) -> Self {
        Self {
            ctx,
            changes: Vec::new(),
            presence: HashMap::new(),
        }
    }

    fn is_present(&self, id: &MessageId) -> Result<bool> {
        match self.presence.get(id.as_str()) {
            Some(present) => Ok(*present),
            None => self.ctx.store.has_message(self.ctx.account_id, id),
        }
    }

    fn delete(&mut self, id: &MessageId) -> Result<bool> {
        if !self.is_present(id)? {
            return Ok(false);
        }
        self.changes.push(LocalChange::Delete(id.clone()));
        self.presence.insert(id.0.clone(), false);
        Ok(true)
    }

    fn set_starred(&mut self, id: &MessageId, starred: bool) -> Result<bool> {
        if !self.is_present(id)? {
            return Ok(false);
        }
        self.changes.push(LocalChange::SetStarred(id.clone(), starred));
        Ok(true)
    }

    fn create(&mut self, id: &MessageId) -> Result<Created> {
        if self.is_present(id)? {
            return Ok(Created::Present);
        }
        match fetch_normalized(self.ctx, id)? {
            Some(message) => {
                self.changes.push(LocalChange::Insert(message));
                self.presence.insert(id.0.clone(), true);
                Ok(Created::Inserted)
            }
            None => Ok(Created::Filtered),
        }
    }

    fn into_changes(self) -> Vec<LocalChange> {
        self.changes
    }
}

/// Replay the change log from `from`
///
/// Returns [`ReconcileOutcome::Rebased`] when Gmail reports the range as
/// expired, a page carries no history detail, or a referenced message is
/// gone (HTTP 404). Any other error aborts the run; pages committed before
/// it keep their changes and checkpoint.
pub fn reconcile(ctx: &SyncContext<'_>, from: &HistoryId) -> Result<ReconcileOutcome> {
    let start = Instant::now();
    let account_id = ctx.account_id;
    let mut stats = ReconcileStats::default();
    let mut latest = from.clone();
    let mut page_token: Option<String> = None;

    loop {
        let page = match ctx
            .service
            .list_history(from, page_token.as_deref())
            .with_context(|| format!("Failed to list history from {}", from))?
        {
            HistoryPage::Page(page) => page,
            HistoryPage::Expired => return fall_back(ctx, from, "history expired"),
        };

        let Some(records) = page.history else {
            return fall_back(ctx, from, "no history detail returned");
        };
        stats.pages += 1;

        let mut batch = PageBatch::new(ctx);
        match apply_page(&mut batch, &records, &mut stats) {
            Ok(()) => {}
            // The page references a message Gmail no longer has
            Err(e) if GmailError::is_not_found(&e) => {
                return fall_back(ctx, from, "message gone before fetch");
            }
            Err(e) => return Err(e),
        }

        let checkpoint = match &page.history_id {
            Some(history_id) => {
                latest = watermark::later_of(Some(latest), history_id.clone());
                watermark::checkpoint_for(ctx.store, account_id, history_id)?
            }
            None => None,
        };

        ctx.store.commit_page(account_id, batch.into_changes(), checkpoint)?;
        debug!(
            "[{}] history page {}: {} records, checkpoint {:?}",
            account_id,
            stats.pages,
            records.len(),
            page.history_id
        );

        page_token = page.next_page_token.filter(|token| !token.is_empty());
        if page_token.is_none() {
            break;
        }
    }

    let history_id = watermark::advance(ctx.store, account_id, latest)?;
    stats.duration_ms = start.elapsed().as_millis() as u64;
    info!(
        "[{}] reconciled {} pages: +{} -{} restored {} starred {} unstarred {} filtered {} in {}ms (watermark {})",
        account_id,
        stats.pages,
        stats.added,
        stats.removed,
        stats.restored,
        stats.starred,
        stats.unstarred,
        stats.filtered,
        stats.duration_ms,
        history_id
    );

    Ok(ReconcileOutcome::Applied { history_id, stats })
}

fn fall_back(ctx: &SyncContext<'_>, from: &HistoryId, reason: &str) -> Result<ReconcileOutcome> {
    warn!(
        "[{}] cannot reconcile from {} ({}), rebuilding from full enumeration",
        ctx.account_id, from, reason
    );
    let enumeration = rebuild(ctx)?;
    Ok(ReconcileOutcome::Rebased {
        history_id: enumeration.history_id.clone(),
        enumeration,
    })
}

fn apply_page(
    batch: &mut PageBatch<'_, '_>,
    records: &[HistoryRecord],
    stats: &mut ReconcileStats,
) -> Result<()> {
    for record in records {
        apply_record(batch, record, stats)?;
    }
    Ok(())
}

/// Stage the changes of one history record
fn apply_record(
    batch: &mut PageBatch<'_, '_>,
    record: &HistoryRecord,
    stats: &mut ReconcileStats,
) -> Result<()> {
    let ctx = batch.ctx;
    let inbox = ctx.options.inbox_label.as_str();

    for deleted in &record.messages_deleted {
        if batch.delete(&MessageId::new(&deleted.message.id))? {
            stats.removed += 1;
        }
    }

    for change in &record.labels_added {
        let id = MessageId::new(&change.message.id);
        if change.contains(label::STARRED) && batch.set_starred(&id, true)? {
            stats.starred += 1;
        }
        if change.contains(inbox) {
            match batch.create(&id)? {
                Created::Inserted => stats.restored += 1,
                Created::Filtered => stats.filtered += 1,
                Created::Present => {}
            }
        }
    }

    for change in &record.labels_removed {
        let id = MessageId::new(&change.message.id);
        if change.contains(label::STARRED) && batch.set_starred(&id, false)? {
            stats.unstarred += 1;
        }
        if change.contains(inbox) && batch.delete(&id)? {
            stats.removed += 1;
        }
    }

    for added in &record.messages_added {
        match batch.create(&MessageId::new(&added.message.id))? {
            Created::Inserted => stats.added += 1,
            Created::Filtered => stats.filtered += 1,
            Created::Present => {}
        }
    }

    Ok(())
}
